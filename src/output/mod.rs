//! Result handoff from file processors to the display layer.
//!
//! Processors push into a [`ResultQueue`]; a single [`QueueConsumer`] drains it
//! on a fixed interval and forwards each batch to a [`ResultSink`].

pub mod consumer;
pub mod queue;
pub mod sink;

// Re-export commonly used types
pub use consumer::{ConsumerHandle, QueueConsumer};
pub use queue::ResultQueue;
pub use sink::{ConsoleSink, DisplayState, FanOutSink, JsonlSink, ResultSink};
