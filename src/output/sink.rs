//! Display sinks for drained prediction results.

use crate::core::prediction::PredictionResult;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Stdout, Write};
use std::path::Path;

/// Receives batches of results drained from the queue.
pub trait ResultSink: Send {
    fn deliver(&mut self, batch: &[PredictionResult]) -> io::Result<()>;
}

/// Latest reading shown to the operator.
#[derive(Debug, Clone, Default)]
pub struct DisplayState {
    latest: Option<PredictionResult>,
}

impl DisplayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, result: &PredictionResult) {
        self.latest = Some(result.clone());
    }

    pub fn latest(&self) -> Option<&PredictionResult> {
        self.latest.as_ref()
    }

    /// The four operator lines: predicted, visualizer, difference, breath.
    pub fn lines(&self) -> [String; 4] {
        match &self.latest {
            Some(r) => [
                format!("Predicted Heart Rate: {:.2} bpm", r.predicted_heart_rate),
                format!("Visualizer Heart Rate: {:.2} bpm", r.reference_heart_rate),
                format!("Difference: {:.2} bpm", r.difference()),
                format!("Breath Rate: {:.2} breaths/min", r.breath_rate),
            ],
            None => [
                "Predicted Heart Rate: -- bpm".to_string(),
                "Visualizer Heart Rate: -- bpm".to_string(),
                "Difference: -- bpm".to_string(),
                "Breath Rate: -- breaths/min".to_string(),
            ],
        }
    }
}

/// Prints one line per result.
pub struct ConsoleSink<W: Write + Send = Stdout> {
    out: W,
    display: DisplayState,
}

impl ConsoleSink<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            display: DisplayState::new(),
        }
    }

    pub fn display(&self) -> &DisplayState {
        &self.display
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> ResultSink for ConsoleSink<W> {
    fn deliver(&mut self, batch: &[PredictionResult]) -> io::Result<()> {
        for result in batch {
            self.display.update(result);
            let name = result
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            writeln!(
                self.out,
                "[{}] {}#{} | {}",
                result.produced_at.format("%H:%M:%S"),
                name,
                result.frame_index,
                self.display.lines().join(" | ")
            )?;
        }
        self.out.flush()
    }
}

/// Appends results as JSON lines.
pub struct JsonlSink {
    writer: BufWriter<File>,
}

impl JsonlSink {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl ResultSink for JsonlSink {
    fn deliver(&mut self, batch: &[PredictionResult]) -> io::Result<()> {
        for result in batch {
            serde_json::to_writer(&mut self.writer, result).map_err(io::Error::other)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()
    }
}

/// Forwards every batch to each inner sink in turn.
pub struct FanOutSink {
    sinks: Vec<Box<dyn ResultSink>>,
}

impl FanOutSink {
    pub fn new(sinks: Vec<Box<dyn ResultSink>>) -> Self {
        Self { sinks }
    }
}

impl ResultSink for FanOutSink {
    fn deliver(&mut self, batch: &[PredictionResult]) -> io::Result<()> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(e) = sink.deliver(batch) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
