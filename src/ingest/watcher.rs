//! Directory watching and per-file dispatch.
//!
//! A `notify` watcher forwards raw events to a dedicated thread, which turns
//! them into [`FileEvent`]s and passes each through the [`EventRouter`]:
//! suffix filter, then a registry claim, then dispatch of a
//! [`FileProcessor`] run. The router never waits for a processor to finish.

use crate::ingest::dedup::DedupRegistry;
use crate::ingest::dispatch::Dispatcher;
use crate::ingest::processor::FileProcessor;
use crate::telemetry::SharedPipelineStats;
use crossbeam_channel::{unbounded, RecvTimeoutError};
use notify::event::CreateKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// How often the watcher thread checks its stop flag while idle.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Directory '{0}' does not exist")]
    MissingDirectory(PathBuf),

    #[error("File watching error: {0}")]
    Notify(#[from] notify::Error),

    #[error("Failed to start watcher thread: {0}")]
    Thread(#[from] std::io::Error),
}

/// Kind of file system change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Modified,
    Removed,
    /// A directory appeared; files inside it may predate its watch.
    DirectoryCreated,
}

/// A change to one file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

impl FileEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FileEventKind::Created,
        }
    }

    /// Convert a notify event. Access and other kinds map to nothing.
    pub fn from_notify(event: notify::Event) -> Vec<FileEvent> {
        let kind = match event.kind {
            EventKind::Create(CreateKind::Folder) => FileEventKind::DirectoryCreated,
            EventKind::Create(_) => FileEventKind::Created,
            EventKind::Modify(_) => FileEventKind::Modified,
            EventKind::Remove(_) => FileEventKind::Removed,
            _ => return Vec::new(),
        };

        event
            .paths
            .into_iter()
            .map(|path| FileEvent { path, kind })
            .collect()
    }

    /// Whether this announces a new directory. Some backends only report
    /// `Create(Any)`, so a created path that is a directory also counts.
    pub fn is_new_directory(&self) -> bool {
        match self.kind {
            FileEventKind::DirectoryCreated => true,
            FileEventKind::Created => self.path.is_dir(),
            _ => false,
        }
    }

    /// Creation events for every file already under a new directory.
    pub fn scan_directory(dir: &Path) -> Vec<FileEvent> {
        WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| FileEvent::created(e.into_path()))
            .collect()
    }
}

/// What the router did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    /// A processor was started for the file.
    Dispatched,
    /// The file had already been claimed.
    Duplicate,
    /// Not a qualifying creation event.
    Ignored,
    /// The file was claimed but its processor could not be started.
    DispatchFailed,
}

/// Filters events and dispatches one processor per new file.
pub struct EventRouter {
    suffix: String,
    registry: Arc<DedupRegistry>,
    processor: FileProcessor,
    dispatcher: Dispatcher,
    stats: SharedPipelineStats,
}

impl EventRouter {
    pub fn new(
        suffix: impl Into<String>,
        registry: Arc<DedupRegistry>,
        processor: FileProcessor,
        dispatcher: Dispatcher,
    ) -> Self {
        let stats = Arc::clone(processor.stats());
        Self {
            suffix: suffix.into(),
            registry,
            processor,
            dispatcher,
            stats,
        }
    }

    pub fn registry(&self) -> &Arc<DedupRegistry> {
        &self.registry
    }

    fn qualifies(&self, path: &Path) -> bool {
        path.to_string_lossy().ends_with(self.suffix.as_str()) && !path.is_dir()
    }

    /// Route one event. Returns immediately; processing happens elsewhere.
    pub fn route(&self, event: &FileEvent) -> RouteDecision {
        if event.kind != FileEventKind::Created || !self.qualifies(&event.path) {
            return RouteDecision::Ignored;
        }

        if !self.registry.claim(&event.path) {
            self.stats.record_duplicate_event();
            debug!("Ignoring repeated event for {}", event.path.display());
            return RouteDecision::Duplicate;
        }

        self.stats.record_file_detected();
        info!("Detected new file: {}", event.path.display());

        let processor = self.processor.clone();
        let path = event.path.clone();
        match self.dispatcher.dispatch(Box::new(move || {
            processor.process(&path);
        })) {
            Ok(()) => RouteDecision::Dispatched,
            Err(e) => {
                self.stats.record_file_failed();
                error!("Could not dispatch {}: {}", event.path.display(), e);
                RouteDecision::DispatchFailed
            }
        }
    }

    /// Stop dispatching and wait for any pooled work to drain.
    pub fn shutdown(self) {
        self.dispatcher.shutdown();
    }
}

/// Watches a directory and routes creation events.
pub struct DirectoryWatcher;

impl DirectoryWatcher {
    /// Start watching `dir`. Fails if the directory does not exist.
    pub fn start(
        dir: impl AsRef<Path>,
        recursive: bool,
        router: EventRouter,
    ) -> Result<WatcherHandle, WatchError> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(WatchError::MissingDirectory(dir));
        }

        let (tx, rx) = unbounded::<notify::Result<notify::Event>>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            // Receiver gone means the watcher is shutting down.
            let _ = tx.send(res);
        })?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher.watch(&dir, mode)?;

        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let thread = thread::Builder::new()
            .name("vitals-watcher".to_string())
            .spawn(move || {
                while flag.load(Ordering::SeqCst) {
                    match rx.recv_timeout(STOP_POLL_INTERVAL) {
                        Ok(Ok(event)) => {
                            for file_event in FileEvent::from_notify(event) {
                                if file_event.is_new_directory() {
                                    if recursive {
                                        route_new_directory(&router, &file_event.path);
                                    }
                                    continue;
                                }
                                router.route(&file_event);
                            }
                        }
                        Ok(Err(e)) => warn!("Notify error: {}", e),
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                router
            })?;

        info!("Started monitoring directory: {}", dir.display());

        Ok(WatcherHandle {
            dir,
            watcher: Some(watcher),
            running,
            thread: Some(thread),
        })
    }
}

/// Route files written into a directory before notify started watching it.
///
/// Files that also raise their own creation event are dropped by the registry.
fn route_new_directory(router: &EventRouter, dir: &Path) {
    let found = FileEvent::scan_directory(dir);
    debug!("New directory {} holds {} file(s)", dir.display(), found.len());
    for event in &found {
        router.route(event);
    }
}

/// Handle to a running directory watcher.
pub struct WatcherHandle {
    dir: PathBuf,
    watcher: Option<RecommendedWatcher>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<EventRouter>>,
}

impl WatcherHandle {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop detecting new files and return the router.
    ///
    /// Processors already dispatched are not cancelled.
    pub fn stop(mut self) -> Option<EventRouter> {
        self.halt()
    }

    fn halt(&mut self) -> Option<EventRouter> {
        self.running.store(false, Ordering::SeqCst);
        self.watcher.take();
        let thread = self.thread.take()?;
        match thread.join() {
            Ok(router) => {
                info!("Stopped monitoring directory: {}", self.dir.display());
                Some(router)
            }
            Err(_) => {
                error!("Watcher thread panicked");
                None
            }
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.halt();
    }
}
