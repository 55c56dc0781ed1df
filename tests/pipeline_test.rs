//! End-to-end tests for the ingestion pipeline.

use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use synheart_vitals_agent::{
    ingest::{FileEvent, RouteDecision},
    telemetry::create_shared_stats,
    DedupRegistry, DirectoryWatcher, DispatchPolicy, Dispatcher, EventRouter, FileProcessor,
    LinearModel, PredictionResult, ResultQueue, RetryingReader, SharedPipelineStats,
};
use tempfile::TempDir;

const MODEL: &str = r#"{
    "features": ["heartWaveform_0", "heartWaveform_1", "breathWaveform_0"],
    "weights": [10.0, 1.0, 0.5],
    "intercept": 60.0
}"#;

struct Harness {
    queue: ResultQueue,
    stats: SharedPipelineStats,
    registry: Arc<DedupRegistry>,
}

impl Harness {
    fn new() -> Self {
        Self {
            queue: ResultQueue::new(),
            stats: create_shared_stats(),
            registry: Arc::new(DedupRegistry::new()),
        }
    }

    fn router(&self, retries: u32, delay: Duration, policy: DispatchPolicy) -> EventRouter {
        let processor = FileProcessor::new(
            RetryingReader::fixed(retries, delay),
            Arc::new(LinearModel::from_json(MODEL).unwrap()),
            self.queue.clone(),
            Arc::clone(&self.stats),
        );
        EventRouter::new(
            ".json",
            Arc::clone(&self.registry),
            processor,
            Dispatcher::new(policy).unwrap(),
        )
    }

    /// Drain results until `count` have arrived or the timeout passes.
    fn collect(&self, count: usize, timeout: Duration) -> Vec<PredictionResult> {
        let deadline = Instant::now() + timeout;
        let mut results = Vec::new();
        while results.len() < count && Instant::now() < deadline {
            results.extend(self.queue.drain_all());
            thread::sleep(Duration::from_millis(10));
        }
        results
    }

    /// Wait for every dispatched processor to finish.
    fn settle(&self, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        // Give freshly dispatched threads a moment to register as in flight.
        thread::sleep(Duration::from_millis(20));
        while self.stats.in_flight() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
    }
}

fn vitals_file(heart: f64) -> String {
    format!(
        r#"{{"data": [{{"frameData": {{"vitals": {{"heartRate": 70.0, "breathRate": 12.0, "heartWaveform": [{heart}], "breathWaveform": [2.0]}}}}}}]}}"#
    )
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

#[test]
fn test_duplicate_events_dispatch_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("replay_1.json");
    write(&path, &vitals_file(1.0));

    let harness = Harness::new();
    let router = Arc::new(harness.router(1, Duration::ZERO, DispatchPolicy::ThreadPerFile));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let router = Arc::clone(&router);
            let path = path.clone();
            thread::spawn(move || router.route(&FileEvent::created(path)))
        })
        .collect();
    let decisions: Vec<RouteDecision> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let dispatched = decisions
        .iter()
        .filter(|d| **d == RouteDecision::Dispatched)
        .count();
    assert_eq!(dispatched, 1);

    harness.settle(Duration::from_secs(5));
    let results = harness.collect(1, Duration::from_millis(200));
    assert_eq!(results.len(), 1);
    // heartWaveform_1 is absent from the frame and contributes zero.
    assert_eq!(results[0].predicted_heart_rate, 60.0 + 10.0 * 1.0 + 0.5 * 2.0);
    assert_eq!(harness.stats.stats().duplicate_events, 7);
}

#[test]
fn test_late_write_yields_one_result_after_a_delay() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("late.json");
    write(&path, "");

    let delay = Duration::from_millis(60);
    let harness = Harness::new();
    let router = harness.router(3, delay, DispatchPolicy::ThreadPerFile);

    let started = Instant::now();
    assert_eq!(
        router.route(&FileEvent::created(path.clone())),
        RouteDecision::Dispatched
    );

    thread::sleep(Duration::from_millis(90));
    write(&path, &vitals_file(2.0));

    let results = harness.collect(1, Duration::from_secs(5));
    assert_eq!(results.len(), 1);
    assert!(started.elapsed() >= delay);
    assert_eq!(results[0].source, path);

    harness.settle(Duration::from_secs(5));
    assert!(harness.queue.drain_all().is_empty());
    assert_eq!(harness.stats.stats().files_completed, 1);
}

#[test]
fn test_malformed_file_exhausts_retries_without_results() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    write(&path, r#"{"data": [{"frameData": "#);

    let harness = Harness::new();
    let router = harness.router(3, Duration::from_millis(5), DispatchPolicy::ThreadPerFile);
    router.route(&FileEvent::created(path));
    harness.settle(Duration::from_secs(5));

    let stats = harness.stats.stats();
    assert_eq!(stats.read_attempts, 3);
    assert_eq!(stats.files_gave_up, 1);
    assert!(harness.queue.drain_all().is_empty());
}

#[test]
fn test_empty_file_exhausts_retries_without_results() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.json");
    write(&path, "");

    let harness = Harness::new();
    let router = harness.router(4, Duration::from_millis(5), DispatchPolicy::ThreadPerFile);
    router.route(&FileEvent::created(path));
    harness.settle(Duration::from_secs(5));

    let stats = harness.stats.stats();
    assert_eq!(stats.read_attempts, 4);
    assert_eq!(stats.files_gave_up, 1);
    assert!(harness.queue.is_empty());
}

#[test]
fn test_many_files_each_yield_exactly_one_result() {
    for policy in [
        DispatchPolicy::ThreadPerFile,
        DispatchPolicy::WorkerPool { workers: 3 },
    ] {
        let dir = TempDir::new().unwrap();
        let harness = Harness::new();
        let router = harness.router(2, Duration::from_millis(1), policy);

        let paths: Vec<PathBuf> = (0..12)
            .map(|i| dir.path().join(format!("replay_{i}.json")))
            .collect();
        for (i, path) in paths.iter().enumerate() {
            write(path, &vitals_file(i as f64));
            router.route(&FileEvent::created(path.clone()));
        }

        let results = harness.collect(paths.len(), Duration::from_secs(10));
        let sources: HashSet<PathBuf> = results.iter().map(|r| r.source.clone()).collect();
        assert_eq!(results.len(), paths.len(), "policy {policy:?}");
        assert_eq!(sources, paths.iter().cloned().collect::<HashSet<_>>());
    }
}

#[test]
fn test_watcher_detects_new_files_recursively() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new();
    let router = harness.router(3, Duration::from_millis(50), DispatchPolicy::ThreadPerFile);

    let watcher = DirectoryWatcher::start(dir.path(), true, router).unwrap();
    assert!(watcher.is_running());

    write(&dir.path().join("top.json"), &vitals_file(1.0));
    write(&dir.path().join("ignored.txt"), "not sensor output");
    let nested = dir.path().join("session_2").join("replay.json");
    write(&nested, &vitals_file(2.0));

    let results = harness.collect(2, Duration::from_secs(10));
    let names: HashSet<String> = results
        .iter()
        .filter_map(|r| r.source.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    assert_eq!(results.len(), 2);
    assert!(names.contains("top.json"));
    assert!(names.contains("replay.json"));

    watcher.stop();
    assert_eq!(harness.registry.len(), 2);
}

#[test]
fn test_files_in_fresh_subdirectories_are_not_missed() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new();
    let router = harness.router(3, Duration::from_millis(20), DispatchPolicy::ThreadPerFile);
    let watcher = DirectoryWatcher::start(dir.path(), true, router).unwrap();

    let rounds = 10;
    let mut expected = HashSet::new();
    for i in 0..rounds {
        let session = dir.path().join(format!("session_{i}"));
        fs::create_dir_all(&session).unwrap();
        let path = session.join("replay.json");
        fs::write(&path, vitals_file(i as f64)).unwrap();
        expected.insert(path);
    }

    let results = harness.collect(rounds, Duration::from_secs(10));
    let sources: HashSet<PathBuf> = results.iter().map(|r| r.source.clone()).collect();
    assert_eq!(sources, expected);
    assert_eq!(results.len(), rounds);

    watcher.stop();
    assert_eq!(harness.registry.len(), rounds);
}

#[test]
fn test_stopped_watcher_dispatches_nothing_new() {
    let dir = TempDir::new().unwrap();
    let harness = Harness::new();
    let router = harness.router(1, Duration::ZERO, DispatchPolicy::ThreadPerFile);

    let watcher = DirectoryWatcher::start(dir.path(), true, router).unwrap();
    watcher.stop();

    write(&dir.path().join("after_stop.json"), &vitals_file(1.0));
    thread::sleep(Duration::from_millis(300));

    assert!(harness.registry.is_empty());
    assert!(harness.queue.drain_all().is_empty());
}
