//! Synheart Vitals Agent CLI
//!
//! Live vital-sign inference from radar sensor output files.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use synheart_vitals_agent::{
    config::Config,
    inference::{InferenceModel, LinearModel},
    ingest::{
        DedupRegistry, DirectoryWatcher, DispatchPolicy, Dispatcher, EventRouter, FileOutcome,
        FileProcessor, RetryingReader,
    },
    output::{ConsoleSink, FanOutSink, JsonlSink, QueueConsumer, ResultQueue, ResultSink},
    telemetry::{create_shared_stats, create_shared_stats_with_persistence},
    VERSION,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "synheart-vitals")]
#[command(author = "Synheart")]
#[command(version = VERSION)]
#[command(about = "Live vital-sign inference from radar sensor output", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Settings that can override the persisted configuration for one run.
#[derive(clap::Args, Debug, Default)]
struct Overrides {
    /// Directory to watch for sensor output files
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Model weights file (JSON)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Read attempts per file
    #[arg(long)]
    retries: Option<u32>,

    /// Delay before each read attempt, in seconds
    #[arg(long)]
    delay: Option<u64>,

    /// Run files on a fixed pool of N worker threads instead of one thread per file
    #[arg(long)]
    workers: Option<usize>,

    /// Display poll interval, in milliseconds
    #[arg(long)]
    poll_ms: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the sensor output directory and display live predictions
    Start {
        #[command(flatten)]
        overrides: Overrides,

        /// Also append predictions as JSON lines, to PATH or to the configured export directory
        #[arg(long, value_name = "PATH", num_args = 0..=1)]
        export: Option<Option<PathBuf>>,
    },

    /// Run a single file through the pipeline and print its predictions
    Process {
        /// Sensor output file
        file: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Print the model's ordered feature schema
    Schema {
        /// Model weights file (JSON)
        #[arg(long)]
        model: Option<PathBuf>,
    },

    /// Show cumulative pipeline statistics
    Status,

    /// Show configuration
    Config,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Start { overrides, export } => cmd_start(overrides, export),
        Commands::Process { file, overrides } => cmd_process(&file, overrides),
        Commands::Schema { model } => cmd_schema(model),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

/// Load the persisted configuration and apply command-line overrides.
fn effective_config(overrides: Overrides) -> anyhow::Result<Config> {
    let mut config = Config::load().context("loading configuration")?;

    if let Some(dir) = overrides.dir {
        config.watch_dir = dir;
    }
    if let Some(model) = overrides.model {
        config.model_path = model;
    }
    if let Some(retries) = overrides.retries {
        config.retries = retries;
    }
    if let Some(delay) = overrides.delay {
        config.retry_delay = Duration::from_secs(delay);
    }
    if let Some(workers) = overrides.workers {
        config.dispatch = DispatchPolicy::WorkerPool { workers };
    }
    if let Some(poll_ms) = overrides.poll_ms {
        config.poll_interval = Duration::from_millis(poll_ms);
    }

    config.validate()?;
    Ok(config)
}

fn load_model(path: &Path) -> anyhow::Result<Arc<dyn InferenceModel>> {
    let model = LinearModel::load(path)
        .with_context(|| format!("loading model from {}", path.display()))?;
    Ok(Arc::new(model))
}

fn reader_for(config: &Config) -> RetryingReader {
    RetryingReader::new(config.retries, config.backoff.build(config.retry_delay))
}

fn cmd_start(overrides: Overrides, export: Option<Option<PathBuf>>) -> anyhow::Result<()> {
    println!("Synheart Vitals Agent v{VERSION}");
    println!();

    let config = effective_config(overrides)?;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    let model = load_model(&config.model_path)?;

    println!("Starting live monitoring...");
    println!("  Directory: {}", config.watch_dir.display());
    println!("  File suffix: {}", config.file_suffix);
    println!(
        "  Retries: {} (delay {}s, {:?} backoff)",
        config.retries,
        config.retry_delay.as_secs(),
        config.backoff
    );
    match config.dispatch {
        DispatchPolicy::ThreadPerFile => println!("  Dispatch: one thread per file (uncapped)"),
        DispatchPolicy::WorkerPool { workers } => {
            println!("  Dispatch: worker pool ({workers} workers)")
        }
    }
    println!("  Model features: {}", model.schema().len());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let stats = create_shared_stats_with_persistence(config.stats_path());
    let queue = ResultQueue::new();

    let processor = FileProcessor::new(
        reader_for(&config),
        model,
        queue.clone(),
        Arc::clone(&stats),
    );
    let router = EventRouter::new(
        config.file_suffix.clone(),
        Arc::new(DedupRegistry::new()),
        processor,
        Dispatcher::new(config.dispatch)?,
    );

    let watcher = DirectoryWatcher::start(&config.watch_dir, config.recursive, router)?;

    let mut sinks: Vec<Box<dyn ResultSink>> = vec![Box::new(ConsoleSink::stdout())];
    if let Some(path) = export {
        let path = path.unwrap_or_else(|| config.export_file());
        let sink = JsonlSink::create(&path)
            .with_context(|| format!("opening export file {}", path.display()))?;
        println!("Exporting predictions to {}", path.display());
        sinks.push(Box::new(sink));
    }
    let consumer = QueueConsumer::new(queue, Box::new(FanOutSink::new(sinks)))
        .with_stats(Arc::clone(&stats))
        .spawn(config.poll_interval)?;

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(Arc::clone(&running))?;

    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }

    println!();
    println!("Stopping monitoring...");
    // Dropping the returned router closes the worker pool queue without waiting on it.
    watcher.stop();

    let in_flight = stats.in_flight();
    if in_flight > 0 {
        println!("{in_flight} file(s) still in progress will be abandoned on exit");
    }

    consumer.stop();

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save pipeline stats: {e}");
    }

    println!();
    println!("{}", stats.summary());
    Ok(())
}

fn cmd_process(file: &Path, overrides: Overrides) -> anyhow::Result<()> {
    let config = effective_config(overrides)?;
    let model = load_model(&config.model_path)?;

    let queue = ResultQueue::new();
    let stats = create_shared_stats();
    let processor = FileProcessor::new(reader_for(&config), model, queue.clone(), stats);

    let outcome = processor.process(file);

    let mut sink = ConsoleSink::stdout();
    sink.deliver(&queue.drain_all())?;

    match outcome {
        FileOutcome::Completed {
            attempts,
            frames_enqueued,
            frames_failed,
        } => {
            println!();
            println!(
                "Processed {} in {attempts} attempt(s): {frames_enqueued} prediction(s), {frames_failed} frame(s) failed",
                file.display()
            );
            Ok(())
        }
        FileOutcome::GaveUp { reason, .. } => {
            anyhow::bail!("{}: {reason}", file.display())
        }
        FileOutcome::Failed { stage, reason, .. } => {
            anyhow::bail!("{} ({stage:?}): {reason}", file.display())
        }
    }
}

fn cmd_schema(model: Option<PathBuf>) -> anyhow::Result<()> {
    let path = match model {
        Some(path) => path,
        None => Config::load()?.model_path,
    };
    let model = load_model(&path)?;

    println!("Model: {}", path.display());
    println!("Features ({}):", model.schema().len());
    for (i, name) in model.schema().names().iter().enumerate() {
        println!("  {i:>4}  {name}");
    }
    Ok(())
}

fn cmd_status() -> anyhow::Result<()> {
    let config = Config::load()?;

    println!("Synheart Vitals Agent Status");
    println!("============================");
    println!();
    println!("Configuration:");
    println!("  Watch directory: {}", config.watch_dir.display());
    println!(
        "  Directory present: {}",
        if config.watch_dir.is_dir() {
            "yes ✓"
        } else {
            "no ✗"
        }
    );
    println!("  Model: {}", config.model_path.display());
    println!();

    let stats_path = config.stats_path();
    if stats_path.exists() {
        let content = std::fs::read_to_string(&stats_path)?;
        let stats: serde_json::Value = serde_json::from_str(&content)?;
        println!("Cumulative Statistics:");
        for key in [
            "files_detected",
            "duplicate_events",
            "files_completed",
            "files_gave_up",
            "files_failed",
            "read_attempts",
            "frames_predicted",
            "frames_failed",
            "results_delivered",
        ] {
            if let Some(value) = stats.get(key) {
                println!("  {}: {value}", key.replace('_', " "));
            }
        }
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load()?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")
}
