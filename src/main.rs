//! QuizTally - monthly quiz response aggregation
//!
//! A CLI tool that captures raw quiz submissions and folds them into
//! per-quiz, per-month tally documents.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (bad input, storage failure, missing document, etc.)
//!   2 - Batch finished but one or more submissions failed

use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use quiztally::bucket::TimeBucket;
use quiztally::capture;
use quiztally::cli::{Args, CaptureArgs, Command, OutputFormat, ProcessArgs, ShowArgs};
use quiztally::config::{Config, CONFIG_FILE_NAME};
use quiztally::models::{QuizResponse, RawSubmission, StorageNotification};
use quiztally::processor::SubmissionProcessor;
use quiztally::report::{self, ReportOptions};
use quiztally::store::{AggregateStore, FsObjectStore, ObjectStore};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle init-config early (no logging needed)
    if let Command::InitConfig = args.command {
        return handle_init_config();
    }

    // Load configuration before logging so the file can set verbosity
    let (mut config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(config.log_level(&args));

    info!("QuizTally v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    source.log();

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Command failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle init-config: generate a default .quiztally.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE_NAME);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to choose the storage root and bucket names.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Dispatch a subcommand. Returns the process exit code.
async fn run(args: Args, config: Config) -> Result<i32> {
    config.validate()?;

    let root = &config.storage.root;
    let raw = FsObjectStore::open(root, &config.storage.raw_bucket)
        .with_context(|| format!("Failed to open raw bucket under {}", root.display()))?;
    let aggregates = FsObjectStore::open(root, &config.storage.aggregate_bucket)
        .with_context(|| format!("Failed to open aggregate bucket under {}", root.display()))?;

    match args.command {
        Command::Capture(ref capture_args) => handle_capture(&raw, capture_args).await,
        Command::Process(ref process_args) => {
            let processor = SubmissionProcessor::new(raw, aggregates);
            handle_process(&processor, process_args, &config, args.quiet).await
        }
        Command::Show(ref show_args) => handle_show(AggregateStore::new(aggregates), show_args).await,
        Command::InitConfig => Ok(0),
    }
}

/// Store one raw submission and print the notification for it.
async fn handle_capture(raw: &FsObjectStore, args: &CaptureArgs) -> Result<i32> {
    let response = match args.file {
        Some(ref file) => {
            let bytes = std::fs::read(file)
                .with_context(|| format!("Failed to read submission file: {}", file.display()))?;
            RawSubmission::from_slice(&bytes)?.quiz_data
        }
        None => QuizResponse {
            quiz_id: args.quiz.clone().unwrap_or_default(),
            question_answers: args.answers.clone(),
        },
    };

    let notification = capture::capture(raw, response, TimeBucket::current()).await?;
    println!("{}", serde_json::to_string(&notification)?);
    Ok(0)
}

/// Aggregate the requested raw submissions.
async fn handle_process(
    processor: &SubmissionProcessor<FsObjectStore, FsObjectStore>,
    args: &ProcessArgs,
    config: &Config,
    quiet: bool,
) -> Result<i32> {
    let start_time = Instant::now();
    let mut keys = Vec::new();

    if let Some(ref message) = args.message {
        let notification = StorageNotification::parse(message)?;
        keys.push(processor.notification_key(&notification)?);
    }
    if let Some(ref prefix) = args.prefix {
        let listed = processor
            .raw_store()
            .list(prefix)
            .await
            .with_context(|| format!("Failed to list raw submissions under '{}'", prefix))?;
        info!("Found {} raw submission(s) under '{}'", listed.len(), prefix);
        keys.extend(listed);
    }
    keys.extend(args.keys.iter().cloned());

    if keys.is_empty() {
        println!("Nothing to process.");
        return Ok(0);
    }

    let bucket = TimeBucket::current();
    if !quiet {
        println!("📥 Aggregating {} submission(s) into period {}", keys.len(), bucket);
    }

    let progress = if quiet {
        None
    } else {
        let pb = ProgressBar::new(keys.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        Some(pb)
    };

    let summary = processor
        .process_keys(&keys, bucket, config.processing.concurrency, progress.as_ref())
        .await;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    let duration = start_time.elapsed().as_secs_f64();
    if !quiet {
        println!("\n📊 Processing Summary:");
        println!("   Submissions merged: {}", summary.merged_count());
        println!("   Documents written: {}", summary.written.len());
        for report in &summary.written {
            println!(
                "     📄 {} (+{} submission(s), {} change(s))",
                report.aggregate_key,
                report.source_refs.len(),
                report.changes.len()
            );
        }
        println!("   Failed: {}", summary.failed.len());
        println!("   Duration: {:.1}s", duration);
    }

    if !summary.failed.is_empty() {
        for failed in &summary.failed {
            eprintln!("   ⛔ {}: {}", failed.key, failed.error);
        }
        warn!("{} submission(s) were not aggregated", summary.failed.len());
        return Ok(2);
    }

    Ok(0)
}

/// Render one aggregate document.
async fn handle_show(store: AggregateStore<FsObjectStore>, args: &ShowArgs) -> Result<i32> {
    let bucket = match (args.month, args.year) {
        (Some(month), Some(year)) => TimeBucket::new(month, year)?,
        _ => TimeBucket::current(),
    };

    let document = store
        .load(&args.quiz, bucket)
        .await?
        .with_context(|| format!("No aggregate for quiz '{}' in period {}", args.quiz, bucket))?;

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&document)?,
        OutputFormat::Markdown => report::generate_markdown_report(
            &document,
            bucket,
            Utc::now(),
            ReportOptions {
                include_sources: args.sources,
            },
        ),
    };

    match args.output {
        Some(ref path) => {
            std::fs::write(path, &output)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            println!("✅ Report saved to: {}", path.display());
        }
        None => println!("{}", output),
    }

    Ok(0)
}

/// Where the configuration came from, reported once logging is up.
enum ConfigSource {
    Explicit(PathBuf),
    Default,
    Missing,
    Unreadable(String),
}

impl ConfigSource {
    fn log(&self) {
        match self {
            ConfigSource::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigSource::Default => info!("Loaded default config from {}", CONFIG_FILE_NAME),
            ConfigSource::Missing => debug!("No config file found, using defaults"),
            ConfigSource::Unreadable(e) => warn!("Failed to load config: {}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::Explicit(config_path.clone())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigSource::Default)),
        Ok(None) => Ok((Config::default(), ConfigSource::Missing)),
        Err(e) => Ok((Config::default(), ConfigSource::Unreadable(format!("{:#}", e)))),
    }
}
