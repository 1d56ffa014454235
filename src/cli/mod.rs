//! Command-line interface for cohortlens.
//!
//! Provides commands for analyzing learner data from JSON or CSV, listing
//! CSV inputs, browsing stored reports and inspecting the roster and
//! configuration.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config;
use crate::core::{ExecutionRecorder, Orchestrator, ReportStore, RunMeta, SessionStore};
use crate::domain::learner::validate_label;
use crate::domain::{AnalysisReport, AnalysisRequest, LearnerRecord, MergedReport, ReportSource};
use crate::ingest;
use crate::specialists::build_roster;

/// cohortlens - Resilient learner-analytics orchestrator
#[derive(Parser, Debug)]
#[command(name = "cohortlens")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Analyze learner responses from a JSON file or stdin
    Analyze {
        /// Input file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[command(flatten)]
        options: AnalyzeOptions,
    },

    /// Analyze learner responses from a CSV file
    Csv {
        /// Path to the CSV file
        path: PathBuf,

        #[command(flatten)]
        options: AnalyzeOptions,
    },

    /// List CSV files in the data directory
    Files {
        /// Directory to search (defaults to the configured data directory)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Show stored reports
    Reports {
        /// Only reports for this module
        #[arg(short, long)]
        module: Option<String>,

        /// Show the report for a single session
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Show the specialist roster
    Roster,

    /// Show resolved configuration (debug)
    Config,
}

/// Options shared by the analysis commands
#[derive(Args, Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Module identifier
    #[arg(short, long)]
    pub module: Option<String>,

    /// Cohort label
    #[arg(short, long)]
    pub cohort: Option<String>,

    /// Session identifier (generated from module and time if omitted)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Seed the session with the last N stored reports for the module
    #[arg(long, requires = "module")]
    pub history: Option<usize>,

    /// Print execution metrics after the report
    #[arg(long)]
    pub metrics: bool,

    /// Do not save the report
    #[arg(long)]
    pub no_save: bool,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Analyze { input, options } => analyze_json(input, options).await,
            Commands::Csv { path, options } => analyze_csv(path, options).await,
            Commands::Files { dir } => list_files(dir).await,
            Commands::Reports { module, session } => show_reports(module, session).await,
            Commands::Roster => show_roster(),
            Commands::Config => show_config(),
        }
    }
}

/// Session id of the form `<module>-<timestamp>` with `:` and `.` replaced
pub fn generate_session_id(module_id: Option<&str>) -> String {
    let timestamp = Utc::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{}-{}", module_id.unwrap_or("module"), timestamp)
}

/// Analyze JSON input from a file or stdin
async fn analyze_json(input_file: Option<PathBuf>, mut options: AnalyzeOptions) -> Result<()> {
    let content = if let Some(path) = input_file {
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read input file: {}", path.display()))?
    } else if !io::stdin().is_terminal() {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    } else {
        anyhow::bail!("No input provided. Use --input <file> or pipe to stdin");
    };

    let input = ingest::parse_learner_json(&content)?;

    // Command-line labels win over labels embedded in the document
    options.module = options.module.or(input.module_id);
    options.cohort = options.cohort.or(input.cohort);

    analyze(input.learners, ReportSource::Json, None, options).await
}

/// Analyze a CSV file
async fn analyze_csv(path: PathBuf, options: AnalyzeOptions) -> Result<()> {
    // An empty file reaches validation so it is counted as a failed request
    let learners = ingest::read_learner_csv(&path).await?;

    analyze(
        learners,
        ReportSource::Csv,
        Some(path.display().to_string()),
        options,
    )
    .await
}

/// Shared analysis flow for every input source
async fn analyze(
    learners: Vec<LearnerRecord>,
    source: ReportSource,
    csv_file_path: Option<String>,
    options: AnalyzeOptions,
) -> Result<()> {
    let correlation_id = Uuid::new_v4();
    let span = info_span!("analysis", %correlation_id, source = source.as_str());

    async move {
        let started = Instant::now();
        let recorder = Arc::new(ExecutionRecorder::new());

        let result = run_analysis(learners, source, csv_file_path, &options, &recorder).await;
        recorder.record_request(source.as_str(), result.is_ok(), started.elapsed());

        if options.metrics {
            let snapshot = recorder.snapshot();
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&snapshot).context("Failed to serialize metrics")?
            );
        }

        let report = result?;
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?
        );
        Ok::<(), anyhow::Error>(())
    }
    .instrument(span)
    .await
}

async fn run_analysis(
    learners: Vec<LearnerRecord>,
    source: ReportSource,
    csv_file_path: Option<String>,
    options: &AnalyzeOptions,
    recorder: &Arc<ExecutionRecorder>,
) -> Result<AnalysisReport> {
    let request = AnalysisRequest::new(learners);

    let validation = request
        .validate()
        .and_then(|_| validate_label("moduleId", options.module.as_deref()))
        .and_then(|_| validate_label("cohort", options.cohort.as_deref()));
    if let Err(e) = validation {
        recorder.record_error("validation_error");
        return Err(e).with_context(|| match &csv_file_path {
            Some(path) => format!("Invalid learner data in {}", path),
            None => "Invalid learner data".to_string(),
        });
    }

    let config = config::config()?;
    let orchestrator = Orchestrator::new(build_roster(config)?, Arc::clone(recorder))
        .context("Invalid specialist roster")?;

    let session_id = options
        .session
        .clone()
        .unwrap_or_else(|| generate_session_id(options.module.as_deref()));

    let mut meta = RunMeta::new(options.module.clone(), options.cohort.clone());
    if let (Some(limit), Some(module_id)) = (options.history, options.module.as_deref()) {
        let store = ReportStore::open_default().await?;
        let history = store.history_for_module(module_id, limit).await?;
        info!(runs = history.len(), "Loaded report history");
        meta = meta.with_previous_runs(history);
    }

    info!(%session_id, learners = request.learner_count(), "Starting analysis session");

    let mut sessions = SessionStore::new();
    let outcome = orchestrator
        .run_detailed(&mut sessions, &session_id, request, &meta)
        .await?;

    let context = sessions
        .get(&session_id)
        .context("Session context missing after run")?;

    if let Some(previous) = context.previous() {
        print_trend(previous, &outcome.report);
    }

    let report = AnalysisReport {
        session_id: session_id.clone(),
        module_id: context.module_id.clone(),
        cohort: context.cohort.clone(),
        analyzed_at: Utc::now(),
        source,
        csv_file_path,
        unavailable: outcome.unavailable(),
        metrics: outcome.report,
    };

    if !options.no_save {
        let store = ReportStore::open_default().await?;
        store.save(&report).await?;
    }

    Ok(report)
}

/// Print per-field changes against the previous run
fn print_trend(previous: &MergedReport, current: &MergedReport) {
    eprintln!("Trend vs previous run:");
    for (field, value) in current.iter() {
        match previous.get(field) {
            Some(before) => eprintln!("  {:<20} {:>10.3} ({:+.3})", field, value, value - before),
            None => eprintln!("  {:<20} {:>10.3} (new)", field, value),
        }
    }
}

/// List CSV files in a directory
async fn list_files(dir: Option<PathBuf>) -> Result<()> {
    let dir = match dir {
        Some(d) => d,
        None => config::data_dir()?,
    };

    let files = ingest::list_csv_files(&dir).await?;
    for file in &files {
        println!("{}", file.display());
    }
    eprintln!("[{} CSV file(s) in {}]", files.len(), dir.display());

    Ok(())
}

/// Show stored reports, optionally filtered
async fn show_reports(module: Option<String>, session: Option<String>) -> Result<()> {
    let store = ReportStore::open_default().await?;

    if let Some(session_id) = session {
        let report = store
            .find_by_session(&session_id)
            .await?
            .with_context(|| format!("No report found for session {}", session_id))?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let reports = match module {
        Some(module_id) => store.find_by_module(&module_id).await?,
        None => store.all().await?,
    };

    if reports.is_empty() {
        println!("No reports found");
        return Ok(());
    }

    println!(
        "{:<45} {:<20} {:<15} {:<12}",
        "SESSION", "MODULE", "COHORT", "UNAVAILABLE"
    );
    println!("{}", "-".repeat(95));

    for report in reports {
        println!(
            "{:<45} {:<20} {:<15} {:<12}",
            report.session_id,
            report.module_id,
            report.cohort,
            report.unavailable.len()
        );
    }

    Ok(())
}

/// Show the configured roster
fn show_roster() -> Result<()> {
    let config = config::config()?;
    let orchestrator = Orchestrator::new(build_roster(config)?, Arc::new(ExecutionRecorder::new()))
        .context("Invalid specialist roster")?;

    println!(
        "{:<15} {:>12} {:>9}  FIELDS",
        "SPECIALIST", "DEADLINE_MS", "ATTEMPTS"
    );
    println!("{}", "-".repeat(75));

    for call in orchestrator.roster() {
        let fields: Vec<&str> = call.fields().iter().map(|f| f.name.as_str()).collect();
        println!(
            "{:<15} {:>12} {:>9}  {}",
            call.name,
            call.deadline.as_millis(),
            call.retry.attempt_limit(),
            fields.join(", ")
        );
    }

    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let config = config::config()?;

    println!("Home:        {}", config.home.display());
    println!("Data:        {}", config.data_dir.display());
    match &config.config_file {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (none, using defaults)"),
    }
    println!(
        "Deadline:    {}ms per attempt",
        config.orchestrator.deadline.as_millis()
    );
    let retry = &config.orchestrator.retry;
    println!(
        "Retry:       {} attempts, {}ms initial, {}ms max, x{}",
        retry.max_attempts, retry.initial_delay_ms, retry.max_delay_ms, retry.backoff_multiplier
    );
    if config.specialists.is_empty() {
        println!("Roster:      built-in");
    } else {
        println!("Roster:      {} configured specialist(s)", config.specialists.len());
    }

    Ok(())
}
