//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use otwatch_cache::FileDedupCache;
use otwatch_core::classifier::{KeywordSet, RelevanceClassifier};
use otwatch_core::model::OllamaClient;
use otwatch_core::pipeline::{
    CycleObserver, CyclePhase, CycleSummary, Pipeline, PipelineConfig,
};
use otwatch_core::synthesizer::ImpactSynthesizer;
use otwatch_feed::FeedClient;
use otwatch_shared::{AppConfig, init_config, load_config};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// OTWatch — automated CVE monitoring for ICS/OT environments.
#[derive(Parser)]
#[command(
    name = "otwatch",
    version,
    about = "Monitor the CVE feed for threats to industrial-control environments.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a single monitoring cycle.
    Run {
        /// Fetch from the fallback lookback window (days) instead of the
        /// recent-minutes window. Useful for initial runs and sparse feeds.
        #[arg(long)]
        fallback: bool,

        /// Override the recent fetch window, in minutes.
        #[arg(long)]
        window_minutes: Option<u32>,

        /// Override the model name.
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Run continuously, one cycle per interval, until Ctrl-C.
    Watch {
        /// Minutes between cycles.
        #[arg(short, long)]
        interval: Option<u32>,

        /// Override the model name.
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Print a summary of the last saved threat report.
    Report {
        /// Report file to read (defaults to the configured report path).
        #[arg(long)]
        path: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "otwatch=info",
        1 => "otwatch=debug",
        _ => "otwatch=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            fallback,
            window_minutes,
            model,
        } => cmd_run(fallback, window_minutes, model).await,
        Command::Watch { interval, model } => cmd_watch(interval, model).await,
        Command::Report { path } => cmd_report(path.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Pipeline assembly
// ---------------------------------------------------------------------------

/// Wire feed, model, classifier, synthesizer, and cache into a pipeline.
fn build_pipeline(
    config: &AppConfig,
    model_override: Option<String>,
    window_minutes: Option<u32>,
) -> Result<Pipeline> {
    let api_key = config.feed.api_key();
    if api_key.is_none() {
        warn!(
            env_var = %config.feed.api_key_env,
            "no feed API key set; keyless rate limits apply"
        );
    }

    let feed = FeedClient::with_api_key(config.feed.clone(), api_key)?;

    let generator = Arc::new(OllamaClient::new(&config.model, model_override)?);
    info!(model = %generator.model(), "model backend ready");

    let classifier = RelevanceClassifier::new(
        generator.clone(),
        KeywordSet::new(config.classifier.keywords.iter().cloned()),
    );
    let synthesizer = ImpactSynthesizer::new(generator, config.model.max_impact_chars);

    // Cache corruption is fatal by design: stopping beats silently
    // reprocessing or losing dedup state.
    let cache = FileDedupCache::load(&config.monitor.cache_path)?;

    let pipeline_config = PipelineConfig {
        window_minutes: window_minutes.unwrap_or(config.monitor.window_minutes),
        fallback_days: config.monitor.fallback_days,
        report_path: PathBuf::from(&config.monitor.report_path),
    };

    Ok(Pipeline::new(
        feed,
        classifier,
        synthesizer,
        Box::new(cache),
        pipeline_config,
    ))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    fallback: bool,
    window_minutes: Option<u32>,
    model: Option<String>,
) -> Result<()> {
    let config = load_config()?;
    let mut pipeline = build_pipeline(&config, model, window_minutes)?;

    let reporter = CliProgress::new();
    let summary = pipeline.run_cycle(fallback, &reporter).await?;
    print_summary(&summary);

    Ok(())
}

async fn cmd_watch(interval: Option<u32>, model: Option<String>) -> Result<()> {
    let config = load_config()?;
    let mut pipeline = build_pipeline(&config, model, None)?;

    let interval_minutes = interval.unwrap_or(config.monitor.interval_minutes);
    let interval = Duration::from_secs(u64::from(interval_minutes) * 60);

    // Ctrl-C flips the shutdown flag; the current cycle always completes.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current cycle");
            let _ = shutdown_tx.send(true);
        }
    });

    println!("  Monitoring every {interval_minutes} minute(s). Press Ctrl-C to stop.");

    let reporter = CliProgress::new();
    pipeline
        .run_continuous(interval, shutdown_rx, &reporter)
        .await?;

    println!("  Monitoring stopped.");
    Ok(())
}

async fn cmd_report(path: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let path = PathBuf::from(path.unwrap_or(&config.monitor.report_path));

    let report = otwatch_report::load_report(&path)?;
    println!("{}", otwatch_report::render_summary(&report));
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("  Config file created at {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

/// Print a cycle summary block.
fn print_summary(summary: &CycleSummary) {
    println!();
    println!("  Cycle complete!");
    println!("  New records:  {}", summary.fetched);
    println!("  OT threats:   {}", summary.relevant);
    if summary.classification_errors > 0 {
        println!("  Class. errors: {}", summary.classification_errors);
    }
    if summary.synthesis_errors > 0 {
        println!("  Synth. errors: {}", summary.synthesis_errors);
    }
    if let Some(breakdown) = &summary.breakdown {
        println!(
            "  Severity:     critical {}, high {}, medium {}, low {}",
            breakdown.critical, breakdown.high, breakdown.medium, breakdown.low
        );
    }
    match &summary.report_path {
        Some(path) => println!("  Report:       {}", path.display()),
        None => println!("  Report:       skipped (nothing to report)"),
    }
    println!("  Time:         {:.1}s", summary.elapsed.as_secs_f64());
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl CycleObserver for CliProgress {
    fn phase(&self, phase: CyclePhase) {
        let message = match phase {
            CyclePhase::Fetching => "Fetching new CVE records",
            CyclePhase::Classifying => "Classifying records for OT relevance",
            CyclePhase::Synthesizing => "Generating impact statements",
            CyclePhase::Reporting => "Writing threat report",
            CyclePhase::Idle | CyclePhase::Failed => return,
        };
        self.spinner.set_message(message);
    }

    fn record_progress(&self, current: usize, total: usize, cve_id: &str) {
        self.spinner
            .set_message(format!("[{current}/{total}] {cve_id}"));
    }

    fn cycle_complete(&self, _summary: &CycleSummary) {
        self.spinner.finish_and_clear();
    }
}
