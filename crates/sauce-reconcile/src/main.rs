//! sauce-reconcile - publish CI test outcomes to Sauce Labs jobs
//!
//! Reads a finished run's console log and test report, finds the Sauce
//! sessions the run started, and updates each remote job's name, build,
//! pass/fail status and failure diagnostics.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use sauce_reconcile_core::config::PublisherConfig;
use sauce_reconcile_core::engine::{ReconciliationEngine, collect_references};
use sauce_reconcile_core::gateway::{DryRunGateway, RemoteJobGateway, TestSuiteSource};
use sauce_reconcile_core::job_record::{JobSet, JobVisibility};
use sauce_reconcile_core::logging::{LogConfig, LogFormat, init_logging};
use sauce_reconcile_core::sources::{FileLogSource, JsonTestResults};
use sauce_reconcile_core::state::{FileRunContext, RunStateFile};
use tracing::warn;

mod rest;

use rest::SauceRestGateway;

/// sauce-reconcile - publish CI test outcomes to Sauce Labs jobs
#[derive(Parser, Debug)]
#[command(name = "sauce-reconcile")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a sauce-reconcile.toml configuration file
    #[arg(long, global = true, env = "SAUCE_RECONCILE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the session references found in a run as JSON lines
    Extract {
        /// Console log of the run
        #[arg(long)]
        log: PathBuf,

        /// Test report (JSON) whose suite and case output is also scanned
        #[arg(long)]
        results: Option<PathBuf>,
    },

    /// Reconcile a run's Sauce jobs with its test results
    Reconcile(ReconcileArgs),
}

#[derive(Args, Debug)]
struct ReconcileArgs {
    /// Console log of the run
    #[arg(long)]
    log: PathBuf,

    /// Test report (JSON); omit when the run published none
    #[arg(long)]
    results: Option<PathBuf>,

    /// Display name of the build, e.g. "checkout-app #42"
    #[arg(long)]
    build: String,

    /// Run state file carrying jobs between passes
    #[arg(long, default_value = "sauce-jobs.json")]
    state: PathBuf,

    /// Job visibility: public, "public restricted", private, team
    #[arg(long)]
    visibility: Option<String>,

    /// Do not attach failure stack traces to failed jobs
    #[arg(long)]
    disable_usage_stats: bool,

    /// Log updates instead of sending them
    #[arg(long)]
    dry_run: bool,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,

    /// Sauce Labs REST endpoint
    #[arg(long)]
    endpoint: Option<String>,

    /// Sauce Labs username
    #[arg(long, env = "SAUCE_USERNAME")]
    username: Option<String>,

    /// Sauce Labs access key
    #[arg(long, env = "SAUCE_ACCESS_KEY", hide_env_values = true)]
    access_key: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            if let Some(remediation) = err
                .downcast_ref::<sauce_reconcile_core::Error>()
                .and_then(sauce_reconcile_core::Error::remediation)
            {
                eprintln!("\n{}", remediation.render_plain());
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = PublisherConfig::load_or_default(cli.config.as_deref())
        .context("loading configuration")?;

    let mut log_config: LogConfig = config.logging.clone();
    if let Some(level) = cli.log_level {
        log_config.level = level;
    }
    if let Some(format) = cli.log_format {
        log_config.format = format;
    }
    init_logging(&log_config).context("initializing logging")?;

    match cli.command {
        Commands::Extract { log, results } => extract(&log, results.as_deref()),
        Commands::Reconcile(args) => reconcile(&config, args),
    }
}

fn load_results(path: Option<&Path>) -> Result<JsonTestResults> {
    match path {
        Some(path) => JsonTestResults::load(path)
            .with_context(|| format!("reading test results from {}", path.display())),
        None => Ok(JsonTestResults::absent()),
    }
}

fn require_file(path: &Path, what: &str) -> Result<()> {
    if !path.is_file() {
        bail!("{what} not found: {}", path.display());
    }
    Ok(())
}

fn extract(log: &Path, results: Option<&Path>) -> Result<()> {
    require_file(log, "run log")?;
    let results = load_results(results)?.test_results();
    let references = collect_references(&FileLogSource::new(log), results.as_ref());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for reference in &references {
        writeln!(out, "{}", serde_json::to_string(reference)?)?;
    }
    Ok(())
}

fn reconcile(config: &PublisherConfig, args: ReconcileArgs) -> Result<()> {
    require_file(&args.log, "run log")?;

    let mut options = config.reconcile_options();
    if let Some(raw) = &args.visibility {
        options.visibility = JobVisibility::parse_optional(raw)
            .map_err(sauce_reconcile_core::Error::from)
            .context("parsing --visibility")?;
    }
    if args.disable_usage_stats {
        options.disable_usage_stats = true;
    }

    let endpoint = args
        .endpoint
        .clone()
        .unwrap_or_else(|| config.rest.resolved_endpoint());
    let username = args.username.or_else(|| config.rest.username.clone());
    let access_key = args.access_key.or_else(|| config.rest.access_key.clone());
    let rest = match (username, access_key) {
        (Some(username), Some(access_key)) => Some(
            SauceRestGateway::new(&endpoint, username, access_key)
                .map_err(sauce_reconcile_core::Error::from)
                .context("creating Sauce REST client")?,
        ),
        _ => None,
    };
    let gateway: Box<dyn RemoteJobGateway> = match (rest, args.dry_run) {
        (rest, true) => Box::new(DryRunGateway::new(rest)),
        (Some(rest), false) => Box::new(rest),
        (None, false) => bail!(
            "Sauce Labs credentials missing: set SAUCE_USERNAME and SAUCE_ACCESS_KEY, or pass --dry-run"
        ),
    };

    let state = RunStateFile::new(&args.state);
    let prior_jobs = state.load().unwrap_or_else(|err| {
        warn!(path = %args.state.display(), error = %err, "Ignoring unreadable run state");
        JobSet::new()
    });
    let results = load_results(args.results.as_deref())?;
    let log = FileLogSource::new(&args.log);

    let engine = ReconciliationEngine::new(gateway, options);
    // Keep stdout clean for the JSON document.
    let listener: Box<dyn Write> = if args.json {
        Box::new(io::stderr())
    } else {
        Box::new(io::stdout())
    };
    let mut run = FileRunContext::new(&args.build, state, listener);
    let outcome = engine.reconcile(&mut run, prior_jobs, &log, &results);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&outcome)?)?;
    } else {
        writeln!(
            out,
            "Reconciled {} Sauce job(s) for build {}: {} updated, {} failed",
            outcome.jobs.len(),
            outcome.build_name,
            outcome.updates_sent,
            outcome.updates_failed
        )?;
    }
    Ok(())
}
