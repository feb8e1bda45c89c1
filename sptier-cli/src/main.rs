//! `sp`: tier advice and tier-aware starts for Atlas Stream Processing.

mod output;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use sptier::advisor::Advisor;
use sptier::atlas::AtlasClient;
use sptier::batch::{BatchRunner, ProcessorResult};
use sptier::cancellation::CancellationToken;
use sptier::catalog::{LayeredCatalog, LocalCatalog, ProcessorCatalog};
use sptier::config::{RuntimeSettings, SpConfig};
use sptier::deploy::AutoRetryController;
use sptier::errors::AdvisorError;
use sptier::tiers::{TierTable, VolumeClass};

use output::{render_batch, render_result};

const DEFAULT_CONFIG_FILE: &str = "config.txt";

#[derive(Parser)]
#[command(name = "sp")]
#[command(about = "Atlas Stream Processing tier advisor", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (KEY=VALUE lines)
    #[arg(long, global = true, env = "SP_CONFIG")]
    config: Option<PathBuf>,

    /// JSON tier table replacing the built-in Atlas tiers
    #[arg(long, global = true)]
    tiers: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "pretty")]
    output: OutputFormat,

    /// Log format on stderr
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum VolumeArg {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl From<VolumeArg> for VolumeClass {
    fn from(arg: VolumeArg) -> Self {
        match arg {
            VolumeArg::Low => Self::Low,
            VolumeArg::Medium => Self::Medium,
            VolumeArg::High => Self::High,
            VolumeArg::VeryHigh => Self::VeryHigh,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Recommend a tier for one or all processors
    #[command(alias = "analyze-tier")]
    TierAdvise(TierAdviseArgs),

    /// Start a processor on the recommended (or given) tier, escalating on rejection
    Start(StartArgs),
}

#[derive(clap::Args)]
struct TierAdviseArgs {
    /// Processor name
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    name: Option<String>,

    /// Every processor in the processors directory and the workspace
    #[arg(long)]
    all: bool,

    /// Start each processor after advising, with automatic tier escalation
    #[arg(long)]
    auto: bool,

    /// Initial tier for --auto instead of the recommendation
    #[arg(long, requires = "auto")]
    tier: Option<String>,

    /// Expected data volume, shown as relative cost
    #[arg(long, value_enum)]
    volume: Option<VolumeArg>,

    /// Directory of <name>.json processor definitions
    #[arg(long)]
    processors_dir: Option<PathBuf>,

    /// Processors handled at once with --all
    #[arg(long)]
    concurrency: Option<usize>,
}

#[derive(clap::Args)]
struct StartArgs {
    /// Processor name
    name: String,

    /// Initial tier instead of the recommendation
    #[arg(long)]
    tier: Option<String>,

    /// Expected data volume, shown as relative cost
    #[arg(long, value_enum)]
    volume: Option<VolumeArg>,

    /// Directory of <name>.json processor definitions
    #[arg(long)]
    processors_dir: Option<PathBuf>,
}

/// What one invocation runs.
struct Job {
    single: Option<String>,
    start: bool,
    tier: Option<String>,
    volume: Option<VolumeClass>,
    processors_dir: Option<PathBuf>,
    concurrency: Option<usize>,
}

impl From<&Commands> for Job {
    fn from(command: &Commands) -> Self {
        match command {
            Commands::TierAdvise(args) => Self {
                single: args.name.clone(),
                start: args.auto,
                tier: args.tier.clone(),
                volume: args.volume.map(VolumeClass::from),
                processors_dir: args.processors_dir.clone(),
                concurrency: args.concurrency,
            },
            Commands::Start(args) => Self {
                single: Some(args.name.clone()),
                start: true,
                tier: args.tier.clone(),
                volume: args.volume.map(VolumeClass::from),
                processors_dir: args.processors_dir.clone(),
                concurrency: None,
            },
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(cli.log_format, cli.verbose) {
        report_error(cli.output, &e);
        return ExitCode::FAILURE;
    }

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            report_error(cli.output, &e);
            ExitCode::FAILURE
        }
    }
}

/// Prints a fatal error: a JSON error body on stdout in json mode, a red
/// line on stderr otherwise.
fn report_error(format: OutputFormat, err: &anyhow::Error) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&error_body(err)) {
            Ok(text) => println!("{text}"),
            Err(_) => eprintln!("{err:#}"),
        },
        OutputFormat::Pretty => eprintln!("{} {err:#}", "Error:".red().bold()),
    }
}

/// JSON body for a fatal error. Library errors keep their kind and context;
/// the message carries the whole context chain.
fn error_body(err: &anyhow::Error) -> Value {
    let mut body = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<AdvisorError>())
        .map_or_else(
            || json!({"status": "error", "error_kind": "CliError"}),
            |advisor| Value::Object(advisor.to_dict().into_iter().collect()),
        );
    body["message"] = json!(format!("{err:#}"));
    body
}

fn init_tracing(format: LogFormat, verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = Registry::default().with(filter);

    match format {
        LogFormat::Text => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_writer(std::io::stderr).with_target(false)),
        ),
        LogFormat::Json => {
            tracing::subscriber::set_global_default(registry.with(fmt::layer().json().with_writer(std::io::stderr)))
        }
    }
    .context("Failed to install tracing subscriber")
}

/// Runs the command. `Ok(false)` means at least one processor failed.
async fn run(cli: &Cli) -> Result<bool> {
    let config = match &cli.config {
        Some(path) => SpConfig::load(path),
        None => SpConfig::load_or_default(DEFAULT_CONFIG_FILE),
    }
    .context("Failed to load configuration")?;

    let table = load_tiers(cli.tiers.clone().or_else(|| config.tiers_file()))?;
    let mut runtime = config.runtime().context("Invalid runtime settings")?;

    let mut job = Job::from(&cli.command);
    if let Some(dir) = job.processors_dir.take() {
        runtime.processors_dir = dir;
    }
    if let Some(limit) = job.concurrency {
        runtime.concurrency = limit;
    }

    let runner = build_runner(&config, &runtime, table, job.start)?;

    let cancel = Arc::new(CancellationToken::new());
    cancel.on_cancel(|reason| {
        tracing::warn!(reason, "Stopping: queued processors are skipped, in-flight calls finish");
    });
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel("interrupted");
            }
        });
    }

    if let Some(name) = job.single.take() {
        let ok = if job.start {
            let result = runner.start(&name, job.tier.as_deref(), job.volume, &cancel).await;
            emit_single(cli.output, &name, &ProcessorResult::from(result))?
        } else {
            let result = runner.advise(&name, job.volume).await;
            emit_single(cli.output, &name, &ProcessorResult::from(result))?
        };
        return Ok(ok);
    }

    let names = runner.list_names().await.context("Failed to list processors")?;
    if names.is_empty() {
        bail!("no processors found in {}", runtime.processors_dir.display());
    }

    if job.start {
        let report = runner.start_all(&names, job.tier.as_deref(), job.volume, &cancel).await;
        emit_batch(cli.output, &report)
    } else {
        let report = runner.advise_all(&names, job.volume, &cancel).await;
        emit_batch(cli.output, &report)
    }
}

fn load_tiers(path: Option<PathBuf>) -> Result<Arc<TierTable>> {
    match path {
        Some(path) => {
            let table = TierTable::load(&path).with_context(|| format!("Failed to load tier table {}", path.display()))?;
            tracing::info!(path = %path.display(), tiers = table.len(), "Tier table loaded");
            Ok(Arc::new(table))
        }
        None => Ok(TierTable::shared_default()),
    }
}

/// Local definitions first, the Atlas workspace second when credentials exist.
fn build_runner(config: &SpConfig, runtime: &RuntimeSettings, table: Arc<TierTable>, start: bool) -> Result<BatchRunner> {
    let local: Arc<dyn ProcessorCatalog> = Arc::new(LocalCatalog::new(&runtime.processors_dir));
    let mut catalog = LayeredCatalog::new().with_layer(local);

    let atlas = config
        .atlas()
        .and_then(|settings| AtlasClient::new(&settings, runtime))
        .map(Arc::new);

    let controller = match atlas {
        Ok(client) => {
            catalog = catalog.with_layer(client.clone());
            Some(Arc::new(
                AutoRetryController::new(client, table.clone()).with_attempt_timeout(runtime.attempt_timeout),
            ))
        }
        Err(err) if start => return Err(err).context("Starting processors needs Atlas access"),
        Err(err) => {
            tracing::debug!(error = %err, "Atlas unavailable; using local definitions only");
            None
        }
    };

    let mut runner = BatchRunner::new(Arc::new(catalog), Advisor::new(table)).with_concurrency(runtime.concurrency);
    if let Some(controller) = controller {
        runner = runner.with_controller(controller);
    }
    Ok(runner)
}

fn emit_single<T>(format: OutputFormat, name: &str, result: &ProcessorResult<T>) -> Result<bool>
where
    T: serde::Serialize + output::Render,
{
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Pretty => print!("{}", render_result(name, result)),
    }
    Ok(result.is_ok())
}

fn emit_batch<T>(format: OutputFormat, report: &sptier::batch::BatchReport<T>) -> Result<bool>
where
    T: serde::Serialize + output::Render,
{
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Pretty => print!("{}", render_batch(report)),
    }
    Ok(report.failed() == 0)
}
