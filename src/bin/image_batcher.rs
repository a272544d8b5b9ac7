use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use image_batcher::config::{ConfigLoader, ConfigOverrides, ResolvedConfig};
use image_batcher::dedup::DedupIndex;
use image_batcher::error::BatcherError;
use image_batcher::gallery::Gallery;
use image_batcher::ledger::Ledger;
use image_batcher::output::JsonOutput;
use image_batcher::pipeline::{Pipeline, PipelineStatus};
use image_batcher::scheduler::{Scheduler, SchedulerOptions, StopSignal};
use image_batcher::source::HttpImageSource;
use image_batcher::store::Store;

#[derive(Parser)]
#[command(name = "image-batcher")]
#[command(about = "Poll an image listing and file new images into numbered batches")]
#[command(version, author)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Path to the JSON config file (default: ./image-batcher.json if present)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Listing endpoint returning [{"image_url": ...}, ...]
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[arg(long, global = true)]
    images_root: Option<String>,

    #[arg(long, global = true)]
    interval_secs: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run ingestion cycles on a fixed interval")]
    Run(RunArgs),
    #[command(about = "Run a single ingestion cycle and print its outcome")]
    Once,
    #[command(about = "List saved batches, newest first")]
    Gallery,
    #[command(about = "Show batch, ledger and index state")]
    Status,
}

#[derive(Args)]
struct RunArgs {
    /// Stop after this many cycles instead of running forever
    #[arg(long)]
    cycles: Option<u64>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<BatcherError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &BatcherError) -> u8 {
    match error {
        BatcherError::MissingEndpoint
        | BatcherError::ConfigRead(_)
        | BatcherError::ConfigParse(_) => 2,
        err if err.is_upstream() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let overrides = ConfigOverrides {
        endpoint: cli.global.endpoint,
        images_root: cli.global.images_root,
        interval_secs: cli.global.interval_secs,
    };
    let config = ConfigLoader::resolve(cli.global.config.as_deref(), overrides)?;
    let store = Store::new(config.images_root.clone());

    match cli.command {
        Commands::Run(args) => run_scheduler(&config, store, args),
        Commands::Once => {
            let mut pipeline = open_online(&config, store)?;
            let outcome = pipeline.run_cycle()?;
            JsonOutput::print_cycle(&outcome).into_diagnostic()
        }
        Commands::Gallery => {
            let batches = Gallery::new(store).list()?;
            JsonOutput::print_gallery(&batches).into_diagnostic()
        }
        Commands::Status => {
            let ledger = Ledger::load(config.ledger_path.clone())?;
            let index = DedupIndex::rebuild(&store, &ledger)?;
            let status = PipelineStatus::collect(&store, &ledger, &index)?;
            JsonOutput::print_status(&status).into_diagnostic()
        }
    }
}

fn open_online(
    config: &ResolvedConfig,
    store: Store,
) -> Result<Pipeline<HttpImageSource>, BatcherError> {
    let source = HttpImageSource::new(config.endpoint()?, config.request_timeout)?;
    Pipeline::open(store, config.ledger_path.clone(), source)
}

fn run_scheduler(config: &ResolvedConfig, store: Store, args: RunArgs) -> miette::Result<()> {
    let pipeline = open_online(config, store)?;
    info!(endpoint = config.endpoint()?, "starting background fetch");
    let scheduler = Scheduler::new(
        pipeline,
        SchedulerOptions {
            interval: config.interval,
            max_cycles: args.cycles,
        },
    );
    let handle = scheduler.spawn(StopSignal::new());
    let (summary, _pipeline) = handle
        .join()
        .map_err(|_| miette::Report::msg("scheduler thread panicked"))?;
    JsonOutput::print_summary(&summary).into_diagnostic()
}
