use std::path::{Path, PathBuf};
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kepler_sync::app::{App, InitOptions, ProgressSink, SyncReport, UpdateOptions};
use kepler_sync::archive::{ArchiveSource, HttpArchiveSource};
use kepler_sync::catalog::{CatalogClient, CatalogRows, ExoplanetArchiveClient};
use kepler_sync::config::{ConfigLoader, ResolvedConfig};
use kepler_sync::converter::{CommandConverter, Converter};
use kepler_sync::dispatch::{HttpMetadataStore, MetadataStore, StoreResponse};
use kepler_sync::domain::{Dataset, Selection};
use kepler_sync::error::SyncError;
use kepler_sync::output::{ConsoleOutput, JsonOutput, OutputMode};
use kepler_sync::pipeline::RunReport;

#[derive(Parser)]
#[command(name = "kepler-sync")]
#[command(about = "Ingest Kepler/K2 light-curve archives and sync catalog metadata")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download, extract and convert the light-curve archives of a dataset")]
    Init(InitArgs),
    #[command(about = "Push catalog metadata onto the stored series")]
    Update(UpdateArgs),
}

#[derive(Args)]
struct InitArgs {
    dataset: Dataset,

    #[arg(long, help = "data folder")]
    path: Option<String>,

    #[arg(long, default_value = "all", help = "comma separated list of campaigns")]
    limit: String,

    #[arg(long, help = "marker file removed once every segment is done")]
    lock: Option<PathBuf>,

    #[arg(long)]
    dry_run: bool,
}

#[derive(Args)]
struct UpdateArgs {
    #[arg(long, env = "KEPLER_SYNC_WTOKEN", default_value = "", hide_env_values = true)]
    wtoken: String,

    #[arg(long, env = "KEPLER_SYNC_RTOKEN", default_value = "", hide_env_values = true)]
    rtoken: String,

    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long, default_value = "all", help = "comma separated list of datasets")]
    limit: String,

    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<SyncError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &SyncError) -> u8 {
    match error {
        SyncError::InvalidDataset(_)
        | SyncError::InvalidCampaign(_)
        | SyncError::MissingConfig(_)
        | SyncError::ConfigRead(_)
        | SyncError::ConfigParse(_)
        | SyncError::InvalidScript(_) => 2,
        err if err.is_transfer() => 3,
        SyncError::CatalogHttp(_)
        | SyncError::CatalogStatus { .. }
        | SyncError::StoreHttp(_)
        | SyncError::MissingTool(_)
        | SyncError::Conversion(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };
    let config = ConfigLoader::resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Init(args) => run_init(args, config, output_mode),
        Commands::Update(args) => run_update(args, config, output_mode),
    }
}

fn run_init(
    args: InitArgs,
    mut config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    if let Some(path) = args.path {
        config.root = Utf8PathBuf::from(path);
    }
    let archive = HttpArchiveSource::new()?;
    let converter = CommandConverter::new(&config.converter);
    if !converter.is_available() && !args.dry_run {
        tracing::warn!(
            program = %config.converter.program,
            "converter not found, every conversion will be reported as failed"
        );
    }
    let app = App::new(config, archive, converter, NopCatalog, NopStore);
    let options = InitOptions {
        campaigns: Selection::parse(&args.limit),
        lock: args.lock,
        dry_run: args.dry_run,
    };

    match output_mode {
        OutputMode::Interactive => {
            let report = app.init(args.dataset, options, &ConsoleOutput)?;
            print_run_summary(&report);
        }
        OutputMode::NonInteractive => {
            let report = app.init(args.dataset, options, &JsonOutput)?;
            JsonOutput::print_run(&report).into_diagnostic()?;
        }
    }
    Ok(())
}

fn run_update(
    args: UpdateArgs,
    mut config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    if let Some(endpoint) = args.endpoint {
        config.endpoint = endpoint;
    }
    let (read_token, write_token) = if args.dry_run {
        (
            placeholder(args.rtoken, "READ_TOKEN"),
            placeholder(args.wtoken, "WRITE_TOKEN"),
        )
    } else {
        (args.rtoken, args.wtoken)
    };

    let catalog = ExoplanetArchiveClient::new(&config.catalog_url)?;
    let store = HttpMetadataStore::new(&config.endpoint)?;
    let app = App::new(config, NopArchive, NopConverter, catalog, store);
    let options = UpdateOptions {
        datasets: Selection::parse(&args.limit),
        read_token,
        write_token,
        dry_run: args.dry_run,
    };

    let sink: &dyn ProgressSink = match output_mode {
        OutputMode::Interactive => &ConsoleOutput,
        OutputMode::NonInteractive => &JsonOutput,
    };
    let report = app.update(options, sink)?;
    match output_mode {
        OutputMode::Interactive => print_sync_summary(&report),
        OutputMode::NonInteractive => JsonOutput::print_sync(&report).into_diagnostic()?,
    }
    Ok(())
}

fn placeholder(value: String, fallback: &str) -> String {
    if value.trim().is_empty() {
        fallback.to_string()
    } else {
        value
    }
}

fn print_run_summary(report: &RunReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    let downloaded = report
        .segments
        .iter()
        .filter(|segment| segment.action == "download")
        .count();
    let failed: usize = report
        .segments
        .iter()
        .filter_map(|segment| segment.conversion.as_ref())
        .map(|stats| stats.failed.len())
        .sum();

    println!("{cyan}{} ingestion summary{reset}", report.dataset);
    println!("{green}segments downloaded: {downloaded}/{}{reset}", report.segments.len());
    println!("{yellow}conversion errors: {failed}{reset}");
    for segment in &report.segments {
        let converted = segment
            .conversion
            .as_ref()
            .map(|stats| stats.converted)
            .unwrap_or(0);
        println!(
            "  {} {} ({}, {converted} converted)",
            segment.campaign, segment.segment, segment.action
        );
    }
}

fn print_sync_summary(report: &SyncReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}metadata sync summary{reset}");
    for dataset in &report.datasets {
        let ok = dataset.results.iter().filter(|result| result.ok).count();
        println!(
            "{green}{}: {} bundle(s), {} confirmed, {ok} updated{reset}",
            dataset.dataset, dataset.bundles, dataset.confirmed
        );
        for script in &dataset.scripts {
            println!("// {} {}", script.id, script.label_pattern);
            print!("{}", script.as_str());
        }
    }
    println!("{yellow}errors: {}{reset}", report.failures());
}

struct NopArchive;
struct NopConverter;
struct NopCatalog;
struct NopStore;

impl ArchiveSource for NopArchive {
    fn download(&self, _url: &str, _destination: &Path) -> Result<u64, SyncError> {
        Err(SyncError::ArchiveHttp(
            "archive source not configured".to_string(),
        ))
    }
}

impl Converter for NopConverter {
    fn convert(&self, _input: &Path, _output: &Path, _columns: &[&str]) -> Result<(), SyncError> {
        Err(SyncError::MissingTool("converter not configured".to_string()))
    }
}

impl CatalogClient for NopCatalog {
    fn rows(&self, _dataset: Dataset) -> Result<CatalogRows<'_>, SyncError> {
        Err(SyncError::CatalogHttp(
            "catalog client not configured".to_string(),
        ))
    }
}

impl MetadataStore for NopStore {
    fn exec(&self, _script: &str) -> Result<StoreResponse, SyncError> {
        Err(SyncError::StoreHttp(
            "metadata store not configured".to_string(),
        ))
    }
}
