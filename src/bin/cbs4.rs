use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use cbs_odata4::app::{App, ObservationRequest};
use cbs_odata4::client::HttpFetcher;
use cbs_odata4::config::ConfigLoader;
use cbs_odata4::domain::{DatasetId, DateType};
use cbs_odata4::download::PartialDownloadPolicy;
use cbs_odata4::enrich::{add_date_column, add_label_columns, add_unit_column};
use cbs_odata4::error::OdataError;
use cbs_odata4::output::{JsonOutput, OutputMode};
use cbs_odata4::query::FilterArg;
use cbs_odata4::table::MetaTable;

#[derive(Parser)]
#[command(name = "cbs4")]
#[command(about = "Download and reshape tables from the CBS OData4 statistics service")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true, help = "JSON config file (defaults to ./cbs4.json when present)")]
    config: Option<String>,

    #[arg(long, global = true, help = "Do not report download progress on stderr")]
    no_progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "List the catalogs published by the service")]
    Catalogs,
    #[command(about = "List datasets, optionally for one catalog")]
    Datasets(CatalogArgs),
    #[command(about = "Show the metadata of a dataset")]
    Metadata(MetadataArgs),
    #[command(about = "Download metadata and observations to disk")]
    Download(DownloadArgs),
    #[command(about = "Print observations in long format")]
    Observations(ObservationsArgs),
    #[command(about = "Print observations with one column per measure")]
    Wide(WideArgs),
}

#[derive(Args)]
struct CatalogArgs {
    #[arg(long)]
    catalog: Option<String>,
}

#[derive(Args)]
struct MetadataArgs {
    id: DatasetId,

    #[arg(long)]
    catalog: Option<String>,
}

#[derive(Args, Clone)]
struct DownloadArgs {
    id: DatasetId,

    #[arg(long)]
    catalog: Option<String>,

    #[arg(long, help = "Dataset directory (defaults to <download_root>/<catalog>/<id>)")]
    dir: Option<Utf8PathBuf>,

    #[arg(long, help = "Raw OData query; overrides --filter and --select")]
    query: Option<String>,

    #[arg(long, value_delimiter = ',')]
    select: Option<Vec<String>>,

    #[arg(
        long = "filter",
        value_name = "COLUMN=VALUE[,VALUE...]",
        help = "Column filter, repeatable"
    )]
    filters: Vec<FilterArg>,

    #[arg(long, help = "Discard partitions left behind by an unfinished download")]
    restart: bool,
}

#[derive(Args)]
struct EnrichArgs {
    #[arg(long, help = "Add <Column>Label columns")]
    labels: bool,

    #[arg(long, value_enum, help = "Add period date columns")]
    dates: Option<DateType>,

    #[arg(long, help = "Add a Unit column after Value")]
    units: bool,
}

#[derive(Args)]
struct ObservationsArgs {
    #[command(flatten)]
    download: DownloadArgs,

    #[command(flatten)]
    enrich: EnrichArgs,

    #[arg(long, help = "Drop the Id column")]
    no_id: bool,
}

#[derive(Args)]
struct WideArgs {
    #[command(flatten)]
    download: DownloadArgs,

    #[command(flatten)]
    enrich: EnrichArgs,

    #[arg(long, help = "Name measure columns by code instead of title")]
    codes: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(error) = report.downcast_ref::<OdataError>() {
            return ExitCode::from(map_exit_code(error));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &OdataError) -> u8 {
    if error.is_not_found() {
        2
    } else if error.is_transport() {
        3
    } else {
        1
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.no_progress {
        OutputMode::Quiet
    } else {
        OutputMode::Progress
    };

    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let fetcher = HttpFetcher::with_timeout(config.timeout)?;
    let app = App::from_config(&config, fetcher);

    match cli.command {
        Commands::Catalogs => {
            let catalogs = app.get_catalogs()?;
            JsonOutput::print_catalogs(&catalogs).into_diagnostic()
        }
        Commands::Datasets(args) => {
            let datasets = app.get_datasets(args.catalog.as_deref())?;
            JsonOutput::print_datasets(&datasets).into_diagnostic()
        }
        Commands::Metadata(args) => {
            let meta = app.get_metadata(&args.id, args.catalog.as_deref())?;
            JsonOutput::print_metadata(&meta).into_diagnostic()
        }
        Commands::Download(args) => {
            let result = app.download(&build_request(args), output_mode.sink())?;
            JsonOutput::print_download(&result).into_diagnostic()
        }
        Commands::Observations(args) => {
            let request = build_request(args.download);
            let data = app.get_observations(&request, !args.no_id, output_mode.sink())?;
            let data = enrich(data, &args.enrich)?;
            JsonOutput::print_table(&data.table).into_diagnostic()
        }
        Commands::Wide(args) => {
            let request = build_request(args.download);
            let data = app.get_wide_data(&request, !args.codes, output_mode.sink())?;
            let data = enrich(data, &args.enrich)?;
            JsonOutput::print_table(&data.table).into_diagnostic()
        }
    }
}

fn build_request(args: DownloadArgs) -> ObservationRequest {
    let DownloadArgs {
        id,
        catalog,
        dir,
        query,
        select,
        filters,
        restart,
    } = args;

    ObservationRequest {
        catalog,
        download_dir: dir,
        query,
        select,
        filters: filters.into_iter().collect(),
        policy: if restart {
            PartialDownloadPolicy::Restart
        } else {
            PartialDownloadPolicy::TreatAsComplete
        },
        ..ObservationRequest::new(id)
    }
}

fn enrich(mut data: MetaTable, args: &EnrichArgs) -> Result<MetaTable, OdataError> {
    if args.units {
        data = add_unit_column(&data)?;
    }
    if args.labels {
        data = add_label_columns(&data)?;
    }
    if let Some(date_type) = args.dates {
        data = add_date_column(&data, date_type)?;
    }
    Ok(data)
}
