use std::path::{Path, PathBuf};

use autoshop_reports::io::excel_read;
use autoshop_reports::model::snapshot::ShopSnapshot;
use autoshop_reports::model::{ServiceRequest, format_date, price_label};
use autoshop_reports::report::{self, ReportConfig, ReportFormat};
use autoshop_reports::resources::ResourceResolver;
use autoshop_reports::select::{self, NO_RESULTS_NOTICE, RequestQuery, SortKey, TypeFilter};
use autoshop_reports::settings::{SETTINGS_FILE, Settings};
use autoshop_reports::{ReportError, Result};
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging().and_then(|()| run(cli)) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| ReportError::Logging(error.to_string()))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Report(args) => execute_report(args),
        Command::List(args) => execute_list(args),
        Command::Inspect(args) => execute_inspect(&args.report),
        Command::Settings(args) => execute_settings(args),
        Command::ImportImage(args) => execute_import(args),
    }
}

fn load_requests(data: &Path) -> Result<Vec<ServiceRequest>> {
    ShopSnapshot::load(data)?.resolve_requests()
}

fn include_completed(config: &Path, flag: bool) -> Result<bool> {
    Ok(flag || Settings::load(config)?.show_completed_requests)
}

fn execute_report(args: ReportArgs) -> Result<()> {
    let include_completed = include_completed(&args.config, args.include_completed)?;
    let requests = load_requests(&args.data)?;
    let selected = select::for_report(&requests, include_completed, Local::now().naive_local());

    let (format, legacy) = args.format.resolve();
    let mut config = ReportConfig::new(format, ResourceResolver::new(&args.resources));
    config.legacy = legacy;
    if let Some(font) = args.font {
        config.font_family = font;
    }

    let target = args
        .output_dir
        .join(format!("Отчёт.{}", args.format.extension()));
    match report::assemble(&target, &selected, &config) {
        Ok(outcome) => {
            info!(pages = outcome.pages.len(), "report assembled");
            println!("{}", report::outcome_notice(true));
            println!("{}", outcome.path.display());
            Ok(())
        }
        Err(error) => {
            println!("{}", report::outcome_notice(false));
            Err(error)
        }
    }
}

fn execute_list(args: ListArgs) -> Result<()> {
    let query = RequestQuery {
        search: args.search.unwrap_or_default(),
        sort: args.sort.parse::<SortKey>()?,
        type_filter: TypeFilter::from_choice(args.service_type.as_deref().unwrap_or("")),
        include_completed: include_completed(&args.config, args.include_completed)?,
    };
    let requests = load_requests(&args.data)?;
    let selection = select::select(&requests, &query, Local::now().naive_local());

    if selection.is_empty() {
        println!("{NO_RESULTS_NOTICE}");
        return Ok(());
    }

    let page = selection.page(args.page.saturating_sub(1));
    for request in page.items {
        let completes = request
            .completes_on
            .map(format_date)
            .unwrap_or_else(|| "—".to_string());
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            request.id,
            request.vehicle.divided_state_number(),
            request.vehicle.name,
            request.service_type.name,
            completes,
            price_label(request.total_price())
        );
    }
    println!(
        "Страница {} из {} ({} заказов)",
        page.index + 1,
        page.page_count,
        page.total
    );
    Ok(())
}

fn execute_inspect(path: &Path) -> Result<()> {
    for sheet in excel_read::read_report(path)? {
        println!("[{}]", sheet.name);
        for (row, cells) in sheet.rows.iter().enumerate() {
            for (col, value) in cells.iter().enumerate() {
                if !value.is_empty() {
                    println!("{row},{col}\t{value}");
                }
            }
        }
    }
    Ok(())
}

fn execute_settings(args: SettingsArgs) -> Result<()> {
    let mut settings = Settings::load(&args.config)?;
    if let Some(show_completed) = args.show_completed {
        settings.show_completed_requests = show_completed;
        settings.save(&args.config)?;
    }
    println!("showCompletedRequests = {}", settings.show_completed_requests);
    Ok(())
}

fn execute_import(args: ImportArgs) -> Result<()> {
    let stored = ResourceResolver::new(&args.resources).import_image(&args.source)?;
    println!("{stored}");
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "List auto repair shop requests and render them into report documents."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render the reportable requests into a document.
    Report(ReportArgs),
    /// Print one page of the filtered request list.
    List(ListArgs),
    /// Print the cells of a generated spreadsheet report.
    Inspect(InspectArgs),
    /// Show or change the persisted settings.
    Settings(SettingsArgs),
    /// Copy a vehicle image into managed storage.
    ImportImage(ImportArgs),
}

#[derive(clap::Args)]
struct ReportArgs {
    /// Shop snapshot (JSON).
    #[arg(long)]
    data: PathBuf,

    /// Directory the report is written to.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Xlsx)]
    format: OutputFormat,

    /// Font family applied to every text run.
    #[arg(long)]
    font: Option<String>,

    #[arg(long, default_value = SETTINGS_FILE)]
    config: PathBuf,

    /// Resource root holding the `Images` directory.
    #[arg(long, default_value = ".")]
    resources: PathBuf,

    /// Include requests whose completion date has passed.
    #[arg(long)]
    include_completed: bool,
}

#[derive(clap::Args)]
struct ListArgs {
    #[arg(long)]
    data: PathBuf,

    /// Case-insensitive text matched against vehicle, service type and completion date.
    #[arg(long)]
    search: Option<String>,

    /// none, price, quantity or completion; prefix with '-' for descending.
    #[arg(long, default_value = "none", allow_hyphen_values = true)]
    sort: String,

    #[arg(long)]
    service_type: Option<String>,

    /// 1-based page number.
    #[arg(long, default_value_t = 1)]
    page: usize,

    #[arg(long, default_value = SETTINGS_FILE)]
    config: PathBuf,

    #[arg(long)]
    include_completed: bool,
}

#[derive(clap::Args)]
struct InspectArgs {
    #[arg(long)]
    report: PathBuf,
}

#[derive(clap::Args)]
struct SettingsArgs {
    #[arg(long, default_value = SETTINGS_FILE)]
    config: PathBuf,

    #[arg(long)]
    show_completed: Option<bool>,
}

#[derive(clap::Args)]
struct ImportArgs {
    #[arg(long, default_value = ".")]
    resources: PathBuf,

    #[arg(long)]
    source: PathBuf,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Xlsx,
    Xls,
    Docx,
    Doc,
}

impl OutputFormat {
    fn resolve(self) -> (ReportFormat, bool) {
        match self {
            OutputFormat::Xlsx => (ReportFormat::Spreadsheet, false),
            OutputFormat::Xls => (ReportFormat::Spreadsheet, true),
            OutputFormat::Docx => (ReportFormat::WordProcessor, false),
            OutputFormat::Doc => (ReportFormat::WordProcessor, true),
        }
    }

    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Xlsx => "xlsx",
            OutputFormat::Xls => "xls",
            OutputFormat::Docx => "docx",
            OutputFormat::Doc => "doc",
        }
    }
}
