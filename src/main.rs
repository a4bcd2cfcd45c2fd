//! CLI entry point for the air-quality explorer.
//!
//! Provides subcommands for previewing a merged station dataset, profiling
//! and imputing missing values, computing the Air Quality Index, and
//! exporting the data behind the dashboard's charts.

use anyhow::{Result, bail};
use aq_explorer::analyzers::aggregate::{category_counts, xy_series};
use aq_explorer::analyzers::analyzer::analyze;
use aq_explorer::analyzers::types::ChartKind;
use aq_explorer::{
    aqi::AqiEngine,
    breakpoints::BreakpointSet,
    dataset::Dataset,
    fetch::{BasicClient, load_source},
    impute::{FillMethod, ImputeStrategy, impute},
    output::{preview, print_json, write_dataset, write_json},
    parser::parse_dataset,
    stats::{ColumnSummary, DatasetInfo, MissingSummary, describe},
};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::ffi::OsStr;
use std::path::Path;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "aq_explorer")]
#[command(about = "Explore multi-station air-quality data and its AQI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show dataset shape, column types and the first rows
    Preview {
        /// Path to a CSV (optionally gzipped) or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// Number of rows to show
        #[arg(short, long, default_value_t = 10)]
        rows: usize,
    },
    /// Report missing values per column
    Missing {
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// Also report summary statistics of numeric columns
        #[arg(short, long, default_value_t = false)]
        describe: bool,

        /// Optional: write the report as JSON to this file
        #[arg(long)]
        json_out: Option<String>,
    },
    /// Handle missing values and write the resulting dataset
    Impute {
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// How to handle missing values
        #[arg(short, long, value_enum)]
        strategy: StrategyArg,

        /// Columns to drop (drop-columns only), comma separated
        #[arg(short, long, value_delimiter = ',')]
        columns: Vec<String>,

        /// Neighbors used by KNN imputation
        #[arg(short = 'k', long, default_value_t = 5)]
        neighbors: usize,

        /// CSV file to write (".gz" suffix compresses)
        #[arg(short, long, default_value = "airQuality_imputed.csv")]
        output: String,
    },
    /// Compute per-pollutant sub-indices, the AQI and its category
    Aqi {
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// CSV file to write (".gz" suffix compresses)
        #[arg(short, long, default_value = "airQuality_refined.csv")]
        output: String,

        /// Optional: JSON breakpoint tables (defaults to $AQ_BREAKPOINTS, then built-in)
        #[arg(short, long)]
        breakpoints: Option<String>,
    },
    /// Export the series behind every dashboard chart as JSON
    Charts {
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// JSON file to write
        #[arg(short, long, default_value = "charts.json")]
        output: String,

        /// Stations kept per pollutant ranking
        #[arg(short, long, default_value_t = 3)]
        top: usize,

        /// Optional: JSON breakpoint tables (defaults to $AQ_BREAKPOINTS, then built-in)
        #[arg(short, long)]
        breakpoints: Option<String>,
    },
    /// Export one numeric column against another
    Plot {
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        #[arg(short, long)]
        x: String,

        #[arg(short, long)]
        y: String,

        #[arg(short, long, value_enum, default_value_t = KindArg::Scatter)]
        kind: KindArg,

        /// Optional: JSON file to write instead of logging the series
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    #[value(name = "none")]
    NoAction,
    DropRows,
    DropColumns,
    Mean,
    Median,
    Mode,
    Knn,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Scatter,
    Line,
    Bar,
}

impl From<KindArg> for ChartKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Scatter => ChartKind::Scatter,
            KindArg::Line => ChartKind::Line,
            KindArg::Bar => ChartKind::Bar,
        }
    }
}

#[derive(Serialize)]
struct MissingReport {
    missing: MissingSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<Vec<ColumnSummary>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/aq_explorer.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("aq_explorer.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Preview { source, rows } => {
            let ds = load_dataset(&source).await?;
            let (n_rows, n_cols) = ds.shape();
            info!(rows = n_rows, cols = n_cols, "Dataset shape");
            print_json(&DatasetInfo::from_dataset(&ds))?;
            info!("Preview:\n{}", preview(&ds, rows)?);
        }
        Commands::Missing {
            source,
            describe: with_summary,
            json_out,
        } => {
            let ds = load_dataset(&source).await?;
            let report = MissingReport {
                missing: MissingSummary::from_dataset(&ds),
                summary: with_summary.then(|| describe(&ds)).transpose()?,
            };

            if report.missing.is_complete() {
                info!("No missing values");
            }
            for column in &report.missing.columns {
                info!(
                    column = %column.column,
                    missing = column.missing,
                    missing_pct = column.missing_pct,
                    "Missing values"
                );
            }

            match json_out {
                Some(path) => write_json(&path, &report)?,
                None => {
                    if let Some(summary) = &report.summary {
                        print_json(summary)?;
                    }
                }
            }
        }
        Commands::Impute {
            source,
            strategy,
            columns,
            neighbors,
            output,
        } => {
            let strategy = match strategy {
                StrategyArg::NoAction => ImputeStrategy::NoAction,
                StrategyArg::DropRows => ImputeStrategy::DropRows,
                StrategyArg::DropColumns => {
                    if columns.is_empty() {
                        bail!("--columns is required with --strategy drop-columns");
                    }
                    ImputeStrategy::DropColumns(columns)
                }
                StrategyArg::Mean => ImputeStrategy::Fill(FillMethod::Mean),
                StrategyArg::Median => ImputeStrategy::Fill(FillMethod::Median),
                StrategyArg::Mode => ImputeStrategy::Fill(FillMethod::Mode),
                StrategyArg::Knn => ImputeStrategy::Knn {
                    n_neighbors: neighbors,
                },
            };

            let ds = load_dataset(&source).await?;
            let (imputed, report) = impute(&ds, &strategy)?;
            print_json(&report.after)?;
            write_dataset(&output, &imputed)?;
        }
        Commands::Aqi {
            source,
            output,
            breakpoints,
        } => {
            let engine = build_engine(breakpoints)?;
            let ds = load_dataset(&source).await?;
            let annotated = engine.annotate(&ds)?;
            print_json(&category_counts(&annotated)?)?;
            write_dataset(&output, &annotated)?;
        }
        Commands::Charts {
            source,
            output,
            top,
            breakpoints,
        } => {
            let engine = build_engine(breakpoints)?;
            let ds = load_dataset(&source).await?;
            let report = analyze(&ds, &engine, top)?;
            write_json(&output, &report)?;
            info!(output, "Chart data written");
        }
        Commands::Plot {
            source,
            x,
            y,
            kind,
            output,
        } => {
            let ds = load_dataset(&source).await?;
            let series = xy_series(&ds, &x, &y, kind.into())?;
            info!(points = series.points.len(), x = %x, y = %y, "Series built");
            match output {
                Some(path) => write_json(&path, &series)?,
                None => print_json(&series)?,
            }
        }
    }

    Ok(())
}

/// Fetches and parses a dataset from a local file or URL.
#[tracing::instrument]
async fn load_dataset(source: &str) -> Result<Dataset> {
    let client = BasicClient::new()?;
    let bytes = load_source(&client, source).await?;
    let ds = parse_dataset(&bytes)?;
    if ds.n_rows() == 0 {
        warn!("Dataset has no rows");
    }
    Ok(ds)
}

/// Builds the AQI engine from `--breakpoints`, then `$AQ_BREAKPOINTS`, then
/// the built-in reference tables.
fn build_engine(breakpoints: Option<String>) -> Result<AqiEngine> {
    let path = breakpoints.or_else(|| std::env::var("AQ_BREAKPOINTS").ok());
    let tables = match path {
        Some(path) => {
            info!(path = %path, "Loading breakpoint tables");
            BreakpointSet::load(&path)?
        }
        None => {
            warn!("Using built-in reference breakpoint tables; only PM2.5 follows a regulatory scale");
            BreakpointSet::reference()
        }
    };
    AqiEngine::new(tables)
}
