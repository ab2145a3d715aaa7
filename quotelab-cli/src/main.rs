//! QuoteLab CLI. Runs the normalization/indicator pipeline and inspects
//! stored series.
//!
//! Commands:
//! - `run`: fetch, normalize and enrich tickers, then print status, latest values
//!   and the correlation matrix
//! - `show`: print the tail of a persisted series
//! - `config`: print the default configuration as TOML

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use quotelab_core::data::{
    CsvSource, DataSource, SourceKind, SyntheticSource, TimeRangeSpec, YahooSource,
};
use quotelab_core::store::{ParquetStore, SeriesStore};
use quotelab_core::{CanonicalSeries, IndicatorSelection, Pipeline, RunReport, Settings, TickerStatus};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "quotelab",
    about = "QuoteLab CLI: market data normalization, indicators and correlation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch tickers, derive indicators and correlate returns.
    Run {
        /// Tickers (e.g., AAPL MSFT). Defaults to the configured list.
        tickers: Vec<String>,

        /// Lookback period (1d 5d 1mo 3mo 6mo 1y 2y 5y) or YYYY-MM-DD..YYYY-MM-DD.
        #[arg(long)]
        range: Option<TimeRangeSpec>,

        /// Comma-separated indicators (sma,rsi,volatility,bollinger), `all` or `none`.
        #[arg(long)]
        indicators: Option<IndicatorSelection>,

        /// Data source: yahoo, csv or synthetic.
        #[arg(long, default_value = "yahoo")]
        source: SourceKind,

        /// Directory of `{TICKER}.csv` snapshots for `--source csv`.
        #[arg(long, default_value = "data/csv")]
        csv_dir: PathBuf,

        /// End date for synthetic periods (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        anchor: Option<NaiveDate>,

        /// Do not persist results.
        #[arg(long, default_value_t = false)]
        no_store: bool,

        /// Store directory. Overrides the config file.
        #[arg(long)]
        store_dir: Option<PathBuf>,

        /// Path to a TOML config file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the full report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Print the most recent rows of a stored series.
    Show {
        ticker: String,

        /// Store directory.
        #[arg(long, default_value = "data/database")]
        store_dir: PathBuf,

        /// Number of rows to print.
        #[arg(long, default_value_t = 10)]
        rows: usize,
    },
    /// Print the default configuration as TOML.
    Config,
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            tickers,
            range,
            indicators,
            source,
            csv_dir,
            anchor,
            no_store,
            store_dir,
            config,
            json,
        } => {
            let mut settings = match config {
                Some(path) => Settings::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => Settings::default(),
            };
            if !tickers.is_empty() {
                settings.tickers = tickers;
            }
            if let Some(range) = range {
                settings.range = range;
            }
            if let Some(indicators) = indicators {
                settings.indicators = indicators;
            }
            if no_store {
                settings.store.enabled = false;
            }
            if let Some(dir) = store_dir {
                settings.store.path = dir;
            }
            settings.validate()?;

            let source = build_source(source, &settings, csv_dir, anchor)?;
            run_pipeline(&settings, source, json)
        }
        Commands::Show {
            ticker,
            store_dir,
            rows,
        } => run_show(&ticker, store_dir, rows),
        Commands::Config => {
            print!("{}", Settings::default().to_toml()?);
            Ok(())
        }
    }
}

/// Structured logs on stderr; `RUST_LOG` overrides the `info` default.
fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init()
}

fn build_source(
    kind: SourceKind,
    settings: &Settings,
    csv_dir: PathBuf,
    anchor: Option<NaiveDate>,
) -> Result<Box<dyn DataSource>> {
    Ok(match kind {
        SourceKind::Yahoo => Box::new(YahooSource::new(settings.fetch.clone())?),
        SourceKind::Csv => {
            if !csv_dir.is_dir() {
                bail!("CSV directory does not exist: {}", csv_dir.display());
            }
            Box::new(CsvSource::new(csv_dir))
        }
        SourceKind::Synthetic => Box::new(SyntheticSource::new(
            anchor.unwrap_or_else(|| chrono::Local::now().date_naive()),
        )),
    })
}

fn run_pipeline(settings: &Settings, source: Box<dyn DataSource>, json: bool) -> Result<()> {
    let mut pipeline = Pipeline::new(source, settings.indicator.clone());
    if settings.store.enabled {
        info!(path = %settings.store.path.display(), "persisting to parquet store");
        pipeline = pipeline.with_store(Box::new(ParquetStore::new(&settings.store.path)));
    }

    let report = pipeline.run(settings.tickers.as_slice(), &settings.range, &settings.indicators);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&settings.tickers, &report);
    }

    if report.succeeded.is_empty() {
        bail!("no ticker produced data");
    }
    Ok(())
}

fn print_report(requested: &[String], report: &RunReport) {
    println!("{:<8} {:<10} DETAIL", "TICKER", "STATUS");
    for ticker in quotelab_core::pipeline::normalize_tickers(requested) {
        let (status, detail) = match report.status(&ticker) {
            Some(TickerStatus::Succeeded) => (
                "ok",
                format!("{} rows", report.succeeded[&ticker].height()),
            ),
            Some(TickerStatus::NoData) => ("no data", failure_detail(report, &ticker)),
            Some(TickerStatus::Errored) => ("error", failure_detail(report, &ticker)),
            None => continue,
        };
        println!("{ticker:<8} {status:<10} {detail}");
    }

    for (ticker, series) in &report.succeeded {
        println!();
        print_latest(ticker, series);
    }

    println!();
    match &report.correlation {
        Some(matrix) => {
            println!("Correlation of daily returns:");
            print!("{:>8}", "");
            for t in matrix.tickers() {
                print!(" {t:>8}");
            }
            println!();
            for (t, row) in matrix.tickers().iter().zip(matrix.values()) {
                print!("{t:>8}");
                for v in row {
                    match v {
                        Some(v) => print!(" {v:>8.3}"),
                        None => print!(" {:>8}", "-"),
                    }
                }
                println!();
            }
        }
        None => println!(
            "Correlation not available: {}",
            report.correlation_note.as_deref().unwrap_or("unknown reason")
        ),
    }
}

fn failure_detail(report: &RunReport, ticker: &str) -> String {
    report
        .failed
        .get(ticker)
        .map(ToString::to_string)
        .unwrap_or_default()
}

fn print_latest(ticker: &str, series: &CanonicalSeries) {
    let Some(date) = series.index().last() else {
        return;
    };
    println!("{ticker} as of {date}:");
    for col in series.columns() {
        let value = col
            .values
            .last()
            .copied()
            .flatten()
            .map(|v| format!("{v:.2}"))
            .unwrap_or_else(|| "-".into());
        println!("  {:<12} {value:>12}", col.name);
    }
}

fn run_show(ticker: &str, store_dir: PathBuf, rows: usize) -> Result<()> {
    let store = ParquetStore::new(store_dir);
    let ticker = ticker.trim().to_uppercase();
    let series = store
        .load(&ticker)
        .with_context(|| format!("loading {ticker} from {}", store.root().display()))?;
    if let Ok(meta) = store.meta(&ticker) {
        println!(
            "{ticker}: {} rows, stored {}",
            meta.row_count,
            meta.stored_at.format("%Y-%m-%d %H:%M")
        );
    }

    let tail = series.tail(rows);
    print!("{:<10}", "Date");
    for name in tail.column_names() {
        print!(" {name:>12}");
    }
    println!();
    for (i, date) in tail.index().iter().enumerate() {
        print!("{:<10}", date.to_string());
        for col in tail.columns() {
            match col.values[i] {
                Some(v) => print!(" {v:>12.2}"),
                None => print!(" {:>12}", "-"),
            }
        }
        println!();
    }
    Ok(())
}
