//! Loads the page once against file-backed storage and prints what it shows.
//!
//! Run with:
//! ```bash
//! cargo run --example visit --features demo -- --help
//! RUST_LOG=contavisite=debug cargo run --example visit --features demo -- --simulate 3
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use contavisite::config::Config;
use contavisite::observers::json::JsonObserver;
use contavisite::observers::prometheus::PrometheusObserver;
use contavisite::observers::table::{TableObserver, TableStyle};
use contavisite::page::{PageLoad, PageView};
use contavisite::protocol::IncrementMode;
use contavisite::session;
use contavisite::stats::ProtocolStats;
use contavisite::storage::{FileStorage, KeyValueStorage, MemoryStorage, UnavailableStorage};
use contavisite::store::JsonFileStore;
use tokio::time;
use tracing_subscriber::EnvFilter;

/// Output format for the statistics.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Prometheus,
}

/// Counts one page load and shows the live view counter.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// File holding this browser's visitor id
    #[arg(long, default_value = "visitor.json")]
    storage: PathBuf,

    /// Run as if local storage were disabled
    #[arg(long)]
    no_storage: bool,

    /// File holding the shared documents
    #[arg(long, default_value = "store.json")]
    store: PathBuf,

    /// Increment mode, overrides the configuration
    #[arg(long)]
    mode: Option<IncrementMode>,

    /// JSON configuration file (defaults to CONTAVISITE_* variables)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Statistics output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Keep following the live counter for N milliseconds
    #[arg(short, long)]
    watch_ms: Option<u64>,

    /// Simulate N other first-time visitors while watching
    #[arg(long, default_value = "0")]
    simulate: usize,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::from_env(),
    };
    if let Some(mode) = args.mode {
        config.increment_mode = mode;
    }

    let storage: Arc<dyn KeyValueStorage> = if args.no_storage {
        Arc::new(UnavailableStorage)
    } else {
        Arc::new(FileStorage::new(&args.storage))
    };
    let stats = Arc::new(ProtocolStats::new());

    let (signal, mut page_session) = session::channel();
    match JsonFileStore::open(&args.store) {
        Ok(store) => {
            signal.establish(store);
        }
        Err(e) => signal.fail(e.to_string()),
    }

    let view = PageLoad::new(storage, config.clone())
        .with_stats(Arc::clone(&stats))
        .run(&mut page_session)
        .await;
    println!("visit: {:?}", view.outcome);

    // the first notification may still be in flight
    time::sleep(Duration::from_millis(20)).await;
    println!("views: {}", view.display.count());

    if let Some(ms) = args.watch_ms {
        watch(&view, &mut page_session, &config, &stats, &args, ms).await;
    }
    view.close().await;

    println!("{}", render(args.format, &stats)?);
    Ok(())
}

async fn watch(
    view: &PageView,
    page_session: &mut session::Session<JsonFileStore>,
    config: &Config,
    stats: &Arc<ProtocolStats>,
    args: &Args,
    ms: u64,
) {
    let mut rx = view.display.watch();
    let mut others = Vec::with_capacity(args.simulate);
    let spacing = Duration::from_millis(ms / (args.simulate as u64 + 1));
    let spacing = spacing.max(Duration::from_millis(1));
    let mut arrivals = time::interval_at(time::Instant::now() + spacing, spacing);
    let deadline = time::sleep(Duration::from_millis(ms));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = arrivals.tick(), if others.len() < args.simulate => {
                let other = PageLoad::new(MemoryStorage::new(), config.clone())
                    .with_stats(Arc::clone(stats))
                    .run(page_session)
                    .await;
                others.push(other);
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let count = *rx.borrow_and_update();
                let marker = if view.display.is_pulsing() { " *" } else { "" };
                println!("views: {}{}", count, marker);
            }
        }
    }

    for other in others {
        other.close().await;
    }
}

fn render(
    format: OutputFormat,
    stats: &ProtocolStats,
) -> Result<String, Box<dyn std::error::Error>> {
    let tallies = stats.tallies();
    Ok(match format {
        OutputFormat::Table => TableObserver::new()
            .with_style(TableStyle::Rounded)
            .with_title("Protocol statistics")
            .render(tallies.into_iter()),
        OutputFormat::Json => JsonObserver::new()
            .pretty(true)
            .wrap_in_snapshot(true)
            .include_timestamp(true)
            .to_json(tallies.into_iter())?,
        OutputFormat::Prometheus => PrometheusObserver::new()
            .with_namespace("contavisite")
            .render(tallies.into_iter())?,
    })
}
