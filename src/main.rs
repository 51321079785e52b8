use anyhow::Context;
use clap::{Parser, Subcommand};
use gnv_scraper::apis::create_source;
use gnv_scraper::config::Config;
use gnv_scraper::constants;
use gnv_scraper::db::SqliteStorage;
use gnv_scraper::error::ScraperError;
use gnv_scraper::fetch::ReqwestFetcher;
use gnv_scraper::geocoder::NominatimClient;
use gnv_scraper::notify::{BroadcastNotifier, EventNotifier, NoopNotifier};
use gnv_scraper::pipeline::Orchestrator;
use gnv_scraper::storage::{InMemoryStorage, Storage};
use gnv_scraper::tasks::IngestionScheduler;
use gnv_scraper::{logging, metrics, server};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "gnv_scraper")]
#[command(about = "Gainesville event ingestion: crawl, de-duplicate and geocode events")]
#[command(version)]
struct Cli {
    /// Keep everything in memory instead of the SQLite database
    #[arg(long, global = true)]
    in_memory: bool,

    /// Directory for the JSON log files
    #[arg(long, global = true, default_value = "logs")]
    log_dir: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server and schedule ingestion in the background
    Serve {
        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Crawl sources once and print a report per source
    Ingest {
        /// Sources to crawl (comma-separated). Defaults to all of them
        #[arg(long)]
        sources: Option<String>,
    },
    /// Geocode stored events that still have no coordinates
    GeocodeBackfill {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// List the known sources
    Sources,
}

fn parse_sources(list: Option<String>) -> Result<Vec<String>, ScraperError> {
    let names: Vec<String> = match list {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => constants::get_supported_sources()
            .into_iter()
            .map(str::to_string)
            .collect(),
    };
    if let Some(unknown) = names.iter().find(|name| create_source(name).is_none()) {
        return Err(ScraperError::UnknownSource(unknown.clone()));
    }
    Ok(names)
}

fn open_storage(config: &Config, in_memory: bool) -> anyhow::Result<Arc<dyn Storage>> {
    if in_memory {
        warn!("Using in-memory storage; nothing will be kept");
        return Ok(Arc::new(InMemoryStorage::new()));
    }
    let storage = SqliteStorage::open(&config.database.path)
        .with_context(|| format!("opening database {}", config.database.path))?;
    Ok(Arc::new(storage))
}

fn build_orchestrator(
    config: &Config,
    storage: Arc<dyn Storage>,
    notifier: Arc<dyn EventNotifier>,
) -> anyhow::Result<Orchestrator> {
    let fetcher = ReqwestFetcher::new(&config.crawl)?;
    let geocoding = NominatimClient::new(&config.geocoder)?;
    Ok(Orchestrator::new(
        config,
        storage,
        Arc::new(fetcher),
        Arc::new(geocoding),
        notifier,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _guard = logging::init_logging(&cli.log_dir);
    let config = Config::load()?;

    match cli.command {
        Commands::Serve { port } => {
            metrics::install_recorder();
            let storage = open_storage(&config, cli.in_memory)?;
            let notifier = BroadcastNotifier::new(256);
            let _notification_log = notifier.spawn_logger();
            let orchestrator = build_orchestrator(&config, storage, Arc::new(notifier))?;
            let scheduler = IngestionScheduler::new(orchestrator);

            let interval = Duration::from_secs(config.crawl.interval_secs);
            let port = port.unwrap_or(config.server.port);
            server::start_server(scheduler, port, Some(interval)).await?;
        }
        Commands::Ingest { sources } => {
            let names = parse_sources(sources)?;
            let storage = open_storage(&config, cli.in_memory)?;
            let orchestrator = build_orchestrator(&config, storage, Arc::new(NoopNotifier))?;
            let scheduler = IngestionScheduler::new(orchestrator);

            let shutdown = scheduler.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl+C received, cancelling crawls");
                    shutdown.shutdown();
                }
            });

            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            for report in scheduler.run_sources(&names).await {
                println!("\n📊 Results for {} (run {}):", report.source, report.run_id);
                println!("   Pages fetched: {}", report.pages_fetched);
                println!("   Items seen: {}", report.items_seen);
                println!("   Created: {}", report.created);
                println!("   Duplicates: {}", report.duplicates);
                println!("   Skipped: {}", report.skipped);
                println!("   Geocoded: {}", report.geocoded);
                if report.cancelled {
                    println!("   ⚠️  Cancelled before completion");
                }
                for error in &report.errors {
                    println!("   - {}", error);
                }
            }
        }
        Commands::GeocodeBackfill { limit } => {
            let storage = open_storage(&config, cli.in_memory)?;
            let orchestrator = build_orchestrator(&config, storage, Arc::new(NoopNotifier))?;
            let (attempted, updated) = orchestrator.backfill_coordinates(limit).await?;
            println!("Geocoded {updated} of {attempted} events");
        }
        Commands::Sources => {
            for name in constants::get_supported_sources() {
                println!("{name}");
            }
        }
    }

    Ok(())
}
