//! Command-line runner for one scraping session
//!
//! ```text
//! enforcement-scraper --agency hse --record-type case --param start_page=1 --param end_page=3
//! ```

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use enforcement_scraper::domain::{
    Agency, EnforcementStore, ProcessingLogStore, RawParams, RecordType, Session, SessionStore,
};
use enforcement_scraper::infrastructure::{
    ConfigError, ConfigProvider, DatabaseConnection, FileConfigProvider, HttpFeedFetcher, InMemoryEnforcementStore,
    InMemoryProcessingLogStore, InMemorySessionStore, ScraperConfig, SqliteEnforcementStore, SqliteProcessingLogStore,
    SqliteSessionStore, StaticConfigProvider, init_logging_with_config, logging::log_system_info,
};
use enforcement_scraper::scraping::{
    BroadcastEventSink, ScrapeCoordinator, ScrapeEvent, ScrapeRateLimiter, StrategyDeps, StrategyRegistry,
};

#[derive(Parser)]
#[command(name = "enforcement-scraper")]
#[command(about = "Scrape regulatory enforcement cases and notices", long_about = None)]
struct Cli {
    /// Agency code: hse, ea
    #[arg(long)]
    agency: Agency,

    /// Record type: case, notice
    #[arg(long)]
    record_type: RecordType,

    /// Strategy parameter as key=value; repeatable
    #[arg(long = "param", value_parser = parse_key_value)]
    params: Vec<(String, String)>,

    /// JSON configuration file; defaults to the user config directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite URL; defaults to a database in the user data directory
    #[arg(long, conflicts_with = "dry_run")]
    database: Option<String>,

    /// Keep everything in memory instead of SQLite
    #[arg(long)]
    dry_run: bool,

    /// Recorded on the session as the initiator
    #[arg(long, default_value = "cli")]
    actor: String,
}

fn parse_key_value(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{input}'"))?;
    Ok((key.trim().to_string(), value.trim().to_string()))
}

struct Stores {
    records: Arc<dyn EnforcementStore>,
    sessions: Arc<dyn SessionStore>,
    logs: Arc<dyn ProcessingLogStore>,
}

async fn open_stores(cli: &Cli) -> Result<Stores> {
    if cli.dry_run {
        return Ok(Stores {
            records: Arc::new(InMemoryEnforcementStore::new()),
            sessions: Arc::new(InMemorySessionStore::new()),
            logs: Arc::new(InMemoryProcessingLogStore::new()),
        });
    }

    let database_url = match &cli.database {
        Some(url) => url.clone(),
        None => {
            let dir = FileConfigProvider::get_app_data_dir().context("Failed to get user data directory")?;
            format!("sqlite:{}", dir.join("database").join("enforcement.db").display())
        }
    };
    let db = DatabaseConnection::new(&database_url)
        .await
        .with_context(|| format!("Failed to open database {database_url}"))?;
    db.migrate().await.context("Failed to create schema")?;
    info!("Database ready: {}", database_url);

    let pool = db.pool().clone();
    Ok(Stores {
        records: Arc::new(SqliteEnforcementStore::new(pool.clone())),
        sessions: Arc::new(SqliteSessionStore::new(pool.clone())),
        logs: Arc::new(SqliteProcessingLogStore::new(pool)),
    })
}

async fn wait_for_finish(
    coordinator: &ScrapeCoordinator,
    session_id: &str,
    mut events: tokio::sync::broadcast::Receiver<ScrapeEvent>,
) -> Result<Session> {
    let mut stop_requested = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(ScrapeEvent::SessionUpdated(session))
                    if session.session_id == session_id && session.status.is_terminal() =>
                {
                    return Ok(session);
                }
                Ok(ScrapeEvent::ProcessingLogCreated(log)) if log.session_id == session_id => {
                    info!(
                        batch = log.batch_number,
                        found = log.tally.found,
                        created = log.tally.created,
                        updated = log.tally.updated,
                        existing = log.tally.existing,
                        "Batch logged"
                    );
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream lagged");
                    let session = coordinator.session(session_id).await?;
                    if session.status.is_terminal() {
                        return Ok(session);
                    }
                }
                Err(RecvError::Closed) => return Err(anyhow!("Event stream closed")),
            },
            signal = tokio::signal::ctrl_c(), if !stop_requested => {
                signal.context("Failed to listen for Ctrl-C")?;
                warn!("Interrupted, stopping after the current unit");
                coordinator.stop_session(session_id).await?;
                stop_requested = true;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_provider = match &cli.config {
        Some(path) => FileConfigProvider::new(path),
        None => FileConfigProvider::from_default_location().context("Failed to get user config directory")?,
    };
    let config = match config_provider.active_config().await {
        Ok(config) => config,
        Err(ConfigError::NotConfigured) => ScraperConfig::default(),
        Err(err) => return Err(err).context("Failed to load configuration"),
    };
    init_logging_with_config(&config.logging)?;
    log_system_info();

    let stores = open_stores(&cli).await?;
    let rate_limiter = Arc::new(ScrapeRateLimiter::new());
    let fetcher = HttpFeedFetcher::new(&config).context("Failed to create HTTP client")?;
    let registry = StrategyRegistry::new(&StrategyDeps {
        fetcher: Arc::new(fetcher),
        store: stores.records,
        rate_limiter: rate_limiter.clone(),
    });

    let sink = BroadcastEventSink::default();
    let events = sink.subscribe();
    let coordinator = ScrapeCoordinator::new(
        registry,
        Arc::new(StaticConfigProvider::new(config)),
        stores.sessions,
        stores.logs,
        Arc::new(sink.clone()),
        rate_limiter,
    );

    let raw_params: RawParams = cli.params.iter().cloned().collect();
    let session_id = coordinator
        .start_session(cli.agency, cli.record_type, raw_params, &cli.actor)
        .await?;
    info!(%session_id, "Session started");

    let session = wait_for_finish(&coordinator, &session_id, events).await?;
    println!("{}", serde_json::to_string_pretty(&session)?);
    Ok(())
}
