use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, trace, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use watchpost::actors::dispatcher::DispatcherHandle;
use watchpost::actors::scheduler::{SchedulerHandle, SchedulerOptions};
use watchpost::actors::snapshots::SnapshotWriter;
use watchpost::aggregator::HealthAggregator;
use watchpost::api::{ApiState, spawn_api_server};
use watchpost::config::{Config, StorageConfig, read_config_file, smtp_from_env};
use watchpost::notify::{LogNotifier, Notifier, SmtpNotifier};
use watchpost::registry::ClientRegistry;
use watchpost::store::{ClientStore, MemoryStore, SqliteStore};

/// Transition queue between the poll workers and the alert dispatcher
const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (JSON); defaults apply when omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Run a single poll cycle over all clients, then exit
    #[arg(long)]
    poll_once: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("watchpost=info"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.config {
        Some(path) => read_config_file(path).with_context(|| format!("reading {path}"))?,
        None => {
            info!("no config file given, using defaults");
            Config::default()
        }
    };

    // Store selection and startup load
    let store: Arc<dyn ClientStore> = match config.storage.clone().unwrap_or_default() {
        StorageConfig::None => {
            info!("persistence disabled, clients live in memory only");
            Arc::new(MemoryStore::new())
        }
        StorageConfig::Sqlite { path } => Arc::new(
            SqliteStore::new(&path)
                .await
                .with_context(|| format!("opening sqlite store at {}", path.display()))?,
        ),
    };

    let registry = Arc::new(ClientRegistry::new());
    let stored_clients = store
        .load_clients()
        .await
        .context("loading clients from the store")?;
    if !stored_clients.is_empty() {
        info!("loaded {} client(s) from the store", stored_clients.len());
        registry.seed(stored_clients).await;
    }

    // Notifier: configured SMTP section, then environment, then log-only
    let notifier: Arc<dyn Notifier> = match config.smtp.clone().or_else(smtp_from_env) {
        Some(smtp) => {
            info!("alerts go out via {}:{}", smtp.server, smtp.port);
            Arc::new(SmtpNotifier::new(&smtp).context("building smtp notifier")?)
        }
        None => {
            warn!("no smtp relay configured, alerts are logged only");
            Arc::new(LogNotifier)
        }
    };

    // Wire the core: poll workers feed transitions to the dispatcher and
    // fresh statuses to the snapshot writer
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let (snapshot_tx, writer_handle) = SnapshotWriter::spawn(Arc::clone(&store));

    let aggregator = Arc::new(HealthAggregator::new(
        Arc::clone(&registry),
        config.probes.clone(),
        event_tx,
        snapshot_tx,
    ));

    let dispatcher = DispatcherHandle::spawn(config.monitor.cooldown(), notifier, event_rx);
    let scheduler = SchedulerHandle::spawn(
        Arc::clone(&registry),
        aggregator,
        SchedulerOptions::from(&config.monitor),
    );

    if args.poll_once {
        let started = scheduler.poll_now().await?;
        info!("poll cycle finished, {started} client(s) polled");
    } else {
        let (api_shutdown_tx, api_shutdown_rx) = oneshot::channel();
        let api_state = ApiState {
            registry: Arc::clone(&registry),
            store: Arc::clone(&store),
            scheduler: scheduler.clone(),
            dispatcher: dispatcher.clone(),
        };
        spawn_api_server(&config.api, api_state, api_shutdown_rx)
            .await
            .context("starting the dashboard API")?;

        info!(
            "monitoring {} client(s) every {}s",
            registry.count().await,
            config.monitor.interval_secs
        );

        tokio::signal::ctrl_c()
            .await
            .context("waiting for shutdown signal")?;
        info!("received shutdown signal");

        let _ = api_shutdown_tx.send(());
    }

    // Orderly teardown: stop polling, deliver queued alerts, flush
    // snapshots, close the store
    if let Err(e) = scheduler.shutdown().await {
        error!("scheduler shutdown failed: {e}");
    }
    if let Err(e) = dispatcher.shutdown().await {
        error!("dispatcher shutdown failed: {e}");
    }
    if let Err(e) = writer_handle.await {
        error!("snapshot writer task failed: {e}");
    }
    if let Err(e) = store.close().await {
        error!("closing the store failed: {e}");
    }

    info!("shutdown complete");
    Ok(())
}
