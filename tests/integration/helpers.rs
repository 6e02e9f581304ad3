//! Helper functions and fakes for integration tests

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use watchpost::ClientId;
use watchpost::actors::dispatcher::DispatcherHandle;
use watchpost::actors::messages::StateChange;
use watchpost::actors::scheduler::{SchedulerHandle, SchedulerOptions};
use watchpost::actors::snapshots::SnapshotWriter;
use watchpost::aggregator::HealthAggregator;
use watchpost::config::ProbeConfig;
use watchpost::notify::{AlertKind, Notifier, NotifyResult};
use watchpost::registry::ClientRegistry;
use watchpost::store::{ClientStore, MemoryStore};

/// Notifier fake that records what the dispatcher delivers
pub struct RecordingNotifier {
    sent: Mutex<Vec<(ClientId, AlertKind)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn sent(&self) -> Vec<(ClientId, AlertKind)> {
        self.sent.lock().unwrap().clone()
    }

    /// Poll until at least `count` notifications arrived, or two seconds
    /// elapsed. Returns whatever has been recorded by then.
    pub async fn wait_for_sent(&self, count: usize) -> Vec<(ClientId, AlertKind)> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            let sent = self.sent();
            if sent.len() >= count || tokio::time::Instant::now() >= deadline {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &StateChange, kind: AlertKind) -> NotifyResult {
        self.sent.lock().unwrap().push((event.client.id, kind));
        Ok(())
    }
}

/// The whole monitoring core wired together on an in-memory store
pub struct TestStack {
    pub registry: Arc<ClientRegistry>,
    pub store: Arc<MemoryStore>,
    pub scheduler: SchedulerHandle,
    pub dispatcher: DispatcherHandle,
    pub notifier: Arc<RecordingNotifier>,
    writer_handle: JoinHandle<()>,
}

impl TestStack {
    pub async fn start(probes: ProbeConfig, interval: Duration, cooldown: Duration) -> Self {
        let registry = Arc::new(ClientRegistry::new());
        let store = Arc::new(MemoryStore::new());
        let notifier = RecordingNotifier::new();

        let (event_tx, event_rx) = mpsc::channel(64);
        let (snapshot_tx, writer_handle) =
            SnapshotWriter::spawn(store.clone() as Arc<dyn ClientStore>);

        let aggregator = Arc::new(HealthAggregator::new(
            Arc::clone(&registry),
            probes,
            event_tx,
            snapshot_tx,
        ));

        let options = SchedulerOptions {
            interval,
            max_concurrent: 8,
            miss_warn_threshold: 3,
            shutdown_grace: Duration::from_secs(5),
        };
        let scheduler = SchedulerHandle::spawn(Arc::clone(&registry), aggregator, options);
        let dispatcher = DispatcherHandle::spawn(cooldown, notifier.clone(), event_rx);

        Self {
            registry,
            store,
            scheduler,
            dispatcher,
            notifier,
            writer_handle,
        }
    }

    /// Stop the actors and flush pending snapshots into the store.
    pub async fn stop(self) {
        let _ = self.scheduler.shutdown().await;
        let _ = self.dispatcher.shutdown().await;
        let _ = self.writer_handle.await;
    }
}

/// Probe config pointing the agent probe at a wiremock server.
///
/// Ping and SSH probes run against 127.0.0.1; pass an open port from
/// [`fake_ssh_daemon`] or a [`closed_port`] depending on the scenario.
pub fn probes_for(agent: &MockServer, ssh_port: u16) -> ProbeConfig {
    let url = Url::parse(&agent.uri()).unwrap();
    ProbeConfig {
        api_port: url.port().unwrap(),
        ssh_port,
        ping_timeout_ms: 500,
        ssh_timeout_ms: 500,
        api_timeout_ms: 1000,
        ..ProbeConfig::default()
    }
}

/// Mount the agent endpoint on a wiremock server.
pub async fn mount_agent(server: &MockServer, template: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path("/device/traffic/browsing/profile/get"))
        .respond_with(template)
        .mount(server)
        .await;
}

/// A listening socket standing in for a client's SSH daemon.
///
/// The listener must stay alive for the port to keep accepting.
pub async fn fake_ssh_daemon() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}
