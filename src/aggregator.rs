//! Poll execution and health derivation
//!
//! The aggregator runs the three probes for a client, folds the results
//! into a fresh [`HealthStatus`] and pushes the consequences to the rest of
//! the system: the registry gets the new status, the snapshot writer gets a
//! persistence request, and the alert dispatcher gets a [`StateChange`]
//! when the overall state moved.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::actors::messages::StateChange;
use crate::actors::snapshots::StatusUpdate;
use crate::config::ProbeConfig;
use crate::probes;
use crate::registry::ClientRegistry;
use crate::{Client, HealthStatus, ProbeReport};

/// Derive the next status from the previous one and a fresh probe report.
///
/// `since` is carried over while the overall state is unchanged and reset
/// to `now` on a transition, so repeating cycles with the same outcome
/// never move it.
pub fn advance_status(
    previous: &HealthStatus,
    report: &ProbeReport,
    now: DateTime<Utc>,
) -> HealthStatus {
    let overall = report.overall();
    HealthStatus {
        overall,
        probes: report.iter().cloned().collect(),
        since: if overall == previous.overall {
            previous.since
        } else {
            now
        },
    }
}

/// Runs probes for single clients and applies the outcome
///
/// One aggregator is shared by all poll workers. The HTTP client inside is
/// reused across requests.
pub struct HealthAggregator {
    registry: Arc<ClientRegistry>,

    probes: ProbeConfig,

    /// HTTP client for the agent API probe (reused across requests)
    client: reqwest::Client,

    /// Transitions for the alert dispatcher
    event_tx: mpsc::Sender<StateChange>,

    /// Best-effort persistence requests for the snapshot writer
    snapshot_tx: mpsc::Sender<StatusUpdate>,
}

impl HealthAggregator {
    pub fn new(
        registry: Arc<ClientRegistry>,
        probes: ProbeConfig,
        event_tx: mpsc::Sender<StateChange>,
        snapshot_tx: mpsc::Sender<StatusUpdate>,
    ) -> Self {
        Self {
            registry,
            client: reqwest::Client::builder()
                .timeout(probes.api_timeout())
                .build()
                .expect("Failed to build HTTP client"),
            probes,
            event_tx,
            snapshot_tx,
        }
    }

    /// Probe a client once and apply the derived status.
    ///
    /// Results for clients that were deregistered while the probes ran are
    /// discarded.
    #[instrument(skip(self, client), fields(client = %client.address, id = %client.id))]
    pub async fn poll_client(&self, client: Client) {
        let report = self.run_probes(&client.address).await;

        let Some(previous) = self.registry.get_status(client.id).await else {
            debug!("discarding poll result for deregistered client");
            return;
        };

        let now = Utc::now();
        let status = advance_status(&previous, &report, now);
        let transitioned = status.overall != previous.overall;

        if !self.registry.update_status(client.id, status.clone()).await {
            debug!("discarding poll result for deregistered client");
            return;
        }

        // Best effort: a full queue drops the snapshot, not the poll
        let update = StatusUpdate {
            client_id: client.id,
            status: status.clone(),
        };
        if self.snapshot_tx.try_send(update).is_err() {
            warn!("snapshot writer busy, dropping status snapshot");
        }

        if transitioned {
            debug!(
                previous = %previous.overall,
                current = %status.overall,
                "health state changed"
            );

            let change = StateChange {
                client,
                previous: previous.overall,
                current: status.overall,
                report,
                at: now,
            };
            if self.event_tx.send(change).await.is_err() {
                warn!("alert dispatcher unavailable, transition dropped");
            }
        }
    }

    /// Run all probes for an address concurrently.
    async fn run_probes(&self, address: &str) -> ProbeReport {
        let (ping, ssh_port, api) = tokio::join!(
            probes::ping_probe(address, &self.probes),
            probes::ssh_probe(address, &self.probes),
            probes::api_probe(&self.client, address, &self.probes),
        );

        ProbeReport {
            ping,
            ssh_port,
            api,
        }
    }
}
