//! Snapshot writer - best-effort persistence of fresh statuses
//!
//! Poll workers push every freshly derived status onto a bounded queue; a
//! single writer task drains it into the store. Persistence never gets to
//! slow down or fail a poll cycle: a full queue drops the snapshot on the
//! sending side, a store error is logged here and forgotten.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::store::ClientStore;
use crate::{ClientId, HealthStatus};

/// Queue depth before senders start dropping snapshots
pub const SNAPSHOT_QUEUE_CAPACITY: usize = 256;

/// One persistence request, the latest status for a client
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub client_id: ClientId,
    pub status: HealthStatus,
}

/// Task that drains status updates into the store
pub struct SnapshotWriter {
    store: Arc<dyn ClientStore>,
    update_rx: mpsc::Receiver<StatusUpdate>,
}

impl SnapshotWriter {
    /// Spawn the writer task.
    ///
    /// The task runs until every sender is dropped, so awaiting the returned
    /// handle after shutting down the scheduler flushes remaining snapshots.
    pub fn spawn(store: Arc<dyn ClientStore>) -> (mpsc::Sender<StatusUpdate>, JoinHandle<()>) {
        let (update_tx, update_rx) = mpsc::channel(SNAPSHOT_QUEUE_CAPACITY);

        let writer = Self { store, update_rx };
        let handle = tokio::spawn(writer.run());

        (update_tx, handle)
    }

    async fn run(mut self) {
        debug!("starting snapshot writer");

        while let Some(update) = self.update_rx.recv().await {
            if let Err(error) = self
                .store
                .save_status_snapshot(update.client_id, &update.status)
                .await
            {
                warn!(
                    client_id = %update.client_id,
                    "failed to persist status snapshot: {error}"
                );
            }
        }

        debug!("snapshot channel closed, snapshot writer stopped");
    }
}
