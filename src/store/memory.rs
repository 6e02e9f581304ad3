//! In-memory store (no persistence)
//!
//! Used by tests and by deployments that run without a database. All data
//! is lost on restart; the monitoring core rebuilds live state within one
//! poll interval anyway.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::backend::{ClientStore, StoreHealth};
use super::error::StoreResult;
use crate::{Client, ClientId, HealthStatus};

/// Store that keeps everything in process memory
#[derive(Default)]
pub struct MemoryStore {
    clients: RwLock<HashMap<ClientId, Client>>,
    snapshots: RwLock<HashMap<ClientId, HealthStatus>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClientStore for MemoryStore {
    async fn load_clients(&self) -> StoreResult<Vec<Client>> {
        let clients = self.clients.read().await;
        let mut all: Vec<_> = clients.values().cloned().collect();
        all.sort_by_key(|client| client.id);
        Ok(all)
    }

    async fn insert_client(&self, client: &Client) -> StoreResult<()> {
        self.clients.write().await.insert(client.id, client.clone());
        Ok(())
    }

    async fn delete_client(&self, id: ClientId) -> StoreResult<()> {
        self.clients.write().await.remove(&id);
        self.snapshots.write().await.remove(&id);
        Ok(())
    }

    async fn update_alert_email(&self, id: ClientId, alert_email: &str) -> StoreResult<()> {
        if let Some(client) = self.clients.write().await.get_mut(&id) {
            client.alert_email = alert_email.to_string();
        }
        Ok(())
    }

    async fn save_status_snapshot(&self, id: ClientId, status: &HealthStatus) -> StoreResult<()> {
        self.snapshots.write().await.insert(id, status.clone());
        Ok(())
    }

    async fn load_status_snapshot(&self, id: ClientId) -> StoreResult<Option<HealthStatus>> {
        Ok(self.snapshots.read().await.get(&id).cloned())
    }

    async fn health_check(&self) -> StoreResult<StoreHealth> {
        let count = self.clients.read().await.len();
        Ok(StoreHealth {
            healthy: true,
            message: "in-memory store operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("clients".to_string(), count.to_string()),
            ]),
        })
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}
