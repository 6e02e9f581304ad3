//! Store trait definition
//!
//! This module defines the `ClientStore` trait that all storage
//! implementations must implement.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StoreResult;
use crate::{Client, ClientId, HealthStatus};

/// Health of the store itself, reported on the process health endpoint
#[derive(Debug, Clone)]
pub struct StoreHealth {
    /// Is the store operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for persistent client stores
///
/// Implementations must be `Send + Sync` as they are shared across async
/// tasks behind an `Arc`.
///
/// ## Error Handling
///
/// Methods return `StoreResult<T>` wrapping `StoreError`. Callers on the
/// poll path treat every error as transient: they log it and move on, the
/// registry stays authoritative for live state.
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Load every registered client.
    ///
    /// Called once at startup to seed the registry. Results are ordered by
    /// id so the registry's id counter can resume above the highest one.
    async fn load_clients(&self) -> StoreResult<Vec<Client>>;

    /// Persist a newly registered client.
    async fn insert_client(&self, client: &Client) -> StoreResult<()>;

    /// Remove a client and its status snapshot.
    async fn delete_client(&self, id: ClientId) -> StoreResult<()>;

    /// Change the alert recipient of a stored client.
    async fn update_alert_email(&self, id: ClientId, alert_email: &str) -> StoreResult<()>;

    /// Upsert the latest status snapshot for a client.
    ///
    /// This is a current-status store, not a time series: each write
    /// replaces the previous snapshot for the client.
    async fn save_status_snapshot(&self, id: ClientId, status: &HealthStatus) -> StoreResult<()>;

    /// Read back the latest snapshot, if one was ever written.
    async fn load_status_snapshot(&self, id: ClientId) -> StoreResult<Option<HealthStatus>>;

    /// Check store health with a lightweight operation.
    async fn health_check(&self) -> StoreResult<StoreHealth>;

    /// Close the store and release resources.
    async fn close(&self) -> StoreResult<()>;
}
