//! In-memory registry of monitored clients
//!
//! The registry is the authoritative view of which clients exist and what
//! their current health is. The scheduler reads it to decide what to poll,
//! poll workers write statuses back, and the dashboard API serves every
//! read from it without touching persistent storage.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::{Client, ClientId, HealthStatus};

/// Result type alias for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur when manipulating the client registry
#[derive(Debug, PartialEq, Eq)]
pub enum RegistryError {
    /// Address is neither an IP address nor a plausible hostname
    InvalidAddress(String),

    /// Alert email does not parse as an address
    InvalidEmail(String),

    /// A client with the same address and alert email already exists
    Duplicate(String),

    /// No client with the given id
    NotFound(ClientId),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::InvalidAddress(addr) => write!(f, "invalid client address: {}", addr),
            RegistryError::InvalidEmail(email) => write!(f, "invalid alert email: {}", email),
            RegistryError::Duplicate(addr) => write!(f, "client already registered: {}", addr),
            RegistryError::NotFound(id) => write!(f, "no client with id {}", id),
        }
    }
}

impl std::error::Error for RegistryError {}

struct ClientEntry {
    client: Client,
    status: HealthStatus,
}

/// Shared client registry
pub struct ClientRegistry {
    entries: RwLock<HashMap<ClientId, ClientEntry>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new client and return it with its assigned id.
    ///
    /// The client starts out with an unknown status until the first poll
    /// cycle reaches it.
    pub async fn register(&self, address: &str, alert_email: &str) -> RegistryResult<Client> {
        validate_address(address)?;
        validate_email(alert_email)?;

        let mut entries = self.entries.write().await;

        let duplicate = entries
            .values()
            .any(|entry| entry.client.address == address && entry.client.alert_email == alert_email);
        if duplicate {
            return Err(RegistryError::Duplicate(address.to_string()));
        }

        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let now = Utc::now();
        let client = Client {
            id,
            address: address.to_string(),
            alert_email: alert_email.to_string(),
            created_at: now,
        };

        entries.insert(
            id,
            ClientEntry {
                client: client.clone(),
                status: HealthStatus::unknown(now),
            },
        );

        Ok(client)
    }

    /// Remove a client, returning its record.
    pub async fn deregister(&self, id: ClientId) -> RegistryResult<Client> {
        let mut entries = self.entries.write().await;
        entries
            .remove(&id)
            .map(|entry| entry.client)
            .ok_or(RegistryError::NotFound(id))
    }

    /// All registered clients, ordered by id.
    pub async fn list(&self) -> Vec<Client> {
        let entries = self.entries.read().await;
        let mut clients: Vec<_> = entries.values().map(|entry| entry.client.clone()).collect();
        clients.sort_by_key(|client| client.id);
        clients
    }

    /// All clients together with their current status, ordered by id.
    pub async fn snapshot(&self) -> Vec<(Client, HealthStatus)> {
        let entries = self.entries.read().await;
        let mut snapshot: Vec<_> = entries
            .values()
            .map(|entry| (entry.client.clone(), entry.status.clone()))
            .collect();
        snapshot.sort_by_key(|(client, _)| client.id);
        snapshot
    }

    pub async fn get(&self, id: ClientId) -> Option<Client> {
        let entries = self.entries.read().await;
        entries.get(&id).map(|entry| entry.client.clone())
    }

    pub async fn get_status(&self, id: ClientId) -> Option<HealthStatus> {
        let entries = self.entries.read().await;
        entries.get(&id).map(|entry| entry.status.clone())
    }

    /// Store a freshly derived status for a client.
    ///
    /// Returns `false` when the client has been deregistered in the
    /// meantime, in which case the result is discarded.
    pub async fn update_status(&self, id: ClientId, status: HealthStatus) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&id) {
            Some(entry) => {
                entry.status = status;
                true
            }
            None => false,
        }
    }

    /// Change the alert recipient for a client.
    pub async fn update_alert_email(
        &self,
        id: ClientId,
        alert_email: &str,
    ) -> RegistryResult<Client> {
        validate_email(alert_email)?;

        let mut entries = self.entries.write().await;

        let address = entries
            .get(&id)
            .map(|entry| entry.client.address.clone())
            .ok_or(RegistryError::NotFound(id))?;

        let duplicate = entries.values().any(|entry| {
            entry.client.id != id
                && entry.client.address == address
                && entry.client.alert_email == alert_email
        });
        if duplicate {
            return Err(RegistryError::Duplicate(address));
        }

        let entry = entries.get_mut(&id).ok_or(RegistryError::NotFound(id))?;
        entry.client.alert_email = alert_email.to_string();
        Ok(entry.client.clone())
    }

    /// Load clients persisted by an earlier run.
    ///
    /// Statuses always restart as unknown, the id counter resumes above the
    /// highest id seen so far.
    pub async fn seed(&self, clients: Vec<Client>) {
        let now = Utc::now();
        let mut entries = self.entries.write().await;

        for client in clients {
            let id = client.id;
            entries.insert(
                id,
                ClientEntry {
                    client,
                    status: HealthStatus::unknown(now),
                },
            );
            // Atomic max so seeding cannot move the counter backwards
            self.next_id.fetch_max(id.0 + 1, Ordering::Relaxed);
        }
    }

    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}

fn validate_address(address: &str) -> RegistryResult<()> {
    if address.parse::<IpAddr>().is_ok() {
        return Ok(());
    }

    if is_valid_hostname(address) {
        return Ok(());
    }

    Err(RegistryError::InvalidAddress(address.to_string()))
}

fn is_valid_hostname(address: &str) -> bool {
    if address.is_empty() || address.len() > 253 {
        return false;
    }

    address.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

fn validate_email(alert_email: &str) -> RegistryResult<()> {
    alert_email
        .parse::<lettre::Address>()
        .map(|_| ())
        .map_err(|_| RegistryError::InvalidEmail(alert_email.to_string()))
}
