//! Request and response bodies for the dashboard API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Client, ClientId, HealthState, HealthStatus, ProbeResult};

/// Body of `POST /api/v1/clients`
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub address: String,
    pub alert_email: String,
}

/// Body of `PATCH /api/v1/clients/:id`
///
/// The alert recipient is the only mutable field; an address change is a
/// delete plus a fresh registration.
#[derive(Debug, Deserialize)]
pub struct UpdateClientRequest {
    pub alert_email: String,
}

/// Current status of one client
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub overall: HealthState,
    pub since: DateTime<Utc>,
    pub probes: Vec<ProbeResult>,
}

impl From<HealthStatus> for StatusResponse {
    fn from(status: HealthStatus) -> Self {
        Self {
            overall: status.overall,
            since: status.since,
            probes: status.probes,
        }
    }
}

/// One client joined with its current status
#[derive(Debug, Serialize)]
pub struct ClientResponse {
    pub id: ClientId,
    pub address: String,
    pub alert_email: String,
    pub created_at: DateTime<Utc>,
    pub status: StatusResponse,
}

impl From<(Client, HealthStatus)> for ClientResponse {
    fn from((client, status): (Client, HealthStatus)) -> Self {
        Self {
            id: client.id,
            address: client.address,
            alert_email: client.alert_email,
            created_at: client.created_at,
            status: status.into(),
        }
    }
}

/// One named check on the `/health` endpoint
#[derive(Debug, Serialize)]
pub struct HealthCheck {
    pub healthy: bool,
    pub message: String,
}

/// Body of `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" or "degraded"
    pub status: String,
    pub timestamp: String,
    pub store: HealthCheck,
    pub scheduler: HealthCheck,
}
