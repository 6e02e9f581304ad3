pub mod actors;
pub mod aggregator;
pub mod api;
pub mod config;
pub mod notify;
pub mod probes;
pub mod registry;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifier assigned to a client at registration.
///
/// Ids are unique for the lifetime of a deployment and are not reused after
/// a client has been deregistered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A monitored client as registered through the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,

    /// IP address or hostname the probes run against.
    pub address: String,

    /// Recipient for alerts concerning this client.
    pub alert_email: String,

    /// When the client was registered.
    pub created_at: DateTime<Utc>,
}

/// The probes every client is checked with, once per poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// ICMP echo (or TCP fallback) reachability check
    Ping,
    /// TCP connect to the SSH port
    SshPort,
    /// HTTP request against the client's local agent API
    Api,
}

impl ProbeKind {
    /// Get the string representation (snake_case)
    ///
    /// This matches the serde serialization format.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Ping => "ping",
            ProbeKind::SshPort => "ssh_port",
            ProbeKind::Api => "api",
        }
    }
}

impl std::fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single probe execution
///
/// A probe never "errors" at the type level: unreachable hosts, refused
/// connections and timeouts are all recorded as results with `ok = false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub kind: ProbeKind,

    /// Whether the probed service responded as expected.
    pub ok: bool,

    /// Measured round-trip time in milliseconds.
    ///
    /// Present when the probe got an answer (including a definite negative
    /// one such as a refused connection). `None` when the probe timed out
    /// and no meaningful duration exists.
    pub latency_ms: Option<u64>,

    /// When the probe was executed.
    pub checked_at: DateTime<Utc>,

    /// Short diagnostic for failed probes, e.g. "timeout" or "HTTP 503".
    pub detail: Option<String>,
}

impl ProbeResult {
    pub fn success(kind: ProbeKind, latency: Duration) -> Self {
        Self {
            kind,
            ok: true,
            latency_ms: Some(latency.as_millis() as u64),
            checked_at: Utc::now(),
            detail: None,
        }
    }

    pub fn failure(kind: ProbeKind, latency: Option<Duration>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            ok: false,
            latency_ms: latency.map(|l| l.as_millis() as u64),
            checked_at: Utc::now(),
            detail: Some(detail.into()),
        }
    }
}

/// Results of one full probe cycle against a single client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub ping: ProbeResult,
    pub ssh_port: ProbeResult,
    pub api: ProbeResult,
}

impl ProbeReport {
    pub fn iter(&self) -> impl Iterator<Item = &ProbeResult> {
        [&self.ping, &self.ssh_port, &self.api].into_iter()
    }

    /// Derive the overall health state from the individual probe outcomes.
    ///
    /// Reachability is judged by the ping probe alone: when ping fails the
    /// client is down, no matter what the service probes returned in the
    /// same cycle. When ping succeeds but the SSH port or the agent API
    /// failed, the client is degraded.
    pub fn overall(&self) -> HealthState {
        if !self.ping.ok {
            HealthState::Down
        } else if self.ssh_port.ok && self.api.ok {
            HealthState::Healthy
        } else {
            HealthState::Degraded
        }
    }
}

/// Overall health of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    /// All probes succeeded
    Healthy,
    /// Reachable, but at least one service probe failed
    Degraded,
    /// Ping failed, host considered unreachable
    Down,
    /// No completed probe cycle yet
    Unknown,
}

impl HealthState {
    /// Get the string representation (lowercase)
    ///
    /// This matches the serde serialization format.
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Down => "down",
            HealthState::Unknown => "unknown",
        }
    }

    /// Whether this state raises or keeps an alert active.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthState::Degraded | HealthState::Down)
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current health of a client: the overall state plus the per-probe results
/// from the cycle that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub overall: HealthState,

    /// Probe results from the most recent completed cycle. Empty until the
    /// first cycle finishes.
    pub probes: Vec<ProbeResult>,

    /// When the client entered the current overall state.
    ///
    /// Moves only on state transitions, never on cycles that confirm the
    /// state the client is already in.
    pub since: DateTime<Utc>,
}

impl HealthStatus {
    /// Status for a client that has not completed a probe cycle yet.
    pub fn unknown(now: DateTime<Utc>) -> Self {
        Self {
            overall: HealthState::Unknown,
            probes: Vec::new(),
            since: now,
        }
    }
}
