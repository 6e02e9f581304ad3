use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::trace;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./clients.db")
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    /// Poll scheduling and alerting cadence
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Probe timeouts and target ports
    #[serde(default)]
    pub probes: ProbeConfig,

    /// SMTP relay used for alert mails (optional - falls back to environment
    /// variables, then to log-only alerting)
    pub smtp: Option<SmtpConfig>,

    /// Storage configuration (optional - defaults to sqlite; "none" selects
    /// the in-memory store)
    pub storage: Option<StorageConfig>,

    /// Dashboard API server
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitorConfig {
    /// Seconds between poll cycles
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Upper bound on clients probed at the same time
    #[serde(default = "default_max_concurrent_polls")]
    pub max_concurrent_polls: usize,

    /// Consecutive missed cycles per client before a warning is logged
    #[serde(default = "default_missed_cycle_warn_threshold")]
    pub missed_cycle_warn_threshold: u32,

    /// Seconds to wait for in-flight polls during shutdown
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Minimum seconds between repeated alerts for the same client
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_concurrent_polls: default_max_concurrent_polls(),
            missed_cycle_warn_threshold: default_missed_cycle_warn_threshold(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Alert cooldown, honoring the `ALERT_COOLDOWN_SECONDS` environment
    /// variable over the config file value.
    pub fn cooldown(&self) -> Duration {
        let secs = std::env::var(ALERT_COOLDOWN_SECONDS)
            .ok()
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(self.cooldown_secs);
        Duration::from_secs(secs)
    }
}

fn default_interval_secs() -> u64 {
    30
}

fn default_max_concurrent_polls() -> usize {
    16
}

fn default_missed_cycle_warn_threshold() -> u32 {
    3
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_cooldown_secs() -> u64 {
    3600
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProbeConfig {
    /// Ping timeout in milliseconds
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,

    /// SSH port probe timeout in milliseconds
    #[serde(default = "default_ssh_timeout_ms")]
    pub ssh_timeout_ms: u64,

    /// Agent API probe timeout in milliseconds
    #[serde(default = "default_api_timeout_ms")]
    pub api_timeout_ms: u64,

    /// Port probed for SSH reachability
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,

    /// Port the client's local agent API listens on
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Path queried on the agent API
    #[serde(default = "default_api_path")]
    pub api_path: String,

    /// Port used for the TCP reachability fallback when ICMP sockets are
    /// unavailable
    #[serde(default = "default_tcp_fallback_port")]
    pub tcp_fallback_port: u16,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ping_timeout_ms: default_ping_timeout_ms(),
            ssh_timeout_ms: default_ssh_timeout_ms(),
            api_timeout_ms: default_api_timeout_ms(),
            ssh_port: default_ssh_port(),
            api_port: default_api_port(),
            api_path: default_api_path(),
            tcp_fallback_port: default_tcp_fallback_port(),
        }
    }
}

impl ProbeConfig {
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn ssh_timeout(&self) -> Duration {
        Duration::from_millis(self.ssh_timeout_ms)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }
}

fn default_ping_timeout_ms() -> u64 {
    1000
}

fn default_ssh_timeout_ms() -> u64 {
    2000
}

fn default_api_timeout_ms() -> u64 {
    3000
}

fn default_ssh_port() -> u16 {
    22
}

fn default_api_port() -> u16 {
    8083
}

fn default_api_path() -> String {
    "/device/traffic/browsing/profile/get".to_string()
}

fn default_tcp_fallback_port() -> u16 {
    80
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SmtpConfig {
    /// SMTP relay hostname
    pub server: String,

    /// Submission port (STARTTLS)
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Account used to authenticate against the relay
    pub username: String,

    /// Password for the relay account. Falls back to the `SENDER_PASSWORD`
    /// environment variable so it can be kept out of the config file.
    pub password: Option<String>,

    /// Sender address for alert mails (defaults to the username)
    pub from: Option<String>,
}

impl SmtpConfig {
    pub fn password(&self) -> Option<String> {
        self.password
            .clone()
            .or_else(|| std::env::var(SENDER_PASSWORD).ok())
    }

    pub fn from_address(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.username)
    }
}

fn default_smtp_port() -> u16 {
    587
}

const SMTP_SERVER: &str = "SMTP_SERVER";
const SMTP_PORT: &str = "SMTP_PORT";
const SENDER_EMAIL: &str = "SENDER_EMAIL";
const SENDER_PASSWORD: &str = "SENDER_PASSWORD";
const ALERT_COOLDOWN_SECONDS: &str = "ALERT_COOLDOWN_SECONDS";

/// Build an [`SmtpConfig`] from `SMTP_SERVER`, `SMTP_PORT`, `SENDER_EMAIL`
/// and `SENDER_PASSWORD` when no `smtp` section is configured.
pub fn smtp_from_env() -> Option<SmtpConfig> {
    let server = std::env::var(SMTP_SERVER).ok()?;
    let username = std::env::var(SENDER_EMAIL).ok()?;
    let port = std::env::var(SMTP_PORT)
        .map_or(default_smtp_port(), |res| res.parse().unwrap_or(default_smtp_port()));

    Some(SmtpConfig {
        server,
        port,
        username,
        password: std::env::var(SENDER_PASSWORD).ok(),
        from: None,
    })
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiConfig {
    /// Address the dashboard API binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Whether permissive CORS headers are attached to responses
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            enable_cors: default_enable_cors(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

fn default_enable_cors() -> bool {
    true
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|_| anyhow::anyhow!("Invalid configuration file provided!"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
