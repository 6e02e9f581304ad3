//! Outbound alert notifications
//!
//! The dispatcher decides *when* to alert, this module decides *what* goes
//! out and *how*. The [`Notifier`] trait hides the delivery channel so the
//! dispatcher can be tested with a recording fake; deployments without SMTP
//! credentials fall back to [`LogNotifier`].

pub mod smtp;

pub use smtp::SmtpNotifier;

use std::fmt;

use async_trait::async_trait;
use tracing::info;

use crate::actors::messages::StateChange;
use crate::ProbeKind;

/// Result type alias for notification delivery
pub type NotifyResult = Result<(), NotifyError>;

/// Errors that can occur while delivering a notification
#[derive(Debug)]
pub enum NotifyError {
    /// The delivery channel failed (SMTP connect, send, ...)
    Transport(String),

    /// The recipient address did not parse as a mailbox
    InvalidRecipient(String),

    /// The message itself could not be built
    InvalidMessage(String),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::Transport(msg) => write!(f, "notification transport failed: {}", msg),
            NotifyError::InvalidRecipient(msg) => write!(f, "invalid recipient: {}", msg),
            NotifyError::InvalidMessage(msg) => write!(f, "could not build message: {}", msg),
        }
    }
}

impl std::error::Error for NotifyError {}

/// The two messages the dispatcher can send for a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// The client entered (or stayed in) an unhealthy state
    Unhealthy,
    /// The client returned to healthy after an alerted episode
    Recovered,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Unhealthy => f.write_str("unhealthy"),
            AlertKind::Recovered => f.write_str("recovered"),
        }
    }
}

/// Delivery channel for rendered alerts
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Render and deliver one notification for a health transition.
    async fn notify(&self, event: &StateChange, kind: AlertKind) -> NotifyResult;
}

/// Render the (subject, body) pair for a transition.
pub fn render(event: &StateChange, kind: AlertKind) -> (String, String) {
    match kind {
        AlertKind::Unhealthy => render_unhealthy(event),
        AlertKind::Recovered => render_recovered(event),
    }
}

const FOOTER: &str = "----------------------------------------\n\
    This is an automated email to report client health issues, \
    take appropriate action to avoid getting this message every hour.";

fn render_unhealthy(event: &StateChange) -> (String, String) {
    let address = &event.client.address;
    let subject = format!("Client-Health: Services Down for {address}");

    let mut issues = String::new();
    let mut index = 0;
    for probe in event.report.iter().filter(|probe| !probe.ok) {
        index += 1;
        let name = match probe.kind {
            ProbeKind::Ping => "Ping Unreachable",
            ProbeKind::SshPort => "SSH Port 22 Closed",
            ProbeKind::Api => "Agent API Unreachable",
        };
        match &probe.detail {
            Some(detail) => issues.push_str(&format!("{index}. {name} ({detail})\n")),
            None => issues.push_str(&format!("{index}. {name}\n")),
        }
    }

    let body = format!(
        "The following services are down for client {address}:\n\n\
         {issues}\n\
         State changed from {previous} to {current} at {at}.\n\n\
         {FOOTER}",
        previous = event.previous,
        current = event.current,
        at = event.at.to_rfc3339(),
    );

    (subject, body)
}

fn render_recovered(event: &StateChange) -> (String, String) {
    let address = &event.client.address;
    let subject = format!("Client-Health: Recovered {address}");

    let body = format!(
        "Client {address} has recovered: state changed from {previous} to \
         {current} at {at}.\n\n\
         All monitored services are reachable again.\n\n\
         {FOOTER}",
        previous = event.previous,
        current = event.current,
        at = event.at.to_rfc3339(),
    );

    (subject, body)
}

/// Fallback notifier that only logs what would have been sent.
///
/// Used when no SMTP relay is configured, so the monitoring core keeps
/// running and operators can still see alerts in the logs.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &StateChange, kind: AlertKind) -> NotifyResult {
        let (subject, body) = render(event, kind);
        info!(
            recipient = %event.client.alert_email,
            subject = %subject,
            "no smtp relay configured, logging alert\n{body}"
        );
        Ok(())
    }
}
