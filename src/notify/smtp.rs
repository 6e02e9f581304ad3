//! SMTP delivery via lettre
//!
//! Sends plain-text alert mails through a STARTTLS submission relay. The
//! relay, port and credentials come from [`SmtpConfig`], with the password
//! optionally supplied through the environment.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::debug;

use crate::actors::messages::StateChange;
use crate::config::SmtpConfig;

use super::{AlertKind, Notifier, NotifyError, NotifyResult, render};

/// Notifier backed by an async SMTP transport
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    /// Build the transport from the configured relay.
    ///
    /// Fails early when the relay name or the sender address is unusable,
    /// so misconfiguration surfaces at startup rather than on the first
    /// alert.
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)
            .map_err(|error| NotifyError::Transport(error.to_string()))?
            .port(config.port);

        if let Some(password) = config.password() {
            builder = builder.credentials(Credentials::new(config.username.clone(), password));
        }

        let from = config
            .from_address()
            .parse::<Mailbox>()
            .map_err(|error| NotifyError::InvalidRecipient(error.to_string()))?;

        debug!(
            relay = %config.server,
            port = config.port,
            "smtp notifier configured"
        );

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, event: &StateChange, kind: AlertKind) -> NotifyResult {
        let to = event
            .client
            .alert_email
            .parse::<Mailbox>()
            .map_err(|error| NotifyError::InvalidRecipient(error.to_string()))?;

        let (subject, body) = render(event, kind);

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|error| NotifyError::InvalidMessage(error.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|error| NotifyError::Transport(error.to_string()))?;

        Ok(())
    }
}
