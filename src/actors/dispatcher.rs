//! AlertDispatcherActor - Turns health transitions into notifications
//!
//! The dispatcher owns all alert bookkeeping. Poll workers only report
//! state transitions; whether a transition becomes a mail is decided here,
//! based on the per-client [`AlertState`] and the deployment-wide cooldown.
//!
//! ## Policy
//!
//! - Entering an unhealthy state notifies immediately unless an alert is
//!   already active and the cooldown has not elapsed.
//! - Moving between degraded and down while unhealthy re-notifies only
//!   after the cooldown.
//! - Recovery back to healthy always notifies while an alert is active,
//!   the cooldown never suppresses it. Recovery also closes the episode
//!   and drops its state entry.
//!
//! Deregistering a client must be followed by [`DispatcherHandle::forget`]
//! so its state entry does not outlive it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::notify::{AlertKind, Notifier};
use crate::{ClientId, HealthState};

use super::messages::{AlertState, DispatcherCommand, StateChange};

/// What the dispatch policy decided for one transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDecision {
    /// Send an unhealthy notification
    Notify,
    /// Send a recovery notification
    NotifyRecovery,
    /// Unhealthy, but the cooldown has not elapsed yet
    Suppress,
    /// Nothing to notify about
    Ignore,
}

impl AlertDecision {
    /// Apply the dispatch policy to one observed transition.
    pub fn evaluate(
        state: &AlertState,
        current: HealthState,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Self {
        if current.is_unhealthy() {
            if !state.active {
                return AlertDecision::Notify;
            }

            // Within an unhealthy episode, re-notify only after the cooldown.
            // A missing send time means the last attempt failed, retry now.
            let cooldown_elapsed = state.last_sent_at.is_none_or(|sent| {
                now.signed_duration_since(sent)
                    .to_std()
                    .is_ok_and(|elapsed| elapsed >= cooldown)
            });

            if cooldown_elapsed {
                AlertDecision::Notify
            } else {
                AlertDecision::Suppress
            }
        } else if current == HealthState::Healthy && state.active {
            AlertDecision::NotifyRecovery
        } else {
            AlertDecision::Ignore
        }
    }
}

/// Actor that evaluates health transitions and sends alerts
pub struct AlertDispatcherActor {
    /// Per-client alert state
    states: HashMap<ClientId, AlertState>,

    /// Minimum time between repeated alerts per client
    cooldown: Duration,

    /// Outbound notification channel
    notifier: Arc<dyn Notifier>,

    /// Command receiver
    command_rx: mpsc::Receiver<DispatcherCommand>,

    /// Transition event receiver, fed by the poll workers
    event_rx: mpsc::Receiver<StateChange>,
}

impl AlertDispatcherActor {
    pub fn new(
        cooldown: Duration,
        notifier: Arc<dyn Notifier>,
        command_rx: mpsc::Receiver<DispatcherCommand>,
        event_rx: mpsc::Receiver<StateChange>,
    ) -> Self {
        Self {
            states: HashMap::new(),
            cooldown,
            notifier,
            command_rx,
            event_rx,
        }
    }

    /// Run the actor's main loop
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting alert dispatcher actor");

        loop {
            tokio::select! {
                maybe_event = self.event_rx.recv() => {
                    match maybe_event {
                        Some(event) => self.handle_transition(event).await,
                        None => {
                            debug!("transition channel closed, shutting down");
                            break;
                        }
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        DispatcherCommand::GetState { client_id, respond_to } => {
                            let _ = respond_to.send(self.states.get(&client_id).cloned());
                        }

                        DispatcherCommand::Forget { client_id } => {
                            if self.states.remove(&client_id).is_some() {
                                debug!(%client_id, "dropped alert state of deregistered client");
                            }
                        }

                        DispatcherCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            self.drain_pending().await;
                            let _ = respond_to.send(());
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("alert dispatcher actor stopped");
    }

    /// Process transitions that already arrived before shutting down.
    async fn drain_pending(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_transition(event).await;
        }
    }

    /// Handle one health transition
    #[instrument(skip(self, event), fields(client = %event.client.address))]
    async fn handle_transition(&mut self, event: StateChange) {
        let cooldown = self.cooldown;
        let notifier = Arc::clone(&self.notifier);
        let state = self.states.entry(event.client.id).or_default();

        let decision = AlertDecision::evaluate(state, event.current, event.at, cooldown);

        trace!(
            previous = %event.previous,
            current = %event.current,
            active = state.active,
            "transition evaluated: {decision:?}"
        );

        match decision {
            AlertDecision::Notify => {
                state.active = true;
                Self::deliver(notifier.as_ref(), &event, state, AlertKind::Unhealthy).await;
            }

            AlertDecision::NotifyRecovery => {
                state.active = false;
                Self::deliver(notifier.as_ref(), &event, state, AlertKind::Recovered).await;
                // The episode is over, drop its bookkeeping. A fresh
                // unhealthy transition notifies immediately either way.
                self.states.remove(&event.client.id);
            }

            AlertDecision::Suppress => {
                debug!("alert suppressed, cooldown not elapsed");
            }

            AlertDecision::Ignore => {}
        }
    }

    /// Hand one notification to the notifier.
    ///
    /// The send time is only recorded on success. After a failed send the
    /// next transition is evaluated as if nothing had been sent, while the
    /// active flag keeps tracking the episode.
    async fn deliver(
        notifier: &dyn Notifier,
        event: &StateChange,
        state: &mut AlertState,
        kind: AlertKind,
    ) {
        match notifier.notify(event, kind).await {
            Ok(()) => {
                state.last_sent_at = Some(event.at);
                info!(
                    recipient = %event.client.alert_email,
                    "alert delivered: {kind}"
                );
            }
            Err(error) => {
                error!("failed to deliver alert: {error}");
            }
        }
    }
}

/// Handle for controlling an AlertDispatcherActor
#[derive(Clone)]
pub struct DispatcherHandle {
    sender: mpsc::Sender<DispatcherCommand>,
}

impl DispatcherHandle {
    /// Spawn a new alert dispatcher actor consuming `event_rx`.
    pub fn spawn(
        cooldown: Duration,
        notifier: Arc<dyn Notifier>,
        event_rx: mpsc::Receiver<StateChange>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = AlertDispatcherActor::new(cooldown, notifier, cmd_rx, event_rx);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Get the current alert state for a client.
    pub async fn get_state(&self, client_id: ClientId) -> Option<AlertState> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(DispatcherCommand::GetState {
                client_id,
                respond_to: tx,
            })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    /// Drop the alert state of a client, called on deregistration.
    ///
    /// Best-effort: when the actor is already gone there is nothing left
    /// to forget.
    pub async fn forget(&self, client_id: ClientId) {
        let _ = self
            .sender
            .send(DispatcherCommand::Forget { client_id })
            .await;
    }

    /// Gracefully shut down the dispatcher, delivering alerts for
    /// transitions that are already queued.
    ///
    /// Also succeeds when the actor has already stopped on its own because
    /// the transition channel closed; queued events were drained either way.
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(DispatcherCommand::Shutdown { respond_to: tx })
            .await
            .is_err()
        {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }
}
