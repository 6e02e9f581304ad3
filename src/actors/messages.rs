//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Events**: Transition notifications flowing from poll workers to the
//!    alert dispatcher
//! 3. **Request/Response**: oneshot channels for synchronous queries

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::{Client, ClientId, HealthState, ProbeReport};

/// Event emitted when a poll cycle moves a client from one overall health
/// state to another
///
/// Transitions travel over an mpsc channel to the alert dispatcher. Each
/// client has at most one poll in flight, so its transitions arrive in
/// order.
#[derive(Debug, Clone)]
pub struct StateChange {
    /// The affected client as registered at the time of the poll
    pub client: Client,

    /// Overall state before this poll cycle
    pub previous: HealthState,

    /// Overall state derived from this poll cycle
    pub current: HealthState,

    /// The probe results that caused the transition
    pub report: ProbeReport,

    /// When the transition was observed
    pub at: DateTime<Utc>,
}

/// Commands that can be sent to the SchedulerActor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a poll cycle immediately and wait for every poll it started
    /// (and any still in flight) to finish
    ///
    /// Used for testing and manual refresh operations. Responds with the
    /// number of polls started by this cycle.
    PollNow { respond_to: oneshot::Sender<usize> },

    /// Get scheduler statistics
    GetStats {
        respond_to: oneshot::Sender<SchedulerStats>,
    },

    /// Gracefully shut down the scheduler
    ///
    /// Stops future ticks and waits for in-flight polls up to the shutdown
    /// grace period. Responds once the drain has finished.
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Scheduler statistics
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    /// Completed poll cycles
    pub cycles_completed: u64,

    /// Polls skipped because the client's previous poll was still running
    pub polls_skipped: u64,

    /// Polls currently in flight
    pub polls_in_flight: usize,
}

/// Commands that can be sent to the AlertDispatcherActor
#[derive(Debug)]
pub enum DispatcherCommand {
    /// Get the current alert state for a client
    GetState {
        client_id: ClientId,
        respond_to: oneshot::Sender<Option<AlertState>>,
    },

    /// Drop the alert state of a deregistered client
    Forget { client_id: ClientId },

    /// Gracefully shut down the dispatcher
    ///
    /// Queued transitions are processed before the actor exits, so alerts
    /// for polls that finished during shutdown are still delivered.
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Alert bookkeeping for one client, owned by the dispatcher
#[derive(Debug, Clone, Default)]
pub struct AlertState {
    /// Whether the client is in an unhealthy state that has been alerted on
    pub active: bool,

    /// When the last alert was successfully handed to the notifier
    pub last_sent_at: Option<DateTime<Utc>>,
}
