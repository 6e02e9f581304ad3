//! Actor-based monitoring core
//!
//! Each actor runs as an independent async task communicating via Tokio
//! channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!                  ┌─────────────────┐
//!                  │   main          │
//!                  └────────┬────────┘
//!                           │ spawns
//!            ┌──────────────┼─────────────────┐
//!            │              │                 │
//!   ┌────────▼────────┐     │        ┌────────▼────────┐
//!   │ SchedulerActor  │     │        │ SnapshotWriter  │
//!   └────────┬────────┘     │        └────────▲────────┘
//!            │ poll tasks   │                 │ status updates
//!   ┌────────▼────────┐     │                 │
//!   │ HealthAggregator├─────┼─────────────────┘
//!   └────────┬────────┘     │
//!            │ transitions  │
//!   ┌────────▼──────────────▼──┐
//!   │  AlertDispatcherActor    │
//!   └──────────────────────────┘
//! ```
//!
//! ## Actor Types
//!
//! - **SchedulerActor**: Ticks on the poll interval and fans out bounded
//!   concurrent poll tasks, one per client
//! - **AlertDispatcherActor**: Evaluates health transitions against the
//!   cooldown policy and sends notifications
//! - **SnapshotWriter**: Persists the latest status per client, best effort
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control
//!    messages
//! 2. **Events**: Health transitions flow over an mpsc channel from the poll
//!    workers to the dispatcher
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod dispatcher;
pub mod messages;
pub mod scheduler;
pub mod snapshots;
