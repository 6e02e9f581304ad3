//! API shared state

use std::sync::Arc;

use crate::actors::dispatcher::DispatcherHandle;
use crate::actors::scheduler::SchedulerHandle;
use crate::registry::ClientRegistry;
use crate::store::ClientStore;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Live client state, authoritative for every read
    pub registry: Arc<ClientRegistry>,

    /// Persistent store, mirrored on writes and probed by `/health`
    pub store: Arc<dyn ClientStore>,

    /// Handle to the scheduler, for liveness checks
    pub scheduler: SchedulerHandle,

    /// Handle to the alert dispatcher, told about deregistrations
    pub dispatcher: DispatcherHandle,
}
