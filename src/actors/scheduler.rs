//! SchedulerActor - Drives poll cycles over all registered clients
//!
//! Every tick the scheduler reads the registry and spawns one poll task per
//! client. Concurrency is capped by a semaphore that the tasks acquire
//! themselves, so the scheduler loop never blocks on a full pool. A client
//! whose previous poll is still running is skipped for the cycle, not
//! queued up, to keep slow clients from building a backlog.
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → registry snapshot → spawn poll tasks → HealthAggregator
//!     ↑
//!     └─── Commands (PollNow, GetStats, Shutdown)
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::{Id as TaskId, JoinError, JoinSet};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, instrument, warn};

use crate::ClientId;
use crate::aggregator::HealthAggregator;
use crate::config::MonitorConfig;
use crate::registry::ClientRegistry;

use super::messages::{SchedulerCommand, SchedulerStats};

/// Scheduling parameters, usually derived from [`MonitorConfig`]
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Time between poll cycles
    pub interval: Duration,

    /// Upper bound on concurrently running polls
    pub max_concurrent: usize,

    /// Consecutive skipped cycles per client before a warning is logged
    pub miss_warn_threshold: u32,

    /// How long shutdown waits for in-flight polls
    pub shutdown_grace: Duration,
}

impl From<&MonitorConfig> for SchedulerOptions {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            interval: config.interval(),
            max_concurrent: config.max_concurrent_polls,
            miss_warn_threshold: config.missed_cycle_warn_threshold,
            shutdown_grace: config.shutdown_grace(),
        }
    }
}

/// Actor that schedules health polls for all registered clients
pub struct SchedulerActor {
    registry: Arc<ClientRegistry>,

    /// Shared poll executor
    aggregator: Arc<HealthAggregator>,

    options: SchedulerOptions,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<SchedulerCommand>,

    /// Concurrency cap, acquired inside the poll tasks
    limiter: Arc<Semaphore>,

    /// Clients with a poll currently in flight
    in_flight: HashSet<ClientId>,

    /// Running poll tasks, each resolving to the client it polled
    tasks: JoinSet<ClientId>,

    /// Client behind each running task, so a crashed task can still be
    /// cleared from `in_flight`
    task_owners: HashMap<TaskId, ClientId>,

    /// Consecutive skipped cycles per client
    missed: HashMap<ClientId, u32>,

    cycles_completed: u64,
    polls_skipped: u64,
}

impl SchedulerActor {
    pub fn new(
        registry: Arc<ClientRegistry>,
        aggregator: Arc<HealthAggregator>,
        options: SchedulerOptions,
        command_rx: mpsc::Receiver<SchedulerCommand>,
    ) -> Self {
        let limiter = Arc::new(Semaphore::new(options.max_concurrent.max(1)));

        Self {
            registry,
            aggregator,
            options,
            command_rx,
            limiter,
            in_flight: HashSet::new(),
            tasks: JoinSet::new(),
            task_owners: HashMap::new(),
            missed: HashMap::new(),
            cycles_completed: 0,
            polls_skipped: 0,
        }
    }

    /// Run the actor's main loop
    ///
    /// The first cycle starts immediately, subsequent ones follow the
    /// configured interval. Runs until a Shutdown command arrives or the
    /// command channel closes.
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting scheduler actor");

        let mut ticker = interval(self.options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }

                Some(result) = self.tasks.join_next_with_id(), if !self.tasks.is_empty() => {
                    self.finish_poll(result);
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SchedulerCommand::PollNow { respond_to } => {
                            debug!("received PollNow command");
                            let started = self.run_cycle().await;
                            self.drain(None).await;
                            let _ = respond_to.send(started);
                        }

                        SchedulerCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(self.stats());
                        }

                        SchedulerCommand::Shutdown { respond_to } => {
                            debug!("received shutdown command");
                            self.drain(Some(self.options.shutdown_grace)).await;
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

        debug!("scheduler actor stopped");
    }

    /// Start polls for every client without one in flight.
    ///
    /// Returns the number of polls started.
    async fn run_cycle(&mut self) -> usize {
        // Collect finished polls first so their slots free up
        while let Some(result) = self.tasks.try_join_next_with_id() {
            self.finish_poll(result);
        }

        let clients = self.registry.list().await;

        // Miss counters of deregistered clients have nothing left to count
        let live: HashSet<ClientId> = clients.iter().map(|client| client.id).collect();
        self.missed.retain(|id, _| live.contains(id));

        let mut started = 0;

        for client in clients {
            if self.in_flight.contains(&client.id) {
                let missed = self.missed.entry(client.id).or_insert(0);
                *missed += 1;
                self.polls_skipped += 1;

                if *missed >= self.options.miss_warn_threshold {
                    warn!(
                        client = %client.address,
                        missed_cycles = *missed,
                        "poll still running, client keeps missing cycles"
                    );
                } else {
                    debug!(client = %client.address, "poll still running, skipping cycle");
                }
                continue;
            }

            self.missed.remove(&client.id);
            self.in_flight.insert(client.id);
            started += 1;

            let aggregator = Arc::clone(&self.aggregator);
            let limiter = Arc::clone(&self.limiter);
            let id = client.id;
            let task = self.tasks.spawn(async move {
                // Wait for a slot here so the scheduler loop never blocks
                let Ok(_permit) = limiter.acquire_owned().await else {
                    return id;
                };
                aggregator.poll_client(client).await;
                id
            });
            self.task_owners.insert(task.id(), id);
        }

        self.cycles_completed += 1;
        started
    }

    /// Clear the bookkeeping of one finished poll task.
    ///
    /// A task that panicked or was cancelled cannot report its client id,
    /// so `task_owners` recovers it from the task id. Without that the
    /// client would stay in `in_flight` forever and never be polled again.
    fn finish_poll(&mut self, result: Result<(TaskId, ClientId), JoinError>) {
        match result {
            Ok((task_id, client_id)) => {
                self.task_owners.remove(&task_id);
                self.in_flight.remove(&client_id);
            }
            Err(join_error) => {
                error!("poll task failed: {join_error}");
                if let Some(client_id) = self.task_owners.remove(&join_error.id()) {
                    self.in_flight.remove(&client_id);
                }
            }
        }
    }

    /// Wait for in-flight polls to finish, bounded by `limit` when given.
    async fn drain(&mut self, limit: Option<Duration>) {
        let deadline = limit.map(|limit| tokio::time::Instant::now() + limit);

        while !self.tasks.is_empty() {
            let result = match deadline {
                Some(deadline) => {
                    match tokio::time::timeout_at(deadline, self.tasks.join_next_with_id()).await {
                        Ok(result) => result,
                        Err(_) => {
                            warn!(
                                remaining = self.tasks.len(),
                                "shutdown grace elapsed, abandoning in-flight polls"
                            );
                            break;
                        }
                    }
                }
                None => self.tasks.join_next_with_id().await,
            };

            match result {
                Some(result) => self.finish_poll(result),
                None => break,
            }
        }
    }

    fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            cycles_completed: self.cycles_completed,
            polls_skipped: self.polls_skipped,
            polls_in_flight: self.in_flight.len(),
        }
    }
}

/// Handle for controlling a SchedulerActor
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Spawn a new scheduler actor
    pub fn spawn(
        registry: Arc<ClientRegistry>,
        aggregator: Arc<HealthAggregator>,
        options: SchedulerOptions,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = SchedulerActor::new(registry, aggregator, options, cmd_rx);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run a poll cycle immediately and wait for it to finish.
    ///
    /// Returns the number of polls the cycle started.
    pub async fn poll_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::PollNow { respond_to: tx })
            .await
            .context("failed to send PollNow command")?;
        rx.await.context("scheduler did not respond")
    }

    /// Get scheduler statistics.
    pub async fn stats(&self) -> Result<SchedulerStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;
        rx.await.context("scheduler did not respond")
    }

    /// Gracefully shut down the scheduler, waiting for in-flight polls up
    /// to the shutdown grace period.
    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::Shutdown { respond_to: tx })
            .await
            .context("failed to send Shutdown command")?;
        rx.await.context("scheduler did not respond")
    }
}
