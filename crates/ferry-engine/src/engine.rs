//! The dispatch engine's scheduling loop.
//!
//! A single engine instance owns the health gate, the poller, the in-flight
//! registry, and the shutdown controller, and composes them into a
//! level-triggered loop: poll when there is admission room, spawn one
//! dispatch task per admitted message, and wake on every slot release. The
//! loop is bounded purely by the concurrency ceiling; the queue's long-poll
//! window does the waiting when the queue is empty.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use ferry_core::{Clock, Message};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    client::{ClientConfig, WorkerClient},
    dispatcher::{DispatchConfig, DispatchOutcome, Dispatcher},
    error::{EngineError, Result},
    health::HealthGate,
    poller::Poller,
    queue::QueueSource,
    registry::InFlightRegistry,
    shutdown::ShutdownController,
};

/// How the engine runs once started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    /// One poll-and-drain cycle, then a natural exit.
    SingleBatch,
    /// Poll until externally cancelled or the error budget trips.
    Continuous,
}

/// Configuration for the dispatch engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker webhook URL messages are POSTed to.
    pub webhook_url: String,

    /// Queue name, forwarded as the `X-Queue-Name` header.
    pub queue_name: String,

    /// Content type for forwarded bodies.
    pub content_type: String,

    /// User agent for all worker requests.
    pub user_agent: String,

    /// Concurrency ceiling; also the upper bound on any single poll.
    pub max_in_flight: usize,

    /// Per-delivery timeout. Zero means no timeout is enforced.
    pub delivery_timeout: Duration,

    /// Single-batch or continuous operation.
    pub run_mode: RunMode,

    /// Minimum delay after an empty poll in continuous mode. Zero disables
    /// the throttle.
    pub idle_backoff: Duration,

    /// Worker health URL. When absent the health gate passes immediately.
    pub health_url: Option<String>,

    /// How long to wait for the worker to become healthy.
    pub health_wait: Duration,

    /// Error budget before draining (0 = unlimited).
    pub max_errors: u32,
}

/// Live counters shared between the loop and its dispatch tasks.
#[derive(Debug, Default)]
pub struct EngineStats {
    polls: AtomicU64,
    received: AtomicU64,
    acknowledged: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

impl EngineStats {
    /// Polls issued since startup.
    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Acquire)
    }

    /// Messages received from the queue.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Acquire)
    }

    /// Messages delivered and deleted from the queue.
    pub fn acknowledged(&self) -> u64 {
        self.acknowledged.load(Ordering::Acquire)
    }

    /// Deliveries the worker answered with a non-2xx status.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Acquire)
    }

    /// Deliveries that failed before a worker verdict landed.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }
}

/// Summary of an engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineReport {
    /// Polls issued.
    pub polls: u64,
    /// Messages received.
    pub received: u64,
    /// Messages delivered and acknowledged.
    pub acknowledged: u64,
    /// Worker rejections (non-2xx).
    pub rejected: u64,
    /// Failed delivery or acknowledgement attempts.
    pub failed: u64,
    /// Failures counted against the error budget.
    pub errors: u32,
}

/// Bridges the queue to the worker until done, cancelled, or out of budget.
pub struct Engine {
    config: EngineConfig,
    poller: Poller,
    dispatcher: Arc<Dispatcher>,
    registry: Arc<InFlightRegistry>,
    health: HealthGate,
    controller: Arc<ShutdownController>,
    stats: Arc<EngineStats>,
    cancel: CancellationToken,
    clock: Arc<dyn Clock>,
}

impl Engine {
    /// Creates an engine over the given queue.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Configuration` for an empty webhook URL, a zero
    /// concurrency ceiling, or an HTTP client that cannot be built.
    pub fn new(
        queue: Arc<dyn QueueSource>,
        config: EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if config.webhook_url.is_empty() {
            return Err(EngineError::configuration("webhook URL is required"));
        }
        if config.max_in_flight == 0 {
            return Err(EngineError::configuration(
                "max_in_flight must be greater than 0",
            ));
        }

        let client = WorkerClient::new(ClientConfig {
            user_agent: config.user_agent.clone(),
            timeout: config.delivery_timeout,
        })?;

        let dispatcher = Arc::new(Dispatcher::new(
            client.clone(),
            Arc::clone(&queue),
            DispatchConfig {
                webhook_url: config.webhook_url.clone(),
                queue_name: config.queue_name.clone(),
                content_type: config.content_type.clone(),
            },
        ));

        let health = HealthGate::new(
            client,
            config.health_url.clone(),
            config.health_wait,
            Arc::clone(&clock),
        );

        Ok(Self {
            poller: Poller::new(queue),
            dispatcher,
            registry: Arc::new(InFlightRegistry::new(config.max_in_flight)),
            health,
            controller: Arc::new(ShutdownController::new(config.max_errors)),
            stats: Arc::new(EngineStats::default()),
            cancel: CancellationToken::new(),
            clock,
            config,
        })
    }

    /// Token that stops new polls when cancelled.
    ///
    /// Cancellation does not abort in-flight deliveries; they run to their
    /// own timeout and are drained before `run` returns.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Live engine counters.
    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    /// Runs the engine to completion.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::HealthCheck` if the worker never becomes
    /// healthy, `EngineError::Queue` if a receive fails, and
    /// `EngineError::ErrorBudgetExceeded` when the budget trips in
    /// continuous mode.
    pub async fn run(mut self) -> Result<EngineReport> {
        if !self.health.check().await {
            return Err(EngineError::health_check(self.config.health_wait));
        }

        match self.config.run_mode {
            RunMode::SingleBatch => self.run_once().await,
            RunMode::Continuous => self.run_continuous().await,
        }
    }

    /// One poll-and-drain cycle. The error budget plays no part here.
    async fn run_once(&mut self) -> Result<EngineReport> {
        let batch = self.poller.poll(self.config.max_in_flight).await?;
        self.stats.polls.fetch_add(1, Ordering::AcqRel);
        self.spawn_batch(batch);

        debug!(in_flight = self.registry.in_flight(), "waiting for dispatches to settle");
        self.registry.drained().await;
        self.controller.mark_stopped();

        let report = self.report();
        info!(
            received = report.received,
            acknowledged = report.acknowledged,
            failed = report.failed + report.rejected,
            "single batch complete"
        );
        Ok(report)
    }

    /// The self-sustaining loop: poll, dispatch, and wake on every release.
    async fn run_continuous(&mut self) -> Result<EngineReport> {
        loop {
            if self.controller.is_draining() {
                break;
            }
            if self.cancel.is_cancelled() {
                info!("shutdown requested, no further polls will be issued");
                break;
            }

            let room = self.registry.room();
            if room == 0 {
                // Ceiling reached; a slot release or a shutdown request
                // re-triggers the tick.
                tokio::select! {
                    () = self.registry.released() => {},
                    () = self.cancel.cancelled() => {},
                }
                continue;
            }

            let batch = self.poller.poll(room).await?;
            self.stats.polls.fetch_add(1, Ordering::AcqRel);
            let received = batch.len();
            self.spawn_batch(batch);

            if received == 0 && !self.config.idle_backoff.is_zero() {
                tokio::select! {
                    () = self.clock.sleep(self.config.idle_backoff) => {},
                    () = self.cancel.cancelled() => {},
                }
            }
        }

        info!(
            in_flight = self.registry.in_flight(),
            "draining in-flight deliveries"
        );
        self.registry.drained().await;
        self.controller.mark_stopped();

        let report = self.report();
        if self.controller.budget_exceeded() {
            return Err(EngineError::budget_exceeded(
                report.errors,
                self.config.max_errors,
            ));
        }

        info!(
            polls = report.polls,
            received = report.received,
            acknowledged = report.acknowledged,
            errors = report.errors,
            "engine stopped"
        );
        Ok(report)
    }

    /// Admits each message and starts a non-blocking dispatch for it.
    fn spawn_batch(&self, batch: Vec<Message>) {
        for message in batch {
            self.stats.received.fetch_add(1, Ordering::AcqRel);

            // A poll that was already in flight when the budget tripped may
            // still return messages; while draining they are left for the
            // queue to redeliver. Single-batch mode always finishes its one
            // cycle regardless of the budget.
            if self.config.run_mode == RunMode::Continuous && self.controller.is_draining() {
                debug!(message_id = %message.id, "draining, leaving message for redelivery");
                continue;
            }

            let Some(guard) = self.registry.admit(&message.id) else {
                continue;
            };

            let dispatcher = Arc::clone(&self.dispatcher);
            let controller = Arc::clone(&self.controller);
            let stats = Arc::clone(&self.stats);

            tokio::spawn(async move {
                let outcome = dispatcher.dispatch(message).await;
                match outcome {
                    DispatchOutcome::Acknowledged { .. } => {
                        stats.acknowledged.fetch_add(1, Ordering::AcqRel);
                    },
                    DispatchOutcome::Rejected { .. } => {
                        stats.rejected.fetch_add(1, Ordering::AcqRel);
                        controller.record_failure();
                    },
                    DispatchOutcome::Failed => {
                        stats.failed.fetch_add(1, Ordering::AcqRel);
                        controller.record_failure();
                    },
                }
                // The guard release is the loop's wake-up signal; failure
                // accounting has to land before it fires.
                drop(guard);
            });
        }
    }

    fn report(&self) -> EngineReport {
        EngineReport {
            polls: self.stats.polls(),
            received: self.stats.received(),
            acknowledged: self.stats.acknowledged(),
            rejected: self.stats.rejected(),
            failed: self.stats.failed(),
            errors: self.controller.error_count(),
        }
    }
}
