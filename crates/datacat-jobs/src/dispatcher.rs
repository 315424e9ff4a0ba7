//! Single-consumer dispatch loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use datacat_core::{defaults, logging, Error, Job, JobStatus, JobType, Result};

use crate::handler::{JobContext, JobHandler, JobResult, ProgressSink};
use crate::queue::JobQueue;
use crate::registry::HandlerRegistry;

/// Configuration for the dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Sleep between polls of an empty queue, in milliseconds.
    pub poll_interval_ms: u64,
    /// Sleep after a failure in the loop's own bookkeeping, in milliseconds.
    pub error_backoff_ms: u64,
    /// Whether to run the loop at all.
    pub enabled: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::DISPATCH_POLL_INTERVAL_MS,
            error_backoff_ms: defaults::DISPATCH_ERROR_BACKOFF_MS,
            enabled: true,
        }
    }
}

impl DispatcherConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DISPATCHER_ENABLED` | `true` | Enable/disable job processing |
    /// | `DISPATCH_POLL_INTERVAL_MS` | `1000` | Polling interval when queue is empty |
    /// | `DISPATCH_ERROR_BACKOFF_MS` | `5000` | Pause after a loop error |
    pub fn from_env() -> Self {
        let enabled = std::env::var("DISPATCHER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let poll_interval_ms = std::env::var("DISPATCH_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::DISPATCH_POLL_INTERVAL_MS);

        let error_backoff_ms = std::env::var("DISPATCH_ERROR_BACKOFF_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::DISPATCH_ERROR_BACKOFF_MS);

        Self {
            poll_interval_ms,
            error_backoff_ms,
            enabled,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_error_backoff(mut self, ms: u64) -> Self {
        self.error_backoff_ms = ms;
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatcherEvent {
    /// A job was started.
    JobStarted { job_id: Uuid, job_type: JobType },
    /// Job progress was updated.
    JobProgress {
        job_id: Uuid,
        percent: i32,
        message: Option<String>,
    },
    /// A job completed successfully.
    JobCompleted { job_id: Uuid, job_type: JobType },
    /// A job failed.
    JobFailed {
        job_id: Uuid,
        job_type: JobType,
        error: String,
    },
    DispatcherStarted,
    DispatcherStopped,
}

/// What a single dispatch step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The queue was empty.
    Idle,
    /// A popped id was missing or no longer PENDING.
    Skipped(Uuid),
    Completed(Uuid),
    Failed(Uuid),
}

/// Handle for controlling a running dispatcher.
///
/// Dropping the handle also stops the loop at its next idle pause.
pub struct DispatcherHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<DispatcherEvent>,
    task: JoinHandle<()>,
}

impl DispatcherHandle {
    /// Signal the loop to stop and wait for the in-flight job to finish.
    pub async fn shutdown(self) -> Result<()> {
        // The loop may already have exited (disabled dispatcher).
        let _ = self.shutdown_tx.send(()).await;
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Dispatcher task failed: {}", e)))
    }

    /// Get a receiver for dispatcher events.
    pub fn events(&self) -> broadcast::Receiver<DispatcherEvent> {
        self.event_rx.resubscribe()
    }
}

/// Pulls the highest-priority job and drives it to a terminal state.
///
/// At most one handler runs at a time. Exactly one dispatcher should consume
/// a given store.
pub struct Dispatcher {
    queue: JobQueue,
    registry: HandlerRegistry,
    config: DispatcherConfig,
    event_tx: broadcast::Sender<DispatcherEvent>,
}

impl Dispatcher {
    pub fn new(queue: JobQueue, registry: HandlerRegistry, config: DispatcherConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            queue,
            registry,
            config,
            event_tx,
        }
    }

    /// Register a handler for a job type.
    pub async fn register_handler<H: JobHandler + 'static>(&self, handler: H) {
        self.registry.register(handler).await;
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Get a receiver for dispatcher events.
    pub fn events(&self) -> broadcast::Receiver<DispatcherEvent> {
        self.event_tx.subscribe()
    }

    /// Start the loop and return a handle for control.
    pub fn start(self) -> DispatcherHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let dispatcher = Arc::new(self);
        let task = tokio::spawn(async move {
            dispatcher.run(&mut shutdown_rx).await;
        });

        DispatcherHandle {
            shutdown_tx,
            event_rx,
            task,
        }
    }

    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!(
                subsystem = logging::SUBSYSTEM_JOBS,
                component = logging::COMPONENT_DISPATCHER,
                "Dispatcher is disabled, not starting"
            );
            return;
        }

        info!(
            subsystem = logging::SUBSYSTEM_JOBS,
            component = logging::COMPONENT_DISPATCHER,
            poll_interval_ms = self.config.poll_interval_ms,
            error_backoff_ms = self.config.error_backoff_ms,
            "Dispatcher started"
        );
        let _ = self.event_tx.send(DispatcherEvent::DispatcherStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let error_backoff = Duration::from_millis(self.config.error_backoff_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!(
                    subsystem = logging::SUBSYSTEM_JOBS,
                    component = logging::COMPONENT_DISPATCHER,
                    "Dispatcher received shutdown signal"
                );
                break;
            }

            let pause = match self.dispatch_next().await {
                Ok(DispatchOutcome::Idle) => Some(poll_interval),
                Ok(_) => None,
                Err(e) => {
                    error!(
                        subsystem = logging::SUBSYSTEM_JOBS,
                        component = logging::COMPONENT_DISPATCHER,
                        error = %e,
                        backoff_ms = self.config.error_backoff_ms,
                        "Dispatch loop error"
                    );
                    Some(error_backoff)
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(
                            subsystem = logging::SUBSYSTEM_JOBS,
                            component = logging::COMPONENT_DISPATCHER,
                            "Dispatcher received shutdown signal"
                        );
                        break;
                    }
                    _ = sleep(pause) => {}
                }
            }
        }

        let _ = self.event_tx.send(DispatcherEvent::DispatcherStopped);
        info!(
            subsystem = logging::SUBSYSTEM_JOBS,
            component = logging::COMPONENT_DISPATCHER,
            "Dispatcher stopped"
        );
    }

    /// Claim and process the highest-priority job, if any.
    ///
    /// Handler failures are recorded on the job and reported as
    /// [`DispatchOutcome::Failed`]. An `Err` means the store itself failed.
    pub async fn dispatch_next(&self) -> Result<DispatchOutcome> {
        let Some(job_id) = self.queue.claim_next().await? else {
            return Ok(DispatchOutcome::Idle);
        };

        let job = match self.queue.get_status(job_id).await? {
            Some(job) if job.status == JobStatus::Pending => job,
            Some(job) => {
                warn!(
                    subsystem = logging::SUBSYSTEM_JOBS,
                    component = logging::COMPONENT_DISPATCHER,
                    job_id = %job_id,
                    status = %job.status,
                    "Skipping job that is no longer pending"
                );
                return Ok(DispatchOutcome::Skipped(job_id));
            }
            None => {
                warn!(
                    subsystem = logging::SUBSYSTEM_JOBS,
                    component = logging::COMPONENT_DISPATCHER,
                    job_id = %job_id,
                    "Skipping queued id with no job record"
                );
                return Ok(DispatchOutcome::Skipped(job_id));
            }
        };

        self.queue.mark_running(job_id).await?;
        self.execute_job(job).await
    }

    async fn execute_job(&self, job: Job) -> Result<DispatchOutcome> {
        let start = Instant::now();
        let job_id = job.id;
        let job_type = job.job_type.clone();

        info!(
            subsystem = logging::SUBSYSTEM_JOBS,
            component = logging::COMPONENT_DISPATCHER,
            job_id = %job_id,
            job_type = %job_type,
            "Processing job"
        );
        let _ = self.event_tx.send(DispatcherEvent::JobStarted {
            job_id,
            job_type: job_type.clone(),
        });

        let result = match self.registry.resolve(&job_type).await {
            Ok(handler) => {
                let sink = Arc::new(DispatchProgress {
                    queue: self.queue.clone(),
                    event_tx: self.event_tx.clone(),
                });
                let ctx = JobContext::new(job).with_progress_sink(sink);

                // A panicking handler must not take the loop down with it.
                match tokio::spawn(async move { handler.execute(ctx).await }).await {
                    Ok(result) => result,
                    Err(e) => join_failure(e),
                }
            }
            Err(e) => {
                warn!(
                    subsystem = logging::SUBSYSTEM_JOBS,
                    component = logging::COMPONENT_DISPATCHER,
                    job_id = %job_id,
                    job_type = %job_type,
                    "No handler registered for job type"
                );
                let registered: Vec<String> = self
                    .registry
                    .job_types()
                    .await
                    .iter()
                    .map(|t| t.as_str().to_string())
                    .collect();
                JobResult::failed(
                    e.to_string(),
                    format!("{:?}\nregistered job types: [{}]", e, registered.join(", ")),
                )
            }
        };

        match result {
            JobResult::Success(result_data) => {
                self.queue.mark_completed(job_id, result_data).await?;
                info!(
                    subsystem = logging::SUBSYSTEM_JOBS,
                    component = logging::COMPONENT_DISPATCHER,
                    job_id = %job_id,
                    job_type = %job_type,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job completed successfully"
                );
                let _ = self
                    .event_tx
                    .send(DispatcherEvent::JobCompleted { job_id, job_type });
                Ok(DispatchOutcome::Completed(job_id))
            }
            JobResult::Failed { error, trace } => {
                self.queue.mark_failed(job_id, &error, trace).await?;
                warn!(
                    subsystem = logging::SUBSYSTEM_JOBS,
                    component = logging::COMPONENT_DISPATCHER,
                    job_id = %job_id,
                    job_type = %job_type,
                    %error,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Job failed"
                );
                let _ = self.event_tx.send(DispatcherEvent::JobFailed {
                    job_id,
                    job_type,
                    error,
                });
                Ok(DispatchOutcome::Failed(job_id))
            }
        }
    }
}

/// Failure for a handler task that panicked or was aborted.
fn join_failure(err: JoinError) -> JobResult {
    let error = format!("Handler panicked: {}", err);
    let mut trace = format!("{:?}", err);
    if err.is_panic() {
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned());
        if let Some(message) = message {
            trace.push_str("\npanic payload: ");
            trace.push_str(&message);
        }
    }
    JobResult::failed(error, trace)
}

/// Writes handler progress to the job store and mirrors it on the event bus.
struct DispatchProgress {
    queue: JobQueue,
    event_tx: broadcast::Sender<DispatcherEvent>,
}

#[async_trait]
impl ProgressSink for DispatchProgress {
    async fn report(&self, job_id: Uuid, percent: i32, message: Option<String>) {
        if let Err(e) = self
            .queue
            .update_progress(job_id, percent, message.as_deref())
            .await
        {
            warn!(
                subsystem = logging::SUBSYSTEM_JOBS,
                component = logging::COMPONENT_DISPATCHER,
                job_id = %job_id,
                error = %e,
                "Failed to record job progress"
            );
            return;
        }
        debug!(
            subsystem = logging::SUBSYSTEM_JOBS,
            component = logging::COMPONENT_DISPATCHER,
            job_id = %job_id,
            percent,
            "Job progress"
        );
        let _ = self.event_tx.send(DispatcherEvent::JobProgress {
            job_id,
            percent,
            message,
        });
    }
}

/// Builder for creating a dispatcher with handlers.
pub struct DispatcherBuilder {
    queue: JobQueue,
    registry: HandlerRegistry,
    config: DispatcherConfig,
    handlers: Vec<Arc<dyn JobHandler>>,
}

impl DispatcherBuilder {
    pub fn new(queue: JobQueue) -> Self {
        Self {
            queue,
            registry: HandlerRegistry::new(),
            config: DispatcherConfig::default(),
            handlers: Vec::new(),
        }
    }

    /// Set the dispatcher configuration.
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing registry instead of a fresh one.
    pub fn with_registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Add a handler.
    pub fn with_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Build and return the dispatcher.
    pub async fn build(self) -> Dispatcher {
        for handler in self.handlers {
            self.registry.register_arc(handler).await;
        }
        Dispatcher::new(self.queue, self.registry, self.config)
    }
}
