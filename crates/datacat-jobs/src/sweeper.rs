//! Periodic deletion of old terminal jobs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use datacat_core::{defaults, logging, Error, Job, JobStore, Result};

/// Configuration for the retention sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// Seconds between sweeps.
    pub interval_secs: u64,
    /// Terminal jobs completed longer ago than this are deleted.
    pub max_age_hours: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::JOB_SWEEP_INTERVAL_SECS,
            max_age_hours: defaults::JOB_RETENTION_HOURS,
        }
    }
}

impl SweeperConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_SWEEP_INTERVAL_SECS` | `3600` | Seconds between sweeps |
    /// | `JOB_RETENTION_HOURS` | `24` | Age after which terminal jobs are deleted |
    pub fn from_env() -> Self {
        let interval_secs = std::env::var("JOB_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_SWEEP_INTERVAL_SECS)
            .max(1);

        let max_age_hours = std::env::var("JOB_RETENTION_HOURS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(defaults::JOB_RETENTION_HOURS);

        Self {
            interval_secs,
            max_age_hours,
        }
    }

    pub fn with_interval(mut self, secs: u64) -> Self {
        self.interval_secs = secs.max(1);
        self
    }

    pub fn with_max_age_hours(mut self, hours: i64) -> Self {
        self.max_age_hours = hours;
        self
    }
}

/// Handle for a running sweeper.
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(()).await;
        self.task
            .await
            .map_err(|e| Error::Internal(format!("Sweeper task failed: {}", e)))
    }
}

/// Deletes terminal jobs whose `completed_at` is older than the retention
/// window. Jobs without a completion time are never deleted.
#[derive(Clone)]
pub struct RetentionSweeper {
    store: Arc<dyn JobStore>,
    config: SweeperConfig,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn JobStore>, config: SweeperConfig) -> Self {
        Self { store, config }
    }

    /// Run one sweep against the current time.
    pub async fn sweep(&self) -> Result<usize> {
        self.sweep_at(Utc::now()).await
    }

    /// Run one sweep as if the current time were `now`. Returns the number of
    /// deleted jobs.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - chrono::Duration::hours(self.config.max_age_hours);
        let ids = self.store.list_ids().await?;
        let scanned = ids.len();

        let mut deleted = 0;
        let mut unreadable = 0;
        for id in ids {
            let job = match self.store.get(id).await {
                Ok(Some(job)) => job,
                Ok(None) => continue,
                Err(e) => {
                    warn!(
                        subsystem = logging::SUBSYSTEM_JOBS,
                        component = logging::COMPONENT_SWEEPER,
                        job_id = %id,
                        error = %e,
                        "Skipping unreadable job record"
                    );
                    unreadable += 1;
                    continue;
                }
            };
            if is_eligible(&job, cutoff) && self.store.delete(id).await? {
                debug!(
                    subsystem = logging::SUBSYSTEM_JOBS,
                    component = logging::COMPONENT_SWEEPER,
                    job_id = %id,
                    status = %job.status,
                    "Deleted expired job"
                );
                deleted += 1;
            }
        }

        info!(
            subsystem = logging::SUBSYSTEM_JOBS,
            component = logging::COMPONENT_SWEEPER,
            op = "sweep",
            scanned,
            deleted,
            unreadable,
            max_age_hours = self.config.max_age_hours,
            "Retention sweep finished"
        );
        Ok(deleted)
    }

    /// Sweep every `interval_secs` until shut down. The first sweep runs
    /// immediately.
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let task = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(self.config.interval_secs));
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = interval.tick() => {
                        if let Err(e) = self.sweep().await {
                            error!(
                                subsystem = logging::SUBSYSTEM_JOBS,
                                component = logging::COMPONENT_SWEEPER,
                                error = %e,
                                "Retention sweep failed"
                            );
                        }
                    }
                }
            }
            info!(
                subsystem = logging::SUBSYSTEM_JOBS,
                component = logging::COMPONENT_SWEEPER,
                "Retention sweeper stopped"
            );
        });
        SweeperHandle { shutdown_tx, task }
    }
}

/// Terminal, and completed strictly before `cutoff`.
pub fn is_eligible(job: &Job, cutoff: DateTime<Utc>) -> bool {
    job.status.is_terminal() && job.completed_at.is_some_and(|at| at < cutoff)
}
