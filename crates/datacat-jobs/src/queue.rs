//! Job submission and lifecycle operations over a [`JobStore`].

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};
use uuid::Uuid;

use datacat_core::{
    logging, Error, Job, JobPatch, JobStatus, JobStore, JobType, QueueStats, Result, StatusCounts,
};

/// Producer-side view of the job store and priority queue.
///
/// Cheap to clone; every clone shares the same store.
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Access the underlying store.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Create a PENDING job and enqueue it under `priority`.
    ///
    /// Fails with [`Error::Submission`] when the store is unavailable; the job
    /// is not created in that case.
    pub async fn submit(&self, job_type: JobType, payload: JsonValue, priority: i32) -> Result<Uuid> {
        let job = Job::new(job_type, payload, priority);
        self.store
            .create(&job)
            .await
            .map_err(|e| Error::Submission(e.to_string()))?;

        info!(
            subsystem = logging::SUBSYSTEM_JOBS,
            component = logging::COMPONENT_QUEUE,
            op = "submit",
            job_id = %job.id,
            job_type = %job.job_type,
            priority,
            "Job submitted"
        );
        Ok(job.id)
    }

    pub async fn get_status(&self, job_id: Uuid) -> Result<Option<Job>> {
        self.store.get(job_id).await
    }

    /// Cancel a job.
    ///
    /// A PENDING job is marked CANCELLED and removed from the queue. A RUNNING
    /// job is only marked; its handler keeps running and its terminal write
    /// replaces the marker. Returns `false` for missing or terminal jobs.
    pub async fn cancel(&self, job_id: Uuid) -> Result<bool> {
        let Some(job) = self.store.get(job_id).await? else {
            return Ok(false);
        };
        if job.status.is_terminal() {
            debug!(
                subsystem = logging::SUBSYSTEM_JOBS,
                component = logging::COMPONENT_QUEUE,
                job_id = %job_id,
                status = %job.status,
                "Cancel ignored for terminal job"
            );
            return Ok(false);
        }

        self.store
            .update(job_id, &JobPatch::cancelled(Utc::now()))
            .await?;
        if job.status == JobStatus::Pending {
            self.store.dequeue(job_id).await?;
        } else {
            warn!(
                subsystem = logging::SUBSYSTEM_JOBS,
                component = logging::COMPONENT_QUEUE,
                job_id = %job_id,
                "Cancelled running job; handler will not be interrupted"
            );
        }

        info!(
            subsystem = logging::SUBSYSTEM_JOBS,
            component = logging::COMPONENT_QUEUE,
            op = "cancel",
            job_id = %job_id,
            previous_status = %job.status,
            "Job cancelled"
        );
        Ok(true)
    }

    /// Record handler progress. `percent` is clamped to `0..=100`.
    pub async fn update_progress(
        &self,
        job_id: Uuid,
        percent: i32,
        message: Option<&str>,
    ) -> Result<()> {
        if !self.store.exists(job_id).await? {
            return Err(Error::JobNotFound(job_id));
        }
        let patch = JobPatch::progress(percent.clamp(0, 100), message.map(String::from));
        self.store.update(job_id, &patch).await
    }

    /// Queue length, per-status counts and total number of job records.
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        let queue_length = self.store.queue_len().await?;
        let ids = self.store.list_ids().await?;

        let mut status_counts = StatusCounts::default();
        for id in &ids {
            // Records can vanish between the scan and the read.
            match self.store.get(*id).await {
                Ok(Some(job)) => status_counts.increment(job.status),
                Ok(None) => {}
                Err(e) => warn!(
                    subsystem = logging::SUBSYSTEM_JOBS,
                    component = logging::COMPONENT_QUEUE,
                    job_id = %id,
                    error = %e,
                    "Skipping unreadable job record in stats"
                ),
            }
        }

        Ok(QueueStats {
            queue_length,
            status_counts,
            total_jobs: ids.len() as i64,
        })
    }

    /// Delete a job record and its queue entry.
    pub async fn delete(&self, job_id: Uuid) -> Result<bool> {
        self.store.delete(job_id).await
    }

    // -------------------------------------------------------------------------
    // Consumer-side transitions used by the dispatcher
    // -------------------------------------------------------------------------

    pub(crate) async fn claim_next(&self) -> Result<Option<Uuid>> {
        self.store.pop_highest().await
    }

    pub(crate) async fn mark_running(&self, job_id: Uuid) -> Result<()> {
        self.store
            .update(job_id, &JobPatch::running(Utc::now()))
            .await
    }

    pub(crate) async fn mark_completed(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()> {
        self.store
            .update(job_id, &JobPatch::completed(Utc::now(), result))
            .await
    }

    pub(crate) async fn mark_failed(
        &self,
        job_id: Uuid,
        error: &str,
        trace: Option<String>,
    ) -> Result<()> {
        self.store
            .update(job_id, &JobPatch::failed(Utc::now(), error, trace))
            .await
    }
}
