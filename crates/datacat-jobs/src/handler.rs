//! Job handler contract.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use datacat_core::{Job, JobType, Result};

/// Receives progress reports from a running handler.
///
/// Reports are best-effort: a sink that fails to record one must not fail
/// the job.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, job_id: Uuid, percent: i32, message: Option<String>);
}

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job: Job) -> Self {
        Self {
            job,
            progress: None,
        }
    }

    /// Set the progress sink.
    pub fn with_progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Report progress to the sink, if any.
    pub async fn report_progress(&self, percent: i32, message: Option<&str>) {
        if let Some(sink) = &self.progress {
            sink.report(self.job.id, percent, message.map(String::from))
                .await;
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job.id
    }

    /// Get the job payload.
    pub fn payload(&self) -> &JsonValue {
        &self.job.payload
    }

    /// Deserialize the payload into a handler-specific type.
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.job.payload.clone())?)
    }
}

/// Result of job execution.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResult {
    /// Job completed successfully with optional result data.
    Success(Option<JsonValue>),
    /// Job failed with a message and a diagnostic trace.
    Failed { error: String, trace: Option<String> },
}

impl JobResult {
    pub fn failed(error: impl Into<String>, trace: impl Into<String>) -> Self {
        JobResult::Failed {
            error: error.into(),
            trace: Some(trace.into()),
        }
    }

    /// Failure carrying the error's cause chain as message and its debug
    /// rendering as trace.
    pub fn from_error(err: &anyhow::Error) -> Self {
        JobResult::Failed {
            error: format!("{:#}", err),
            trace: Some(format!("{:?}", err)),
        }
    }

    /// Success carrying `value` as the job result.
    pub fn from_serializable<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => JobResult::Success(Some(json)),
            Err(e) => JobResult::from_error(
                &anyhow::Error::new(e).context("Failed to serialize job result"),
            ),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success(_))
    }
}

impl<T: Serialize> From<anyhow::Result<T>> for JobResult {
    fn from(result: anyhow::Result<T>) -> Self {
        match result {
            Ok(value) => JobResult::from_serializable(&value),
            Err(e) => JobResult::from_error(&e),
        }
    }
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;

    /// Check if this handler can process the given job type.
    fn can_handle(&self, job_type: &JobType) -> bool {
        self.job_type() == *job_type
    }
}

/// No-op handler for testing.
pub struct NoOpHandler {
    job_type: JobType,
}

impl NoOpHandler {
    /// Create a new no-op handler for the given job type.
    pub fn new(job_type: JobType) -> Self {
        Self { job_type }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn job_type(&self) -> JobType {
        self.job_type.clone()
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        ctx.report_progress(50, Some("Processing...")).await;
        ctx.report_progress(100, Some("Done")).await;
        JobResult::Success(None)
    }
}
