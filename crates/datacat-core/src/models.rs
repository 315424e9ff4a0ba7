//! Data models for the job engine and the metadata catalog.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Error;

// =============================================================================
// JOB TYPES
// =============================================================================

/// Lifecycle status of a job.
///
/// `PENDING -> RUNNING -> {COMPLETED | FAILED}`, with `CANCELLED` reachable
/// from `PENDING` and (advisory only) from `RUNNING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Completed, failed and cancelled jobs are never picked up again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the lifecycle permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(Error::InvalidInput(format!("unknown job status: {}", other))),
        }
    }
}

/// Kind of work a job performs; selects the handler that runs it.
///
/// Unknown tags survive a round trip through the store as [`JobType::Custom`]
/// so that a job submitted by a newer producer still fails cleanly with
/// "no handler" instead of being unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    /// Profile an uploaded local file
    ProcessDataset,
    /// Download a file from a URL and profile it
    ProcessDatasetUrl,
    /// Any other tag
    Custom(String),
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            JobType::ProcessDataset => "process_dataset",
            JobType::ProcessDatasetUrl => "process_dataset_url",
            JobType::Custom(tag) => tag.as_str(),
        }
    }

    pub fn custom(tag: impl Into<String>) -> Self {
        JobType::from(tag.into())
    }
}

impl From<String> for JobType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "process_dataset" => JobType::ProcessDataset,
            "process_dataset_url" => JobType::ProcessDatasetUrl,
            _ => JobType::Custom(tag),
        }
    }
}

impl From<&str> for JobType {
    fn from(tag: &str) -> Self {
        JobType::from(tag.to_string())
    }
}

impl From<JobType> for String {
    fn from(job_type: JobType) -> Self {
        match job_type {
            JobType::Custom(tag) => tag,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job record as held by the job store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub payload: JsonValue,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
    pub error_trace: Option<String>,
    pub progress_percent: i32,
    pub progress_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A fresh pending job with a time-ordered id.
    pub fn new(job_type: JobType, payload: JsonValue, priority: i32) -> Self {
        Self {
            id: Uuid::now_v7(),
            job_type,
            status: JobStatus::Pending,
            priority,
            payload,
            result: None,
            error_message: None,
            error_trace: None,
            progress_percent: 0,
            progress_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Overwrite the fields named by `patch`.
    pub fn apply(&mut self, patch: &JobPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(result) = &patch.result {
            self.result = Some(result.clone());
        }
        if let Some(error) = &patch.error_message {
            self.error_message = Some(error.clone());
        }
        if let Some(trace) = &patch.error_trace {
            self.error_trace = Some(trace.clone());
        }
        if let Some(percent) = patch.progress_percent {
            self.progress_percent = percent;
        }
        if let Some(message) = &patch.progress_message {
            self.progress_message = Some(message.clone());
        }
        if let Some(at) = patch.started_at {
            self.started_at = Some(at);
        }
        if let Some(at) = patch.completed_at {
            self.completed_at = Some(at);
        }
    }
}

/// Partial update to a job record. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
    pub error_trace: Option<String>,
    pub progress_percent: Option<i32>,
    pub progress_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobPatch {
    pub fn running(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Running),
            started_at: Some(at),
            ..Default::default()
        }
    }

    pub fn completed(at: DateTime<Utc>, result: Option<JsonValue>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            result,
            progress_percent: Some(100),
            completed_at: Some(at),
            ..Default::default()
        }
    }

    pub fn failed(at: DateTime<Utc>, error: impl Into<String>, trace: Option<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error_message: Some(error.into()),
            error_trace: trace,
            completed_at: Some(at),
            ..Default::default()
        }
    }

    pub fn cancelled(at: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Cancelled),
            completed_at: Some(at),
            ..Default::default()
        }
    }

    pub fn progress(percent: i32, message: Option<String>) -> Self {
        Self {
            progress_percent: Some(percent),
            progress_message: message,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == JobPatch::default()
    }
}

/// Per-status job counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl StatusCounts {
    pub fn increment(&mut self, status: JobStatus) {
        *self.slot(status) += 1;
    }

    pub fn get(&self, status: JobStatus) -> i64 {
        match status {
            JobStatus::Pending => self.pending,
            JobStatus::Running => self.running,
            JobStatus::Completed => self.completed,
            JobStatus::Failed => self.failed,
            JobStatus::Cancelled => self.cancelled,
        }
    }

    fn slot(&mut self, status: JobStatus) -> &mut i64 {
        match status {
            JobStatus::Pending => &mut self.pending,
            JobStatus::Running => &mut self.running,
            JobStatus::Completed => &mut self.completed,
            JobStatus::Failed => &mut self.failed,
            JobStatus::Cancelled => &mut self.cancelled,
        }
    }
}

/// Queue statistics summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs currently waiting in the priority queue
    pub queue_length: i64,
    pub status_counts: StatusCounts,
    /// Job records present in the store
    pub total_jobs: i64,
}

// =============================================================================
// CATALOG TYPES
// =============================================================================

/// Kind of relation described by a catalog entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    #[default]
    Table,
    View,
    MaterializedView,
    ExternalTable,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Table => "table",
            TableKind::View => "view",
            TableKind::MaterializedView => "materialized_view",
            TableKind::ExternalTable => "external_table",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TableKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "table" => Ok(TableKind::Table),
            "view" => Ok(TableKind::View),
            "materialized_view" => Ok(TableKind::MaterializedView),
            "external_table" => Ok(TableKind::ExternalTable),
            other => Err(Error::InvalidInput(format!("unknown table kind: {}", other))),
        }
    }
}

/// Inferred semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Datetime,
    Json,
    Array,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Datetime => "datetime",
            ColumnType::Json => "json",
            ColumnType::Array => "array",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(ColumnType::String),
            "integer" => Ok(ColumnType::Integer),
            "float" => Ok(ColumnType::Float),
            "boolean" => Ok(ColumnType::Boolean),
            "datetime" => Ok(ColumnType::Datetime),
            "json" => Ok(ColumnType::Json),
            "array" => Ok(ColumnType::Array),
            other => Err(Error::InvalidInput(format!("unknown column type: {}", other))),
        }
    }
}

/// Stored catalog entry for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub id: Uuid,
    pub schema_name: String,
    pub table_name: String,
    pub table_kind: TableKind,
    pub description: Option<String>,
    pub row_count: i64,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_analyzed: Option<DateTime<Utc>>,
}

/// Stored catalog entry for one column of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub id: Uuid,
    pub table_id: Uuid,
    pub column_name: String,
    /// 1-based position in the source dataset
    pub ordinal_position: i32,
    pub column_type: ColumnType,
    pub is_nullable: bool,
    pub null_count: i64,
    pub unique_count: i64,
    pub min_value: Option<String>,
    pub max_value: Option<String>,
    pub avg_value: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Statistics computed for a single column by the profiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub column_name: String,
    pub ordinal_position: i32,
    pub column_type: ColumnType,
    pub is_nullable: bool,
    pub null_count: i64,
    pub unique_count: i64,
    pub min_value: Option<String>,
    pub max_value: Option<String>,
    pub avg_value: Option<f64>,
}

/// Table-level profile plus its column profiles, ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableProfile {
    pub schema_name: String,
    pub table_name: String,
    pub table_kind: TableKind,
    pub row_count: i64,
    pub size_bytes: i64,
    pub last_analyzed: DateTime<Utc>,
    pub columns: Vec<ColumnProfile>,
}

/// A stored table with its columns in ordinal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetProfile {
    pub table: TableMetadata,
    pub columns: Vec<ColumnMetadata>,
}
