//! Core traits for datacat abstractions.
//!
//! These traits define the interfaces that concrete stores must satisfy,
//! enabling pluggable backends and testability.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// JOB STORE TRAIT
// =============================================================================

/// Key-value store holding job records and the priority-ordered pending set.
///
/// A job id is in the pending set only while its record is `PENDING`;
/// removal from the set is the claim step, so at most one caller can win it.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Store a new job record and enqueue it by priority, atomically.
    async fn create(&self, job: &Job) -> Result<()>;

    /// Fetch a job record.
    async fn get(&self, id: Uuid) -> Result<Option<Job>>;

    /// Overwrite the fields named by `patch`. Does not check the lifecycle.
    async fn update(&self, id: Uuid, patch: &JobPatch) -> Result<()>;

    /// Remove a job record and its queue entry. Returns false if absent.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Whether a job record exists.
    async fn exists(&self, id: Uuid) -> Result<bool>;

    /// Ids of every job record in the store.
    async fn list_ids(&self) -> Result<Vec<Uuid>>;

    /// Remove and return the highest-priority queued id.
    async fn pop_highest(&self) -> Result<Option<Uuid>>;

    /// Remove an id from the pending set. Returns false if it was not queued.
    async fn dequeue(&self, id: Uuid) -> Result<bool>;

    /// Number of ids in the pending set.
    async fn queue_len(&self) -> Result<i64>;
}

// =============================================================================
// CATALOG REPOSITORY TRAIT
// =============================================================================

/// Relational metadata catalog of profiled tables and their columns.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Upsert the table row keyed by `(schema_name, table_name)` and replace
    /// its column set, in one transaction. Returns the table id.
    async fn store_profile(&self, profile: &TableProfile) -> Result<Uuid>;

    /// Fetch a stored table with its columns in ordinal order.
    async fn get_profile(&self, schema_name: &str, table_name: &str)
        -> Result<Option<DatasetProfile>>;

    /// List stored tables, optionally restricted to one schema.
    async fn list_tables(&self, schema_name: Option<&str>) -> Result<Vec<TableMetadata>>;

    /// Delete a table and its columns. Returns false if absent.
    async fn delete_table(&self, table_id: Uuid) -> Result<bool>;
}
