//! In-memory stores implementing the same traits as the Redis and
//! PostgreSQL backends.
//!
//! Always compiled so that integration tests in other crates can drive the
//! job engine without live services.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use datacat_core::{
    CatalogRepository, ColumnMetadata, DatasetProfile, Error, Job, JobPatch, JobStore, Result,
    TableMetadata, TableProfile,
};

#[derive(Default)]
struct JobState {
    jobs: HashMap<Uuid, Job>,
    queue: HashMap<Uuid, i32>,
}

/// Job store held in process memory.
#[derive(Default)]
pub struct MemoryJobStore {
    state: Mutex<JobState>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a stored record wholesale, bypassing the queue.
    /// Lets tests plant records with arbitrary timestamps.
    pub async fn put(&self, job: Job) {
        self.state.lock().await.jobs.insert(job.id, job);
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, job: &Job) -> Result<()> {
        let mut state = self.state.lock().await;
        state.jobs.insert(job.id, job.clone());
        state.queue.insert(job.id, job.priority);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn update(&self, id: Uuid, patch: &JobPatch) -> Result<()> {
        let mut state = self.state.lock().await;
        let job = state.jobs.get_mut(&id).ok_or(Error::JobNotFound(id))?;
        job.apply(patch);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.queue.remove(&id);
        Ok(state.jobs.remove(&id).is_some())
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.lock().await.jobs.contains_key(&id))
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut ids: Vec<Uuid> = state.jobs.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn pop_highest(&self) -> Result<Option<Uuid>> {
        let mut state = self.state.lock().await;
        // Ties fall back to the time-ordered id, oldest first.
        let next = state
            .queue
            .iter()
            .max_by(|(a_id, a_pri), (b_id, b_pri)| a_pri.cmp(b_pri).then(b_id.cmp(a_id)))
            .map(|(id, _)| *id);
        if let Some(id) = next {
            state.queue.remove(&id);
        }
        Ok(next)
    }

    async fn dequeue(&self, id: Uuid) -> Result<bool> {
        Ok(self.state.lock().await.queue.remove(&id).is_some())
    }

    async fn queue_len(&self) -> Result<i64> {
        Ok(self.state.lock().await.queue.len() as i64)
    }
}

#[derive(Default)]
struct CatalogState {
    tables: HashMap<Uuid, TableMetadata>,
    columns: HashMap<Uuid, Vec<ColumnMetadata>>,
}

/// Metadata catalog held in process memory.
#[derive(Default)]
pub struct MemoryCatalog {
    state: Mutex<CatalogState>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tables.
    pub async fn table_count(&self) -> usize {
        self.state.lock().await.tables.len()
    }
}

#[async_trait]
impl CatalogRepository for MemoryCatalog {
    async fn store_profile(&self, profile: &TableProfile) -> Result<Uuid> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let now = Utc::now();

        let existing = state
            .tables
            .values_mut()
            .find(|t| t.schema_name == profile.schema_name && t.table_name == profile.table_name);

        let table_id = match existing {
            Some(table) => {
                table.row_count = profile.row_count;
                table.size_bytes = profile.size_bytes;
                table.last_analyzed = Some(profile.last_analyzed);
                table.updated_at = now;
                table.id
            }
            None => {
                let table = TableMetadata {
                    id: Uuid::now_v7(),
                    schema_name: profile.schema_name.clone(),
                    table_name: profile.table_name.clone(),
                    table_kind: profile.table_kind,
                    description: None,
                    row_count: profile.row_count,
                    size_bytes: profile.size_bytes,
                    created_at: now,
                    updated_at: now,
                    last_analyzed: Some(profile.last_analyzed),
                };
                let id = table.id;
                state.tables.insert(id, table);
                id
            }
        };

        let columns = profile
            .columns
            .iter()
            .map(|c| ColumnMetadata {
                id: Uuid::now_v7(),
                table_id,
                column_name: c.column_name.clone(),
                ordinal_position: c.ordinal_position,
                column_type: c.column_type,
                is_nullable: c.is_nullable,
                null_count: c.null_count,
                unique_count: c.unique_count,
                min_value: c.min_value.clone(),
                max_value: c.max_value.clone(),
                avg_value: c.avg_value,
                created_at: now,
                updated_at: now,
            })
            .collect();
        state.columns.insert(table_id, columns);

        Ok(table_id)
    }

    async fn get_profile(
        &self,
        schema_name: &str,
        table_name: &str,
    ) -> Result<Option<DatasetProfile>> {
        let state = self.state.lock().await;
        let Some(table) = state
            .tables
            .values()
            .find(|t| t.schema_name == schema_name && t.table_name == table_name)
        else {
            return Ok(None);
        };
        let mut columns = state.columns.get(&table.id).cloned().unwrap_or_default();
        columns.sort_by_key(|c| c.ordinal_position);
        Ok(Some(DatasetProfile {
            table: table.clone(),
            columns,
        }))
    }

    async fn list_tables(&self, schema_name: Option<&str>) -> Result<Vec<TableMetadata>> {
        let state = self.state.lock().await;
        let mut tables: Vec<TableMetadata> = state
            .tables
            .values()
            .filter(|t| schema_name.map_or(true, |s| t.schema_name == s))
            .cloned()
            .collect();
        tables.sort_by(|a, b| {
            (a.schema_name.as_str(), a.table_name.as_str())
                .cmp(&(b.schema_name.as_str(), b.table_name.as_str()))
        });
        Ok(tables)
    }

    async fn delete_table(&self, table_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        state.columns.remove(&table_id);
        Ok(state.tables.remove(&table_id).is_some())
    }
}
