//! Redis implementation of the job store and priority queue.
//!
//! Each job is a hash at `job:{uuid}`; pending ids live in the sorted set
//! `job_queue` scored by priority. Claiming is a single `ZPOPMAX`, so two
//! dispatchers can never pop the same id.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, warn};
use uuid::Uuid;

use datacat_core::{defaults, logging, Error, Job, JobPatch, JobStatus, JobStore, JobType, Result};

const FIELD_ID: &str = "id";
const FIELD_TYPE: &str = "type";
const FIELD_STATUS: &str = "status";
const FIELD_PRIORITY: &str = "priority";
const FIELD_PAYLOAD: &str = "payload";
const FIELD_RESULT: &str = "result";
const FIELD_ERROR: &str = "error";
const FIELD_TRACEBACK: &str = "traceback";
const FIELD_PROGRESS: &str = "progress";
const FIELD_MESSAGE: &str = "message";
const FIELD_CREATED_AT: &str = "created_at";
const FIELD_STARTED_AT: &str = "started_at";
const FIELD_COMPLETED_AT: &str = "completed_at";

/// Writes patch fields only when the job hash exists, so an update racing a
/// delete cannot leave a partial record behind.
const UPDATE_IF_EXISTS: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 0 then
    return 0
end
redis.call('HSET', KEYS[1], unpack(ARGV))
return 1
"#;

/// Redis-backed [`JobStore`].
#[derive(Clone)]
pub struct RedisJobStore {
    conn: ConnectionManager,
    key_prefix: String,
    queue_key: String,
}

impl RedisJobStore {
    /// Wrap an existing connection manager using the default key layout.
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            key_prefix: defaults::JOB_KEY_PREFIX.to_string(),
            queue_key: defaults::JOB_QUEUE_KEY.to_string(),
        }
    }

    /// Open a managed connection to `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        debug!(
            subsystem = logging::SUBSYSTEM_DB,
            component = logging::COMPONENT_JOB_STORE,
            op = "connect",
            "Redis job store connected"
        );
        Ok(Self::new(conn))
    }

    /// Prefix every key with `namespace:` so several stores can share a
    /// Redis database (used by the live-store tests).
    pub fn with_namespace(mut self, namespace: &str) -> Self {
        self.key_prefix = format!("{}:{}", namespace, defaults::JOB_KEY_PREFIX);
        self.queue_key = format!("{}:{}", namespace, defaults::JOB_QUEUE_KEY);
        self
    }

    fn job_key(&self, id: Uuid) -> String {
        format!("{}{}", self.key_prefix, id)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn create(&self, job: &Job) -> Result<()> {
        let mut conn = self.conn.clone();
        let fields = encode_job(job)?;
        let _: () = redis::pipe()
            .atomic()
            .hset_multiple(self.job_key(job.id), fields.as_slice())
            .ignore()
            .zadd(&self.queue_key, job.id.to_string(), job.priority)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Job>> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(self.job_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        decode_job(id, &fields).map(Some)
    }

    async fn update(&self, id: Uuid, patch: &JobPatch) -> Result<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let fields = encode_patch(patch)?;

        let script = redis::Script::new(UPDATE_IF_EXISTS);
        let mut invocation = script.key(self.job_key(id));
        for (field, value) in &fields {
            invocation.arg(*field).arg(value);
        }
        let updated: i64 = invocation.invoke_async(&mut conn).await?;
        if updated == 0 {
            return Err(Error::JobNotFound(id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let mut conn = self.conn.clone();
        let (removed, _dequeued): (i64, i64) = redis::pipe()
            .atomic()
            .del(self.job_key(id))
            .zrem(&self.queue_key, id.to_string())
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(self.job_key(id)).await?;
        Ok(exists)
    }

    async fn list_ids(&self) -> Result<Vec<Uuid>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", self.key_prefix);
        let mut cursor: u64 = 0;
        let mut ids = Vec::new();

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(defaults::STORE_SCAN_COUNT)
                .query_async(&mut conn)
                .await?;

            for key in keys {
                let Some(raw) = key.strip_prefix(&self.key_prefix) else {
                    continue;
                };
                match Uuid::parse_str(raw) {
                    Ok(id) => ids.push(id),
                    Err(_) => warn!(
                        subsystem = logging::SUBSYSTEM_DB,
                        component = logging::COMPONENT_JOB_STORE,
                        op = "list_ids",
                        key = %key,
                        "Skipping key with non-UUID suffix"
                    ),
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once.
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn pop_highest(&self) -> Result<Option<Uuid>> {
        let mut conn = self.conn.clone();
        let popped: Vec<(String, f64)> = conn.zpopmax(&self.queue_key, 1).await?;
        let Some((member, score)) = popped.into_iter().next() else {
            return Ok(None);
        };
        let id = Uuid::parse_str(&member)
            .map_err(|e| Error::Store(format!("invalid queue member {}: {}", member, e)))?;
        debug!(
            subsystem = logging::SUBSYSTEM_DB,
            component = logging::COMPONENT_JOB_STORE,
            op = "pop_highest",
            job_id = %id,
            priority = score,
            "Popped job from queue"
        );
        Ok(Some(id))
    }

    async fn dequeue(&self, id: Uuid) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.zrem(&self.queue_key, id.to_string()).await?;
        Ok(removed > 0)
    }

    async fn queue_len(&self) -> Result<i64> {
        let mut conn = self.conn.clone();
        let len: i64 = conn.zcard(&self.queue_key).await?;
        Ok(len)
    }
}

/// Hash fields for a full job record. Unset optional fields are omitted.
pub fn encode_job(job: &Job) -> Result<Vec<(&'static str, String)>> {
    let mut fields = vec![
        (FIELD_ID, job.id.to_string()),
        (FIELD_TYPE, job.job_type.to_string()),
        (FIELD_STATUS, job.status.to_string()),
        (FIELD_PRIORITY, job.priority.to_string()),
        (FIELD_PAYLOAD, serde_json::to_string(&job.payload)?),
        (FIELD_PROGRESS, job.progress_percent.to_string()),
        (FIELD_CREATED_AT, job.created_at.to_rfc3339()),
    ];
    let patch = JobPatch {
        result: job.result.clone(),
        error_message: job.error_message.clone(),
        error_trace: job.error_trace.clone(),
        progress_message: job.progress_message.clone(),
        started_at: job.started_at,
        completed_at: job.completed_at,
        ..Default::default()
    };
    fields.extend(encode_patch(&patch)?);
    Ok(fields)
}

/// Hash fields written by a partial update.
pub fn encode_patch(patch: &JobPatch) -> Result<Vec<(&'static str, String)>> {
    let mut fields = Vec::new();
    if let Some(status) = patch.status {
        fields.push((FIELD_STATUS, status.to_string()));
    }
    if let Some(result) = &patch.result {
        fields.push((FIELD_RESULT, serde_json::to_string(result)?));
    }
    if let Some(error) = &patch.error_message {
        fields.push((FIELD_ERROR, error.clone()));
    }
    if let Some(trace) = &patch.error_trace {
        fields.push((FIELD_TRACEBACK, trace.clone()));
    }
    if let Some(percent) = patch.progress_percent {
        fields.push((FIELD_PROGRESS, percent.to_string()));
    }
    if let Some(message) = &patch.progress_message {
        fields.push((FIELD_MESSAGE, message.clone()));
    }
    if let Some(at) = patch.started_at {
        fields.push((FIELD_STARTED_AT, at.to_rfc3339()));
    }
    if let Some(at) = patch.completed_at {
        fields.push((FIELD_COMPLETED_AT, at.to_rfc3339()));
    }
    Ok(fields)
}

/// Rebuild a job from its hash fields.
///
/// `type` and `status` are required. Unparsable timestamps read as absent.
pub fn decode_job(id: Uuid, fields: &HashMap<String, String>) -> Result<Job> {
    let field = |name: &str| fields.get(name).map(String::as_str);

    let job_type = field(FIELD_TYPE)
        .map(JobType::from)
        .ok_or_else(|| Error::Store(format!("job {} has no type field", id)))?;
    let status = field(FIELD_STATUS)
        .ok_or_else(|| Error::Store(format!("job {} has no status field", id)))?
        .parse::<JobStatus>()?;

    let priority = field(FIELD_PRIORITY)
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v.round() as i32)
        .unwrap_or(defaults::JOB_PRIORITY);
    let progress_percent = field(FIELD_PROGRESS)
        .and_then(|v| v.parse::<f64>().ok())
        .map(|v| v.round() as i32)
        .unwrap_or(0);

    let payload = match field(FIELD_PAYLOAD) {
        Some(raw) => serde_json::from_str(raw)?,
        None => serde_json::Value::Null,
    };
    let result = field(FIELD_RESULT)
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()?;

    Ok(Job {
        id,
        job_type,
        status,
        priority,
        payload,
        result,
        error_message: field(FIELD_ERROR).map(str::to_string),
        error_trace: field(FIELD_TRACEBACK).map(str::to_string),
        progress_percent,
        progress_message: field(FIELD_MESSAGE).map(str::to_string),
        created_at: parse_timestamp(id, FIELD_CREATED_AT, field(FIELD_CREATED_AT))
            .unwrap_or_default(),
        started_at: parse_timestamp(id, FIELD_STARTED_AT, field(FIELD_STARTED_AT)),
        completed_at: parse_timestamp(id, FIELD_COMPLETED_AT, field(FIELD_COMPLETED_AT)),
    })
}

fn parse_timestamp(id: Uuid, name: &str, raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(at) => Some(at.with_timezone(&Utc)),
        Err(e) => {
            warn!(
                subsystem = logging::SUBSYSTEM_DB,
                component = logging::COMPONENT_JOB_STORE,
                job_id = %id,
                field = name,
                value = raw,
                error = %e,
                "Unparsable timestamp in job record, treating as absent"
            );
            None
        }
    }
}
