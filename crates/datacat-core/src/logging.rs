//! Structured logging schema and field constants for datacat.
//!
//! Log events carry `subsystem`, `component` and `op` fields so aggregation
//! tools can filter one part of the engine. tracing macros need field names
//! as identifiers, so the names below document the schema while the value
//! constants are passed directly (`subsystem = logging::SUBSYSTEM_JOBS`).
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (per column, per key) |

// ─── Field names ───────────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "jobs", "db", "profile", "worker"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "submit", "claim", "sweep", "store_profile"
pub const OPERATION: &str = "op";

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Job type tag.
pub const JOB_TYPE: &str = "job_type";

/// Catalog schema of the dataset.
pub const SCHEMA_NAME: &str = "schema_name";

/// Catalog table name of the dataset.
pub const TABLE_NAME: &str = "table_name";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

// ─── Subsystems ────────────────────────────────────────────────────────────

/// Job queue, dispatcher and sweeper.
pub const SUBSYSTEM_JOBS: &str = "jobs";

/// Redis and PostgreSQL stores.
pub const SUBSYSTEM_DB: &str = "db";

/// Dataset loading and profiling.
pub const SUBSYSTEM_PROFILE: &str = "profile";

/// Worker binary bootstrap.
pub const SUBSYSTEM_WORKER: &str = "worker";

// ─── Components ────────────────────────────────────────────────────────────

pub const COMPONENT_QUEUE: &str = "queue";
pub const COMPONENT_DISPATCHER: &str = "dispatcher";
pub const COMPONENT_SWEEPER: &str = "sweeper";
pub const COMPONENT_REGISTRY: &str = "registry";
pub const COMPONENT_JOB_STORE: &str = "job_store";
pub const COMPONENT_CATALOG: &str = "catalog";
pub const COMPONENT_POOL: &str = "pool";
pub const COMPONENT_LOADER: &str = "loader";
pub const COMPONENT_PROFILER: &str = "profiler";
pub const COMPONENT_HANDLER: &str = "handler";
