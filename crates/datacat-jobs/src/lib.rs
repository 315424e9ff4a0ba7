//! # datacat-jobs
//!
//! Background job engine for the datacat catalog.
//!
//! This crate provides:
//! - Priority job submission, cancellation and progress tracking
//! - A single-consumer dispatcher with a typed handler registry
//! - Lifecycle notifications via broadcast channels
//! - Retention sweeping of finished jobs
//! - Built-in handlers that profile local or downloaded datasets
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use datacat_jobs::{DispatcherBuilder, DispatcherConfig, JobQueue, NoOpHandler};
//! use datacat_db::RedisJobStore;
//! use datacat_core::JobType;
//!
//! let store = RedisJobStore::connect("redis://localhost:6379").await?;
//! let queue = JobQueue::new(Arc::new(store));
//!
//! let dispatcher = DispatcherBuilder::new(queue.clone())
//!     .with_config(DispatcherConfig::default().with_poll_interval(1000))
//!     .with_handler(NoOpHandler::new(JobType::custom("noop")))
//!     .build()
//!     .await;
//!
//! let handle = dispatcher.start();
//! let job_id = queue.submit(JobType::custom("noop"), serde_json::json!({}), 0).await?;
//!
//! let mut events = handle.events();
//! while let Ok(event) = events.recv().await {
//!     println!("Event: {:?}", event);
//! }
//!
//! handle.shutdown().await?;
//! ```

pub mod dispatcher;
pub mod handler;
pub mod handlers;
pub mod processor;
pub mod queue;
pub mod registry;
pub mod sweeper;

// Re-export core types
pub use datacat_core::*;

pub use dispatcher::{
    DispatchOutcome, Dispatcher, DispatcherBuilder, DispatcherConfig, DispatcherEvent,
    DispatcherHandle,
};
pub use handler::{JobContext, JobHandler, JobResult, NoOpHandler, ProgressSink};
pub use handlers::{
    ProcessDatasetHandler, ProcessDatasetPayload, ProcessDatasetUrlHandler,
    ProcessDatasetUrlPayload,
};
pub use processor::{DatasetProcessor, ProcessingReport};
pub use queue::JobQueue;
pub use registry::HandlerRegistry;
pub use sweeper::{RetentionSweeper, SweeperConfig, SweeperHandle};
