//! Typed handler registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use datacat_core::{logging, Error, JobType, Result};

use crate::handler::JobHandler;

/// Maps job types to the handler that executes them.
///
/// Registration normally happens once at startup; lookups are shared reads.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<RwLock<HashMap<JobType, Arc<dyn JobHandler>>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its own job type, replacing any previous one.
    pub async fn register<H: JobHandler + 'static>(&self, handler: H) {
        self.register_arc(Arc::new(handler)).await;
    }

    pub async fn register_arc(&self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type();
        let mut handlers = self.handlers.write().await;
        if handlers.insert(job_type.clone(), handler).is_some() {
            warn!(
                subsystem = logging::SUBSYSTEM_JOBS,
                component = logging::COMPONENT_REGISTRY,
                job_type = %job_type,
                "Replaced existing job handler"
            );
        } else {
            debug!(
                subsystem = logging::SUBSYSTEM_JOBS,
                component = logging::COMPONENT_REGISTRY,
                job_type = %job_type,
                "Registered job handler"
            );
        }
    }

    /// Handler for `job_type`, or [`Error::HandlerNotFound`].
    pub async fn resolve(&self, job_type: &JobType) -> Result<Arc<dyn JobHandler>> {
        self.handlers
            .read()
            .await
            .get(job_type)
            .cloned()
            .ok_or_else(|| Error::HandlerNotFound(job_type.clone()))
    }

    pub async fn job_types(&self) -> Vec<JobType> {
        let mut types: Vec<JobType> = self.handlers.read().await.keys().cloned().collect();
        types.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        types
    }

    pub async fn len(&self) -> usize {
        self.handlers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handlers.read().await.is_empty()
    }
}
