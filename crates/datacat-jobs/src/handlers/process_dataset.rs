//! Profile a dataset file already on local storage.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tracing::{info, warn};

use datacat_core::{defaults, logging, JobType};

use crate::handler::{JobContext, JobHandler, JobResult};
use crate::handlers::table_name_from;
use crate::processor::{DatasetProcessor, ProcessingReport};

/// Payload of a `process_dataset` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDatasetPayload {
    /// Uploaded file; owned by the job and deleted once it finishes.
    pub file_path: String,
    #[serde(default)]
    pub schema_name: Option<String>,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub original_filename: Option<String>,
}

/// Handler for [`JobType::ProcessDataset`].
pub struct ProcessDatasetHandler {
    processor: DatasetProcessor,
    default_schema: String,
}

impl ProcessDatasetHandler {
    pub fn new(processor: DatasetProcessor) -> Self {
        Self {
            processor,
            default_schema: defaults::DEFAULT_SCHEMA_NAME.to_string(),
        }
    }

    /// Schema used when the payload names none.
    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = schema.into();
        self
    }

    async fn process(
        &self,
        ctx: &JobContext,
        payload: &ProcessDatasetPayload,
        path: &Path,
    ) -> anyhow::Result<ProcessingReport> {
        let schema_name = payload
            .schema_name
            .clone()
            .unwrap_or_else(|| self.default_schema.clone());
        let table_name = payload.table_name.clone().unwrap_or_else(|| {
            table_name_from(&[
                payload.original_filename.as_deref(),
                Some(payload.file_path.as_str()),
            ])
        });

        ctx.report_progress(10, Some("Starting dataset analysis"))
            .await;
        let profile = self
            .processor
            .profile_file(path, &schema_name, &table_name)
            .await
            .with_context(|| format!("Failed to profile {}", path.display()))?;

        ctx.report_progress(90, Some("Storing metadata")).await;
        let report = self
            .processor
            .store(profile)
            .await
            .context("Failed to store metadata")?;

        ctx.report_progress(100, Some("Processing complete")).await;
        Ok(report)
    }
}

#[async_trait]
impl JobHandler for ProcessDatasetHandler {
    fn job_type(&self) -> JobType {
        JobType::ProcessDataset
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        // The upload is owned even when the rest of the payload is invalid.
        let file = ctx
            .payload()
            .get("file_path")
            .and_then(|v| v.as_str())
            .map(TempPath::from_path);

        let result = match ctx
            .parse_payload::<ProcessDatasetPayload>()
            .context("Invalid payload")
        {
            Ok(payload) => self.process(&ctx, &payload, Path::new(&payload.file_path)).await,
            Err(e) => Err(e),
        };

        if let Some(file) = file {
            let file_path = file.display().to_string();
            if let Err(e) = file.close() {
                warn!(
                    subsystem = logging::SUBSYSTEM_JOBS,
                    component = logging::COMPONENT_HANDLER,
                    job_id = %ctx.job_id(),
                    file_path = %file_path,
                    error = %e,
                    "Failed to remove dataset file"
                );
            }
        }

        if let Ok(report) = &result {
            info!(
                subsystem = logging::SUBSYSTEM_JOBS,
                component = logging::COMPONENT_HANDLER,
                job_id = %ctx.job_id(),
                table_id = %report.table_id,
                rows = report.rows_processed,
                columns = report.columns_analyzed,
                "Dataset processed"
            );
        }
        result.into()
    }
}
