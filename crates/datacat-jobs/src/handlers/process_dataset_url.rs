//! Download a dataset over HTTP, then profile it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use datacat_core::{defaults, logging, JobType};

use crate::handler::{JobContext, JobHandler, JobResult};
use crate::handlers::table_name_from;
use crate::processor::{DatasetProcessor, ProcessingReport};

/// Payload of a `process_dataset_url` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessDatasetUrlPayload {
    pub url: String,
    #[serde(default)]
    pub schema_name: Option<String>,
    #[serde(default)]
    pub table_name: Option<String>,
}

/// Handler for [`JobType::ProcessDatasetUrl`].
pub struct ProcessDatasetUrlHandler {
    processor: DatasetProcessor,
    client: Client,
    download_dir: Option<PathBuf>,
    default_schema: String,
}

impl ProcessDatasetUrlHandler {
    pub fn new(processor: DatasetProcessor, client: Client) -> Self {
        Self {
            processor,
            client,
            download_dir: None,
            default_schema: defaults::DEFAULT_SCHEMA_NAME.to_string(),
        }
    }

    /// Directory for downloaded files; the system temp dir otherwise.
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    pub fn with_default_schema(mut self, schema: impl Into<String>) -> Self {
        self.default_schema = schema.into();
        self
    }

    /// Stream `url` into a temporary file named with the detected suffix.
    async fn download(&self, url: &Url) -> anyhow::Result<TempPath> {
        let start = Instant::now();
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to download {}", url))?;

        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {}", status);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let suffix = detect_suffix(url, content_type);

        let mut builder = tempfile::Builder::new();
        builder.prefix("datacat-").suffix(&suffix);
        let named = match &self.download_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .context("Failed to create download file")?;

        // The path guard deletes the file if streaming fails part way.
        let (file, path) = named.into_parts();
        let mut file = tokio::fs::File::from_std(file);
        let mut bytes: u64 = 0;
        while let Some(chunk) = response.chunk().await.context("Download interrupted")? {
            file.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        file.flush().await?;

        debug!(
            subsystem = logging::SUBSYSTEM_JOBS,
            component = logging::COMPONENT_HANDLER,
            url = %url,
            bytes,
            suffix = %suffix,
            duration_ms = start.elapsed().as_millis() as u64,
            "Dataset downloaded"
        );
        Ok(path)
    }

    async fn process(
        &self,
        ctx: &JobContext,
        payload: &ProcessDatasetUrlPayload,
    ) -> anyhow::Result<ProcessingReport> {
        let url = Url::parse(&payload.url)
            .with_context(|| format!("Invalid dataset URL: {}", payload.url))?;
        let schema_name = payload
            .schema_name
            .clone()
            .unwrap_or_else(|| self.default_schema.clone());
        let table_name = payload
            .table_name
            .clone()
            .unwrap_or_else(|| table_name_from(&[url.path_segments().and_then(|s| s.last())]));

        ctx.report_progress(10, Some("Downloading dataset")).await;
        let file = self.download(&url).await?;

        ctx.report_progress(30, Some("Download complete, analyzing dataset"))
            .await;
        let profiled = self
            .processor
            .profile_file(&file, &schema_name, &table_name)
            .await;

        if let Err(e) = file.close() {
            warn!(
                subsystem = logging::SUBSYSTEM_JOBS,
                component = logging::COMPONENT_HANDLER,
                job_id = %ctx.job_id(),
                error = %e,
                "Failed to remove downloaded file"
            );
        }
        let profile = profiled.context("Failed to profile downloaded dataset")?;

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
impl JobHandler for ProcessDatasetUrlHandler {
    fn job_type(&self) -> JobType {
        JobType::ProcessDatasetUrl
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let payload: ProcessDatasetUrlPayload = match ctx.parse_payload().context("Invalid payload")
        {
            Ok(p) => p,
            Err(e) => return JobResult::from_error(&e),
        };
        self.process(&ctx, &payload).await.into()
    }
}

/// File suffix for a downloaded dataset.
///
/// The URL path's extension wins; otherwise the content type decides between
/// `.parquet`, `.tsv` and `.csv`, falling back to `.csv`.
pub fn detect_suffix(url: &Url, content_type: Option<&str>) -> String {
    if let Some(ext) = Path::new(url.path())
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
    {
        return format!(".{}", ext.to_ascii_lowercase());
    }

    match content_type.map(str::to_ascii_lowercase) {
        Some(ct) if ct.contains("parquet") => ".parquet".to_string(),
        Some(ct) if ct.contains("tab-separated") => ".tsv".to_string(),
        Some(ct) if ct.contains("csv") => ".csv".to_string(),
        _ => ".csv".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_suffix_from_path() {
        assert_eq!(
            detect_suffix(&url("https://data.example.com/trips/yellow.TSV?x=1"), None),
            ".tsv"
        );
        assert_eq!(
            detect_suffix(&url("https://data.example.com/yellow.parquet"), Some("text/csv")),
            ".parquet"
        );
    }

    #[test]
    fn test_suffix_from_content_type() {
        let u = url("https://data.example.com/export");
        assert_eq!(
            detect_suffix(&u, Some("text/tab-separated-values")),
            ".tsv"
        );
        assert_eq!(detect_suffix(&u, Some("text/csv; charset=utf-8")), ".csv");
        assert_eq!(
            detect_suffix(&u, Some("application/vnd.apache.parquet")),
            ".parquet"
        );
        assert_eq!(detect_suffix(&u, Some("application/octet-stream")), ".csv");
        assert_eq!(detect_suffix(&u, None), ".csv");
    }
}
