//! Profile-and-store pipeline shared by the dataset handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use datacat_core::{logging, CatalogRepository, Error, Result, TableProfile};
use datacat_profile::{load_dataset, Profiler};

/// Result payload stored on a completed dataset job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingReport {
    /// Always `"success"`; failures are recorded on the job instead.
    pub status: String,
    pub table_id: Uuid,
    pub rows_processed: i64,
    pub columns_analyzed: usize,
    pub metadata: TableProfile,
}

/// Loads a dataset file, profiles it and writes the result to the catalog.
#[derive(Clone)]
pub struct DatasetProcessor {
    catalog: Arc<dyn CatalogRepository>,
    profiler: Profiler,
}

impl DatasetProcessor {
    pub fn new(catalog: Arc<dyn CatalogRepository>) -> Self {
        Self {
            catalog,
            profiler: Profiler::default(),
        }
    }

    pub fn with_profiler(mut self, profiler: Profiler) -> Self {
        self.profiler = profiler;
        self
    }

    /// Load and profile `path` on a blocking thread.
    pub async fn profile_file(
        &self,
        path: &Path,
        schema_name: &str,
        table_name: &str,
    ) -> Result<TableProfile> {
        let path: PathBuf = path.to_path_buf();
        let profiler = self.profiler.clone();
        let schema_name = schema_name.to_string();
        let table_name = table_name.to_string();

        tokio::task::spawn_blocking(move || {
            let dataset = load_dataset(&path)?;
            Ok(profiler.profile(&dataset, &schema_name, &table_name))
        })
        .await
        .map_err(|e| Error::Profiling(format!("Profiling task failed: {}", e)))?
    }

    /// Persist `profile` and build the job report.
    pub async fn store(&self, profile: TableProfile) -> Result<ProcessingReport> {
        let start = Instant::now();
        let table_id = self.catalog.store_profile(&profile).await?;

        info!(
            subsystem = logging::SUBSYSTEM_PROFILE,
            component = logging::COMPONENT_PROFILER,
            op = "store",
            table_id = %table_id,
            schema_name = %profile.schema_name,
            table_name = %profile.table_name,
            duration_ms = start.elapsed().as_millis() as u64,
            "Stored dataset profile"
        );

        Ok(ProcessingReport {
            status: "success".to_string(),
            table_id,
            rows_processed: profile.row_count,
            columns_analyzed: profile.columns.len(),
            metadata: profile,
        })
    }

    /// [`profile_file`](Self::profile_file) followed by [`store`](Self::store).
    pub async fn process_file(
        &self,
        path: &Path,
        schema_name: &str,
        table_name: &str,
    ) -> Result<ProcessingReport> {
        let profile = self.profile_file(path, schema_name, table_name).await?;
        self.store(profile).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datacat_db::MemoryCatalog;
    use std::io::Write;

    #[tokio::test]
    async fn test_process_file() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(b"id,name\n1,a\n2,bb\n").unwrap();

        let catalog = Arc::new(MemoryCatalog::new());
        let processor = DatasetProcessor::new(catalog.clone());
        let report = processor
            .process_file(file.path(), "nyc_taxi", "zones")
            .await
            .unwrap();

        assert_eq!(report.status, "success");
        assert_eq!(report.rows_processed, 2);
        assert_eq!(report.columns_analyzed, 2);
        assert_eq!(report.metadata.table_name, "zones");

        let stored = catalog.get_profile("nyc_taxi", "zones").await.unwrap().unwrap();
        assert_eq!(stored.table.id, report.table_id);
        assert_eq!(stored.columns.len(), 2);
    }

    #[tokio::test]
    async fn test_process_parquet_file() {
        use arrow::array::{Int32Array, RecordBatch, StringArray};
        use arrow::datatypes::{DataType, Field, Schema};
        use datacat_core::ColumnType;
        use parquet::arrow::ArrowWriter;

        let schema = Arc::new(Schema::new(vec![
            Field::new("LocationID", DataType::Int32, false),
            Field::new("Borough", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int32Array::from(vec![1, 2])),
                Arc::new(StringArray::from(vec![Some("EWR"), Some("Queens")])),
            ],
        )
        .unwrap();
        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        let mut writer = ArrowWriter::try_new(file.reopen().unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let catalog = Arc::new(MemoryCatalog::new());
        let processor = DatasetProcessor::new(catalog.clone());
        let report = processor
            .process_file(file.path(), "nyc_taxi", "taxi_zones")
            .await
            .unwrap();

        assert_eq!(report.rows_processed, 2);
        assert_eq!(report.columns_analyzed, 2);
        assert_eq!(report.metadata.columns[0].column_type, ColumnType::Integer);
        assert_eq!(report.metadata.columns[1].column_type, ColumnType::String);
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        let processor = DatasetProcessor::new(Arc::new(MemoryCatalog::new()));
        let err = processor
            .profile_file(file.path(), "s", "t")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }

    #[test]
    fn test_report_serialization() {
        let report = ProcessingReport {
            status: "success".to_string(),
            table_id: Uuid::nil(),
            rows_processed: 0,
            columns_analyzed: 0,
            metadata: TableProfile {
                schema_name: "s".into(),
                table_name: "t".into(),
                table_kind: datacat_core::TableKind::Table,
                row_count: 0,
                size_bytes: 0,
                last_analyzed: chrono::Utc::now(),
                columns: vec![],
            },
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["metadata"]["table_kind"], "table");
    }
}
