//! Table profile assembly.

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use datacat_core::{defaults, logging, ColumnProfile, TableKind, TableProfile};

use crate::dataset::{Column, Dataset};
use crate::infer::infer_column_type;
use crate::stats::value_stats;

/// Computes table and column profiles for a dataset.
#[derive(Debug, Clone)]
pub struct Profiler {
    sample_size: usize,
}

impl Default for Profiler {
    fn default() -> Self {
        Self {
            sample_size: defaults::INFERENCE_SAMPLE_SIZE,
        }
    }
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of non-null values sampled for textual type inference.
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size.max(1);
        self
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Profile every column of `dataset` as `(schema_name, table_name)`.
    ///
    /// The kind is always [`TableKind::Table`]; size is the deep in-memory
    /// footprint of the loaded columns.
    pub fn profile(&self, dataset: &Dataset, schema_name: &str, table_name: &str) -> TableProfile {
        let start = Instant::now();

        let columns: Vec<ColumnProfile> = dataset
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| self.profile_column(column, i as i32 + 1))
            .collect();

        let profile = TableProfile {
            schema_name: schema_name.to_string(),
            table_name: table_name.to_string(),
            table_kind: TableKind::Table,
            row_count: dataset.row_count() as i64,
            size_bytes: dataset.memory_usage() as i64,
            last_analyzed: Utc::now(),
            columns,
        };

        info!(
            subsystem = logging::SUBSYSTEM_PROFILE,
            component = logging::COMPONENT_PROFILER,
            op = "profile",
            schema_name = schema_name,
            table_name = table_name,
            row_count = profile.row_count,
            column_count = profile.columns.len(),
            size_bytes = profile.size_bytes,
            duration_ms = start.elapsed().as_millis() as u64,
            "Profiled dataset"
        );
        profile
    }

    /// Type and statistics for a single column at 1-based `ordinal_position`.
    pub fn profile_column(&self, column: &Column, ordinal_position: i32) -> ColumnProfile {
        let column_type = infer_column_type(column, self.sample_size);
        let null_count = column.values.null_count() as i64;
        let stats = value_stats(&column.values, column_type);

        debug!(
            subsystem = logging::SUBSYSTEM_PROFILE,
            component = logging::COMPONENT_PROFILER,
            column = %column.name,
            column_type = %column_type,
            null_count,
            "Profiled column"
        );

        ColumnProfile {
            column_name: column.name.clone(),
            ordinal_position,
            column_type,
            is_nullable: null_count > 0,
            null_count,
            unique_count: column.values.distinct_count() as i64,
            min_value: stats.min_value,
            max_value: stats.max_value,
            avg_value: stats.avg_value,
        }
    }
}
