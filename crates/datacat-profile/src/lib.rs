//! # datacat-profile
//!
//! Dataset profiling for the datacat catalog.
//!
//! This crate provides:
//! - A columnar in-memory [`Dataset`]
//! - CSV/TSV loading with native type detection, and Parquet loading
//! - Sample-based column type inference
//! - Per-column statistics and table profile assembly
//!
//! Everything here is synchronous and CPU-bound; async callers should run
//! it on a blocking thread.

pub mod columnar;
pub mod dataset;
pub mod infer;
pub mod loader;
pub mod profiler;
pub mod stats;

pub use dataset::{Column, ColumnValues, Dataset};
pub use infer::{infer_column_type, infer_from_sample, parse_datetime, parse_numeric};
pub use columnar::read_parquet;
pub use loader::{format_for, load_dataset, read_delimited, FileFormat};
pub use profiler::Profiler;
pub use stats::{value_stats, ValueStats};
