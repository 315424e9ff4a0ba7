//! Dataset file loader.
//!
//! Reads CSV and TSV files into a [`Dataset`], assigning each column a native
//! representation the way a dataframe reader does: integers, then finite
//! floats, then `true`/`false`, else text. Dates are left as text for the
//! profiler to infer. Parquet files keep the storage their schema declares.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

use datacat_core::{defaults, logging, Error, Result};

use crate::columnar::read_parquet;
use crate::dataset::{Column, ColumnValues, Dataset};

/// On-disk layout of a dataset file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Delimited(u8),
    Parquet,
}

/// Load a dataset from `path`, picking the reader from the extension.
///
/// `.csv` is comma-separated, `.tsv`/`.tab` tab-separated and
/// `.parquet`/`.pq` Parquet. Anything else is [`Error::UnsupportedFormat`];
/// a missing file is [`Error::NotFound`].
pub fn load_dataset(path: &Path) -> Result<Dataset> {
    let start = Instant::now();

    if !path.exists() {
        return Err(Error::NotFound(format!(
            "Dataset file not found: {}",
            path.display()
        )));
    }

    let format = format_for(path)?;
    let file = File::open(path)?;
    let dataset = match format {
        FileFormat::Delimited(delimiter) => read_delimited(BufReader::new(file), delimiter)?,
        FileFormat::Parquet => read_parquet(file)?,
    };

    info!(
        subsystem = logging::SUBSYSTEM_PROFILE,
        component = logging::COMPONENT_LOADER,
        op = "load_dataset",
        path = %path.display(),
        format = ?format,
        row_count = dataset.row_count(),
        column_count = dataset.column_count(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Loaded dataset"
    );
    Ok(dataset)
}

/// File format implied by the extension of `path`.
pub fn format_for(path: &Path) -> Result<FileFormat> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("csv") => Ok(FileFormat::Delimited(b',')),
        Some("tsv") | Some("tab") => Ok(FileFormat::Delimited(b'\t')),
        Some("parquet") | Some("pq") => Ok(FileFormat::Parquet),
        Some(other) => Err(Error::UnsupportedFormat(format!(".{}", other))),
        None => Err(Error::UnsupportedFormat(path.display().to_string())),
    }
}

/// Read delimited text with a header row into a dataset.
///
/// Short rows are padded with nulls; extra trailing cells are dropped.
pub fn read_delimited<R: Read>(reader: R, delimiter: u8) -> Result<Dataset> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| Error::Profiling(format!("Failed to read header row: {}", e)))?
        .clone();
    let names = column_names(headers.iter());

    let mut cells: Vec<Vec<Option<String>>> = vec![Vec::new(); names.len()];
    for (line, record) in csv_reader.records().enumerate() {
        let record = record
            .map_err(|e| Error::Profiling(format!("Failed to parse row {}: {}", line + 1, e)))?;
        for (i, column) in cells.iter_mut().enumerate() {
            column.push(record.get(i).and_then(null_or_value));
        }
    }

    let columns = names
        .into_iter()
        .zip(cells)
        .map(|(name, raw)| {
            let values = detect_native(raw);
            debug!(
                subsystem = logging::SUBSYSTEM_PROFILE,
                component = logging::COMPONENT_LOADER,
                column = %name,
                storage = storage_name(&values),
                "Detected column storage"
            );
            Column::new(name, values)
        })
        .collect();

    Ok(Dataset::new(columns))
}

fn null_or_value(cell: &str) -> Option<String> {
    if defaults::NULL_TOKENS.contains(&cell) {
        None
    } else {
        Some(cell.to_string())
    }
}

/// Unique header names: blanks become `Unnamed: {i}`, repeats get `.{n}`.
fn column_names<'a>(headers: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .enumerate()
        .map(|(i, raw)| {
            let base = if raw.trim().is_empty() {
                format!("Unnamed: {}", i)
            } else {
                raw.to_string()
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{}.{}", base, count)
            };
            *count += 1;
            name
        })
        .collect()
}

fn detect_native(raw: Vec<Option<String>>) -> ColumnValues {
    let non_null: Vec<&str> = raw.iter().flatten().map(|s| s.trim()).collect();
    if non_null.is_empty() {
        return ColumnValues::Text(raw);
    }

    if non_null.iter().all(|v| v.parse::<i64>().is_ok()) {
        return ColumnValues::Int(
            raw.iter()
                .map(|c| c.as_deref().and_then(|v| v.trim().parse().ok()))
                .collect(),
        );
    }

    if non_null
        .iter()
        .all(|v| v.parse::<f64>().map(f64::is_finite).unwrap_or(false))
    {
        return ColumnValues::Float(
            raw.iter()
                .map(|c| c.as_deref().and_then(|v| v.trim().parse().ok()))
                .collect(),
        );
    }

    if non_null.iter().all(|v| parse_bool_literal(v).is_some()) {
        return ColumnValues::Bool(
            raw.iter()
                .map(|c| c.as_deref().and_then(parse_bool_literal))
                .collect(),
        );
    }

    ColumnValues::Text(raw)
}

fn parse_bool_literal(value: &str) -> Option<bool> {
    if value.trim().eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.trim().eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn storage_name(values: &ColumnValues) -> &'static str {
    match values {
        ColumnValues::Int(_) => "int",
        ColumnValues::Float(_) => "float",
        ColumnValues::Bool(_) => "bool",
        ColumnValues::DateTime(_) => "datetime",
        ColumnValues::Text(_) => "text",
    }
}
