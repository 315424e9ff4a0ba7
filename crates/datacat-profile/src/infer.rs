//! Column type inference.
//!
//! Native storage decides the type directly. Textual columns are typed from
//! a bounded sample of their first non-null values, trying datetime, then
//! numeric, then the boolean vocabulary, and falling back to STRING. The
//! sample can misclassify a column whose early values are unrepresentative.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::trace;

use datacat_core::{defaults, logging, ColumnType};

use crate::dataset::{Column, ColumnValues};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

/// Parse a date or date-time in one of the accepted layouts.
///
/// Offsets in RFC 3339 input are normalized to UTC. Bare numbers are never
/// dates.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Parse a finite number.
pub fn parse_numeric(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Infer the semantic type of `column`, sampling at most `sample_size`
/// non-null values of a textual column.
pub fn infer_column_type(column: &Column, sample_size: usize) -> ColumnType {
    let inferred = match &column.values {
        ColumnValues::DateTime(_) => ColumnType::Datetime,
        ColumnValues::Int(_) => ColumnType::Integer,
        ColumnValues::Float(_) => ColumnType::Float,
        ColumnValues::Bool(_) => ColumnType::Boolean,
        ColumnValues::Text(values) => {
            let sample: Vec<&str> = values
                .iter()
                .flatten()
                .take(sample_size)
                .map(String::as_str)
                .collect();
            infer_from_sample(&sample)
        }
    };
    trace!(
        subsystem = logging::SUBSYSTEM_PROFILE,
        component = logging::COMPONENT_PROFILER,
        column = %column.name,
        column_type = %inferred,
        "Inferred column type"
    );
    inferred
}

/// Type a sample of textual values. An empty sample is STRING.
pub fn infer_from_sample(sample: &[&str]) -> ColumnType {
    if sample.is_empty() {
        return ColumnType::String;
    }

    if sample.iter().all(|v| parse_datetime(v).is_some()) {
        return ColumnType::Datetime;
    }

    let numeric: Option<Vec<f64>> = sample.iter().map(|v| parse_numeric(v)).collect();
    if let Some(numbers) = numeric {
        return if numbers.iter().all(|n| n.fract() == 0.0) {
            ColumnType::Integer
        } else {
            ColumnType::Float
        };
    }

    if sample
        .iter()
        .all(|v| defaults::BOOLEAN_TOKENS.contains(&v.to_lowercase().as_str()))
    {
        return ColumnType::Boolean;
    }

    ColumnType::String
}
