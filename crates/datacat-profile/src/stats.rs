//! Per-column statistics over the full column.

use chrono::NaiveDateTime;

use datacat_core::{defaults, ColumnType};

use crate::dataset::ColumnValues;
use crate::infer::{parse_datetime, parse_numeric};

/// Bounds and mean of a column. Absent fields were not computable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueStats {
    pub min_value: Option<String>,
    pub max_value: Option<String>,
    pub avg_value: Option<f64>,
}

/// Compute bounds for `values` interpreted as `column_type`.
///
/// Numeric columns coerce to numbers (unparsable cells count as null) and
/// report min, max and mean. STRING columns report the shortest and longest
/// value length. DATETIME columns report the earliest and latest parsable
/// value. Other types carry no bounds.
pub fn value_stats(values: &ColumnValues, column_type: ColumnType) -> ValueStats {
    match column_type {
        ColumnType::Integer | ColumnType::Float => numeric_stats(values),
        ColumnType::String => length_stats(values),
        ColumnType::Datetime => datetime_stats(values),
        _ => ValueStats::default(),
    }
}

fn numeric_stats(values: &ColumnValues) -> ValueStats {
    if let ColumnValues::Int(ints) = values {
        let present: Vec<i64> = ints.iter().flatten().copied().collect();
        let (Some(min), Some(max)) = (present.iter().min(), present.iter().max()) else {
            return ValueStats::default();
        };
        let mean = present.iter().map(|v| *v as f64).sum::<f64>() / present.len() as f64;
        return ValueStats {
            min_value: Some(min.to_string()),
            max_value: Some(max.to_string()),
            avg_value: Some(mean),
        };
    }

    let present = coerce_numeric(values);
    if present.is_empty() {
        return ValueStats::default();
    }
    let min = present.iter().copied().fold(f64::INFINITY, f64::min);
    let max = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = present.iter().sum::<f64>() / present.len() as f64;

    // Text that coerced to whole numbers reads back as integers.
    let integral = !matches!(values, ColumnValues::Float(_))
        && present.iter().all(|v| v.fract() == 0.0);
    let render = |v: f64| {
        if integral && v.abs() < i64::MAX as f64 {
            (v as i64).to_string()
        } else {
            format!("{:?}", v)
        }
    };

    ValueStats {
        min_value: Some(render(min)),
        max_value: Some(render(max)),
        avg_value: Some(mean),
    }
}

fn coerce_numeric(values: &ColumnValues) -> Vec<f64> {
    match values {
        ColumnValues::Int(v) => v.iter().flatten().map(|i| *i as f64).collect(),
        ColumnValues::Float(v) => v.iter().flatten().copied().filter(|f| f.is_finite()).collect(),
        ColumnValues::Bool(v) => v
            .iter()
            .flatten()
            .map(|b| if *b { 1.0 } else { 0.0 })
            .collect(),
        ColumnValues::Text(v) => v.iter().flatten().filter_map(|s| parse_numeric(s)).collect(),
        ColumnValues::DateTime(_) => Vec::new(),
    }
}

fn length_stats(values: &ColumnValues) -> ValueStats {
    let lengths: Vec<usize> = match values {
        ColumnValues::Text(v) => v.iter().flatten().map(|s| s.chars().count()).collect(),
        ColumnValues::Int(v) => v.iter().flatten().map(|i| i.to_string().len()).collect(),
        ColumnValues::Float(v) => v.iter().flatten().map(|f| format!("{:?}", f).len()).collect(),
        ColumnValues::Bool(v) => v.iter().flatten().map(|b| b.to_string().len()).collect(),
        ColumnValues::DateTime(v) => v
            .iter()
            .flatten()
            .map(|d| format_datetime(d).len())
            .collect(),
    };
    match (lengths.iter().min(), lengths.iter().max()) {
        (Some(min), Some(max)) => ValueStats {
            min_value: Some(min.to_string()),
            max_value: Some(max.to_string()),
            avg_value: None,
        },
        _ => ValueStats::default(),
    }
}

fn datetime_stats(values: &ColumnValues) -> ValueStats {
    let parsed: Vec<NaiveDateTime> = match values {
        ColumnValues::DateTime(v) => v.iter().flatten().copied().collect(),
        ColumnValues::Text(v) => v.iter().flatten().filter_map(|s| parse_datetime(s)).collect(),
        _ => Vec::new(),
    };
    match (parsed.iter().min(), parsed.iter().max()) {
        (Some(min), Some(max)) => ValueStats {
            min_value: Some(format_datetime(min)),
            max_value: Some(format_datetime(max)),
            avg_value: None,
        },
        _ => ValueStats::default(),
    }
}

fn format_datetime(value: &NaiveDateTime) -> String {
    value.format(defaults::DATETIME_DISPLAY_FORMAT).to_string()
}
