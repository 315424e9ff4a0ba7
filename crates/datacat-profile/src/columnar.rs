//! Parquet reader.
//!
//! Arrow arrays map onto native column storage: integer widths widen to
//! `i64`, float widths to `f64`, dates and timestamps become naive
//! datetimes. Every other type is rendered as text.

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float64Type, Int64Type, TimeUnit, TimestampMicrosecondType};
use arrow::util::display::{ArrayFormatter, FormatOptions};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::file::reader::ChunkReader;

use datacat_core::{Error, Result};

use crate::dataset::{Column, ColumnValues, Dataset};

/// Pandas writes the frame index as a column with this prefix.
const INDEX_COLUMN_PREFIX: &str = "__index_level_";

/// Read every row group of a Parquet file into a dataset.
pub fn read_parquet<T: ChunkReader + 'static>(reader: T) -> Result<Dataset> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(reader).map_err(parquet_error)?;

    let schema = builder.schema().clone();
    let selected: Vec<usize> = schema
        .fields()
        .iter()
        .enumerate()
        .filter(|(_, field)| !field.name().starts_with(INDEX_COLUMN_PREFIX))
        .map(|(i, _)| i)
        .collect();

    let mut columns: Vec<Column> = selected
        .iter()
        .map(|&i| {
            let field = schema.field(i);
            Column::new(field.name().clone(), empty_storage(field.data_type()))
        })
        .collect();

    let batches = builder.build().map_err(parquet_error)?;
    for batch in batches {
        let batch = batch.map_err(parquet_error)?;
        for (column, &i) in columns.iter_mut().zip(&selected) {
            append(&mut column.values, batch.column(i))?;
        }
    }

    Ok(Dataset::new(columns))
}

fn empty_storage(data_type: &DataType) -> ColumnValues {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => ColumnValues::Int(Vec::new()),
        DataType::Float16 | DataType::Float32 | DataType::Float64 => {
            ColumnValues::Float(Vec::new())
        }
        DataType::Boolean => ColumnValues::Bool(Vec::new()),
        DataType::Timestamp(_, _) | DataType::Date32 | DataType::Date64 => {
            ColumnValues::DateTime(Vec::new())
        }
        _ => ColumnValues::Text(Vec::new()),
    }
}

fn append(values: &mut ColumnValues, array: &ArrayRef) -> Result<()> {
    match values {
        ColumnValues::Int(out) => {
            // Out-of-range u64 values cast to null.
            let widened = cast(array.as_ref(), &DataType::Int64).map_err(arrow_error)?;
            out.extend(widened.as_primitive::<Int64Type>().iter());
        }
        ColumnValues::Float(out) => {
            let widened = cast(array.as_ref(), &DataType::Float64).map_err(arrow_error)?;
            out.extend(widened.as_primitive::<Float64Type>().iter());
        }
        ColumnValues::Bool(out) => {
            out.extend(array.as_boolean().iter());
        }
        ColumnValues::DateTime(out) => {
            let micros = cast(
                array.as_ref(),
                &DataType::Timestamp(TimeUnit::Microsecond, None),
            )
            .map_err(arrow_error)?;
            let micros = micros.as_primitive::<TimestampMicrosecondType>();
            out.extend((0..micros.len()).map(|i| {
                if micros.is_null(i) {
                    None
                } else {
                    micros.value_as_datetime(i)
                }
            }));
        }
        ColumnValues::Text(out) => {
            let options = FormatOptions::default();
            let formatter = ArrayFormatter::try_new(array.as_ref(), &options).map_err(arrow_error)?;
            out.extend((0..array.len()).map(|i| {
                if array.is_null(i) {
                    None
                } else {
                    Some(formatter.value(i).to_string())
                }
            }));
        }
    }
    Ok(())
}

fn parquet_error(e: impl std::fmt::Display) -> Error {
    Error::Profiling(format!("Failed to read parquet file: {}", e))
}

fn arrow_error(e: arrow::error::ArrowError) -> Error {
    Error::Profiling(format!("Failed to convert parquet column: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::sync::Arc;

    use arrow::array::{
        BooleanArray, Date32Array, Float32Array, Int32Array, RecordBatch, StringArray,
        TimestampMillisecondArray,
    };
    use arrow::datatypes::{Field, Schema};
    use chrono::NaiveDate;
    use parquet::arrow::ArrowWriter;

    fn write_parquet(batches: &[RecordBatch]) -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        let mut writer =
            ArrowWriter::try_new(file.reopen().unwrap(), batches[0].schema(), None).unwrap();
        for batch in batches {
            writer.write(batch).unwrap();
        }
        writer.close().unwrap();
        file
    }

    fn trips_batch(ids: Vec<Option<i32>>, zones: Vec<Option<&str>>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, true),
            Field::new("zone", DataType::Utf8, true),
        ]));
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(ids)),
                Arc::new(StringArray::from(zones)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_native_storage_from_arrow_types() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("fare", DataType::Float32, true),
            Field::new("paid", DataType::Boolean, true),
            Field::new(
                "pickup",
                DataType::Timestamp(TimeUnit::Millisecond, None),
                true,
            ),
            Field::new("service_date", DataType::Date32, true),
            Field::new("__index_level_0__", DataType::Int64, true),
        ]));
        let pickup = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        let day = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float32Array::from(vec![Some(12.5), None])),
                Arc::new(BooleanArray::from(vec![Some(true), Some(false)])),
                Arc::new(TimestampMillisecondArray::from(vec![
                    Some(pickup.and_utc().timestamp_millis()),
                    None,
                ])),
                Arc::new(Date32Array::from(vec![
                    Some((day - epoch).num_days() as i32),
                    None,
                ])),
                Arc::new(arrow::array::Int64Array::from(vec![0, 1])),
            ],
        )
        .unwrap();
        let file = write_parquet(&[batch]);

        let dataset = read_parquet(File::open(file.path()).unwrap()).unwrap();

        let names: Vec<_> = dataset.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["fare", "paid", "pickup", "service_date"]);
        assert_eq!(
            dataset.columns[0].values,
            ColumnValues::Float(vec![Some(12.5), None])
        );
        assert_eq!(
            dataset.columns[1].values,
            ColumnValues::Bool(vec![Some(true), Some(false)])
        );
        assert_eq!(
            dataset.columns[2].values,
            ColumnValues::DateTime(vec![Some(pickup), None])
        );
        assert_eq!(
            dataset.columns[3].values,
            ColumnValues::DateTime(vec![day.and_hms_opt(0, 0, 0), None])
        );
    }

    #[test]
    fn test_batches_are_concatenated() {
        let file = write_parquet(&[
            trips_batch(vec![Some(1), Some(2)], vec![Some("JFK"), None]),
            trips_batch(vec![None], vec![Some("Midtown")]),
        ]);

        let dataset = read_parquet(File::open(file.path()).unwrap()).unwrap();

        assert_eq!(dataset.row_count(), 3);
        assert_eq!(
            dataset.columns[0].values,
            ColumnValues::Int(vec![Some(1), Some(2), None])
        );
        assert_eq!(
            dataset.columns[1].values,
            ColumnValues::Text(vec![
                Some("JFK".to_string()),
                None,
                Some("Midtown".to_string())
            ])
        );
    }

    #[test]
    fn test_corrupt_file_is_profiling_error() {
        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        std::fs::write(file.path(), b"id,zone\n1,JFK\n").unwrap();

        let err = read_parquet(File::open(file.path()).unwrap()).unwrap_err();
        assert!(matches!(err, Error::Profiling(msg) if msg.contains("parquet")));
    }
}
