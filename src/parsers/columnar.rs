use std::fs::File;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use parquet::basic::{LogicalType, TimeUnit};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use parquet::schema::types::Type;

use super::{RawInput, RawTable};
use crate::error::{IngestError, Result};

const SECONDS_PER_DAY: i64 = 86_400;

/// Timestamp annotation of a top-level column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnKind {
    /// Timestamps not adjusted to UTC are wall-clock values and stay naive.
    utc_adjusted: bool,
    /// INT64 nanoseconds since the epoch, as pandas writes `datetime64[ns]`.
    nanos: bool,
}

impl ColumnKind {
    const PLAIN: Self = Self {
        utc_adjusted: true,
        nanos: false,
    };

    fn of(field: &Type) -> Self {
        if field.is_group() {
            return Self::PLAIN;
        }
        match field.get_basic_info().logical_type() {
            Some(LogicalType::Timestamp {
                is_adjusted_to_u_t_c,
                unit,
            }) => Self {
                utc_adjusted: is_adjusted_to_u_t_c,
                nanos: matches!(unit, TimeUnit::NANOS(_)),
            },
            _ => Self::PLAIN,
        }
    }
}

/// Read a Parquet file into text cells. Columnar sources have no header block.
///
/// Only flat schemas are meaningful: a nested group becomes one cell holding
/// its display form.
pub fn read(path: &Path) -> Result<RawInput> {
    let file = File::open(path).map_err(|e| IngestError::io(path, e))?;
    let reader = SerializedFileReader::new(file)?;

    let schema = reader.metadata().file_metadata().schema_descr_ptr();
    let fields = schema.root_schema().get_fields();
    let columns: Vec<String> = fields.iter().map(|f| f.name().to_string()).collect();
    let kinds: Vec<ColumnKind> = fields.iter().map(|f| ColumnKind::of(f)).collect();

    let num_rows = reader.metadata().file_metadata().num_rows().max(0) as usize;
    let mut rows = Vec::with_capacity(num_rows);
    for row in reader.get_row_iter(None)? {
        let row = row?;
        let cells = row
            .get_column_iter()
            .enumerate()
            .map(|(i, (_, field))| {
                field_text(field, kinds.get(i).copied().unwrap_or(ColumnKind::PLAIN))
            })
            .collect();
        rows.push(cells);
    }

    Ok(RawInput {
        header: None,
        table: RawTable::new(columns, rows),
    })
}

fn field_text(field: &Field, kind: ColumnKind) -> Option<String> {
    let instant = |dt: Option<DateTime<Utc>>| {
        dt.map(|dt| {
            if kind.utc_adjusted {
                dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
            } else {
                naive_text(dt.naive_utc())
            }
        })
    };

    match field {
        Field::Null => None,
        Field::Str(s) => Some(s.clone()),
        Field::Float(v) if v.is_nan() => None,
        Field::Double(v) if v.is_nan() => None,
        Field::Float(v) => Some(v.to_string()),
        Field::Double(v) => Some(v.to_string()),
        Field::TimestampMillis(ms) => instant(DateTime::from_timestamp_millis(*ms)),
        Field::TimestampMicros(us) => instant(DateTime::from_timestamp_micros(*us)),
        Field::Long(ns) if kind.nanos => instant(Some(DateTime::from_timestamp_nanos(*ns))),
        Field::Date(days) => DateTime::from_timestamp(i64::from(*days) * SECONDS_PER_DAY, 0)
            .map(|dt| dt.date_naive().to_string()),
        other => Some(other.to_string()),
    }
}

fn naive_text(naive: NaiveDateTime) -> String {
    naive.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}
