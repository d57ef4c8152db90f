use crate::report::IngestReport;
use crate::schema::{GPS_COLUMNS, GpsRow, GpsTable};
use crate::timestamp::format_utc;
use anyhow::{Context, Result};
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType};
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

const PARQUET_SCHEMA: &str = "
message gps {
    REQUIRED BYTE_ARRAY vehicle_id (UTF8);
    REQUIRED BYTE_ARRAY ts (UTF8);
    REQUIRED DOUBLE lat;
    REQUIRED DOUBLE lon;
    OPTIONAL DOUBLE speed_mps;
    OPTIONAL DOUBLE heading_deg;
}
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Parquet,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("parquet") || ext.eq_ignore_ascii_case("pq") => {
                TableFormat::Parquet
            }
            _ => TableFormat::Csv,
        }
    }
}

/// Write the table; Parquet for `.parquet`/`.pq`, CSV for anything else.
pub fn write_table(table: &GpsTable, path: &Path) -> Result<()> {
    create_parent_dirs(path)?;
    match TableFormat::from_path(path) {
        TableFormat::Csv => write_csv(table, path),
        TableFormat::Parquet => write_parquet(table, path),
    }
    .with_context(|| format!("writing {}", path.display()))
}

pub fn write_csv(table: &GpsTable, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(file));

    // header goes out even for an empty table
    writer.write_record(GPS_COLUMNS)?;
    for row in table {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_parquet(table: &GpsTable, path: &Path) -> Result<()> {
    let schema = Arc::new(parse_message_type(PARQUET_SCHEMA)?);
    let props = Arc::new(WriterProperties::builder().build());
    let file = File::create(path)?;
    let mut writer = SerializedFileWriter::new(file, schema, props)?;

    let rows = table.rows();
    let vehicle_ids: Vec<ByteArray> = rows
        .iter()
        .map(|r| ByteArray::from(r.vehicle_id.as_str()))
        .collect();
    let timestamps: Vec<ByteArray> = rows
        .iter()
        .map(|r| ByteArray::from(format_utc(&r.ts).into_bytes()))
        .collect();
    let lats: Vec<f64> = rows.iter().map(|r| r.lat).collect();
    let lons: Vec<f64> = rows.iter().map(|r| r.lon).collect();
    let (speeds, speed_defs) = optional_column(rows, |r| r.speed_mps);
    let (headings, heading_defs) = optional_column(rows, |r| r.heading_deg);

    let mut row_group = writer.next_row_group()?;
    let mut index = 0usize;
    while let Some(mut column) = row_group.next_column()? {
        match index {
            0 => column.typed::<ByteArrayType>().write_batch(&vehicle_ids, None, None)?,
            1 => column.typed::<ByteArrayType>().write_batch(&timestamps, None, None)?,
            2 => column.typed::<DoubleType>().write_batch(&lats, None, None)?,
            3 => column.typed::<DoubleType>().write_batch(&lons, None, None)?,
            4 => column
                .typed::<DoubleType>()
                .write_batch(&speeds, Some(speed_defs.as_slice()), None)?,
            _ => column
                .typed::<DoubleType>()
                .write_batch(&headings, Some(heading_defs.as_slice()), None)?,
        };
        column.close()?;
        index += 1;
    }
    row_group.close()?;
    writer.close()?;
    Ok(())
}

/// Present values plus definition levels (1 = present, 0 = null).
fn optional_column(
    rows: &[GpsRow],
    get: impl Fn(&GpsRow) -> Option<f64>,
) -> (Vec<f64>, Vec<i16>) {
    let mut values = Vec::with_capacity(rows.len());
    let mut defs = Vec::with_capacity(rows.len());
    for row in rows {
        match get(row) {
            Some(v) => {
                values.push(v);
                defs.push(1);
            }
            None => defs.push(0),
        }
    }
    (values, defs)
}

/// Pretty-printed JSON report.
pub fn write_report(report: &IngestReport, path: &Path) -> Result<()> {
    create_parent_dirs(path)?;
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush()?;
    Ok(())
}

fn create_parent_dirs(file_path: &Path) -> Result<()> {
    if let Some(parent) = file_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
