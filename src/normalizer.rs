//! The GPS normalization pipeline: resolve columns, rebuild timestamps,
//! convert units, then filter, sort and deduplicate.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::MappingConfig;
use crate::error::{ConfigurationError, Result};
use crate::parsers::{self, HeaderBlock, RawInput, RawTable, parse_f64};
use crate::report::IngestReport;
use crate::schema::{GpsRow, GpsTable, TARGETS, in_valid_range, pick_first_matching};
use crate::timestamp::{Stamp, TimestampStrategy};

const KMH_PER_MPS: f64 = 3.6;

/// Normalize one vendor file with the mapping at `mapping_path`.
pub fn normalize(
    path_in: impl AsRef<Path>,
    mapping_path: impl AsRef<Path>,
) -> Result<(GpsTable, IngestReport)> {
    let mapping = MappingConfig::load(mapping_path)?;
    normalize_with(path_in.as_ref(), &mapping)
}

/// Same as [`normalize`] with an already loaded mapping.
pub fn normalize_with(
    path_in: &Path,
    mapping: &MappingConfig,
) -> Result<(GpsTable, IngestReport)> {
    let RawInput { header, table } = parsers::load(path_in)?;
    debug!(
        path = %path_in.display(),
        rows = table.len(),
        columns = ?table.columns(),
        "loaded raw table"
    );

    let resolved = ResolvedColumns::resolve(table.columns(), mapping);
    let plan = ColumnPlan::new(&table, &resolved, mapping, header.as_ref())?;
    debug!(columns = ?resolved, strategy = ?plan.timestamps, "resolved mapping");

    let vehicle_fallback = path_in
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (candidates, ambiguous) = plan.build(&table, &vehicle_fallback);
    if ambiguous > 0 {
        warn!(
            rows = ambiguous,
            "timestamps fell in a DST fold and were dropped as ambiguous"
        );
    }

    let rows_in = candidates.len();
    let rows = finalize(candidates);
    let report = IngestReport::compute(rows_in, &rows);
    info!(
        rows_in = report.rows_in,
        rows_out = report.rows_out,
        dropped = report.dropped_rows,
        "normalized GPS table"
    );

    Ok((GpsTable::from_rows(rows), report))
}

/// Canonical target -> source column chosen for this run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedColumns(BTreeMap<&'static str, String>);

impl ResolvedColumns {
    pub fn resolve(columns: &[String], mapping: &MappingConfig) -> Self {
        let resolved = TARGETS
            .iter()
            .filter_map(|&target| {
                pick_first_matching(columns, mapping.aliases(target))
                    .map(|src| (target, src.to_string()))
            })
            .collect();
        Self(resolved)
    }

    pub fn get(&self, target: &str) -> Option<&str> {
        self.0.get(target).map(String::as_str)
    }
}

/// Column indices and timestamp strategy, validated before any row is touched.
#[derive(Debug)]
struct ColumnPlan {
    vehicle_id: Option<usize>,
    lat: usize,
    lon: usize,
    speed: Option<usize>,
    heading: Option<usize>,
    speed_is_kmh: bool,
    timestamps: TimestampStrategy,
    ts_column: usize,
}

impl ColumnPlan {
    fn new(
        table: &RawTable,
        resolved: &ResolvedColumns,
        mapping: &MappingConfig,
        header: Option<&HeaderBlock>,
    ) -> std::result::Result<Self, ConfigurationError> {
        let available = || table.columns().to_vec();
        let index = |target: &str| resolved.get(target).and_then(|c| table.column_index(c));
        let stopwatch = mapping.time.stopwatch();

        let missing: Vec<String> = ["lat", "lon"]
            .into_iter()
            .filter(|&t| index(t).is_none())
            .map(String::from)
            .collect();
        let (Some(lat), Some(lon)) = (index("lat"), index("lon")) else {
            return Err(ConfigurationError::MissingColumns {
                missing,
                available: available(),
            });
        };

        let tz = mapping.time.timezone()?;
        let timestamps = match stopwatch {
            Some((start_key, seconds_column)) => {
                // declared verbatim, so matched exactly
                if table.column_index(seconds_column).is_none() {
                    return Err(ConfigurationError::MissingSecondsColumn {
                        column: seconds_column.to_string(),
                        available: available(),
                    });
                }
                let start = header
                    .and_then(|h| h.get(start_key))
                    .filter(|v| !v.trim().is_empty())
                    .ok_or_else(|| ConfigurationError::MissingHeaderKey {
                        key: start_key.to_string(),
                        available: header
                            .map(|h| h.keys().map(String::from).collect())
                            .unwrap_or_default(),
                    })?;
                let strategy = TimestampStrategy::stopwatch(start, tz, seconds_column);
                if let TimestampStrategy::Stopwatch {
                    start: Stamp::Missing,
                    ..
                } = strategy
                {
                    warn!(header = start_key, value = start, "unparseable stopwatch start time");
                }
                strategy
            }
            None => {
                let column = resolved.get("ts").ok_or_else(|| ConfigurationError::MissingTimestamp {
                    available: available(),
                })?;
                TimestampStrategy::Direct {
                    column: column.to_string(),
                    assume_utc: mapping.time.is_iso_utc,
                    tz,
                }
            }
        };
        let ts_column = table
            .column_index(timestamps.source_column())
            .ok_or_else(|| ConfigurationError::MissingColumns {
                missing: vec!["ts".to_string()],
                available: available(),
            })?;

        Ok(Self {
            vehicle_id: index("vehicle_id"),
            lat,
            lon,
            speed: index("speed"),
            heading: index("heading"),
            speed_is_kmh: mapping.units.speed_is_kmh,
            timestamps,
            ts_column,
        })
    }

    /// Coerce every raw row; returns the candidates and how many timestamps were ambiguous.
    fn build(&self, table: &RawTable, vehicle_fallback: &str) -> (Vec<Candidate>, usize) {
        let mut ambiguous = 0usize;
        let candidates = (0..table.len())
            .map(|row| {
                let number =
                    |col: Option<usize>| col.and_then(|c| table.cell(row, c)).and_then(parse_f64);

                let vehicle_id = match self.vehicle_id {
                    Some(col) => table.cell(row, col).map(|v| v.trim().to_string()),
                    None => Some(vehicle_fallback.to_string()),
                };
                let speed_mps = number(self.speed).map(|v| {
                    if self.speed_is_kmh { v / KMH_PER_MPS } else { v }
                });
                let ts = match self.timestamps.resolve(table.cell(row, self.ts_column)) {
                    Stamp::Ambiguous => {
                        ambiguous += 1;
                        None
                    }
                    stamp => stamp.instant(),
                };

                Candidate {
                    vehicle_id,
                    ts,
                    lat: number(Some(self.lat)),
                    lon: number(Some(self.lon)),
                    speed_mps,
                    heading_deg: number(self.heading),
                }
            })
            .collect();
        (candidates, ambiguous)
    }
}

/// A coerced row before cleaning; any field may still be missing.
#[derive(Debug, Clone)]
struct Candidate {
    vehicle_id: Option<String>,
    ts: Option<DateTime<Utc>>,
    lat: Option<f64>,
    lon: Option<f64>,
    speed_mps: Option<f64>,
    heading_deg: Option<f64>,
}

impl Candidate {
    fn into_row(self) -> Option<GpsRow> {
        if !in_valid_range(self.lat, self.lon) {
            return None;
        }
        Some(GpsRow {
            vehicle_id: self.vehicle_id?,
            ts: self.ts?,
            lat: self.lat?,
            lon: self.lon?,
            speed_mps: self.speed_mps,
            heading_deg: self.heading_deg,
        })
    }
}

/// Drop invalid rows, stable-sort by `(vehicle_id, ts)`, keep the first of each duplicate ping.
fn finalize(candidates: Vec<Candidate>) -> Vec<GpsRow> {
    let mut rows: Vec<GpsRow> = candidates
        .into_iter()
        .filter_map(Candidate::into_row)
        .collect();
    rows.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id).then(a.ts.cmp(&b.ts)));

    let mut seen = HashSet::with_capacity(rows.len());
    rows.retain(|r| seen.insert((r.vehicle_id.clone(), r.ts, coord_key(r.lat), coord_key(r.lon))));
    rows
}

// -0.0 and 0.0 are the same coordinate
fn coord_key(v: f64) -> u64 {
    (v + 0.0).to_bits()
}
