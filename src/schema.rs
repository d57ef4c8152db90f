//! Canonical GPS schema plus the two small predicates the normalizer leans on:
//! alias resolution and coordinate range checking.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::timestamp;

/// Canonical targets a mapping may resolve, in resolution order.
pub const TARGETS: [&str; 6] = ["vehicle_id", "lat", "lon", "speed", "heading", "ts"];

/// Output column order.
pub const GPS_COLUMNS: [&str; 6] = [
    "vehicle_id",
    "ts",
    "lat",
    "lon",
    "speed_mps",
    "heading_deg",
];

/// One normalized ping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsRow {
    pub vehicle_id: String,
    #[serde(serialize_with = "timestamp::serialize_utc")]
    pub ts: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub speed_mps: Option<f64>,
    pub heading_deg: Option<f64>,
}

/// Normalized table, sorted by `(vehicle_id, ts)` and free of duplicate pings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpsTable {
    rows: Vec<GpsRow>,
}

impl GpsTable {
    pub(crate) fn from_rows(rows: Vec<GpsRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[GpsRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GpsRow> {
        self.rows.iter()
    }
}

impl<'a> IntoIterator for &'a GpsTable {
    type Item = &'a GpsRow;
    type IntoIter = std::slice::Iter<'a, GpsRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Case-insensitive alias lookup.
///
/// Aliases are tried in priority order and the first one present among
/// `src_cols` wins. When two source columns differ only by case, the later one
/// is returned.
pub fn pick_first_matching<'a, S: AsRef<str>>(
    src_cols: &'a [String],
    candidates: &[S],
) -> Option<&'a str> {
    let lowered: HashMap<String, &str> = src_cols
        .iter()
        .map(|c| (c.to_lowercase(), c.as_str()))
        .collect();

    candidates
        .iter()
        .find_map(|alias| lowered.get(&alias.as_ref().to_lowercase()).copied())
}

/// True if both coordinates are present, numeric and within
/// `[-90, 90]` / `[-180, 180]`.
pub fn in_valid_range(lat: Option<f64>, lon: Option<f64>) -> bool {
    match (lat, lon) {
        (Some(lat), Some(lon)) => (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon),
        _ => false,
    }
}
