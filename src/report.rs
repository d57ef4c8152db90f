use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::schema::GpsRow;

/// Summary of one normalization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub dropped_rows: usize,
    pub pct_missing_speed: f64,
    pub p95_inter_ping_seconds_median_across_vehicles: f64,
}

impl IngestReport {
    /// `rows` must already be cleaned and sorted by `(vehicle_id, ts)`.
    pub fn compute(rows_in: usize, rows: &[GpsRow]) -> Self {
        let rows_out = rows.len();
        let missing_speed = rows.iter().filter(|r| r.speed_mps.is_none()).count();
        let pct_missing_speed = if rows_out == 0 {
            0.0
        } else {
            missing_speed as f64 / rows_out as f64 * 100.0
        };

        Self {
            rows_in,
            rows_out,
            dropped_rows: rows_in.saturating_sub(rows_out),
            pct_missing_speed,
            p95_inter_ping_seconds_median_across_vehicles: median_p95_inter_ping(rows),
        }
    }
}

fn median_p95_inter_ping(rows: &[GpsRow]) -> f64 {
    let mut per_vehicle: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    let mut prev: Option<&GpsRow> = None;
    for row in rows {
        let deltas = per_vehicle.entry(row.vehicle_id.as_str()).or_default();
        if let Some(prev) = prev.filter(|p| p.vehicle_id == row.vehicle_id) {
            deltas.push((row.ts - prev.ts).num_milliseconds() as f64 / 1000.0);
        }
        prev = Some(row);
    }

    let mut p95s: Vec<f64> = per_vehicle
        .into_values()
        .map(|mut deltas| quantile(&mut deltas, 0.95).unwrap_or(0.0))
        .collect();
    quantile(&mut p95s, 0.5).unwrap_or(0.0)
}

/// Linear interpolation between closest ranks; `None` for no values.
fn quantile(values: &mut [f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let pos = q * (values.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(values[lo] + (values[hi] - values[lo]) * (pos - lo as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeDelta, Utc};

    fn ping(vehicle: &str, secs: i64, speed: Option<f64>) -> GpsRow {
        let base: DateTime<Utc> = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        GpsRow {
            vehicle_id: vehicle.to_string(),
            ts: base + TimeDelta::seconds(secs),
            lat: 0.0,
            lon: 0.0,
            speed_mps: speed,
            heading_deg: None,
        }
    }

    #[test]
    fn quantile_interpolates() {
        let mut v = vec![4.0, 1.0, 3.0, 2.0];
        assert_eq!(quantile(&mut v, 0.5), Some(2.5));
        let mut v: Vec<f64> = (1..=21).map(f64::from).collect();
        assert_eq!(quantile(&mut v, 0.95), Some(20.0));
        assert_eq!(quantile(&mut [], 0.95), None);
    }

    #[test]
    fn empty_output_reports_zeroes() {
        let report = IngestReport::compute(5, &[]);
        assert_eq!(report.rows_out, 0);
        assert_eq!(report.dropped_rows, 5);
        assert_eq!(report.pct_missing_speed, 0.0);
        assert_eq!(report.p95_inter_ping_seconds_median_across_vehicles, 0.0);
    }

    #[test]
    fn median_across_vehicles_counts_single_ping_vehicles_as_zero() {
        let rows = vec![
            ping("a", 0, Some(1.0)),
            ping("a", 10, None),
            ping("a", 20, Some(1.0)),
            ping("b", 0, None),
            ping("c", 0, Some(1.0)),
            ping("c", 4, Some(1.0)),
        ];
        // a -> p95 of [10, 10] = 10, b -> 0, c -> 4; median = 4
        let report = IngestReport::compute(6, &rows);
        assert_eq!(report.p95_inter_ping_seconds_median_across_vehicles, 4.0);
        assert!((report.pct_missing_speed - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.dropped_rows, 0);
    }

    #[test]
    fn serializes_fields_in_order() {
        let report = IngestReport::compute(3, &[ping("a", 0, None)]);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.starts_with(r#"{"rows_in":3,"rows_out":1,"dropped_rows":2,"pct_missing_speed":100.0"#));
        assert!(json.ends_with(r#""p95_inter_ping_seconds_median_across_vehicles":0.0}"#));
    }
}
