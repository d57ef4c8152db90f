use std::io::Write;
use std::path::{Path, PathBuf};

use gears::schema::GPS_COLUMNS;
use gears::timestamp::format_utc;
use gears::{ConfigurationError, IngestError, MappingConfig, normalize, output};
use regex::Regex;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn write_file(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    path
}

#[test]
fn vendor_a_basic() {
    let (table, report) = normalize(
        fixture("gps_vendor_a.csv"),
        fixture("config/gps_vendor_a.yaml"),
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("a.csv");
    output::write_table(&table, &out).unwrap();
    let text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(text.lines().next().unwrap(), GPS_COLUMNS.join(","));

    // 36 km/h == 10 m/s
    assert!((table.rows()[2].speed_mps.unwrap() - 10.0).abs() < 1e-6);

    let iso = Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z$").unwrap();
    assert!(table.iter().all(|r| iso.is_match(&format_utc(&r.ts))));
    // 08:00 EST
    assert_eq!(format_utc(&table.rows()[0].ts), "2024-03-05T13:00:00Z");

    assert_eq!(report.rows_in, 3);
    assert_eq!(report.rows_out, 3);
    assert_eq!(report.dropped_rows, 0);
    assert_eq!(report.pct_missing_speed, 0.0);
    assert_eq!(report.p95_inter_ping_seconds_median_across_vehicles, 5.0);
}

#[test]
fn vendor_b_stopwatch_header_time() {
    let (table, report) = normalize(
        fixture("gps_vendor_b.csv"),
        fixture("config/gps_vendor_b.yaml"),
    )
    .unwrap();

    assert_eq!(table.len(), 3);
    assert_eq!(format_utc(&table.rows()[0].ts), "2016-06-29T14:23:50Z");
    assert_eq!(format_utc(&table.rows()[2].ts), "2016-06-29T14:23:52Z");
    assert_eq!(table.rows()[0].heading_deg, Some(180.5));
    assert_eq!(table.rows()[0].vehicle_id, "gps_vendor_b");

    // no speed column: missing, not zero
    assert!(table.iter().all(|r| r.speed_mps.is_none()));
    assert_eq!(report.pct_missing_speed, 100.0);
}

#[test]
fn unmapped_heading_is_all_missing() {
    let dir = tempfile::tempdir().unwrap();
    let mapping = write_file(
        &dir,
        "no_heading.yaml",
        "time:\n  start_time_header: StartTime\n  seconds_column: Seconds\n  input_tz: America/Los_Angeles\ncolumns:\n  lat: Latitude\n  lon: Longitude\n",
    );
    let (table, report) = normalize(fixture("gps_vendor_b.csv"), &mapping).unwrap();

    assert_eq!(report.rows_out, 3);
    assert!(table.iter().all(|r| r.heading_deg.is_none()));

    let out = dir.path().join("b.csv");
    output::write_table(&table, &out).unwrap();
    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.lines().skip(1).all(|line| line.ends_with(",,")));
}

#[test]
fn unresolved_lat_lon_is_configuration_error() {
    let err = normalize(
        fixture("gps_vendor_a.csv"),
        fixture("config/gps_vendor_b.yaml"),
    )
    .unwrap_err();

    let IngestError::Config(ConfigurationError::MissingColumns { missing, available }) = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(missing, &["lat", "lon"]);
    assert_eq!(available, &["DeviceId", "GpsTime", "Lat", "Lng", "Speed_kmh", "Course"]);
    assert!(err.to_string().contains("Have columns"));
}

#[test]
fn rerun_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let mut outputs = Vec::new();
    for i in 0..2 {
        let (table, report) = normalize(
            fixture("gps_vendor_a.csv"),
            fixture("config/gps_vendor_a.yaml"),
        )
        .unwrap();
        let table_path = dir.path().join(format!("run{i}.csv"));
        let report_path = dir.path().join(format!("run{i}.json"));
        output::write_table(&table, &table_path).unwrap();
        output::write_report(&report, &report_path).unwrap();
        outputs.push((
            std::fs::read(&table_path).unwrap(),
            std::fs::read(&report_path).unwrap(),
        ));
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn output_invariants_hold_on_messy_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_file(
        &dir,
        "messy.csv",
        "# exported by vendor-c\n\
         VEHICLE,Timestamp,LAT,LON,SPEED\n\
         v2,2024-06-01T10:00:03Z,45.0,7.0,3\n\
         v1,2024-06-01T10:00:09Z,45.1,7.1,4\n\
         v1,2024-06-01T10:00:01Z,-91.0,7.1,4\n\
         v1,2024-06-01T10:00:01Z,45.2,181.0,4\n\
         v1,2024-06-01T10:00:02Z,45.3,7.3,\n\
         v1,2024-06-01T10:00:02Z,45.3,7.3,9\n\
         v2,2024-06-01T10:00:01Z,45.0,7.0,NA\n\
         v1,2024-06-01T10:00:02Z,45.4,7.4,1\n",
    );
    let mapping = write_file(
        &dir,
        "map.yaml",
        "time:\n  is_iso_utc: true\ncolumns:\n  vehicle_id: vehicle\n  ts: timestamp\n  lat: lat\n  lon: lon\n  speed: speed\n",
    );

    let (table, report) = normalize(&input, &mapping).unwrap();
    let rows = table.rows();

    assert!(rows.iter().all(|r| (-90.0..=90.0).contains(&r.lat)));
    assert!(rows.iter().all(|r| (-180.0..=180.0).contains(&r.lon)));
    assert!(rows.windows(2).all(|w| (&w[0].vehicle_id, w[0].ts) <= (&w[1].vehicle_id, w[1].ts)));
    for (i, a) in rows.iter().enumerate() {
        for b in &rows[i + 1..] {
            let same_ping =
                a.vehicle_id == b.vehicle_id && a.ts == b.ts && a.lat == b.lat && a.lon == b.lon;
            assert!(!same_ping);
        }
    }

    // ties keep input order: 45.3 (missing speed) before 45.4
    let v1: Vec<(f64, Option<f64>)> = rows
        .iter()
        .filter(|r| r.vehicle_id == "v1")
        .map(|r| (r.lat, r.speed_mps))
        .collect();
    assert_eq!(v1, vec![(45.3, None), (45.4, Some(1.0)), (45.1, Some(4.0))]);

    assert_eq!(report.rows_in, 8);
    assert_eq!(report.rows_out, 5);
    assert_eq!(report.dropped_rows, 3);
    assert!((report.pct_missing_speed - 40.0).abs() < 1e-9);
    // v1 deltas [0, 7] -> p95 6.65; v2 deltas [2] -> 2; median 4.325
    assert!((report.p95_inter_ping_seconds_median_across_vehicles - 4.325).abs() < 1e-9);
}

#[test]
fn parquet_input_has_no_header_block() {
    let dir = tempfile::tempdir().unwrap();
    let (table, _) = normalize(
        fixture("gps_vendor_a.csv"),
        fixture("config/gps_vendor_a.yaml"),
    )
    .unwrap();
    let parquet_path = dir.path().join("veh.parquet");
    output::write_table(&table, &parquet_path).unwrap();

    let canonical = write_file(
        &dir,
        "canonical.yaml",
        "time:\n  is_iso_utc: true\ncolumns:\n  vehicle_id: vehicle_id\n  ts: ts\n  lat: lat\n  lon: lon\n  speed: speed_mps\n  heading: heading_deg\n",
    );
    let (again, report) = normalize(&parquet_path, &canonical).unwrap();
    assert_eq!(again, table);
    assert_eq!(report.rows_out, 3);

    let stopwatch = write_file(
        &dir,
        "stopwatch.yaml",
        "time:\n  start_time_header: StartTime\n  seconds_column: ts\ncolumns:\n  lat: lat\n  lon: lon\n",
    );
    let err = normalize(&parquet_path, &stopwatch).unwrap_err();
    assert!(matches!(
        err,
        IngestError::Config(ConfigurationError::MissingHeaderKey { ref available, .. })
            if available.is_empty()
    ));
}

#[test]
fn missing_mapping_file_is_io_error() {
    let err = normalize(fixture("gps_vendor_a.csv"), fixture("config/absent.yaml")).unwrap_err();
    assert!(matches!(err, IngestError::Io { .. }));

    let loaded = MappingConfig::load(fixture("config/gps_vendor_b.yaml")).unwrap();
    assert_eq!(loaded.time.stopwatch(), Some(("StartTime", "Seconds")));
}
