//! Timestamp parsing, time zone localization and the two reconstruction
//! strategies (direct column vs. header start time plus stopwatch seconds).

use std::sync::LazyLock;

use chrono::offset::LocalResult;
use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, SubsecRound, TimeDelta, TimeZone, Timelike,
    Utc,
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Serializer;

use crate::parsers::parse_f64;

/// Canonical output format; sub-second precision is dropped.
pub const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %I:%M:%S%.f %p",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

// Longest DST gap in the tz database is one hour; a day of minutes is plenty.
const MAX_GAP_MINUTES: i64 = 24 * 60;

static OFFSET_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<body>.*\d:\d{2}(?::\d{2}(?:\.\d+)?)?(?:\s*[AaPp][Mm])?)\s*(?P<offset>[Zz]|[+-]\d{2}(?::?\d{2})?)$",
    )
    .expect("offset suffix pattern is valid")
});

/// A parsed source timestamp, with or without an explicit UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsedTimestamp {
    Naive(NaiveDateTime),
    Aware(DateTime<FixedOffset>),
}

/// Result of turning one source cell into a UTC instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    At(DateTime<Utc>),
    /// Local wall time falls in a DST fold
    Ambiguous,
    Missing,
}

impl Stamp {
    pub fn instant(self) -> Option<DateTime<Utc>> {
        match self {
            Stamp::At(ts) => Some(ts),
            Stamp::Ambiguous | Stamp::Missing => None,
        }
    }
}

/// How the `ts` column is rebuilt, chosen once per run.
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampStrategy {
    /// Parse a timestamp column directly.
    Direct {
        column: String,
        /// Naive values are UTC rather than `tz` local time
        assume_utc: bool,
        tz: Tz,
    },
    /// Header start time plus per-row elapsed seconds.
    Stopwatch {
        start: Stamp,
        seconds_column: String,
    },
}

impl TimestampStrategy {
    /// Build the stopwatch variant from the raw header value.
    pub fn stopwatch(start_value: &str, tz: Tz, seconds_column: impl Into<String>) -> Self {
        let start = match parse_timestamp(start_value) {
            Some(ParsedTimestamp::Naive(naive)) => localize(naive, tz),
            Some(ParsedTimestamp::Aware(dt)) => Stamp::At(dt.with_timezone(&Utc)),
            None => Stamp::Missing,
        };
        TimestampStrategy::Stopwatch {
            start,
            seconds_column: seconds_column.into(),
        }
    }

    /// Raw column the strategy reads one cell from per row.
    pub fn source_column(&self) -> &str {
        match self {
            TimestampStrategy::Direct { column, .. } => column,
            TimestampStrategy::Stopwatch { seconds_column, .. } => seconds_column,
        }
    }

    /// Resolve one cell of [`Self::source_column`], truncated to whole seconds.
    pub fn resolve(&self, cell: Option<&str>) -> Stamp {
        let stamp = match self {
            TimestampStrategy::Direct {
                assume_utc, tz, ..
            } => match cell.and_then(parse_timestamp) {
                Some(ParsedTimestamp::Aware(dt)) => Stamp::At(dt.with_timezone(&Utc)),
                Some(ParsedTimestamp::Naive(naive)) if *assume_utc => Stamp::At(naive.and_utc()),
                Some(ParsedTimestamp::Naive(naive)) => localize(naive, *tz),
                None => Stamp::Missing,
            },
            TimestampStrategy::Stopwatch { start, .. } => match *start {
                Stamp::At(start) => cell
                    .and_then(parse_f64)
                    .and_then(seconds_to_delta)
                    .and_then(|offset| start.checked_add_signed(offset))
                    .map_or(Stamp::Missing, Stamp::At),
                other => other,
            },
        };

        match stamp {
            Stamp::At(ts) => Stamp::At(ts.trunc_subsecs(0)),
            other => other,
        }
    }
}

/// Parse the timestamp shapes vendors emit; `None` if nothing fits.
pub fn parse_timestamp(value: &str) -> Option<ParsedTimestamp> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Some(caps) = OFFSET_SUFFIX.captures(value) {
        let naive = parse_naive(caps["body"].trim())?;
        let offset = parse_offset(&caps["offset"])?;
        return match offset.from_local_datetime(&naive) {
            LocalResult::Single(dt) => Some(ParsedTimestamp::Aware(dt)),
            _ => None,
        };
    }

    parse_naive(value).map(ParsedTimestamp::Naive)
}

fn parse_naive(value: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    if raw.eq_ignore_ascii_case("z") {
        return FixedOffset::east_opt(0);
    }
    let (sign, digits) = raw.split_at(1);
    let digits = digits.replace(':', "");
    let hours: i32 = digits.get(..2)?.parse().ok()?;
    let minutes: i32 = match digits.get(2..) {
        Some("") | None => 0,
        Some(m) => m.parse().ok()?,
    };
    let secs = hours * 3600 + minutes * 60;
    match sign {
        "-" => FixedOffset::west_opt(secs),
        _ => FixedOffset::east_opt(secs),
    }
}

/// Attach `tz` to a local wall time.
///
/// Wall times inside a DST gap move forward to the first wall time that exists
/// after the gap. Wall times inside a DST fold are [`Stamp::Ambiguous`].
pub fn localize(naive: NaiveDateTime, tz: Tz) -> Stamp {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Stamp::At(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(_, _) => Stamp::Ambiguous,
        LocalResult::None => shift_forward(naive, tz),
    }
}

fn shift_forward(naive: NaiveDateTime, tz: Tz) -> Stamp {
    let Some(floor) = naive.with_second(0).and_then(|n| n.with_nanosecond(0)) else {
        return Stamp::Missing;
    };
    (1..=MAX_GAP_MINUTES)
        .filter_map(|minutes| floor.checked_add_signed(TimeDelta::minutes(minutes)))
        .find_map(|candidate| tz.from_local_datetime(&candidate).earliest())
        .map_or(Stamp::Missing, |dt| Stamp::At(dt.with_timezone(&Utc)))
}

fn seconds_to_delta(seconds: f64) -> Option<TimeDelta> {
    let nanos = (seconds * 1e9).round();
    if !nanos.is_finite() || nanos.abs() >= i64::MAX as f64 {
        return None;
    }
    Some(TimeDelta::nanoseconds(nanos as i64))
}

pub fn format_utc(ts: &DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

pub fn serialize_utc<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&ts.format(TS_FORMAT))
}
