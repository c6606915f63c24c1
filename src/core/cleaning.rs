//! Event cleaning.
//!
//! Parses raw rows into typed events, drops rows that cannot be interpreted
//! and removes exact duplicates. Gaps in the data are left alone here; the
//! aggregator zero-fills them.

use crate::loader::types::{CleanedEvent, MotionState, RawEvent};
use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Why a raw row was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    MissingField,
    InvalidTimestamp,
    InvalidState,
    Duplicate,
}

/// Row counts for one cleaning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub input_rows: usize,
    pub kept_rows: usize,
    pub missing_field: usize,
    pub invalid_timestamp: usize,
    pub invalid_state: usize,
    pub duplicates: usize,
}

impl CleaningReport {
    fn record(&mut self, reason: DropReason) {
        match reason {
            DropReason::MissingField => self.missing_field += 1,
            DropReason::InvalidTimestamp => self.invalid_timestamp += 1,
            DropReason::InvalidState => self.invalid_state += 1,
            DropReason::Duplicate => self.duplicates += 1,
        }
    }

    /// Total number of dropped rows.
    pub fn dropped(&self) -> usize {
        self.missing_field + self.invalid_timestamp + self.invalid_state + self.duplicates
    }

    /// Count for a single reason.
    pub fn count(&self, reason: DropReason) -> usize {
        match reason {
            DropReason::MissingField => self.missing_field,
            DropReason::InvalidTimestamp => self.invalid_timestamp,
            DropReason::InvalidState => self.invalid_state,
            DropReason::Duplicate => self.duplicates,
        }
    }
}

/// Output of a cleaning pass.
#[derive(Debug, Clone, Default)]
pub struct Cleaned {
    /// Sorted by house, room, timestamp, sensor.
    pub events: Vec<CleanedEvent>,
    pub report: CleaningReport,
}

/// Clean a batch of raw events.
pub fn clean_events(raw: &[RawEvent]) -> Cleaned {
    let mut report = CleaningReport {
        input_rows: raw.len(),
        ..Default::default()
    };

    let mut events = Vec::with_capacity(raw.len());
    for row in raw {
        match parse_row(row) {
            Ok(event) => events.push(event),
            Err(reason) => report.record(reason),
        }
    }

    events.sort();
    let before = events.len();
    events.dedup();
    report.duplicates = before - events.len();
    report.kept_rows = events.len();

    if report.dropped() > 0 {
        warn!(
            missing_field = report.missing_field,
            invalid_timestamp = report.invalid_timestamp,
            invalid_state = report.invalid_state,
            duplicates = report.duplicates,
            "dropped {} of {} raw rows",
            report.dropped(),
            report.input_rows
        );
    }
    info!(kept = report.kept_rows, "cleaning complete");

    Cleaned { events, report }
}

fn parse_row(row: &RawEvent) -> Result<CleanedEvent, DropReason> {
    let house_id = non_empty(&row.house_id).ok_or(DropReason::MissingField)?;
    let room_id = non_empty(&row.room_id).ok_or(DropReason::MissingField)?;
    let sensor_id = non_empty(&row.sensor_id).ok_or(DropReason::MissingField)?;

    let timestamp = row
        .timestamp
        .as_deref()
        .and_then(parse_timestamp)
        .filter(|ts| is_plausible(*ts))
        .ok_or(DropReason::InvalidTimestamp)?;

    let state = row
        .state
        .as_deref()
        .and_then(MotionState::parse)
        .ok_or(DropReason::InvalidState)?;

    Ok(CleanedEvent {
        house_id,
        room_id,
        timestamp,
        sensor_id,
        state,
    })
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Calendar years a sensor reading can plausibly carry.
const PLAUSIBLE_YEARS: std::ops::RangeInclusive<i32> = 1970..=2100;

/// Whether `ts` falls in `PLAUSIBLE_YEARS`. Readings outside it are
/// corrupt and would otherwise stretch a house's span to millions of windows.
pub fn is_plausible(ts: DateTime<Utc>) -> bool {
    PLAUSIBLE_YEARS.contains(&ts.year())
}

/// Naive formats are taken as UTC.
const NAIVE_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parse a stored timestamp.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff][+HH:MM]`, naive date-times
/// (UTC) and Unix seconds (integer or fractional).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    if let Ok(ts) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(ts.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    if let Ok(secs) = value.parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single();
    }

    match value.parse::<f64>() {
        Ok(secs) if secs.is_finite() => {
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
            Utc.timestamp_opt(whole as i64, nanos).single()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2020, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2020-01-01T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2020-01-01 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2020-01-01 11:00:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp("2020-01-01 10:00"), Some(expected));
        assert_eq!(parse_timestamp("1577872800"), Some(expected));
        assert_eq!(parse_timestamp("1577872800.0"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("   "), None);
        assert_eq!(parse_timestamp("NaN"), None);
    }

    #[test]
    fn test_drops_are_counted_by_reason() {
        let raw = vec![
            RawEvent::new("h1", "kitchen", "m1", "2020-01-01 10:00:00", "on"),
            RawEvent::new("h1", "kitchen", "m1", "2020-01-01 10:00:00", "on"),
            RawEvent::new("h1", "kitchen", "m1", "not a time", "on"),
            RawEvent::new("h1", "kitchen", "m1", "2020-01-01 10:01:00", "maybe"),
            RawEvent::new("h1", "", "m1", "2020-01-01 10:02:00", "on"),
            RawEvent {
                timestamp: None,
                ..RawEvent::new("h1", "kitchen", "m1", "", "off")
            },
            RawEvent::new("h1", "kitchen", "m1", "2020-01-01 10:00:00", "off"),
        ];

        let cleaned = clean_events(&raw);
        assert_eq!(cleaned.report.input_rows, 7);
        assert_eq!(cleaned.report.kept_rows, 2);
        assert_eq!(cleaned.report.duplicates, 1);
        assert_eq!(cleaned.report.invalid_timestamp, 2);
        assert_eq!(cleaned.report.invalid_state, 1);
        assert_eq!(cleaned.report.missing_field, 1);
        assert_eq!(cleaned.report.dropped(), 5);
        assert_eq!(cleaned.report.count(DropReason::Duplicate), 1);
    }

    #[test]
    fn test_out_of_calendar_timestamps_dropped() {
        let raw = vec![
            RawEvent::new("h1", "hall", "m1", "8210266876000", "on"),
            RawEvent::new("h1", "hall", "m1", "99999999999", "on"),
            RawEvent::new("h1", "hall", "m1", "1969-12-31 23:59:59", "on"),
            RawEvent::new("h1", "hall", "m1", "2020-01-01 10:00:00", "on"),
        ];
        let cleaned = clean_events(&raw);
        assert_eq!(cleaned.report.kept_rows, 1);
        assert_eq!(cleaned.report.invalid_timestamp, 3);

        // Parsing alone still succeeds
        assert!(parse_timestamp("99999999999").is_some());
        assert!(!is_plausible(parse_timestamp("99999999999").unwrap()));
    }

    #[test]
    fn test_equivalent_encodings_are_duplicates() {
        let raw = vec![
            RawEvent::new("h1", "hall", "m1", "2020-01-01 10:00:00", "on"),
            RawEvent::new("h1", "hall", "m1", "2020-01-01T10:00:00Z", "1"),
        ];
        let cleaned = clean_events(&raw);
        assert_eq!(cleaned.events.len(), 1);
        assert_eq!(cleaned.report.duplicates, 1);
    }

    #[test]
    fn test_output_is_sorted() {
        let raw = vec![
            RawEvent::new("h2", "hall", "m1", "2020-01-01 09:00:00", "on"),
            RawEvent::new("h1", "kitchen", "m1", "2020-01-01 11:00:00", "on"),
            RawEvent::new("h1", "kitchen", "m1", "2020-01-01 10:00:00", "on"),
        ];
        let cleaned = clean_events(&raw);
        let order: Vec<_> = cleaned
            .events
            .iter()
            .map(|e| (e.house_id.as_str(), e.timestamp.format("%H").to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("h1", "10".to_string()),
                ("h1", "11".to_string()),
                ("h2", "09".to_string())
            ]
        );
    }

    fn arb_raw_event() -> impl Strategy<Value = RawEvent> {
        (
            prop::sample::select(vec!["h1", "h2", ""]),
            prop::sample::select(vec!["kitchen", "bedroom"]),
            prop::sample::select(vec!["m1", "m2"]),
            0i64..7200,
            prop::sample::select(vec!["on", "off", "1", "bogus"]),
        )
            .prop_map(|(house, room, sensor, offset, state)| {
                let ts = (1_577_836_800 + offset * 30).to_string();
                RawEvent::new(house, room, sensor, &ts, state)
            })
    }

    proptest! {
        #[test]
        fn prop_cleaning_is_idempotent(raw in prop::collection::vec(arb_raw_event(), 0..200)) {
            let first = clean_events(&raw);
            let reraw: Vec<RawEvent> = first.events.iter().map(CleanedEvent::to_raw).collect();
            let second = clean_events(&reraw);

            prop_assert_eq!(second.report.dropped(), 0);
            prop_assert_eq!(second.events, first.events);
        }
    }
}
