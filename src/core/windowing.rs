//! Fixed-width window aggregation.
//!
//! Cleaned events are bucketed into epoch-aligned windows per house and room.
//! Every room observed in a house gets a row for every window of that house's
//! span, so the resulting series never has implicit gaps.

use crate::core::DataError;
use crate::loader::types::{CleanedEvent, MotionState};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Window length used for aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Granularity {
    HalfHourly,
    Hourly,
    Daily,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [
        Granularity::HalfHourly,
        Granularity::Hourly,
        Granularity::Daily,
    ];

    /// Window length in seconds.
    pub fn seconds(&self) -> i64 {
        match self {
            Granularity::HalfHourly => 30 * 60,
            Granularity::Hourly => 60 * 60,
            Granularity::Daily => 24 * 60 * 60,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.seconds())
    }

    /// Start of the window containing `ts`.
    pub fn floor(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let rem = ts.timestamp().rem_euclid(self.seconds());
        ts - Duration::seconds(rem) - Duration::nanoseconds(i64::from(ts.timestamp_subsec_nanos()))
    }

    /// Smallest window boundary at or after `ts`, or `None` past the last
    /// representable boundary.
    pub fn ceil(&self, ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let floor = self.floor(ts);
        if floor == ts {
            Some(floor)
        } else {
            floor.checked_add_signed(self.duration())
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::HalfHourly => "half-hourly",
            Granularity::Hourly => "hourly",
            Granularity::Daily => "daily",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "half-hourly" | "half_hourly" | "30min" => Ok(Granularity::HalfHourly),
            "hourly" | "1h" => Ok(Granularity::Hourly),
            "daily" | "1d" => Ok(Granularity::Daily),
            other => Err(format!(
                "unknown granularity '{other}' (expected hourly, half-hourly or daily)"
            )),
        }
    }
}

/// Which events contribute to a window's count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CountMode {
    /// Every cleaned event.
    #[default]
    All,
    /// Only transitions into the `on` state.
    MotionOn,
}

impl CountMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CountMode::All => "all",
            CountMode::MotionOn => "motion-on",
        }
    }

    fn counts(&self, state: MotionState) -> bool {
        match self {
            CountMode::All => true,
            CountMode::MotionOn => state == MotionState::On,
        }
    }
}

impl fmt::Display for CountMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CountMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(CountMode::All),
            "motion-on" | "motion_on" | "on" => Ok(CountMode::MotionOn),
            other => Err(format!("unknown count mode '{other}' (expected all or motion-on)")),
        }
    }
}

/// Fixed analysis period shared by every house. `end` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AnalysisRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DataError> {
        if end <= start {
            return Err(DataError::EmptyRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Event count for one (house, room, window).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowedCount {
    pub house_id: String,
    pub room_id: String,
    pub window_start: DateTime<Utc>,
    pub window_length_secs: i64,
    pub event_count: u64,
}

impl WindowedCount {
    pub fn window_end(&self) -> DateTime<Utc> {
        self.window_start + Duration::seconds(self.window_length_secs)
    }
}

/// Result of aggregation.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Ordered by house, room, window start.
    pub counts: Vec<WindowedCount>,
    /// Events ignored because they fell outside the analysis range.
    pub out_of_range: usize,
    /// Houses whose every event fell outside the analysis range. Sorted.
    pub out_of_range_houses: Vec<String>,
}

/// Buckets cleaned events into zero-filled windows.
#[derive(Debug, Clone)]
pub struct WindowAggregator {
    granularity: Granularity,
    count_mode: CountMode,
    range: Option<AnalysisRange>,
}

impl WindowAggregator {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            count_mode: CountMode::default(),
            range: None,
        }
    }

    pub fn with_count_mode(mut self, count_mode: CountMode) -> Self {
        self.count_mode = count_mode;
        self
    }

    pub fn with_range(mut self, range: Option<AnalysisRange>) -> Self {
        self.range = range;
        self
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Aggregate events into windowed counts.
    ///
    /// Without an analysis range a house's span runs from the window holding
    /// its first event to the window holding its last. With a range, every
    /// house uses the range widened to window boundaries.
    pub fn aggregate(&self, events: &[CleanedEvent]) -> Aggregation {
        let mut houses: BTreeMap<&str, BTreeMap<&str, Vec<&CleanedEvent>>> = BTreeMap::new();
        let mut out_of_range = 0;
        let mut skipped_houses: BTreeSet<&str> = BTreeSet::new();

        for event in events {
            if let Some(range) = &self.range {
                if !range.contains(event.timestamp) {
                    out_of_range += 1;
                    skipped_houses.insert(event.house_id.as_str());
                    continue;
                }
            }
            houses
                .entry(event.house_id.as_str())
                .or_default()
                .entry(event.room_id.as_str())
                .or_default()
                .push(event);
        }

        if out_of_range > 0 {
            warn!(out_of_range, "ignored events outside the analysis range");
        }
        let out_of_range_houses: Vec<String> = skipped_houses
            .into_iter()
            .filter(|house_id| !houses.contains_key(house_id))
            .map(str::to_string)
            .collect();

        let length = self.granularity.seconds();
        let mut counts = Vec::new();

        for (house_id, rooms) in &houses {
            let Some((span_start, n_windows)) = self.house_span(rooms) else {
                warn!(house_id, "house span is not representable, skipping");
                continue;
            };

            for (room_id, room_events) in rooms {
                let mut buckets = vec![0u64; n_windows];
                for event in room_events {
                    if !self.count_mode.counts(event.state) {
                        continue;
                    }
                    let offset = (self.granularity.floor(event.timestamp) - span_start).num_seconds();
                    let index = (offset / length) as usize;
                    if let Some(bucket) = buckets.get_mut(index) {
                        *bucket += 1;
                    }
                }

                counts.extend(buckets.into_iter().enumerate().map(|(i, event_count)| {
                    WindowedCount {
                        house_id: house_id.to_string(),
                        room_id: room_id.to_string(),
                        window_start: span_start + Duration::seconds(i as i64 * length),
                        window_length_secs: length,
                        event_count,
                    }
                }));
            }

            debug!(house_id, rooms = rooms.len(), windows = n_windows, "house aggregated");
        }

        info!(
            granularity = %self.granularity,
            houses = houses.len(),
            rows = counts.len(),
            "aggregated events into windows"
        );

        Aggregation {
            counts,
            out_of_range,
            out_of_range_houses,
        }
    }

    /// First window start and number of windows for a house.
    fn house_span(
        &self,
        rooms: &BTreeMap<&str, Vec<&CleanedEvent>>,
    ) -> Option<(DateTime<Utc>, usize)> {
        let (start, end) = match &self.range {
            Some(range) => (
                self.granularity.floor(range.start),
                self.granularity.ceil(range.end)?,
            ),
            None => {
                let timestamps = rooms.values().flatten().map(|e| e.timestamp);
                let first = timestamps.clone().min()?;
                let last = timestamps.max()?;
                (
                    self.granularity.floor(first),
                    self.granularity
                        .floor(last)
                        .checked_add_signed(self.granularity.duration())?,
                )
            }
        };

        let n_windows = ((end - start).num_seconds() / self.granularity.seconds()) as usize;
        Some((start, n_windows))
    }
}

/// Check that a single house/room series is contiguous and uniform.
///
/// `series` must be ordered by window start.
pub fn validate_series(series: &[WindowedCount]) -> Result<(), DataError> {
    let Some(first) = series.first() else {
        return Ok(());
    };

    for pair in series.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if next.window_length_secs != first.window_length_secs {
            return Err(DataError::MixedWindowLength {
                house_id: next.house_id.clone(),
                expected: first.window_length_secs,
                found: next.window_length_secs,
            });
        }
        if next.window_start != prev.window_end() {
            return Err(DataError::NonContiguousWindows {
                house_id: next.house_id.clone(),
                room_id: next.room_id.clone(),
                at: next.window_start,
            });
        }
    }

    Ok(())
}
