//! Record types read from a sensor snapshot.
//!
//! Raw rows keep every field as nullable text, exactly as stored. The cleaner
//! turns them into typed [`CleanedEvent`]s.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A motion-sensor row as read from the snapshot.
///
/// Nothing is validated at this stage; missing columns come through as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub house_id: Option<String>,
    pub room_id: Option<String>,
    pub sensor_id: Option<String>,
    pub timestamp: Option<String>,
    pub state: Option<String>,
}

impl RawEvent {
    /// Build a fully populated raw row.
    pub fn new(house_id: &str, room_id: &str, sensor_id: &str, timestamp: &str, state: &str) -> Self {
        Self {
            house_id: Some(house_id.to_string()),
            room_id: Some(room_id.to_string()),
            sensor_id: Some(sensor_id.to_string()),
            timestamp: Some(timestamp.to_string()),
            state: Some(state.to_string()),
        }
    }
}

/// Motion sensor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionState {
    Off,
    On,
}

impl MotionState {
    /// Parse a stored state value. Returns `None` for anything out of range.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "on" | "1" | "true" | "active" => Some(MotionState::On),
            "off" | "0" | "false" | "inactive" => Some(MotionState::Off),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MotionState::On => "on",
            MotionState::Off => "off",
        }
    }
}

/// A validated motion event.
///
/// Field order matters: the derived ordering sorts by house, room, time, then sensor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CleanedEvent {
    pub house_id: String,
    pub room_id: String,
    pub timestamp: DateTime<Utc>,
    pub sensor_id: String,
    pub state: MotionState,
}

impl CleanedEvent {
    /// Render the event back into its canonical raw form.
    ///
    /// Timestamps use RFC 3339 with as many fractional digits as needed, so
    /// re-parsing yields the same instant.
    pub fn to_raw(&self) -> RawEvent {
        RawEvent {
            house_id: Some(self.house_id.clone()),
            room_id: Some(self.room_id.clone()),
            sensor_id: Some(self.sensor_id.clone()),
            timestamp: Some(self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            state: Some(self.state.as_str().to_string()),
        }
    }
}

/// Ground-truth occupancy class of a house.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occupancy {
    Single,
    Multiple,
}

impl Occupancy {
    pub const ALL: [Occupancy; 2] = [Occupancy::Single, Occupancy::Multiple];

    pub fn as_str(&self) -> &'static str {
        match self {
            Occupancy::Single => "single",
            Occupancy::Multiple => "multiple",
        }
    }
}

impl fmt::Display for Occupancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Occupancy {
    type Err = String;

    /// Accepts `single`/`multiple` or an occupant count.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_lowercase();
        match value.as_str() {
            "single" => return Ok(Occupancy::Single),
            "multiple" => return Ok(Occupancy::Multiple),
            _ => {}
        }

        match value.parse::<u32>() {
            Ok(1) => Ok(Occupancy::Single),
            Ok(n) if n >= 2 => Ok(Occupancy::Multiple),
            _ => Err(format!("unrecognised occupancy label '{s}'")),
        }
    }
}

/// Occupancy ground truth for one house.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupancyLabel {
    pub house_id: String,
    pub label: Occupancy,
}

impl OccupancyLabel {
    pub fn new(house_id: &str, label: Occupancy) -> Self {
        Self {
            house_id: house_id.to_string(),
            label,
        }
    }
}
