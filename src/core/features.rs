//! Per-house feature matrices.
//!
//! Windowed counts are reshaped into one matrix per house (windows × rooms)
//! and paired with the house's occupancy label. Houses that cannot be used
//! are reported, never silently dropped.

use crate::core::windowing::{validate_series, WindowedCount};
use crate::core::DataError;
use crate::loader::types::{Occupancy, OccupancyLabel};
use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

/// Multivariate count series for one house.
#[derive(Debug, Clone, PartialEq)]
pub struct HouseFeatureMatrix {
    pub house_id: String,
    /// Column labels of `counts`.
    pub rooms: Vec<String>,
    /// Row labels of `counts`.
    pub window_starts: Vec<DateTime<Utc>>,
    pub window_length_secs: i64,
    /// Shape `(windows, rooms)`.
    pub counts: Array2<f64>,
}

impl HouseFeatureMatrix {
    pub fn n_windows(&self) -> usize {
        self.counts.nrows()
    }

    pub fn n_rooms(&self) -> usize {
        self.counts.ncols()
    }

    /// Count series for a room, if the matrix has that column.
    pub fn room_series(&self, room_id: &str) -> Option<ArrayView1<'_, f64>> {
        self.rooms
            .iter()
            .position(|r| r == room_id)
            .map(|i| self.counts.column(i))
    }

    /// Total events per room.
    pub fn room_totals(&self) -> Vec<f64> {
        self.counts.sum_axis(Axis(0)).to_vec()
    }
}

/// A feature matrix with its ground truth.
#[derive(Debug, Clone)]
pub struct LabeledHouse {
    pub matrix: HouseFeatureMatrix,
    pub label: Occupancy,
}

impl LabeledHouse {
    pub fn house_id(&self) -> &str {
        &self.matrix.house_id
    }

    pub fn occupancy_label(&self) -> OccupancyLabel {
        OccupancyLabel::new(&self.matrix.house_id, self.label)
    }
}

/// Why a house was left out of the feature set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// No counted sensor events survived cleaning.
    NoEvents,
    /// Has sensor events, but no occupancy label.
    NoLabel,
    /// Every event fell outside the analysis range.
    OutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub house_id: String,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionReport {
    pub excluded: Vec<Exclusion>,
}

impl ExclusionReport {
    pub fn count(&self, reason: ExclusionReason) -> usize {
        self.excluded.iter().filter(|e| e.reason == reason).count()
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }

    /// Record houses that lost every event to the analysis range.
    ///
    /// An existing exclusion for such a house is re-labelled; a house that
    /// was never seen downstream (no windows, no label) is added.
    pub fn mark_out_of_range(&mut self, house_ids: &[String]) {
        for house_id in house_ids {
            match self.excluded.iter_mut().find(|e| &e.house_id == house_id) {
                Some(existing) => {
                    existing.reason = ExclusionReason::OutOfRange;
                    warn_excluded(house_id, ExclusionReason::OutOfRange);
                }
                None => self.push(house_id, ExclusionReason::OutOfRange),
            }
        }
        self.excluded.sort_by(|a, b| a.house_id.cmp(&b.house_id));
    }

    fn push(&mut self, house_id: &str, reason: ExclusionReason) {
        warn_excluded(house_id, reason);
        self.excluded.push(Exclusion {
            house_id: house_id.to_string(),
            reason,
        });
    }
}

fn warn_excluded(house_id: &str, reason: ExclusionReason) {
    match reason {
        ExclusionReason::NoEvents => warn!(house_id, "excluding house: no sensor events"),
        ExclusionReason::NoLabel => {
            warn!(house_id, "excluding house: has sensor events but no label")
        }
        ExclusionReason::OutOfRange => {
            warn!(house_id, "excluding house: all events outside the analysis range")
        }
    }
}

/// Labelled matrices sharing one room set.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    /// Ordered by house id.
    pub houses: Vec<LabeledHouse>,
    /// Union of rooms over the included houses; every matrix uses this column order.
    pub rooms: Vec<String>,
    pub exclusions: ExclusionReport,
}

impl FeatureSet {
    pub fn house_ids(&self) -> Vec<String> {
        self.houses.iter().map(|h| h.house_id().to_string()).collect()
    }

    pub fn get(&self, house_id: &str) -> Option<&LabeledHouse> {
        self.houses.iter().find(|h| h.house_id() == house_id)
    }

    /// Houses in the order of `ids`, skipping unknown ids.
    pub fn select(&self, ids: &[String]) -> Vec<&LabeledHouse> {
        ids.iter().filter_map(|id| self.get(id)).collect()
    }
}

/// Build labelled feature matrices from windowed counts.
///
/// A room a house never reported becomes a zero column, so every matrix has
/// the same room dimension.
pub fn build_feature_set(
    counts: &[WindowedCount],
    labels: &[OccupancyLabel],
) -> Result<FeatureSet, DataError> {
    let mut by_house: BTreeMap<&str, BTreeMap<&str, Vec<WindowedCount>>> = BTreeMap::new();
    for count in counts {
        by_house
            .entry(count.house_id.as_str())
            .or_default()
            .entry(count.room_id.as_str())
            .or_default()
            .push(count.clone());
    }

    let label_map: BTreeMap<&str, Occupancy> = labels
        .iter()
        .map(|l| (l.house_id.as_str(), l.label))
        .collect();

    let all_ids: BTreeSet<&str> = by_house.keys().chain(label_map.keys()).copied().collect();
    let mut exclusions = ExclusionReport::default();
    let mut included = Vec::new();

    for house_id in all_ids {
        let has_events = by_house
            .get(house_id)
            .map(|rooms| rooms.values().flatten().any(|c| c.event_count > 0))
            .unwrap_or(false);

        match (has_events, label_map.get(house_id)) {
            (true, Some(&label)) => included.push((house_id, label)),
            (false, Some(_)) => exclusions.push(house_id, ExclusionReason::NoEvents),
            (true, None) => exclusions.push(house_id, ExclusionReason::NoLabel),
            // Only zero counts: unusable whatever the label
            (false, None) => exclusions.push(house_id, ExclusionReason::NoEvents),
        }
    }

    let rooms: Vec<String> = included
        .iter()
        .filter_map(|(house_id, _)| by_house.get(house_id))
        .flat_map(|rooms| rooms.keys().map(|r| r.to_string()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut houses = Vec::with_capacity(included.len());
    for (house_id, label) in included {
        let Some(house_rooms) = by_house.get_mut(house_id) else {
            continue;
        };
        let matrix = house_matrix(house_id, house_rooms, &rooms)?;
        houses.push(LabeledHouse { matrix, label });
    }

    info!(
        houses = houses.len(),
        rooms = rooms.len(),
        excluded = exclusions.excluded.len(),
        "feature set built"
    );

    Ok(FeatureSet {
        houses,
        rooms,
        exclusions,
    })
}

fn house_matrix(
    house_id: &str,
    house_rooms: &mut BTreeMap<&str, Vec<WindowedCount>>,
    rooms: &[String],
) -> Result<HouseFeatureMatrix, DataError> {
    for series in house_rooms.values_mut() {
        series.sort_by_key(|c| c.window_start);
        validate_series(series)?;
    }

    let mut reference: Option<&Vec<WindowedCount>> = None;
    for series in house_rooms.values() {
        match reference {
            None => reference = Some(series),
            Some(first) => {
                let aligned = first.len() == series.len()
                    && first.first().map(|c| (c.window_start, c.window_length_secs))
                        == series.first().map(|c| (c.window_start, c.window_length_secs));
                if !aligned {
                    return Err(DataError::MisalignedRooms(house_id.to_string()));
                }
            }
        }
    }

    let reference = reference.cloned().unwrap_or_default();
    let window_starts: Vec<DateTime<Utc>> = reference.iter().map(|c| c.window_start).collect();
    let window_length_secs = reference.first().map(|c| c.window_length_secs).unwrap_or(0);

    let mut counts = Array2::<f64>::zeros((window_starts.len(), rooms.len()));
    for (col, room) in rooms.iter().enumerate() {
        if let Some(series) = house_rooms.get(room.as_str()) {
            for (row, count) in series.iter().enumerate() {
                counts[[row, col]] = count.event_count as f64;
            }
        }
    }

    Ok(HouseFeatureMatrix {
        house_id: house_id.to_string(),
        rooms: rooms.to_vec(),
        window_starts,
        window_length_secs,
        counts,
    })
}
