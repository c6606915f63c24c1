//! House-level train/test splitting and k-fold assignment.
//!
//! Splits operate on house ids, never on individual windows, so a house's
//! series cannot leak across partitions. All shuffling is seeded and runs over
//! the sorted id list, making a split a pure function of (ids, ratio, seed).

use crate::core::DataError;
use crate::loader::types::Occupancy;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Disjoint train/test partition of house ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub train: Vec<String>,
    pub test: Vec<String>,
}

impl Split {
    pub fn is_disjoint(&self) -> bool {
        let train: BTreeSet<&String> = self.train.iter().collect();
        self.test.iter().all(|id| !train.contains(id))
    }
}

/// Seeded splitter.
#[derive(Debug, Clone)]
pub struct Splitter {
    test_ratio: f64,
    seed: u64,
}

impl Splitter {
    pub fn new(test_ratio: f64, seed: u64) -> Result<Self, DataError> {
        if !(test_ratio > 0.0 && test_ratio < 1.0) {
            return Err(DataError::InvalidRatio(test_ratio));
        }
        Ok(Self { test_ratio, seed })
    }

    /// Split house ids into train and test.
    ///
    /// With at least two houses both partitions are non-empty.
    pub fn split(&self, house_ids: &[String]) -> Result<Split, DataError> {
        let mut ids = sorted_unique(house_ids.iter().cloned());
        if ids.len() < 2 {
            return Err(DataError::TooFewHouses {
                found: ids.len(),
                required: 2,
            });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        ids.shuffle(&mut rng);

        let n_test = self.test_size(ids.len()).clamp(1, ids.len() - 1);
        let test = ids.split_off(ids.len() - n_test);

        Ok(finish(ids, test))
    }

    /// Split so each label keeps roughly the same share in both partitions.
    ///
    /// A house listed twice must carry the same label both times.
    pub fn split_stratified(&self, houses: &[(String, Occupancy)]) -> Result<Split, DataError> {
        let mut labels: BTreeMap<&str, Occupancy> = BTreeMap::new();
        for (id, label) in houses {
            match labels.insert(id.as_str(), *label) {
                Some(previous) if previous != *label => {
                    return Err(DataError::ConflictingLabels(id.clone()));
                }
                _ => {}
            }
        }

        // Ids arrive sorted and unique per group
        let mut groups: BTreeMap<Occupancy, Vec<String>> = BTreeMap::new();
        for (id, label) in &labels {
            groups.entry(*label).or_default().push(id.to_string());
        }

        let total = labels.len();
        if total < 2 {
            return Err(DataError::TooFewHouses {
                found: total,
                required: 2,
            });
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut train = Vec::new();
        let mut test = Vec::new();

        for ids in groups.values_mut() {
            ids.shuffle(&mut rng);
            let n_test = self.test_size(ids.len()).min(ids.len());
            let group_test = ids.split_off(ids.len() - n_test);
            train.append(ids);
            test.extend(group_test);
        }

        // Small groups can round to an empty side
        if test.is_empty() {
            if let Some(id) = train.pop() {
                test.push(id);
            }
        } else if train.is_empty() {
            if let Some(id) = test.pop() {
                train.push(id);
            }
        }

        Ok(finish(train, test))
    }

    fn test_size(&self, n: usize) -> usize {
        (n as f64 * self.test_ratio).round() as usize
    }
}

fn sorted_unique(ids: impl Iterator<Item = String>) -> Vec<String> {
    ids.collect::<BTreeSet<_>>().into_iter().collect()
}

fn finish(mut train: Vec<String>, mut test: Vec<String>) -> Split {
    train.sort();
    test.sort();
    debug!(train = train.len(), test = test.len(), "houses split");
    Split { train, test }
}

/// One cross-validation fold over sample indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Seeded k-fold assignment of `n_samples` indices.
///
/// Fold sizes differ by at most one. Returns no folds when `k < 2` or
/// `n_samples < k`.
pub fn k_fold(n_samples: usize, k: usize, seed: u64) -> Vec<Fold> {
    if k < 2 || n_samples < k {
        return Vec::new();
    }

    let mut indices: Vec<usize> = (0..n_samples).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    (0..k)
        .map(|i| {
            let start = i * n_samples / k;
            let end = (i + 1) * n_samples / k;

            let mut test_indices = indices[start..end].to_vec();
            let mut train_indices: Vec<usize> = indices[..start]
                .iter()
                .chain(indices[end..].iter())
                .copied()
                .collect();
            test_indices.sort_unstable();
            train_indices.sort_unstable();

            Fold {
                train_indices,
                test_indices,
            }
        })
        .collect()
}
