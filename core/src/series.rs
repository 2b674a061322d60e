use crate::prelude::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One `(timestamp, value)` point of a measurement stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: Timestamp, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// A decoded algorithm-log entry, independent of the log-line syntax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub label: String,
    pub timestamp: Timestamp,
    pub value: f64,
}

/// A named measurement stream. Timestamps are non-decreasing as produced by
/// the source, duplicates allowed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub samples: Vec<Sample>,
}

impl Series {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samples: Vec::new(),
        }
    }

    pub fn from_pairs(name: impl Into<String>, pairs: impl IntoIterator<Item = (Timestamp, f64)>) -> Self {
        Self {
            name: name.into(),
            samples: pairs
                .into_iter()
                .map(|(timestamp, value)| Sample::new(timestamp, value))
                .collect(),
        }
    }

    /// Collects every entry carrying `label` from a uniform log iterator.
    pub fn from_labeled<I>(name: impl Into<String>, label: &str, entries: I) -> Self
    where
        I: IntoIterator<Item = LabeledSample>,
    {
        Self::from_pairs(
            name,
            entries
                .into_iter()
                .filter(|entry| entry.label == label)
                .map(|entry| (entry.timestamp, entry.value)),
        )
    }

    pub fn push(&mut self, timestamp: Timestamp, value: f64) {
        self.samples.push(Sample::new(timestamp, value));
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn timestamps(&self) -> Vec<Timestamp> {
        self.samples.iter().map(|s| s.timestamp).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    /// Index of the sample closest in time to `t`. Ties go to the earlier
    /// sample, and among equal timestamps to the first one.
    pub fn nearest_index(&self, t: Timestamp) -> Option<usize> {
        if self.samples.is_empty() {
            return None;
        }
        let upper = self.samples.partition_point(|s| s.timestamp < t);
        if upper == 0 {
            return Some(0);
        }
        let lower_ts = self.samples[upper - 1].timestamp;
        let lower = self.samples.partition_point(|s| s.timestamp < lower_ts);
        if upper == self.samples.len() {
            return Some(lower);
        }
        let upper_gap = self.samples[upper].timestamp - t;
        let lower_gap = t - lower_ts;
        Some(if lower_gap <= upper_gap { lower } else { upper })
    }

    pub fn nearest_value(&self, t: Timestamp) -> Option<f64> {
        self.nearest_index(t).map(|idx| self.samples[idx].value)
    }
}

/// One row of the joined ranging log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedSample {
    pub system_time: Timestamp,
    pub values: BTreeMap<String, f64>,
}

impl AlignedSample {
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nearest_prefers_earlier_sample_on_tie() {
        let truth = Series::from_pairs("VICON", [(10, 1.0), (20, 2.0), (30, 3.0)]);
        assert_eq!(truth.nearest_value(15), Some(1.0));
        assert_eq!(truth.nearest_value(16), Some(2.0));
        assert_eq!(truth.nearest_value(0), Some(1.0));
        assert_eq!(truth.nearest_value(99), Some(3.0));
    }

    #[test]
    fn nearest_picks_first_of_duplicate_timestamps() {
        let truth = Series::from_pairs("VICON", [(10, 1.0), (20, 2.0), (20, 2.5), (40, 4.0)]);
        assert_eq!(truth.nearest_index(20), Some(1));
        assert_eq!(truth.nearest_index(25), Some(1));
        assert_eq!(truth.nearest_index(45), Some(3));
    }

    #[test]
    fn nearest_on_empty_series_is_none() {
        assert_eq!(Series::new("VICON").nearest_value(5), None);
    }

    #[test]
    fn labeled_entries_are_filtered_by_label() {
        let entries = vec![
            LabeledSample {
                label: "DSR".into(),
                timestamp: 4,
                value: 1.5,
            },
            LabeledSample {
                label: "SR".into(),
                timestamp: 4,
                value: 2.0,
            },
        ];
        let series = Series::from_labeled("DSR", "DSR", entries);
        assert_eq!(series.samples, vec![Sample::new(4, 1.5)]);
    }
}
