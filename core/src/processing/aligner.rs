use crate::capture::MessageRecord;
use crate::config::AlignerConfig;
use crate::prelude::Timestamp;
use crate::series::{AlignedSample, Series};
use crate::telemetry::log::LogManager;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignmentMode {
    /// One aligned timestamp per matched native timestamp.
    Direct,
    /// Each matched anchor carries `checkpoints` further sub-samples.
    Checkpoint { checkpoints: usize },
}

impl AlignmentMode {
    pub fn from_checkpoints(checkpoints: usize) -> Self {
        if checkpoints == 0 {
            Self::Direct
        } else {
            Self::Checkpoint { checkpoints }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    native_index: usize,
    system_time: Timestamp,
}

/// Maps native algorithm timestamps onto sniffer system time through the
/// receive-time column of the reconstructed records.
pub struct StreamAligner<'a> {
    records: &'a [MessageRecord],
    receive_column: usize,
    mode: AlignmentMode,
    logger: LogManager,
}

impl<'a> StreamAligner<'a> {
    pub fn new(records: &'a [MessageRecord], config: &AlignerConfig) -> Self {
        Self {
            records,
            receive_column: config.receive_column,
            mode: AlignmentMode::from_checkpoints(config.checkpoints),
            logger: LogManager::new("aligner"),
        }
    }

    pub fn with_mode(mut self, mode: AlignmentMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> AlignmentMode {
        self.mode
    }

    /// Returns `series` re-stamped in system time. Native samples that never
    /// meet a matching receive time are left out.
    pub fn align(&self, series: &Series) -> Series {
        let stride = match self.mode {
            AlignmentMode::Direct => 1,
            AlignmentMode::Checkpoint { checkpoints } => checkpoints + 1,
        };
        let anchors = self.anchors(series, stride);

        let mut aligned = Series::new(series.name.clone());
        match self.mode {
            AlignmentMode::Direct => {
                for anchor in &anchors {
                    aligned.push(anchor.system_time, series.samples[anchor.native_index].value);
                }
            }
            AlignmentMode::Checkpoint { checkpoints } => {
                let mut spacing: Option<i128> = None;
                for (i, anchor) in anchors.iter().enumerate() {
                    if let Some(next) = anchors.get(i + 1) {
                        spacing = Some(
                            (next.system_time as i128 - anchor.system_time as i128)
                                / stride as i128,
                        );
                    }
                    let steps = if spacing.is_some() { checkpoints } else { 0 };
                    let delta = spacing.unwrap_or(0);
                    for j in 0..=steps {
                        let Some(sample) = series.samples.get(anchor.native_index + j) else {
                            break;
                        };
                        let time = (anchor.system_time as i128 + j as i128 * delta).max(0);
                        aligned.push(time as Timestamp, sample.value);
                    }
                }
            }
        }

        self.logger.detail(&format!(
            "{}: aligned {} of {} samples",
            series.name,
            aligned.len(),
            series.len()
        ));
        aligned
    }

    fn anchors(&self, series: &Series, stride: usize) -> Vec<Anchor> {
        let mut anchors = Vec::new();
        let mut index = 0;
        for record in self.records {
            let Some(native) = series.samples.get(index) else {
                break;
            };
            if record.rx_time(self.receive_column) == Some(native.timestamp) {
                anchors.push(Anchor {
                    native_index: index,
                    system_time: record.system_time,
                });
                index += stride;
            }
        }
        anchors
    }
}

/// Sorted intersection of the timestamps of every series in `series`.
pub fn common_valid_times(series: &[&Series]) -> Vec<Timestamp> {
    let Some((first, rest)) = series.split_first() else {
        return Vec::new();
    };
    let mut common: BTreeSet<Timestamp> = first.samples.iter().map(|s| s.timestamp).collect();
    for other in rest {
        let times: BTreeSet<Timestamp> = other.samples.iter().map(|s| s.timestamp).collect();
        common.retain(|t| times.contains(t));
    }
    common.into_iter().collect()
}

/// Joins aligned series on their common-valid times and attaches the
/// nearest ground-truth value. Each series contributes its first value per
/// shared timestamp.
pub fn join_on_common_times(series: &[&Series], ground_truth: &Series) -> Vec<AlignedSample> {
    let times = common_valid_times(series);
    let lookups: Vec<HashMap<Timestamp, f64>> = series
        .iter()
        .map(|s| {
            let mut first = HashMap::with_capacity(s.len());
            for sample in &s.samples {
                first.entry(sample.timestamp).or_insert(sample.value);
            }
            first
        })
        .collect();

    times
        .into_iter()
        .map(|t| {
            let mut values = BTreeMap::new();
            for (s, lookup) in series.iter().zip(&lookups) {
                if let Some(&value) = lookup.get(&t) {
                    values.insert(s.name.clone(), value);
                }
            }
            if let Some(truth) = ground_truth.nearest_value(t) {
                values.insert(ground_truth.name.clone(), truth);
            }
            AlignedSample {
                system_time: t,
                values,
            }
        })
        .collect()
}
