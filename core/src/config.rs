use crate::prelude::{PipelineError, PipelineResult, Timestamp, INVALID_SENTINEL};
use crate::processing::compensation::{DynamicParams, StaticParams};
use crate::processing::optimizer::{DynamicGrid, StaticGrid};
use serde::{Deserialize, Serialize};

/// Immutable configuration handed to each pipeline component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub correlator: CorrelatorConfig,
    pub aligner: AlignerConfig,
    pub calibration: CalibrationConfig,
    pub compensation: CompensationConfig,
    pub search: SearchConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        self.correlator.validate()?;
        if self.search.workers == 0 {
            return Err(PipelineError::Configuration(
                "search.workers must be at least 1".into(),
            ));
        }
        if let (Some(left), Some(right)) =
            (self.calibration.left_bound, self.calibration.right_bound)
        {
            if left > right {
                return Err(PipelineError::Configuration(format!(
                    "calibration window [{left}, {right}] is empty"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelatorConfig {
    /// Number of ranging participants; detected from the capture when unset.
    pub participant_count: Option<usize>,
    /// Ring capacity as a multiple of the participant count.
    pub window_factor: usize,
    /// Body rows inspected when detecting participant addresses.
    pub address_scan_lines: usize,
    /// Emit still-live complete records when the capture ends.
    pub drain_tail: bool,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            participant_count: None,
            window_factor: 5,
            address_scan_lines: 50,
            drain_tail: false,
        }
    }
}

impl CorrelatorConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        // the flush gate inspects slot 2P-1, so the ring must hold two generations
        if self.window_factor < 2 {
            return Err(PipelineError::Configuration(format!(
                "window_factor {} is below 2",
                self.window_factor
            )));
        }
        if self.address_scan_lines == 0 {
            return Err(PipelineError::Configuration(
                "address_scan_lines must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignerConfig {
    /// Peer column of the record stream whose receive time anchors alignment.
    pub receive_column: usize,
    /// Sub-sampled checkpoints between anchors; 0 selects direct alignment.
    pub checkpoints: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub left_bound: Option<Timestamp>,
    pub right_bound: Option<Timestamp>,
    pub invalid_sentinel: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            left_bound: None,
            right_bound: None,
            invalid_sentinel: INVALID_SENTINEL,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompensationConfig {
    pub static_params: StaticParams,
    pub dynamic_params: DynamicParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub workers: usize,
    pub static_grid: StaticGrid,
    pub dynamic_grid: DynamicGrid,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            static_grid: StaticGrid::default(),
            dynamic_grid: DynamicGrid::default(),
        }
    }
}
