use serde::{Deserialize, Serialize};

/// Parameters of the single-regime compensation filter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaticParams {
    pub compensate_rate: f64,
    pub deceleration_bound: f64,
}

impl Default for StaticParams {
    fn default() -> Self {
        Self {
            compensate_rate: 0.7,
            deceleration_bound: 15.0,
        }
    }
}

/// Parameters of the two-regime compensation filter. The low pair applies
/// while the averaged step stays under `motion_threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DynamicParams {
    pub compensate_rate_low: f64,
    pub deceleration_bound_low: f64,
    pub compensate_rate_high: f64,
    pub deceleration_bound_high: f64,
    pub motion_threshold: f64,
}

impl Default for DynamicParams {
    fn default() -> Self {
        Self {
            compensate_rate_low: 0.1,
            deceleration_bound_low: 1.0,
            compensate_rate_high: 0.7,
            deceleration_bound_high: 15.0,
            motion_threshold: 3.0,
        }
    }
}

impl DynamicParams {
    fn select(&self, avg_delta: f64) -> StaticParams {
        if avg_delta.abs() < self.motion_threshold {
            StaticParams {
                compensate_rate: self.compensate_rate_low,
                deceleration_bound: self.deceleration_bound_low,
            }
        } else {
            StaticParams {
                compensate_rate: self.compensate_rate_high,
                deceleration_bound: self.deceleration_bound_high,
            }
        }
    }
}

/// Carried state of one filter pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterState {
    pub last_value: Option<f64>,
    pub last_delta: Option<f64>,
}

impl FilterState {
    /// Records `value` and, once two steps have been seen, returns the
    /// previous step and the step just observed.
    fn advance(&mut self, value: f64) -> Option<(f64, f64)> {
        let last_value = self.last_value.replace(value)?;
        let delta = value - last_value;
        self.last_delta.replace(delta).map(|prev_delta| (prev_delta, delta))
    }
}

/// Applies the velocity-continuity rule: compensate with the previous step
/// unless the motion reversed, stalled, or decelerated by more than the bound.
pub fn compensate(value: f64, prev_delta: f64, delta: f64, params: StaticParams) -> f64 {
    if prev_delta.abs() - delta.abs() > params.deceleration_bound || prev_delta * delta <= 0.0 {
        value
    } else {
        value + prev_delta * params.compensate_rate
    }
}

/// Online distance filter, reset at the start of every series pass.
pub trait CompensationFilter {
    fn reset(&mut self);
    fn step(&mut self, value: f64) -> f64;

    fn apply(&mut self, values: &[f64]) -> Vec<f64> {
        self.reset();
        values.iter().map(|&value| self.step(value)).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticCompensation {
    params: StaticParams,
    state: FilterState,
}

impl StaticCompensation {
    pub fn new(params: StaticParams) -> Self {
        Self {
            params,
            state: FilterState::default(),
        }
    }

    pub fn state(&self) -> FilterState {
        self.state
    }
}

impl CompensationFilter for StaticCompensation {
    fn reset(&mut self) {
        self.state = FilterState::default();
    }

    fn step(&mut self, value: f64) -> f64 {
        match self.state.advance(value) {
            Some((prev_delta, delta)) => compensate(value, prev_delta, delta, self.params),
            None => value,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DynamicCompensation {
    params: DynamicParams,
    state: FilterState,
}

impl DynamicCompensation {
    pub fn new(params: DynamicParams) -> Self {
        Self {
            params,
            state: FilterState::default(),
        }
    }
}

impl CompensationFilter for DynamicCompensation {
    fn reset(&mut self) {
        self.state = FilterState::default();
    }

    fn step(&mut self, value: f64) -> f64 {
        match self.state.advance(value) {
            Some((prev_delta, delta)) => {
                let selected = self.params.select((prev_delta + delta) / 2.0);
                compensate(value, prev_delta, delta, selected)
            }
            None => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spike_passes_through_uncompensated() {
        let dsr = [100.0, 102.0, 98.0, 97.0, 150.0, 99.0];
        let mut filter = StaticCompensation::new(StaticParams {
            compensate_rate: 0.5,
            deceleration_bound: 5.0,
        });
        let output = filter.apply(&dsr);
        assert_eq!(output, vec![100.0, 102.0, 98.0, 95.0, 150.0, 99.0]);

        let truth = [100.0, 101.0, 99.0, 98.0, 99.0, 99.0];
        let mae = |values: &[f64]| {
            values
                .iter()
                .zip(truth)
                .map(|(v, t)| (v - t).abs())
                .sum::<f64>()
                / truth.len() as f64
        };
        // one compensated step of 0.5 * |-4| is the only difference from raw
        assert!((mae(&output) - mae(&dsr)).abs() <= 2.0 / 6.0 + 1e-12);
    }

    #[test]
    fn constant_input_is_never_compensated() {
        let input = vec![42.5; 16];
        let mut filter = StaticCompensation::new(StaticParams {
            compensate_rate: 1.0,
            deceleration_bound: 100.0,
        });
        assert_eq!(filter.apply(&input), input);

        let mut dynamic = DynamicCompensation::new(DynamicParams::default());
        assert_eq!(dynamic.apply(&input), input);
    }

    #[test]
    fn state_walks_start_seeded_steady() {
        let mut filter = StaticCompensation::new(StaticParams::default());
        assert_eq!(filter.step(10.0), 10.0);
        assert_eq!(filter.state().last_delta, None);
        assert_eq!(filter.step(12.0), 12.0);
        assert_eq!(filter.state().last_delta, Some(2.0));
        // steady motion: 14 + 2 * 0.7
        assert_eq!(filter.step(14.0), 14.0 + 2.0 * 0.7);
        assert_eq!(filter.state().last_value, Some(14.0));
    }

    #[test]
    fn deceleration_beyond_bound_disables_compensation() {
        let params = StaticParams {
            compensate_rate: 1.0,
            deceleration_bound: 2.0,
        };
        assert_eq!(compensate(50.0, 10.0, 1.0, params), 50.0);
        assert_eq!(compensate(50.0, 3.0, 1.0, params), 53.0);
        assert_eq!(compensate(50.0, 3.0, -1.0, params), 50.0);
    }

    #[test]
    fn apply_resets_between_passes() {
        let mut filter = StaticCompensation::new(StaticParams::default());
        let input = [1.0, 3.0, 5.0, 7.0];
        let first = filter.apply(&input);
        let second = filter.apply(&input);
        assert_eq!(first, second);
        assert_eq!(first[0].to_bits(), second[0].to_bits());
    }

    #[test]
    fn dynamic_switches_regime_on_average_step() {
        let params = DynamicParams {
            compensate_rate_low: 0.0,
            deceleration_bound_low: 10.0,
            compensate_rate_high: 1.0,
            deceleration_bound_high: 10.0,
            motion_threshold: 3.0,
        };
        let mut slow = DynamicCompensation::new(params);
        assert_eq!(slow.apply(&[0.0, 1.0, 2.0]), vec![0.0, 1.0, 2.0]);

        let mut fast = DynamicCompensation::new(params);
        assert_eq!(fast.apply(&[0.0, 5.0, 10.0]), vec![0.0, 5.0, 15.0]);
    }
}
