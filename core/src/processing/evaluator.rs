use crate::math::stats::StatsHelper;
use crate::prelude::{PipelineError, PipelineResult};
use ndarray::{Array1, ArrayView1, Zip};
use serde::{Deserialize, Serialize};

/// Accuracy of one series against ground truth. Every field is NaN when no
/// sample could be scored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetrics {
    pub mean_abs_error: f64,
    pub max_abs_error: f64,
    pub rmse: f64,
    /// Mean of `|predicted - truth| / truth`, in percent.
    pub mean_relative_error: f64,
    /// Percentage of samples carrying the invalid marker.
    pub invalid_rate: f64,
}

impl ErrorMetrics {
    fn from_valid(predicted: &[f64], truth: &[f64], invalid_rate: f64) -> Self {
        if predicted.is_empty() || truth.is_empty() {
            return Self {
                mean_abs_error: f64::NAN,
                max_abs_error: f64::NAN,
                rmse: f64::NAN,
                mean_relative_error: f64::NAN,
                invalid_rate,
            };
        }

        let errors = StatsHelper::abs_errors(predicted, truth);
        let signed: Vec<f64> = predicted.iter().zip(truth).map(|(p, t)| p - t).collect();
        let truth_safe: Array1<f64> =
            ArrayView1::from(truth).mapv(|t| if t == 0.0 { f64::EPSILON } else { t });
        let relative = Zip::from(&errors)
            .and(&truth_safe)
            .map_collect(|&e, &t| e / t);

        Self {
            mean_abs_error: errors.mean().unwrap_or(f64::NAN),
            max_abs_error: StatsHelper::max(&errors),
            rmse: StatsHelper::rms(&signed),
            mean_relative_error: relative.mean().unwrap_or(f64::NAN) * 100.0,
            invalid_rate,
        }
    }
}

/// Metrics of several series restricted to the samples valid in all of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonEvaluation {
    pub invalid_rate: f64,
    pub series: Vec<(String, ErrorMetrics)>,
}

/// Scores series against ground truth, skipping samples that carry the
/// bias-adjusted invalid sentinel. Inputs are never modified.
#[derive(Debug, Clone, Copy)]
pub struct ErrorEvaluator {
    invalid_marker: f64,
}

impl ErrorEvaluator {
    /// `offset` is the alignment bias already added to the evaluated series.
    pub fn new(sentinel: f64, offset: f64) -> Self {
        Self {
            invalid_marker: sentinel + offset,
        }
    }

    pub fn invalid_marker(&self) -> f64 {
        self.invalid_marker
    }

    pub fn is_invalid(&self, value: f64) -> bool {
        value == self.invalid_marker
    }

    /// Metrics over the samples of `predicted` that are individually valid.
    pub fn evaluate(&self, predicted: &[f64], truth: &[f64]) -> PipelineResult<ErrorMetrics> {
        check_lengths(predicted.len(), truth.len())?;
        let (valid_predicted, valid_truth): (Vec<f64>, Vec<f64>) = predicted
            .iter()
            .zip(truth)
            .filter(|(p, _)| !self.is_invalid(**p))
            .map(|(p, t)| (*p, *t))
            .unzip();
        let invalid_rate = invalid_rate(predicted.len(), valid_predicted.len());
        Ok(ErrorMetrics::from_valid(
            &valid_predicted,
            &valid_truth,
            invalid_rate,
        ))
    }

    /// Metrics over the sample positions valid in every series.
    pub fn evaluate_common(&self, series: &[(&str, &[f64])], truth: &[f64]) -> PipelineResult<CommonEvaluation> {
        for (_, values) in series {
            check_lengths(values.len(), truth.len())?;
        }

        let keep: Vec<usize> = (0..truth.len())
            .filter(|&i| series.iter().all(|(_, values)| !self.is_invalid(values[i])))
            .collect();
        let common_rate = invalid_rate(truth.len(), keep.len());
        let kept_truth: Vec<f64> = keep.iter().map(|&i| truth[i]).collect();

        let metrics = series
            .iter()
            .map(|(name, values)| {
                let kept: Vec<f64> = keep.iter().map(|&i| values[i]).collect();
                (
                    name.to_string(),
                    ErrorMetrics::from_valid(&kept, &kept_truth, common_rate),
                )
            })
            .collect();

        Ok(CommonEvaluation {
            invalid_rate: common_rate,
            series: metrics,
        })
    }
}

fn invalid_rate(total: usize, valid: usize) -> f64 {
    if total == 0 {
        f64::NAN
    } else {
        (total - valid) as f64 / total as f64 * 100.0
    }
}

fn check_lengths(predicted: usize, truth: usize) -> PipelineResult<()> {
    if predicted != truth {
        return Err(PipelineError::InvalidInput(format!(
            "cannot score {predicted} samples against {truth} ground-truth samples"
        )));
    }
    Ok(())
}

/// Distribution of the compensation factors reported by the nodes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateSummary {
    pub count: usize,
    pub mean: f64,
    pub std_dev: f64,
}

pub fn summarize_rates(rates: &[f64]) -> RateSummary {
    RateSummary {
        count: rates.len(),
        mean: StatsHelper::mean(rates),
        std_dev: StatsHelper::std_dev(rates),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn metrics_for_simple_series() {
        let evaluator = ErrorEvaluator::new(-1.0, 0.0);
        let metrics = evaluator
            .evaluate(&[101.0, 97.0, 100.0, 104.0], &[100.0, 100.0, 100.0, 100.0])
            .unwrap();

        assert_eq!(metrics.mean_abs_error, 2.0);
        assert_eq!(metrics.max_abs_error, 4.0);
        assert!(close(metrics.rmse, (26.0f64 / 4.0).sqrt()));
        assert!(close(metrics.mean_relative_error, 2.0));
        assert_eq!(metrics.invalid_rate, 0.0);
    }

    #[test]
    fn bias_adjusted_sentinel_is_excluded() {
        let offset = 2.5;
        let evaluator = ErrorEvaluator::new(-1.0, offset);
        let predicted = [-1.0 + offset, 10.0, -1.0 + offset, 12.0];
        let truth = [50.0, 11.0, 50.0, 11.0];

        let metrics = evaluator.evaluate(&predicted, &truth).unwrap();
        assert_eq!(metrics.invalid_rate, 50.0);
        assert_eq!(metrics.mean_abs_error, 1.0);
        assert_eq!(predicted[0], -1.0 + offset);
    }

    #[test]
    fn all_invalid_reports_nan_and_full_rate() {
        let evaluator = ErrorEvaluator::new(-1.0, 0.0);
        let metrics = evaluator.evaluate(&[-1.0, -1.0], &[3.0, 4.0]).unwrap();
        assert_eq!(metrics.invalid_rate, 100.0);
        assert!(metrics.mean_abs_error.is_nan());
        assert!(metrics.max_abs_error.is_nan());
        assert!(metrics.rmse.is_nan());
        assert!(metrics.mean_relative_error.is_nan());
    }

    #[test]
    fn empty_series_reports_nan() {
        let metrics = ErrorEvaluator::new(-1.0, 0.0).evaluate(&[], &[]).unwrap();
        assert!(metrics.mean_abs_error.is_nan());
        assert!(metrics.invalid_rate.is_nan());
    }

    #[test]
    fn zero_truth_is_guarded() {
        let metrics = ErrorEvaluator::new(-1.0, 0.0)
            .evaluate(&[1.0, 2.0], &[0.0, 2.0])
            .unwrap();
        assert!(metrics.mean_relative_error.is_finite());
    }

    #[test]
    fn common_evaluation_uses_joint_validity() {
        let evaluator = ErrorEvaluator::new(-1.0, 0.0);
        let sr = [10.0, -1.0, 12.0, 13.0];
        let dsr = [11.0, 11.0, -1.0, 14.0];
        let truth = [10.0, 11.0, 12.0, 13.0];

        let common = evaluator
            .evaluate_common(&[("SR", &sr), ("DSR", &dsr)], &truth)
            .unwrap();
        assert_eq!(common.invalid_rate, 50.0);
        assert_eq!(common.series[0].0, "SR");
        assert_eq!(common.series[0].1.mean_abs_error, 0.0);
        assert_eq!(common.series[1].1.mean_abs_error, 1.0);
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let evaluator = ErrorEvaluator::new(-1.0, 0.0);
        assert!(evaluator.evaluate(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn rate_summary() {
        let summary = summarize_rates(&[0.5, 0.7, 0.9]);
        assert_eq!(summary.count, 3);
        assert!(close(summary.mean, 0.7));
        assert!(close(summary.std_dev, (0.08f64 / 3.0).sqrt()));
    }
}
