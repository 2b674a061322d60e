use crate::config::CalibrationConfig;
use crate::math::stats::StatsHelper;
use crate::series::Series;

/// Mean of the non-sentinel values whose timestamps fall inside the
/// inclusive calibration window. NaN when nothing qualifies.
pub fn window_mean(series: &Series, config: &CalibrationConfig) -> f64 {
    let left = config.left_bound.unwrap_or(u64::MIN);
    let right = config.right_bound.unwrap_or(u64::MAX);
    let start = series.samples.partition_point(|s| s.timestamp < left);
    let end = series.samples.partition_point(|s| s.timestamp <= right);

    let values: Vec<f64> = series.samples[start..end.max(start)]
        .iter()
        .map(|s| s.value)
        .filter(|&v| v != config.invalid_sentinel)
        .collect();
    StatsHelper::mean(&values)
}

/// Additive bias that moves the series' window means onto the ground
/// truth's window mean, averaged over every series with a finite estimate.
pub fn estimate_offset(series: &[&Series], ground_truth: &Series, config: &CalibrationConfig) -> Option<f64> {
    let truth_mean = window_mean(ground_truth, config);
    let diffs: Vec<f64> = series
        .iter()
        .map(|s| truth_mean - window_mean(s, config))
        .collect();
    let offset = StatsHelper::nan_mean(&diffs);
    offset.is_finite().then_some(offset)
}

/// Copy of `series` with `offset` added to every value, sentinels included.
pub fn apply_offset(series: &Series, offset: f64) -> Series {
    let mut shifted = series.clone();
    for sample in &mut shifted.samples {
        sample.value += offset;
    }
    shifted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(left: u64, right: u64) -> CalibrationConfig {
        CalibrationConfig {
            left_bound: Some(left),
            right_bound: Some(right),
            ..Default::default()
        }
    }

    #[test]
    fn window_mean_is_inclusive_and_skips_sentinels() {
        let series = Series::from_pairs("SR", [(5, 100.0), (10, 2.0), (15, -1.0), (20, 4.0), (25, 100.0)]);
        assert_eq!(window_mean(&series, &window(10, 20)), 3.0);
        assert!(window_mean(&series, &window(11, 14)).is_nan());
    }

    #[test]
    fn offset_averages_per_series_differences() {
        let truth = Series::from_pairs("VICON", [(10, 100.0), (20, 100.0)]);
        let sr = Series::from_pairs("SR", [(10, 90.0), (20, 90.0)]);
        let dsr = Series::from_pairs("DSR", [(10, 96.0), (20, -1.0)]);
        let empty = Series::from_pairs("IEEE", [(50, 1.0)]);

        let offset = estimate_offset(&[&sr, &dsr, &empty], &truth, &window(0, 30)).unwrap();
        assert_eq!(offset, 7.0);
    }

    #[test]
    fn offset_is_undefined_without_overlap() {
        let truth = Series::from_pairs("VICON", [(100, 1.0)]);
        let sr = Series::from_pairs("SR", [(10, 1.0)]);
        assert_eq!(estimate_offset(&[&sr], &truth, &window(0, 30)), None);
    }

    #[test]
    fn applied_offset_moves_sentinel_too() {
        let sr = Series::from_pairs("SR", [(10, -1.0), (20, 4.0)]);
        let shifted = apply_offset(&sr, 2.5);
        assert_eq!(shifted.values(), vec![1.5, 6.5]);
        assert_eq!(sr.values(), vec![-1.0, 4.0]);
    }
}
