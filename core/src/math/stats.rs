use ndarray::{Array1, ArrayView1, Zip};

pub struct StatsHelper;

impl StatsHelper {
    /// Arithmetic mean; NaN for an empty slice.
    pub fn mean(samples: &[f64]) -> f64 {
        ArrayView1::from(samples).mean().unwrap_or(f64::NAN)
    }

    /// Mean over the finite entries only; NaN when none are finite.
    pub fn nan_mean(samples: &[f64]) -> f64 {
        let finite: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        Self::mean(&finite)
    }

    pub fn rms(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return f64::NAN;
        }
        let view = ArrayView1::from(samples);
        (view.dot(&view) / samples.len() as f64).sqrt()
    }

    /// Population standard deviation; NaN for an empty slice.
    pub fn std_dev(samples: &[f64]) -> f64 {
        if samples.is_empty() {
            return f64::NAN;
        }
        ArrayView1::from(samples).std(0.0)
    }

    /// Element-wise `|predicted - truth|`. Slices must have equal length.
    pub fn abs_errors(predicted: &[f64], truth: &[f64]) -> Array1<f64> {
        Zip::from(ArrayView1::from(predicted))
            .and(ArrayView1::from(truth))
            .map_collect(|&p, &t| (p - t).abs())
    }

    pub fn mean_abs_error(predicted: &[f64], truth: &[f64]) -> f64 {
        Self::abs_errors(predicted, truth).mean().unwrap_or(f64::NAN)
    }

    pub fn max(samples: &Array1<f64>) -> f64 {
        samples.iter().copied().fold(f64::NAN, f64::max)
    }
}
