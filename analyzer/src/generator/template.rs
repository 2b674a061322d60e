use std::f64::consts::PI;

/// Distance between the two tracked bodies at system time `t_ms`: a slow
/// sinusoidal approach and retreat around `base`.
pub fn distance_profile(t_ms: u64, base: f64, amplitude: f64, period_ms: u64) -> f64 {
    if period_ms == 0 {
        return base;
    }
    let phase = (t_ms % period_ms) as f64 / period_ms as f64 * 2.0 * PI;
    base + amplitude * phase.sin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_oscillates_around_base() {
        assert_eq!(distance_profile(0, 100.0, 40.0, 4000), 100.0);
        assert!((distance_profile(1000, 100.0, 40.0, 4000) - 140.0).abs() < 1e-9);
        assert!((distance_profile(3000, 100.0, 40.0, 4000) - 60.0).abs() < 1e-9);
        assert_eq!(distance_profile(123, 80.0, 10.0, 0), 80.0);
    }
}
