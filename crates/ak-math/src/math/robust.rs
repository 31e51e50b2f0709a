//! Robust location/scale estimates.
//!
//! Median and median absolute deviation (MAD) for the modified z-score
//! outlier test.

/// Scale constant of the Iglewicz-Hoaglin modified z-score.
pub const MODIFIED_ZSCORE_SCALE: f64 = 0.6745;

/// Median of the finite values in `samples`, or `None` if there are none.
pub fn median(samples: &[f64]) -> Option<f64> {
    let mut values: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    Some(sorted_median(&values))
}

/// Median absolute deviation around `center`.
pub fn median_abs_deviation(samples: &[f64], center: f64) -> Option<f64> {
    let mut deviations: Vec<f64> = samples
        .iter()
        .filter(|v| v.is_finite())
        .map(|v| (v - center).abs())
        .collect();
    if deviations.is_empty() {
        return None;
    }
    deviations.sort_by(|a, b| a.total_cmp(b));
    Some(sorted_median(&deviations))
}

/// Modified z-score `0.6745 * |x - median| / mad`. `None` when `mad` is zero.
pub fn modified_zscore(value: f64, median: f64, mad: f64) -> Option<f64> {
    if !mad.is_finite() || mad <= 0.0 || !value.is_finite() {
        return None;
    }
    Some(MODIFIED_ZSCORE_SCALE * (value - median).abs() / mad)
}

fn sorted_median(values: &[f64]) -> f64 {
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn median_ignores_nan() {
        assert_eq!(median(&[f64::NAN, 5.0, 1.0, 3.0]), Some(3.0));
    }

    #[test]
    fn mad_of_constant_is_zero() {
        let samples = [5.0; 9];
        let m = median(&samples).unwrap();
        assert_eq!(median_abs_deviation(&samples, m), Some(0.0));
        assert!(modified_zscore(5.0, m, 0.0).is_none());
    }

    #[test]
    fn modified_zscore_flags_far_point() {
        let samples = [1.0, 1.0, 2.0, 2.0, 2.0, 3.0, 3.0, 50.0];
        let m = median(&samples).unwrap();
        let mad = median_abs_deviation(&samples, m).unwrap();
        let score = modified_zscore(50.0, m, mad).unwrap();
        assert!(score > 3.5, "score={score}");
    }
}
