//! Streaming first/second moments with a mergeable partial state.
//!
//! `Moments` accumulates count, mean and the sum of squared deviations
//! (Welford). Two partial states combine with Chan's pairwise update, which
//! lets callers reduce row partitions independently and fold the partials
//! afterwards. Folding partials in a fixed order yields bit-identical results
//! regardless of which thread produced which partial.

use serde::{Deserialize, Serialize};

/// Running count/mean/M2 accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Moments {
    pub count: u64,
    pub mean: f64,
    /// Sum of squared deviations from the running mean.
    pub m2: f64,
}

impl Moments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate every finite value in `values`.
    pub fn from_slice(values: &[f64]) -> Self {
        let mut m = Self::new();
        for v in values {
            m.push(*v);
        }
        m
    }

    /// Add one observation. Non-finite values are ignored.
    pub fn push(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    /// Combine two partial states (Chan et al. pairwise update).
    pub fn merge(&self, other: &Moments) -> Moments {
        if other.count == 0 {
            return *self;
        }
        if self.count == 0 {
            return *other;
        }
        let na = self.count as f64;
        let nb = other.count as f64;
        let n = na + nb;
        let delta = other.mean - self.mean;
        Moments {
            count: self.count + other.count,
            mean: self.mean + delta * nb / n,
            m2: self.m2 + other.m2 + delta * delta * na * nb / n,
        }
    }

    /// Population variance (divides by n). `None` when empty.
    pub fn population_variance(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some((self.m2 / self.count as f64).max(0.0))
    }

    /// Population standard deviation. `None` when empty.
    pub fn population_stddev(&self) -> Option<f64> {
        self.population_variance().map(f64::sqrt)
    }
}

/// Fold partial moments left to right.
pub fn merge_all<'a, I>(parts: I) -> Moments
where
    I: IntoIterator<Item = &'a Moments>,
{
    parts
        .into_iter()
        .fold(Moments::new(), |acc, part| acc.merge(part))
}

/// Absolute z-score of `value`. Returns `None` when `stddev` is not strictly
/// positive or the inputs are not finite.
pub fn abs_zscore(value: f64, mean: f64, stddev: f64) -> Option<f64> {
    if !stddev.is_finite() || stddev <= 0.0 || !value.is_finite() || !mean.is_finite() {
        return None;
    }
    Some((value - mean).abs() / stddev)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn empty_has_no_variance() {
        let m = Moments::new();
        assert_eq!(m.count, 0);
        assert!(m.population_variance().is_none());
        assert!(m.population_stddev().is_none());
    }

    #[test]
    fn known_population_stddev() {
        // Classic example: population stddev of this set is exactly 2.
        let m = Moments::from_slice(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_eq!(m.count, 8);
        assert!(approx_eq(m.mean, 5.0, 1e-12));
        assert!(approx_eq(m.population_stddev().unwrap(), 2.0, 1e-12));
    }

    #[test]
    fn constant_values_have_zero_variance() {
        let m = Moments::from_slice(&[3.5; 100]);
        assert_eq!(m.population_variance(), Some(0.0));
    }

    #[test]
    fn non_finite_values_are_skipped() {
        let m = Moments::from_slice(&[1.0, f64::NAN, 3.0, f64::INFINITY]);
        assert_eq!(m.count, 2);
        assert!(approx_eq(m.mean, 2.0, 1e-12));
    }

    #[test]
    fn merge_matches_single_pass() {
        let data: Vec<f64> = (0..1000).map(|i| (i as f64 * 0.37).sin() * 50.0).collect();
        let whole = Moments::from_slice(&data);
        let parts: Vec<Moments> = data.chunks(64).map(Moments::from_slice).collect();
        let merged = merge_all(&parts);
        assert_eq!(merged.count, whole.count);
        assert!(approx_eq(merged.mean, whole.mean, 1e-9));
        assert!(approx_eq(
            merged.population_variance().unwrap(),
            whole.population_variance().unwrap(),
            1e-7
        ));
    }

    #[test]
    fn merge_with_empty_is_identity() {
        let m = Moments::from_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(m.merge(&Moments::new()), m);
        assert_eq!(Moments::new().merge(&m), m);
    }

    #[test]
    fn abs_zscore_guards_zero_stddev() {
        assert!(abs_zscore(10.0, 5.0, 0.0).is_none());
        assert!(abs_zscore(f64::NAN, 5.0, 1.0).is_none());
        assert!(approx_eq(abs_zscore(1.0, 5.0, 2.0).unwrap(), 2.0, 1e-12));
    }
}
