//! Property-based tests for ak-math statistics primitives.
//!
//! Uses proptest to verify the algebraic properties the parallel reducers
//! depend on.

use ak_math::benford::{Conformity, DigitCounts};
use ak_math::{half_life_decay, leading_digit, merge_all, Moments};
use proptest::prelude::*;

/// Tolerance for floating point comparisons.
const TOL: f64 = 1e-9;

fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol.max(tol * a.abs().max(b.abs()))
}

// ============================================================================
// Moments
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Splitting the input anywhere and merging gives the single-pass result.
    #[test]
    fn moments_merge_matches_single_pass(
        values in prop::collection::vec(-1.0e6..1.0e6f64, 1..400),
        split in 0usize..400,
    ) {
        let split = split.min(values.len());
        let whole = Moments::from_slice(&values);
        let left = Moments::from_slice(&values[..split]);
        let right = Moments::from_slice(&values[split..]);
        let merged = left.merge(&right);
        let scale = values.iter().fold(1.0f64, |acc, v| acc.max(v.abs()));
        prop_assert_eq!(merged.count, whole.count);
        prop_assert!(approx_eq(merged.mean, whole.mean, TOL * scale));
        prop_assert!(approx_eq(merged.m2, whole.m2, 1e-6));
    }

    /// Folding the same partials in the same order is bit-for-bit repeatable.
    #[test]
    fn moments_fixed_order_fold_is_deterministic(
        values in prop::collection::vec(-1.0e3..1.0e3f64, 1..300),
        chunk in 1usize..64,
    ) {
        let parts: Vec<Moments> = values.chunks(chunk).map(Moments::from_slice).collect();
        let a = merge_all(&parts);
        let b = merge_all(&parts);
        prop_assert_eq!(a.mean.to_bits(), b.mean.to_bits());
        prop_assert_eq!(a.m2.to_bits(), b.m2.to_bits());
    }

    /// Variance is never negative.
    #[test]
    fn variance_non_negative(values in prop::collection::vec(-1.0e9..1.0e9f64, 1..200)) {
        let m = Moments::from_slice(&values);
        prop_assert!(m.population_variance().unwrap() >= 0.0);
    }
}

// ============================================================================
// Benford
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Leading digit is always within 1..=9 for positive finite inputs.
    #[test]
    fn leading_digit_in_range(v in 1.0e-300..1.0e300f64) {
        let d = leading_digit(v).unwrap();
        prop_assert!((1..=9).contains(&d));
    }

    /// Merging digit counts is commutative.
    #[test]
    fn digit_count_merge_commutes(
        a in prop::collection::vec(1u8..=9, 0..100),
        b in prop::collection::vec(1u8..=9, 0..100),
    ) {
        let mut ca = DigitCounts::new();
        a.iter().for_each(|d| ca.record(*d));
        let mut cb = DigitCounts::new();
        b.iter().for_each(|d| cb.record(*d));
        prop_assert_eq!(ca.merge(&cb), cb.merge(&ca));
    }

    /// MAD is bounded and its classification is monotone in MAD.
    #[test]
    fn mad_bounded(digits in prop::collection::vec(1u8..=9, 1..500)) {
        let mut c = DigitCounts::new();
        digits.iter().for_each(|d| c.record(*d));
        let mad = c.mad().unwrap();
        prop_assert!((0.0..=2.0 / 9.0 + TOL).contains(&mad));
        let lower = Conformity::from_mad(mad * 0.5);
        prop_assert!(lower <= Conformity::from_mad(mad));
    }
}

// ============================================================================
// Decay
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn decay_in_unit_interval(age in 0.0..1.0e4f64, half_life in 0.1..1.0e3f64) {
        let d = half_life_decay(age, half_life);
        prop_assert!((0.0..=1.0).contains(&d));
    }

    #[test]
    fn decay_is_multiplicative(a in 0.0..100.0f64, b in 0.0..100.0f64, half_life in 1.0..50.0f64) {
        let combined = half_life_decay(a + b, half_life);
        let product = half_life_decay(a, half_life) * half_life_decay(b, half_life);
        prop_assert!(approx_eq(combined, product, 1e-9));
    }
}
