//! Exponential time decay.

use std::f64::consts::LN_2;

/// Half-life decay weight `exp(-ln2 * age / half_life)`.
///
/// Negative ages (points stamped after `now`) are treated as age zero.
/// A non-positive or non-finite half-life yields 1.0 for age zero and 0.0
/// otherwise.
pub fn half_life_decay(age: f64, half_life: f64) -> f64 {
    let age = if age.is_finite() { age.max(0.0) } else { f64::INFINITY };
    if age == 0.0 {
        return 1.0;
    }
    if !half_life.is_finite() || half_life <= 0.0 {
        return 0.0;
    }
    (-LN_2 * age / half_life).exp()
}
