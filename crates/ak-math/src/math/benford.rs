//! First-digit Benford's Law conformity.
//!
//! Expected probability of leading digit `d` is `log10(1 + 1/d)`. Conformity
//! is measured as the mean absolute deviation (MAD) between observed and
//! expected proportions over the nine digit buckets and classified with the
//! Nigrini first-digit thresholds.

use serde::{Deserialize, Serialize};

/// MAD below this is "close conformity".
pub const MAD_CLOSE: f64 = 0.006;
/// MAD below this is "acceptable conformity".
pub const MAD_ACCEPTABLE: f64 = 0.012;
/// MAD below this is "marginally acceptable conformity".
pub const MAD_MARGINAL: f64 = 0.015;

/// Expected first-digit probability under Benford's Law. Zero outside 1..=9.
pub fn expected_probability(digit: u8) -> f64 {
    if !(1..=9).contains(&digit) {
        return 0.0;
    }
    (1.0 + 1.0 / digit as f64).log10()
}

/// Expected distribution indexed by `digit - 1`.
pub fn expected_distribution() -> [f64; 9] {
    let mut out = [0.0; 9];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = expected_probability(i as u8 + 1);
    }
    out
}

/// Per-digit observation counts, indexed by `digit - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DigitCounts(pub [u64; 9]);

impl DigitCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a leading digit. Digits outside 1..=9 are ignored.
    pub fn record(&mut self, digit: u8) {
        if (1..=9).contains(&digit) {
            self.0[(digit - 1) as usize] += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.0.iter().sum()
    }

    /// Bucket-wise sum. Integer addition, so order of merging is irrelevant.
    pub fn merge(&self, other: &DigitCounts) -> DigitCounts {
        let mut out = *self;
        for (slot, add) in out.0.iter_mut().zip(other.0.iter()) {
            *slot += add;
        }
        out
    }

    /// Observed proportions, or `None` when nothing was recorded.
    pub fn proportions(&self) -> Option<[f64; 9]> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let mut out = [0.0; 9];
        for (slot, count) in out.iter_mut().zip(self.0.iter()) {
            *slot = *count as f64 / total as f64;
        }
        Some(out)
    }

    /// Mean absolute deviation from the Benford distribution.
    pub fn mad(&self) -> Option<f64> {
        let observed = self.proportions()?;
        let expected = expected_distribution();
        let sum: f64 = observed
            .iter()
            .zip(expected.iter())
            .map(|(o, e)| (o - e).abs())
            .sum();
        Some(sum / 9.0)
    }

    /// Digit (1..=9) whose observed proportion deviates most from expectation.
    /// Ties resolve to the smaller digit.
    pub fn most_deviant_digit(&self) -> Option<u8> {
        let observed = self.proportions()?;
        let expected = expected_distribution();
        let mut best: Option<(u8, f64)> = None;
        for (i, (o, e)) in observed.iter().zip(expected.iter()).enumerate() {
            let dev = (o - e).abs();
            match best {
                Some((_, best_dev)) if dev <= best_dev => {}
                _ => best = Some((i as u8 + 1, dev)),
            }
        }
        best.map(|(d, _)| d)
    }
}

/// Four-level first-digit conformity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conformity {
    Close,
    Acceptable,
    Marginal,
    Nonconformance,
}

impl Conformity {
    pub fn from_mad(mad: f64) -> Self {
        if mad < MAD_CLOSE {
            Conformity::Close
        } else if mad < MAD_ACCEPTABLE {
            Conformity::Acceptable
        } else if mad < MAD_MARGINAL {
            Conformity::Marginal
        } else {
            Conformity::Nonconformance
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Conformity::Close => "close",
            Conformity::Acceptable => "acceptable",
            Conformity::Marginal => "marginal",
            Conformity::Nonconformance => "nonconformance",
        }
    }
}

impl std::fmt::Display for Conformity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
