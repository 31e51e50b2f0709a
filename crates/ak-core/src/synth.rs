//! Deterministic synthetic data for tests, benchmarks and `ak-core synth`.
//!
//! Everything here is driven by a seeded [`StdRng`], so the same seed yields
//! the same rows on every platform.
//!
//! ```ignore
//! use ak_core::synth::LedgerBuilder;
//!
//! let rows = LedgerBuilder::new().rows(10_000).seed(7).duplicates(1).build();
//! ```

use ak_common::{DataType, FieldSchema, TableSchema};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value as JsonValue};
use std::collections::HashSet;

pub const DEFAULT_SEED: u64 = 42;
const DEFAULT_VENDORS: usize = 250;

/// `{id: Integer pk, vendor: String indexed, amount: Currency}`.
pub fn ledger_schema() -> TableSchema {
    TableSchema::new(
        "ledger",
        vec![
            FieldSchema::new("id", DataType::Integer).primary_key(),
            FieldSchema::new("vendor", DataType::String).indexed(),
            FieldSchema::new("amount", DataType::Currency),
        ],
    )
}

/// Builder for ledger rows with unique `(vendor, amount)` pairs, plus an
/// exact number of injected duplicate pairs.
#[derive(Debug, Clone)]
pub struct LedgerBuilder {
    rows: usize,
    seed: u64,
    vendors: usize,
    duplicates: usize,
}

impl Default for LedgerBuilder {
    fn default() -> Self {
        Self {
            rows: 1000,
            seed: DEFAULT_SEED,
            vendors: DEFAULT_VENDORS,
            duplicates: 0,
        }
    }
}

impl LedgerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(mut self, rows: usize) -> Self {
        self.rows = rows;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn vendors(mut self, vendors: usize) -> Self {
        self.vendors = vendors.max(1);
        self
    }

    /// Number of row pairs sharing a `(vendor, amount)`. Capped at `rows / 2`.
    pub fn duplicates(mut self, pairs: usize) -> Self {
        self.duplicates = pairs;
        self
    }

    /// Build the rows as JSON objects ready for ingestion. Amounts are
    /// log-uniform between 10.00 and 100000.00, so their leading digits
    /// follow Benford's law.
    pub fn build(&self) -> Vec<JsonValue> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut seen: HashSet<(usize, i64)> = HashSet::with_capacity(self.rows);
        let mut pairs: Vec<(usize, i64)> = Vec::with_capacity(self.rows);

        for _ in 0..self.rows {
            let vendor = rng.random_range(0..self.vendors);
            let mut cents = (benford_amount(&mut rng) * 100.0).round() as i64;
            while !seen.insert((vendor, cents)) {
                cents += 1;
            }
            pairs.push((vendor, cents));
        }

        let injected = self.duplicates.min(self.rows / 2);
        if injected > 0 {
            let mut order: Vec<usize> = (0..self.rows).collect();
            order.shuffle(&mut rng);
            for pair in order.chunks_exact(2).take(injected) {
                let (source, target) = (pair[0], pair[1]);
                pairs[target] = pairs[source];
            }
        }

        pairs
            .into_iter()
            .enumerate()
            .map(|(i, (vendor, cents))| {
                json!({
                    "id": i + 1,
                    "vendor": vendor_name(vendor),
                    "amount": format_cents(cents),
                })
            })
            .collect()
    }
}

fn vendor_name(idx: usize) -> String {
    format!("vendor-{idx:04}")
}

fn format_cents(cents: i64) -> String {
    format!("{}.{:02}", cents / 100, cents % 100)
}

/// Log-uniform over [10, 100000): leading digits follow Benford's law.
fn benford_amount(rng: &mut StdRng) -> f64 {
    10f64.powf(1.0 + 4.0 * rng.random::<f64>())
}

/// `n` log-uniform values spanning four decades.
pub fn benford_values(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| benford_amount(&mut rng)).collect()
}

/// `n` values whose leading digit is uniform over 1..=9.
pub fn uniform_digit_values(n: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let digit = rng.random_range(1..=9) as f64;
            (digit + rng.random::<f64>() * 0.99) * 100.0
        })
        .collect()
}

/// `n` values uniform in `[mean - spread, mean + spread]`.
pub fn low_variance_values(n: usize, mean: f64, spread: f64, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| mean + (rng.random::<f64>() * 2.0 - 1.0) * spread)
        .collect()
}
