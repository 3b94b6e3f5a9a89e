//! Price arithmetic shared by the aggregation passes.
//!
//! Sums and means are computed on unrounded values; rounding to cents is
//! applied once, to the emitted figure.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// Round to 2 decimal places, halves away from zero.
///
/// Every price in the pipeline is non-negative, so this is round-half-up.
/// Rounding happens on the shortest decimal form of `value`, so `1.005`
/// becomes `1.01` even though its binary value sits just below the half.
/// Values outside the `Decimal` range fall back to binary rounding, and a
/// value too large to scale is returned unchanged.
pub fn round_cents(value: f64) -> f64 {
    let rounded = Decimal::from_str(&value.to_string())
        .ok()
        .map(|d| d.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64());
    match rounded {
        Some(cents) => cents,
        None => {
            let scaled = value * 100.0;
            if scaled.is_finite() {
                scaled.round() / 100.0
            } else {
                value
            }
        }
    }
}

/// Running sum of prices for one group.
///
/// Only constructible from a first value, so `count >= 1` and the mean is
/// always defined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceAccumulator {
    sum: f64,
    count: usize,
}

impl PriceAccumulator {
    pub fn new(first: f64) -> Self {
        Self {
            sum: first,
            count: 1,
        }
    }

    pub fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.sum / self.count as f64
    }
}
