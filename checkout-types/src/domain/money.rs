//! Exact millisatoshi amounts.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DomainError;

/// A non-negative amount of millisatoshi.
///
/// Amounts are stored as exact integers - never floating point - so
/// fee splits and ledger sums are reproducible bit for bit.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Msat(i64);

impl Msat {
    /// Creates a new amount, rejecting negative values.
    pub fn new(amount: i64) -> Result<Self, DomainError> {
        if amount < 0 {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Self(amount))
    }

    /// The zero amount.
    pub const ZERO: Msat = Msat(0);

    /// Returns the raw millisatoshi value.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Checked addition.
    pub fn checked_add(&self, other: Msat) -> Result<Msat, DomainError> {
        self.0
            .checked_add(other.0)
            .map(Msat)
            .ok_or(DomainError::AmountOverflow)
    }

    /// Checked subtraction - errors if the result would be negative.
    pub fn checked_sub(&self, other: Msat) -> Result<Msat, DomainError> {
        if self.0 < other.0 {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Msat(self.0 - other.0))
    }

    /// Splits this amount into (platform fee, developer net) at the given
    /// rate in basis points.
    ///
    /// fee = floor(amount * rate_bps / 10_000) using widened integer
    /// arithmetic, so `fee + net == amount` holds for every input.
    pub fn split_fee(&self, rate_bps: u32) -> Result<(Msat, Msat), DomainError> {
        if rate_bps > 10_000 {
            return Err(DomainError::InvalidFeeRate(rate_bps));
        }
        let fee = ((self.0 as i128) * (rate_bps as i128) / 10_000) as i64;
        Ok((Msat(fee), Msat(self.0 - fee)))
    }
}

impl fmt::Display for Msat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} msat", self.0)
    }
}
