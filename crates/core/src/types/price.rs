//! Type-safe price representation using decimal arithmetic.
//!
//! The store trades in a single currency (USD). Amounts travel to and from
//! the backend as JSON numbers (the `numeric` columns of the tables), so the
//! serde impls go through `rust_decimal::serde::float`. Deserializing goes
//! through [`Price::new`], so a negative amount is rejected on the way in.

use core::fmt;
use core::iter::Sum;
use core::ops::{Add, Mul};
use core::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize};

/// Errors that can occur when parsing a [`Price`] from user input.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The input is not a number.
    #[error("price must be a number")]
    NotANumber,
    /// The input is negative.
    #[error("price cannot be negative")]
    Negative,
}

/// A non-negative USD amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Price(#[serde(with = "rust_decimal::serde::float")] Decimal);

impl Price {
    /// The zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`] for amounts below zero.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        Ok(Self(amount))
    }

    /// Create a price from an amount in cents.
    #[must_use]
    pub fn from_cents(cents: u32) -> Self {
        Self(Decimal::new(i64::from(cents), 2))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// True when the amount is strictly greater than zero.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    /// This amount as a whole percentage of `whole`, capped at 100. Zero
    /// when `whole` is zero.
    #[must_use]
    pub fn percent_of(&self, whole: Self) -> u32 {
        if !whole.is_positive() {
            return 0;
        }
        (self.0 * Decimal::ONE_HUNDRED / whole.0)
            .round()
            .min(Decimal::ONE_HUNDRED)
            .to_u32()
            .unwrap_or(0)
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = rust_decimal::serde::float::deserialize(deserializer)?;
        Self::new(amount).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0.round_dp(2))
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('$');
        let amount = Decimal::from_str(trimmed).map_err(|_| PriceError::NotANumber)?;
        Self::new(amount)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Mul<u32> for Price {
    type Output = Self;

    fn mul(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn percent_of_scales_and_caps() {
        let whole = Price::from_cents(400);
        assert_eq!(Price::from_cents(100).percent_of(whole), 25);
        assert_eq!(Price::from_cents(800).percent_of(whole), 100);
        assert_eq!(whole.percent_of(Price::ZERO), 0);
    }

    #[test]
    fn display_rounds_to_cents() {
        assert_eq!(Price::from_cents(1999).to_string(), "$19.99");
        assert_eq!("3".parse::<Price>().unwrap().to_string(), "$3.00");
    }

    #[test]
    fn parse_rejects_garbage_and_negatives() {
        assert_eq!("apple".parse::<Price>(), Err(PriceError::NotANumber));
        assert_eq!("-1.50".parse::<Price>(), Err(PriceError::Negative));
        assert!(!"0".parse::<Price>().unwrap().is_positive());
        assert!("$2.25".parse::<Price>().unwrap().is_positive());
    }

    #[test]
    fn arithmetic() {
        let total: Price = [Price::from_cents(150) * 2, Price::from_cents(99)]
            .into_iter()
            .sum();
        assert_eq!(total, Price::from_cents(399));
    }

    #[test]
    fn wire_format_is_a_json_number() {
        let price: Price = serde_json::from_str("2.5").unwrap();
        assert_eq!(price, Price::from_cents(250));
        let json = serde_json::to_value(Price::from_cents(250)).unwrap();
        assert!(json.is_number());
    }

    #[test]
    fn negative_wire_amount_is_rejected() {
        let err = serde_json::from_str::<Price>("-4.5").unwrap_err();
        assert!(err.to_string().contains("price cannot be negative"));
        assert_eq!(serde_json::from_str::<Price>("0").unwrap(), Price::ZERO);
    }
}
