//! Monetary amounts.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when converting external amounts into [`Money`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MoneyError {
    #[error("amount is not a finite number: {0}")]
    NotFinite(f64),

    #[error("amount out of range: {0}")]
    OutOfRange(f64),
}

/// Money amount represented in cents to avoid floating point issues.
///
/// All amounts in the saga are in a single currency (see [`Money::CURRENCY`]).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Money {
    /// Amount in cents (e.g., 1000 = $10.00)
    cents: i64,
}

impl Money {
    /// ISO currency code every charge is recorded in.
    pub const CURRENCY: &'static str = "USD";

    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Converts a decimal amount such as `40.5` into cents, rounding half away from zero.
    pub fn from_major(amount: f64) -> Result<Self, MoneyError> {
        if !amount.is_finite() {
            return Err(MoneyError::NotFinite(amount));
        }
        let cents = (amount * 100.0).round();
        if cents.abs() >= i64::MAX as f64 {
            return Err(MoneyError::OutOfRange(amount));
        }
        Ok(Self {
            cents: cents as i64,
        })
    }

    pub const fn zero() -> Self {
        Self { cents: 0 }
    }

    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns the amount as a decimal number, for display and wire DTOs.
    pub fn as_major(&self) -> f64 {
        self.cents as f64 / 100.0
    }

    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    pub fn is_negative(&self) -> bool {
        self.cents < 0
    }

    pub fn is_zero(&self) -> bool {
        self.cents == 0
    }

    /// Multiplies by a quantity.
    pub fn multiply(&self, quantity: u64) -> Money {
        Money {
            cents: self.cents.saturating_mul(quantity as i64),
        }
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_add(rhs.cents),
        }
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents.saturating_sub(rhs.cents),
        }
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_major_rounds_to_cents() {
        assert_eq!(Money::from_major(40.0).unwrap().cents(), 4000);
        assert_eq!(Money::from_major(20.5).unwrap().cents(), 2050);
        assert_eq!(Money::from_major(0.125).unwrap().cents(), 13);
    }

    #[test]
    fn from_major_rejects_non_finite() {
        assert!(matches!(
            Money::from_major(f64::NAN),
            Err(MoneyError::NotFinite(_))
        ));
        assert!(Money::from_major(f64::INFINITY).is_err());
    }

    #[test]
    fn as_major_is_exact_for_cent_amounts() {
        assert_eq!(Money::from_cents(2050).as_major(), 20.5);
    }

    #[test]
    fn arithmetic() {
        let a = Money::from_cents(4000);
        let b = Money::from_cents(2050);
        assert_eq!((a + b).cents(), 6050);
        assert_eq!((a - b).cents(), 1950);
        assert_eq!(Money::from_cents(500).multiply(3).cents(), 1500);
        let total: Money = [a, b].into_iter().sum();
        assert_eq!(total.cents(), 6050);
    }

    #[test]
    fn display() {
        assert_eq!(Money::from_cents(6050).to_string(), "$60.50");
        assert_eq!(Money::from_cents(-5).to_string(), "-$0.05");
        assert_eq!(Money::zero().to_string(), "$0.00");
    }
}
