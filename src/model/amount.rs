//! Currency amounts.
//!
//! `Amount` wraps a `Decimal` so that money never passes through floating point. Values parsed from
//! user input may carry thousands separators, e.g. `1,250.50`. Amounts are written back out
//! without separators so that they round-trip through JSON and SQLite unchanged; use
//! `Amount::grouped` for display.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

/// The number of decimal places of the currency.
pub const CURRENCY_DP: u32 = 2;

/// Represents an amount of money.
///
/// Arithmetic on `Amount` is exact. Results of multiplication or division, which can carry more
/// than two decimal places, must be brought back to currency precision with `Amount::round`.
///
/// # Examples
///
/// ```
/// # use sacco_ledger::model::Amount;
/// # use std::str::FromStr;
/// let a = Amount::from_str("1,250.50").unwrap();
/// let b = Amount::from_str("249.50").unwrap();
/// assert_eq!((a + b).to_string(), "1500.00");
/// assert_eq!((a + b).grouped(), "1,500.00");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    /// One minor unit of the currency, i.e. `0.01`.
    pub const CENT: Amount = Amount(Decimal::from_parts(1, 0, 0, false, CURRENCY_DP));

    /// One whole unit of the currency, i.e. `1.00`.
    pub const ONE: Amount = Amount(Decimal::ONE);

    /// Creates an amount from an exact decimal value. No rounding takes place.
    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    /// Creates an amount from a decimal value rounded to currency precision.
    pub fn rounded(value: Decimal) -> Self {
        Self(round_currency(value))
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Returns this amount rounded to currency precision, midpoint away from zero.
    pub fn round(&self) -> Self {
        Self::rounded(self.0)
    }

    /// Returns true if the value has no more than two decimal places of significance.
    pub fn is_whole_cents(&self) -> bool {
        self.0 == round_currency(self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Returns true if the amount is greater than zero.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.0.is_sign_positive()
    }

    /// Returns true if the amount is less than zero.
    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    pub fn abs(&self) -> Self {
        Self(self.0.abs())
    }

    /// Returns `self - other`, or zero if that would be negative.
    pub fn saturating_sub(self, other: Amount) -> Amount {
        if other >= self {
            Amount::ZERO
        } else {
            self - other
        }
    }

    /// Formats the amount with thousands separators and two decimal places, e.g. `-60,000.00`.
    pub fn grouped(&self) -> String {
        let sign = if self.is_negative() { "-" } else { "" };
        let magnitude = self.round().value().abs();
        format!(
            "{sign}{}",
            format_num::format_num!(",.2", magnitude.to_f64().unwrap_or_default())
        )
    }

    /// Computes `self x percent / 100`, rounded to currency precision.
    pub fn percent(&self, percent: Decimal) -> Amount {
        Amount::rounded(self.0 * percent / Decimal::ONE_HUNDRED)
    }
}

/// Rounds a decimal value to currency precision, midpoint away from zero.
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// An error that can occur when parsing strings into `Amount` values.
pub struct AmountError(rust_decimal::Error);

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Amount::ZERO);
        }
        let without_commas = trimmed.replace(',', "");
        let value = Decimal::from_str(&without_commas).map_err(AmountError)?;
        Ok(Amount(value))
    }
}

impl Display for Amount {
    /// Writes the value with at least two decimal places and no separators, e.g. `-1500.00`.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut value = self.0;
        if value.scale() < CURRENCY_DP {
            value.rescale(CURRENCY_DP);
        }
        write!(f, "{value}")
    }
}

impl Debug for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({self})")
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Amount) {
        self.0 -= rhs.0;
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, |acc, a| acc + *a)
    }
}
