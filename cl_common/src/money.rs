use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

//--------------------------------------       Money       -----------------------------------------------------------
/// A monetary amount in minor units (paise). All balances and request amounts in the system use this type, so
/// fractional-rupee rounding can only ever happen at the point a percentage is applied.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Money {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Money {}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(MoneyConversionError(format!("Value {value} is too large to convert to Money")))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rupees = self.0 as f64 / 100.0;
        write!(f, "₹{rupees:0.2}")
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Construct an amount from whole rupees.
    pub const fn from_rupees(rupees: i64) -> Self {
        Self(rupees * 100)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Apply a percentage expressed in basis points, truncating towards zero.
    pub fn apply_bps(&self, bps: i64) -> Self {
        Self(self.0 * bps / 10_000)
    }

    /// Apply a whole percentage, truncating towards zero.
    pub fn apply_percent(&self, pct: i64) -> Self {
        Self(self.0 * pct / 100)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn percentage_application() {
        let amount = Money::from_rupees(2000);
        assert_eq!(amount.apply_percent(10), Money::from_rupees(200));
        // 5% of ₹200 is ₹10
        assert_eq!(amount.apply_percent(10).apply_bps(500), Money::from_rupees(10));
    }

    #[test]
    fn arithmetic() {
        let a = Money::from(1500);
        let b = Money::from(500);
        assert_eq!(a + b, Money::from(2000));
        assert_eq!(a - b, Money::from(1000));
        let mut c = a;
        c -= b;
        assert_eq!(c, Money::from(1000));
        assert_eq!(-b, Money::from(-500));
        assert!((-b).is_negative());
    }

    #[test]
    fn display_in_rupees() {
        assert_eq!(Money::from(123_456).to_string(), "₹1234.56");
    }
}
