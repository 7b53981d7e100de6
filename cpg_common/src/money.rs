use std::{
    fmt::Display,
    iter::Sum,
    ops::Add,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::{op, Rate, RATE_SCALE};

pub const CURRENCY_CODE: &str = "CNY";
const CENTS_PER_UNIT: i64 = 100;

//--------------------------------------       Money         ---------------------------------------------------------
/// A fixed-point currency amount, stored as an integer number of cents (two decimal places).
///
/// Every amount in the ledger, on orders, and in commission splits is a `Money`. Floating point is never used for
/// money; fractional results (e.g. applying a commission [`Rate`]) are rounded half away from zero to the nearest cent.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);
op!(checked Money, checked_add);
op!(checked Money, checked_sub);

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value cannot be represented as a currency amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let unit = CENTS_PER_UNIT.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / unit, abs % unit)
    }
}

/// Parses decimal strings such as `"12.34"`, `"0.5"`, `"7"` or `"-1.00"`. More than two decimal places is an error,
/// since the amount could not be represented without rounding.
impl FromStr for Money {
    type Err = MoneyConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || MoneyConversionError(s.to_string());
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() && frac.is_empty() {
            return Err(err());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) || frac.len() > 2 {
            return Err(err());
        }
        let whole = if whole.is_empty() { 0 } else { whole.parse::<i64>().map_err(|_| err())? };
        let frac = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| err())? * 10,
            _ => frac.parse::<i64>().map_err(|_| err())?,
        };
        let cents = whole.checked_mul(CENTS_PER_UNIT).and_then(|c| c.checked_add(frac)).ok_or_else(err)?;
        Ok(Self(if negative { -cents } else { cents }))
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    /// `None` if the amount does not fit in cents.
    pub fn from_units(units: i64) -> Option<Self> {
        units.checked_mul(CENTS_PER_UNIT).map(Self)
    }

    pub fn checked_mul(self, factor: i64) -> Option<Self> {
        self.0.checked_mul(factor).map(Self)
    }

    pub fn checked_neg(self) -> Option<Self> {
        self.0.checked_neg().map(Self)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Multiplies the amount by a fractional rate, rounding half away from zero to the nearest cent.
    pub fn apply_rate(&self, rate: Rate) -> Money {
        let product = i128::from(self.0) * i128::from(rate.ppm());
        let scale = i128::from(RATE_SCALE);
        let half = scale / 2;
        let rounded = if product >= 0 { (product + half) / scale } else { (product - half) / scale };
        #[allow(clippy::cast_possible_truncation)]
        Self(rounded as i64)
    }
}
