use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Type;
use thiserror::Error;

/// The number of parts that make up a whole in a [`Rate`].
pub const RATE_SCALE: i64 = 1_000_000;

//--------------------------------------        Rate         ---------------------------------------------------------
/// A fraction in the closed interval [0, 1], stored as parts-per-million.
///
/// `Rate` renders and parses as a decimal string (`"0.05"`), and is persisted as the integer ppm value.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash)]
#[sqlx(transparent)]
pub struct Rate(i64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Not a valid rate between 0 and 1: {0}")]
pub struct RateConversionError(String);

impl Rate {
    pub const ONE: Rate = Rate(RATE_SCALE);
    pub const ZERO: Rate = Rate(0);

    /// Creates a rate from a parts-per-million value, checking that it lies in [0, 1].
    pub fn try_from_ppm(ppm: i64) -> Result<Self, RateConversionError> {
        if (0..=RATE_SCALE).contains(&ppm) {
            Ok(Self(ppm))
        } else {
            Err(RateConversionError(format!("{ppm}ppm")))
        }
    }

    /// Percentage helper, e.g. `Rate::percent(5)` is 0.05. Panics in debug builds if `pct > 100`.
    pub const fn percent(pct: i64) -> Self {
        debug_assert!(pct >= 0 && pct <= 100);
        Self(pct * RATE_SCALE / 100)
    }

    pub fn ppm(&self) -> i64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let whole = self.0 / RATE_SCALE;
        let frac = format!("{:06}", self.0 % RATE_SCALE);
        let frac = frac.trim_end_matches('0');
        if frac.is_empty() {
            write!(f, "{whole}")
        } else {
            write!(f, "{whole}.{frac}")
        }
    }
}

impl FromStr for Rate {
    type Err = RateConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || RateConversionError(s.to_string());
        let trimmed = s.trim();
        let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        if (whole.is_empty() && frac.is_empty()) || frac.len() > 6 {
            return Err(err());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
            return Err(err());
        }
        let whole = if whole.is_empty() { 0 } else { whole.parse::<i64>().map_err(|_| err())? };
        let frac = if frac.is_empty() { 0 } else { format!("{frac:0<6}").parse::<i64>().map_err(|_| err())? };
        let ppm = whole.checked_mul(RATE_SCALE).and_then(|w| w.checked_add(frac)).ok_or_else(err)?;
        Self::try_from_ppm(ppm).map_err(|_| err())
    }
}

impl Serialize for Rate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RateRepr {
    Text(String),
    Number(f64),
}

impl<'de> Deserialize<'de> for Rate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RateRepr::deserialize(deserializer)? {
            RateRepr::Text(s) => s.parse().map_err(serde::de::Error::custom),
            RateRepr::Number(n) => {
                #[allow(clippy::cast_possible_truncation)]
                let ppm = (n * RATE_SCALE as f64).round() as i64;
                Rate::try_from_ppm(ppm).map_err(serde::de::Error::custom)
            },
        }
    }
}
