use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::borrow::Cow;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Number of fixed-point units in one whole unit of the quote currency.
pub const SCALE: i64 = 1_0000_0000;
const DECIMALS: u32 = 8;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceError {
    #[error("invalid decimal '{0}'")]
    Invalid(String),
    #[error("'{0}' has more than 8 decimal places")]
    TooPrecise(String),
    #[error("'{0}' is out of range")]
    OutOfRange(String),
    #[error("fee rate {0} must be greater than -1 and less than 1")]
    FeeOutOfRange(String),
}

/// A price in units of 10^-8 of the quote currency.
#[derive(Debug, Clone, Copy, Default, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct Price {
    units: i64,
}

/// A fractional fee (0.001 = 0.1%) in the same 10^-8 fixed-point unit as [`Price`].
#[derive(Debug, Clone, Copy, Default, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct FeeRate {
    units: i64,
}

impl Price {
    pub const ZERO: Price = Price { units: 0 };

    pub const fn from_units(units: i64) -> Price {
        Price { units }
    }

    pub const fn units(self) -> i64 {
        self.units
    }

    pub fn from_decimal(value: Decimal) -> Result<Price, PriceError> {
        scale_decimal(value).map(Price::from_units)
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.units, DECIMALS)
    }
}

impl FeeRate {
    pub const ZERO: FeeRate = FeeRate { units: 0 };

    pub fn from_units(units: i64) -> Result<FeeRate, PriceError> {
        if units <= -SCALE || units >= SCALE {
            return Err(PriceError::FeeOutOfRange(
                Decimal::new(units, DECIMALS).normalize().to_string(),
            ));
        }
        Ok(FeeRate { units })
    }

    pub const fn units(self) -> i64 {
        self.units
    }

    pub fn from_decimal(value: Decimal) -> Result<FeeRate, PriceError> {
        FeeRate::from_units(scale_decimal(value)?)
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.units, DECIMALS)
    }
}

fn scale_decimal(value: Decimal) -> Result<i64, PriceError> {
    let normalized = value.normalize();
    if normalized.scale() > DECIMALS {
        return Err(PriceError::TooPrecise(value.to_string()));
    }

    normalized
        .checked_mul(Decimal::from(SCALE))
        .and_then(|scaled| scaled.to_i64())
        .ok_or_else(|| PriceError::OutOfRange(value.to_string()))
}

fn parse_decimal(s: &str) -> Result<Decimal, PriceError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(PriceError::Invalid(s.to_string()));
    }
    let exact = match trimmed.split_once('.') {
        Some((whole, fraction))
            if fraction.len() > DECIMALS as usize
                && fraction.bytes().all(|b| b.is_ascii_digit()) =>
        {
            let (kept, extra) = fraction.split_at(DECIMALS as usize);
            if extra.bytes().any(|b| b != b'0') {
                return Err(PriceError::TooPrecise(s.to_string()));
            }
            Cow::Owned(format!("{whole}.{kept}"))
        }
        _ => Cow::Borrowed(trimmed),
    };
    Decimal::from_str(&exact).map_err(|_| PriceError::Invalid(s.to_string()))
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Price::from_decimal(parse_decimal(s)?)
    }
}

impl FromStr for FeeRate {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FeeRate::from_decimal(parse_decimal(s)?)
    }
}

impl Display for Price {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let sign = if self.units < 0 { "-" } else { "" };
        let abs = self.units.unsigned_abs();
        let scale = SCALE as u64;
        write!(f, "{sign}{}.{:08}", abs / scale, abs % scale)
    }
}

impl Display for FeeRate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_decimal().normalize())
    }
}
