//! 256-bit unsigned integer arithmetic.
//!
//! Wraps `ruint::aliases::U256` to provide a stable interface. Task factors
//! and digest values are compared through this type, so callers never touch
//! the underlying library directly.

use std::fmt;
use std::str::FromStr;

use ruint::aliases::U256 as Ruint256;
use serde::{de, Deserialize, Deserializer};

/// A 256-bit unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct U256(Ruint256);

/// Error parsing a [`U256`] from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseU256Error {
    #[error("empty number")]
    Empty,

    #[error("invalid digit in {0:?}")]
    InvalidDigit(String),

    #[error("value does not fit in 256 bits")]
    Overflow,
}

impl U256 {
    /// Zero constant.
    pub const ZERO: Self = Self(Ruint256::ZERO);

    /// Maximum value.
    pub const MAX: Self = Self(Ruint256::MAX);

    /// Create from big-endian bytes.
    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Self(Ruint256::from_be_bytes(bytes))
    }

    /// Parse a hexadecimal string without prefix.
    ///
    /// Leading zeros are ignored, so digests longer than 64 characters parse
    /// as long as their value fits.
    pub fn from_hex(hex: &str) -> Result<Self, ParseU256Error> {
        Self::parse_radix(hex, 16)
    }

    fn parse_radix(digits: &str, radix: u32) -> Result<Self, ParseU256Error> {
        if digits.is_empty() {
            return Err(ParseU256Error::Empty);
        }
        if !digits.chars().all(|c| c.is_digit(radix)) {
            return Err(ParseU256Error::InvalidDigit(digits.to_string()));
        }
        let significant = digits.trim_start_matches('0');
        if significant.is_empty() {
            return Ok(Self::ZERO);
        }
        Ruint256::from_str_radix(significant, radix as u64)
            .map(Self)
            .map_err(|_| ParseU256Error::Overflow)
    }
}

impl From<u64> for U256 {
    fn from(value: u64) -> Self {
        Self(Ruint256::from(value))
    }
}

/// Accepts decimal, or hex with a `0x`/`0X` prefix.
impl FromStr for U256 {
    type Err = ParseU256Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => Self::parse_radix(hex, 16),
            None => Self::parse_radix(s, 10),
        }
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coordinators send factors as JSON integers or as strings, since values
/// past 2^53 don't survive a JSON number round trip in every client.
impl<'de> Deserialize<'de> for U256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl de::Visitor<'_> for Visitor {
            type Value = U256;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer or an integer string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<U256, E> {
                Ok(U256::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<U256, E> {
                u64::try_from(v)
                    .map(U256::from)
                    .map_err(|_| E::custom("factor must not be negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<U256, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}
