/// Type-safe wrappers for domain primitives
///
/// These types enforce validation at construction time and keep every wagered
/// or paid-out quantity in integer fixed point.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::constants::*;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Address must not be empty")]
    EmptyAddress,

    #[error("Address too long: {length} chars (max {max})")]
    AddressTooLong { length: usize, max: usize },

    #[error("Amount must be greater than zero")]
    ZeroAmount,

    #[error("Amount overflow in operation")]
    AmountOverflow,

    #[error("Invalid multiplier: {0}")]
    InvalidMultiplier(String),
}

/// Participant identity as supplied by the authenticating caller
///
/// Surrounding whitespace is stripped so `" abc"` and `"abc"` are the same seat.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyAddress);
        }
        if trimmed.len() > MAX_ADDRESS_LENGTH {
            return Err(ValidationError::AddressTooLong {
                length: trimmed.len(),
                max: MAX_ADDRESS_LENGTH,
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Address {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Token amount in smallest indivisible units
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Create a stake amount; stakes must be positive
    pub fn stake(amount: u64) -> Result<Self, ValidationError> {
        if amount == 0 {
            return Err(ValidationError::ZeroAmount);
        }
        Ok(Self(amount))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl From<Amount> for u64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payout multiplier in fixed point with four decimals (`15_000` == 1.5x)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Multiplier(u64);

impl Multiplier {
    pub const ONE: Multiplier = Multiplier(MULTIPLIER_SCALE);

    pub fn from_scaled(scaled: u64) -> Self {
        Self(scaled)
    }

    /// Quantize a real multiplier, truncating beyond the fourth decimal
    pub fn from_f64(value: f64) -> Result<Self, ValidationError> {
        if !value.is_finite() || value < 0.0 {
            return Err(ValidationError::InvalidMultiplier(value.to_string()));
        }
        let scaled = (value * MULTIPLIER_SCALE as f64).floor();
        if scaled > u64::MAX as f64 {
            return Err(ValidationError::InvalidMultiplier(value.to_string()));
        }
        Ok(Self(scaled as u64))
    }

    pub fn scaled(&self) -> u64 {
        self.0
    }

    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / MULTIPLIER_SCALE as f64
    }

    /// `floor(amount * multiplier)` computed without leaving integer arithmetic
    pub fn apply(&self, amount: Amount) -> Result<Amount, ValidationError> {
        let product = amount.0 as u128 * self.0 as u128 / MULTIPLIER_SCALE as u128;
        u64::try_from(product)
            .map(Amount)
            .map_err(|_| ValidationError::AmountOverflow)
    }
}

impl std::fmt::Display for Multiplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}x", self.to_f64())
    }
}

/// Unique identity of one crash round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoundId(Uuid);

impl RoundId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RoundId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::str::FromStr for RoundId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl std::fmt::Display for RoundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
