//! Value Objects for the marketplace

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Money value object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money { amount: Decimal, currency: String }

impl Money {
    pub fn new(amount: Decimal, currency: &str) -> Self { Self { amount, currency: currency.to_uppercase() } }
    pub fn eur(amount: Decimal) -> Self { Self::new(amount, "EUR") }
    pub fn zero(currency: &str) -> Self { Self::new(Decimal::ZERO, currency) }
    pub fn amount(&self) -> Decimal { self.amount }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn add(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency != other.currency { return Err(MoneyError::CurrencyMismatch); }
        Ok(Money::new(self.amount + other.amount, &self.currency))
    }
    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.amount * Decimal::from(qty), &self.currency) }

    /// Amount in cents, rounded half away from zero.
    pub fn to_minor_units(&self) -> Result<i64, MoneyError> {
        (self.amount * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
            .ok_or(MoneyError::Overflow)
    }

    pub fn from_minor_units(cents: i64, currency: &str) -> Self { Self::new(Decimal::new(cents, 2), currency) }
}

impl Default for Money { fn default() -> Self { Self::zero("EUR") } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2} {}", self.amount, self.currency) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum MoneyError { CurrencyMismatch, Overflow }
impl std::error::Error for MoneyError {}
impl fmt::Display for MoneyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::CurrencyMismatch => write!(f, "Currency mismatch"), Self::Overflow => write!(f, "Amount out of range") }
    }
}

/// Catalog section. Accessories are stocked per colour, the rest per colour and size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Section { Tshirt, Pants, Hoodies, Accessories }

impl Section {
    pub fn is_sized(&self) -> bool { !matches!(self, Section::Accessories) }
    pub fn as_str(&self) -> &'static str {
        match self { Self::Tshirt => "TSHIRT", Self::Pants => "PANTS", Self::Hoodies => "HOODIES", Self::Accessories => "ACCESSORIES" }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Section {
    type Err = SectionError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "TSHIRT" => Ok(Self::Tshirt),
            "PANTS" => Ok(Self::Pants),
            "HOODIES" => Ok(Self::Hoodies),
            "ACCESSORIES" => Ok(Self::Accessories),
            _ => Err(SectionError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone)] pub struct SectionError(pub String);
impl std::error::Error for SectionError {}
impl fmt::Display for SectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Unknown section {}", self.0) }
}

/// Rating score, 1 to 5 inclusive
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub struct Score(u8);

impl Score {
    pub fn new(value: i32) -> Result<Self, ScoreError> {
        if !(1..=5).contains(&value) { return Err(ScoreError(value)); }
        Ok(Self(value as u8))
    }
    pub fn value(&self) -> i32 { i32::from(self.0) }
}

impl TryFrom<i32> for Score {
    type Error = ScoreError;
    fn try_from(value: i32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<Score> for i32 { fn from(s: Score) -> Self { s.value() } }

#[derive(Debug, Clone)] pub struct ScoreError(pub i32);
impl std::error::Error for ScoreError {}
impl fmt::Display for ScoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Score {} out of range 1-5", self.0) }
}
