//! Coin amounts
//!
//! Domain primitives for coin values. Amounts and prices are validated at
//! construction time, so an out-of-range value cannot reach the engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Largest amount a single transfer or admin credit may move.
pub const MAX_AMOUNT: u64 = 1000;

/// Largest price an item may carry.
pub const MAX_PRICE: u64 = 1000;

/// Amount represents a validated number of coins moved by one operation.
///
/// # Invariants
/// - Value is in `1..=MAX_AMOUNT`
///
/// # Example
/// ```
/// use coin_ledger::domain::Amount;
///
/// let amount = Amount::new(30).unwrap();
/// assert_eq!(amount.value(), 30);
/// assert!(Amount::new(0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Amount(i64);

/// Errors that can occur when creating an Amount, Price or Balance
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be greater than 0")]
    Zero,

    #[error("Amount must be between 1 and {max} inclusive (got {got})")]
    OutOfRange { got: u64, max: u64 },

    #[error("Balance cannot be negative (got {0})")]
    Negative(i64),

    #[error("Balance overflow")]
    Overflow,
}

fn bounded(value: u64, max: u64) -> Result<i64, AmountError> {
    if value == 0 {
        return Err(AmountError::Zero);
    }
    if value > max {
        return Err(AmountError::OutOfRange { got: value, max });
    }
    i64::try_from(value).map_err(|_| AmountError::Overflow)
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::Zero` if value is 0
    /// - `AmountError::OutOfRange` if value exceeds `MAX_AMOUNT`
    pub fn new(value: u64) -> Result<Self, AmountError> {
        bounded(value, MAX_AMOUNT).map(Self)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl TryFrom<u64> for Amount {
    type Error = AmountError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for u64 {
    fn from(amount: Amount) -> Self {
        amount.0.unsigned_abs()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Price of a catalog item, in `1..=MAX_PRICE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Price(i64);

impl Price {
    pub fn new(value: u64) -> Result<Self, AmountError> {
        bounded(value, MAX_PRICE).map(Self)
    }

    /// Wrap a price read back from storage, where the CHECK constraint
    /// already holds.
    pub(crate) fn from_stored(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl TryFrom<u64> for Price {
    type Error = AmountError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Price::new(value)
    }
}

impl From<Price> for u64 {
    fn from(price: Price) -> Self {
        price.0.unsigned_abs()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Balance represents a wallet balance (can be zero, never negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Balance(i64);

impl Balance {
    pub fn new(value: i64) -> Result<Self, AmountError> {
        if value < 0 {
            return Err(AmountError::Negative(value));
        }
        Ok(Self(value))
    }

    pub fn zero() -> Self {
        Self(0)
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    /// Check if balance covers a withdrawal of `coins`
    pub fn covers(&self, coins: i64) -> bool {
        self.0 >= coins
    }

    /// Add coins to balance
    pub fn credit(&self, coins: i64) -> Result<Balance, AmountError> {
        let new_value = self.0.checked_add(coins).ok_or(AmountError::Overflow)?;
        Balance::new(new_value)
    }

    /// Subtract coins from balance
    pub fn debit(&self, coins: i64) -> Result<Balance, AmountError> {
        let new_value = self.0.checked_sub(coins).ok_or(AmountError::Overflow)?;
        Balance::new(new_value)
    }
}

impl TryFrom<i64> for Balance {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Balance::new(value)
    }
}

impl From<Balance> for i64 {
    fn from(balance: Balance) -> Self {
        balance.0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_bounds() {
        assert_eq!(Amount::new(1).unwrap().value(), 1);
        assert_eq!(Amount::new(MAX_AMOUNT).unwrap().value(), 1000);
        assert_eq!(Amount::new(0), Err(AmountError::Zero));
        assert_eq!(
            Amount::new(1001),
            Err(AmountError::OutOfRange { got: 1001, max: 1000 })
        );
    }

    #[test]
    fn test_amount_deserialize_rejects_zero() {
        let ok: Amount = serde_json::from_str("250").unwrap();
        assert_eq!(ok.value(), 250);
        assert!(serde_json::from_str::<Amount>("0").is_err());
        assert!(serde_json::from_str::<Amount>("-5").is_err());
    }

    #[test]
    fn test_price_bounds() {
        assert!(Price::new(50).is_ok());
        assert!(Price::new(0).is_err());
        assert!(Price::new(MAX_PRICE + 1).is_err());
    }

    #[test]
    fn test_balance_credit_debit() {
        let balance = Balance::new(100).unwrap();

        let balance = balance.debit(30).unwrap();
        assert_eq!(balance.value(), 70);

        let balance = balance.credit(10).unwrap();
        assert_eq!(balance.value(), 80);
    }

    #[test]
    fn test_balance_never_negative() {
        let balance = Balance::new(20).unwrap();
        assert!(!balance.covers(30));
        assert_eq!(balance.debit(30), Err(AmountError::Negative(-10)));
        assert!(Balance::new(-1).is_err());
    }

    #[test]
    fn test_balance_exact_debit() {
        let balance = Balance::new(50).unwrap();
        assert!(balance.covers(50));
        assert_eq!(balance.debit(50).unwrap(), Balance::zero());
    }
}
