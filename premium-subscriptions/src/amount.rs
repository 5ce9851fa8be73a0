//! Fixed-point amounts for plan prices and wallet balances
//!
//! Prices come from three different catalogs (on-chain, app store, extension
//! billing) in different currencies and precisions. All of them are carried
//! as `Decimal`, never `f64`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Monetary amount in major units (e.g. `4.99` USD, `1.5` TON)
///
/// # Examples
///
/// ```rust
/// use premium_subscriptions::Amount;
///
/// let price = Amount::from_minor(4_990_000_000, 9);
/// assert_eq!(price.to_string(), "4.990000000");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount {
    value: Decimal,
}

impl Amount {
    /// Create from a decimal value
    pub fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// Create from smallest units with the given number of decimals
    ///
    /// # Examples
    ///
    /// ```rust
    /// use premium_subscriptions::Amount;
    /// let cents = Amount::from_minor(499, 2);
    /// assert_eq!(cents.to_string(), "4.99");
    /// ```
    pub fn from_minor(units: i64, decimals: u32) -> Self {
        Self {
            value: Decimal::new(units, decimals),
        }
    }

    /// Create from decimal string (e.g., "123.45")
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed as a valid decimal.
    pub fn from_str_checked(s: &str) -> Result<Self, String> {
        Decimal::from_str(s)
            .map(|value| Self { value })
            .map_err(|e| format!("Invalid amount: {}", e))
    }

    /// Get zero amount
    pub fn zero() -> Self {
        Self {
            value: Decimal::ZERO,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Get the internal Decimal value.
    pub fn as_decimal(&self) -> Decimal {
        self.value
    }

    /// Checked addition (returns None on overflow)
    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        self.value
            .checked_add(other.value)
            .map(|value| Self { value })
    }

    /// Checked subtraction (returns None on overflow)
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        self.value
            .checked_sub(other.value)
            .map(|value| Self { value })
    }

    /// How much is missing to cover `required`, zero when fully covered
    ///
    /// # Examples
    ///
    /// ```rust
    /// use premium_subscriptions::Amount;
    /// let balance = Amount::from_minor(150, 2);
    /// let charge = Amount::from_minor(499, 2);
    /// assert_eq!(balance.shortfall(&charge), Amount::from_minor(349, 2));
    /// assert!(charge.shortfall(&balance).is_zero());
    /// ```
    pub fn shortfall(&self, required: &Self) -> Self {
        required
            .checked_sub(self)
            .filter(|missing| missing.value > Decimal::ZERO)
            .unwrap_or_else(Self::zero)
    }

    /// Check if this amount covers `required`
    pub fn covers(&self, required: &Self) -> bool {
        self.value >= required.value
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl FromStr for Amount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_checked(s)
    }
}

/// An amount tagged with its currency code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub amount: Amount,
    /// Currency code, e.g. "USD" or "TON"
    pub currency: String,
}

impl Price {
    pub fn new(amount: Amount, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency)
    }
}
