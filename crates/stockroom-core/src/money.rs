//! # Money Module
//!
//! Provides the `Money` type used for every sale total and profit figure.
//!
//! ## Integer Minor Units
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Prices are stored as REAL in SQLite and in the remote mirror, but all  │
//! │  arithmetic on them happens in integer minor units (cents):            │
//! │                                                                         │
//! │    product.price (f64) ──► Money::from_major ──► cents (i64)           │
//! │                                                    │                    │
//! │                                       × qty, − cost × qty               │
//! │                                                    │                    │
//! │    sale.total_price (f64) ◄── Money::to_major ◄────┘                   │
//! │                                                                         │
//! │    0.1 + 0.2 in f64 = 0.30000000000000004                              │
//! │    10 + 20 in cents = 30 → 0.30                                        │
//! │                                                                         │
//! │  Sale math uses the checked forms: an amount that does not fit in i64  │
//! │  cents is a validation error, never a wrapped or saturated number.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use stockroom_core::money::Money;
//!
//! let price = Money::from_major(10.99);
//! assert_eq!(price.cents(), 1099);
//!
//! let total = price * 3;
//! assert_eq!(total.to_major(), 32.97);
//! ```

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// Signed so that a sale below cost yields a negative profit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ```rust
    /// use stockroom_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from a major-unit amount as stored in the
    /// database (`REAL` column), rounding to the nearest cent.
    ///
    /// Non-finite input (NaN, ±inf) maps to zero.
    ///
    /// ```rust
    /// use stockroom_core::money::Money;
    ///
    /// assert_eq!(Money::from_major(10.99).cents(), 1099);
    /// assert_eq!(Money::from_major(0.1 + 0.2).cents(), 30);
    /// assert_eq!(Money::from_major(f64::NAN).cents(), 0);
    /// ```
    pub fn from_major(amount: f64) -> Self {
        Money::checked_from_major(amount).unwrap_or_default()
    }

    /// Like [`Money::from_major`], but `None` for non-finite amounts and for
    /// amounts whose cents do not fit in an `i64`.
    ///
    /// ```rust
    /// use stockroom_core::money::Money;
    ///
    /// assert_eq!(Money::checked_from_major(2.5), Some(Money::from_cents(250)));
    /// assert_eq!(Money::checked_from_major(1e17), None);
    /// ```
    pub fn checked_from_major(amount: f64) -> Option<Self> {
        let cents = (amount * 100.0).round();
        // i64::MAX as f64 rounds up to 2^63, which itself is out of range.
        if !cents.is_finite() || cents >= i64::MAX as f64 || cents < i64::MIN as f64 {
            return None;
        }
        Some(Money(cents as i64))
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_sub(self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// `self × qty`, `None` on overflow.
    pub fn checked_mul(self, qty: i64) -> Option<Money> {
        self.0.checked_mul(qty).map(Money)
    }

    /// Returns the amount in major units, for storage in a `REAL` column.
    #[inline]
    pub fn to_major(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion (truncated toward zero).
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }
}

// =============================================================================
// Display Implementation
// =============================================================================

/// Formats as a plain two-decimal amount, e.g. `300.00` or `-5.50`.
///
/// No currency symbol is attached; the shop's currency is a display concern
/// of whoever renders the report.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            write!(f, "-{}.{:02}", self.abs().major(), self.abs().minor())
        } else {
            write!(f, "{}.{:02}", self.major(), self.minor())
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

// =============================================================================
// Arithmetic Operations
// =============================================================================
//
// The operators saturate at the i64 bounds so report sums never panic.
// Anything written to a sale row goes through the checked_ forms instead.

impl Add for Money {
    type Output = Money;

    #[inline]
    fn add(self, other: Money) -> Money {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Money) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Money;

    #[inline]
    fn sub(self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Money) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

/// Multiply by a quantity.
impl Mul<i64> for Money {
    type Output = Money;

    #[inline]
    fn mul(self, qty: i64) -> Money {
        Money(self.0.saturating_mul(qty))
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Sale Amounts
// =============================================================================

/// Total and profit for one sale line.
///
/// ```text
/// total  = price × qty
/// profit = (price − cost_price) × qty
/// ```
///
/// Both are computed in cents and converted back with [`Money::to_major`]
/// when the sale row is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleAmounts {
    pub total: Money,
    pub profit: Money,
}

impl SaleAmounts {
    /// Computes the amounts for selling `qty` units.
    ///
    /// ```rust
    /// use stockroom_core::money::SaleAmounts;
    ///
    /// let a = SaleAmounts::compute(100.0, 60.0, 3).unwrap();
    /// assert_eq!(a.total.to_major(), 300.0);
    /// assert_eq!(a.profit.to_major(), 120.0);
    ///
    /// assert!(SaleAmounts::compute(1e9, 0.0, 10_000_000_000).is_err());
    /// ```
    ///
    /// ## Errors
    /// `OutOfRange` when a price, the total or the profit does not fit in
    /// `i64` cents (prices are REAL columns and can arrive from the remote
    /// mirror unvalidated).
    pub fn compute(price: f64, cost_price: f64, qty: i64) -> Result<Self, ValidationError> {
        let unit_price = Money::checked_from_major(price).ok_or_else(|| too_large("price"))?;
        let unit_cost =
            Money::checked_from_major(cost_price).ok_or_else(|| too_large("cost_price"))?;

        let total = unit_price.checked_mul(qty).ok_or_else(|| too_large("total"))?;
        let profit = unit_price
            .checked_sub(unit_cost)
            .and_then(|margin| margin.checked_mul(qty))
            .ok_or_else(|| too_large("profit"))?;

        Ok(SaleAmounts { total, profit })
    }
}

fn too_large(field: &str) -> ValidationError {
    ValidationError::OutOfRange {
        field: field.to_string(),
        min: i64::MIN / 100,
        max: i64::MAX / 100,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
