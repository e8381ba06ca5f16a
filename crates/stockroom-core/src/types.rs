//! # Domain Types
//!
//! Core domain types used throughout Stockroom.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │      Sale       │   │  Transaction    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │◄──│  product_id     │   │  id             │       │
//! │  │  name           │   │  product_name   │   │  timestamp      │       │
//! │  │  category?      │   │  quantity_sold  │   │  grand_total    │       │
//! │  │  quantity       │   │  total_price    │   └────────▲────────┘       │
//! │  │  price          │   │  profit         │            │                │
//! │  │  cost_price     │   │  transaction_id?│────────────┘                │
//! │  │  last_updated   │   │  last_updated   │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      User       │   │      Role       │   │  Report rows    │       │
//! │  │  uid (remote)   │   │  Admin          │   │  SaleRecord     │       │
//! │  │  username       │   │  Staff          │   │  BestSeller     │       │
//! │  └─────────────────┘   └─────────────────┘   │  LowStockItem   │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Products and sales use integer ids that double as their remote keys
//! (`/products/{id}`, `/sales/{id}`). Users carry a UUID `uid` for
//! `/users/{uid}` so that renaming a user never moves the remote node.
//!
//! `last_updated` is epoch seconds (f64) and only moves forward when a
//! strictly newer remote copy is applied, or when a local edit is pushed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::NO_CATEGORY;

// =============================================================================
// Product
// =============================================================================

/// A product in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: i64,
    pub name: String,
    /// NULL or blank means "No Category".
    pub category: Option<String>,
    pub quantity: i64,
    pub price: f64,
    pub cost_price: f64,
    /// Epoch seconds of the last write that reached this row.
    pub last_updated: f64,
}

impl Product {
    /// Category as shown to the operator.
    pub fn display_category(&self) -> &str {
        match self.category.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c,
            _ => NO_CATEGORY,
        }
    }

    #[inline]
    pub fn price_money(&self) -> Money {
        Money::from_major(self.price)
    }

    #[inline]
    pub fn cost_money(&self) -> Money {
        Money::from_major(self.cost_price)
    }

    /// Checks whether `quantity` units can be sold from current stock.
    pub fn can_sell(&self, quantity: i64) -> bool {
        quantity > 0 && quantity <= self.quantity
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub name: String,
    pub category: Option<String>,
    pub quantity: i64,
    pub price: f64,
    #[serde(default)]
    pub cost_price: f64,
}

/// Full replacement of a product's editable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductUpdate {
    pub name: String,
    pub category: Option<String>,
    pub quantity: i64,
    pub price: f64,
    pub cost_price: f64,
}

impl From<&Product> for ProductUpdate {
    fn from(p: &Product) -> Self {
        ProductUpdate {
            name: p.name.clone(),
            category: p.category.clone(),
            quantity: p.quantity,
            price: p.price,
            cost_price: p.cost_price,
        }
    }
}

/// A product whose stock is under the low-stock threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LowStockItem {
    pub id: i64,
    pub name: String,
    pub quantity: i64,
}

// =============================================================================
// Category Filter
// =============================================================================

/// Category selection for list and report queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum CategoryFilter {
    /// No filtering.
    All,
    /// One category; "No Category" selects NULL/blank categories.
    Named(String),
}

impl CategoryFilter {
    /// Builds a filter from operator input, where "All" (or nothing) means
    /// no filtering.
    pub fn parse(input: Option<&str>) -> Self {
        match input.map(str::trim) {
            None | Some("") => CategoryFilter::All,
            Some(s) if s.eq_ignore_ascii_case("all") => CategoryFilter::All,
            Some(s) => CategoryFilter::Named(s.to_string()),
        }
    }

    /// True when the filter selects the NULL/blank pseudo-category.
    pub fn is_no_category(&self) -> bool {
        matches!(self, CategoryFilter::Named(n) if n.eq_ignore_ascii_case(NO_CATEGORY))
    }
}

impl Default for CategoryFilter {
    fn default() -> Self {
        CategoryFilter::All
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A recorded sale line as stored in the `sales` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: i64,
    pub product_id: i64,
    /// Product name at the time of sale.
    pub product_name: Option<String>,
    pub quantity_sold: i64,
    pub total_price: f64,
    pub profit: f64,
    /// ISO-8601 local time.
    pub timestamp: String,
    pub transaction_id: Option<i64>,
    pub last_updated: f64,
}

/// Sale list row, joined with the product table for the current name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleRecord {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity_sold: i64,
    pub total_price: f64,
    pub profit: f64,
    pub timestamp: String,
    pub transaction_id: Option<i64>,
}

/// A single sale with its product's category, for the detail view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleDetail {
    pub id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub category: String,
    pub quantity_sold: i64,
    pub total_price: f64,
    pub profit: f64,
    pub timestamp: String,
    pub transaction_id: Option<i64>,
}

/// The product with the most units sold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct BestSeller {
    pub product_id: i64,
    pub product_name: String,
    pub total_quantity: i64,
    pub revenue: f64,
}

/// Per-product sales totals for the summary report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ProductSalesTotal {
    pub product_name: String,
    pub total_quantity: i64,
    pub total_revenue: f64,
    pub total_profit: f64,
}

// =============================================================================
// Transaction
// =============================================================================

/// A group of sale lines checked out together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Transaction {
    pub id: i64,
    pub timestamp: String,
    /// Sum of the linked sales' `total_price`, recomputed on finalize.
    pub grand_total: f64,
}

/// A transaction together with its sale lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TransactionDetails {
    pub transaction: Transaction,
    pub sales: Vec<SaleRecord>,
}

/// One line of a checkout: `product_id:quantity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub product_id: i64,
    pub quantity: i64,
}

impl FromStr for CartLine {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "cart line".to_string(),
            reason: reason.to_string(),
        };

        let (id, qty) = s
            .split_once(':')
            .ok_or_else(|| invalid("expected <product_id>:<quantity>"))?;
        let product_id = id
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid("product id is not a number"))?;
        let quantity = qty
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid("quantity is not a number"))?;

        Ok(CartLine {
            product_id,
            quantity,
        })
    }
}

// =============================================================================
// Users
// =============================================================================

/// A user's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
}

impl Role {
    /// Normalizes a stored or remote role string: anything that is not
    /// "admin" is staff.
    pub fn normalize(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::Staff
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local user account. The password hash never leaves the database crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct User {
    pub id: i64,
    /// Remote key under `/users/{uid}`.
    pub uid: String,
    pub username: String,
    pub role: Role,
}

// =============================================================================
// Migration Log
// =============================================================================

/// One schema change recorded by the migration runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct MigrationLogEntry {
    pub id: i64,
    pub timestamp: String,
    pub message: String,
}

// =============================================================================
// Unit Tests
// =============================================================================
