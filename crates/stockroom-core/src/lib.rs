//! # stockroom-core: Pure Business Logic for Stockroom
//!
//! This crate contains the domain model of the inventory / point-of-sale
//! system as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/stockroom (CLI + sync daemon)              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │         stockroom-sync (remote mirror, listeners, backups)      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            stockroom-db (SQLite, repositories, merge)           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ stockroom-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ timestamp │  │ validation│  │   │
//! │  │   │  Product  │  │   Money   │  │  to_epoch │  │   rules   │  │   │
//! │  │   │   Sale    │  │SaleAmounts│  │  now_iso  │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, Sale, Transaction, User, report rows)
//! - [`money`] - Integer-cents arithmetic for sale totals and profit
//! - [`timestamp`] - Epoch/ISO timestamp handling for last-write-wins merging
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation run before any mutation
//!
//! ## Example Usage
//!
//! ```rust
//! use stockroom_core::money::SaleAmounts;
//!
//! // product {price=100, cost_price=60}; sell 3
//! let amounts = SaleAmounts::compute(100.0, 60.0, 3).unwrap();
//! assert_eq!(amounts.total.to_major(), 300.0);
//! assert_eq!(amounts.profit.to_major(), 120.0);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod timestamp;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::{Money, SaleAmounts};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Pseudo-category shown for products whose category is NULL or blank.
pub const NO_CATEGORY: &str = "No Category";

/// Stock level below which a product is reported as low stock.
pub const DEFAULT_LOW_STOCK_THRESHOLD: i64 = 5;

/// Number of rotating local backup archives kept on disk.
pub const DEFAULT_MAX_BACKUPS: usize = 5;
