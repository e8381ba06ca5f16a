//! # stockroom-db: Database Layer for Stockroom
//!
//! This crate provides database access for Stockroom.
//! It uses SQLite for local storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockroom Data Flow                              │
//! │                                                                         │
//! │  CLI command (sale sell 1 3)        Listener (remote put /products/1)  │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  stockroom-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │              │  │   │
//! │  │   │               │    │ ProductRepo   │    │ create table │  │   │
//! │  │   │ SqlitePool    │◄───│ SaleRepo      │    │ add column   │  │   │
//! │  │   │ checkpoint()  │    │ Transaction.. │    │ if missing   │  │   │
//! │  │   │               │    │ UserRepo      │    │ + log entry  │  │   │
//! │  │   │               │    │ MergeRepo     │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (inventory.db)              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Schema creation and "add column if missing" upgrades
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockroom_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("inventory.db")).await?;
//!
//! let outcome = db.sales().record_sale(1, 3, None).await?;
//! println!("remaining stock: {}", outcome.remaining_stock);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::merge::{MergeOutcome, MergeRepository};
pub use repository::migration_log::MigrationLogRepository;
pub use repository::product::ProductRepository;
pub use repository::sale::{SaleOutcome, SaleRepository};
pub use repository::transaction::{CheckoutSummary, TransactionRepository};
pub use repository::user::UserRepository;
