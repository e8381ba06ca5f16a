//! # Repository Module
//!
//! Database repository implementations for Stockroom.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  CLI command / Synchronizer                                            │
//! │       │                                                                 │
//! │       │  db.sales().record_sale(1, 3, None)                            │
//! │       ▼                                                                 │
//! │  SaleRepository                                                        │
//! │  ├── record_sale(&self, product_id, qty, transaction)  (atomic)       │
//! │  ├── get_all(&self)                                                    │
//! │  └── best_seller(&self) ...                                            │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`product::ProductRepository`] - Catalog CRUD, categories, low stock
//! - [`sale::SaleRepository`] - Sale recording and sales reports
//! - [`transaction::TransactionRepository`] - Multi-line checkouts
//! - [`user::UserRepository`] - Accounts, roles, password hashing
//! - [`merge::MergeRepository`] - Apply-if-newer upserts from the remote mirror
//! - [`migration_log::MigrationLogRepository`] - Schema change history

pub mod merge;
pub mod migration_log;
pub mod product;
pub mod sale;
pub mod transaction;
pub mod user;

/// Column list shared by every query that returns a full [`stockroom_core::Product`].
pub(crate) const PRODUCT_COLUMNS: &str = "id, name, category, quantity, price, \
     COALESCE(cost_price, 0.0) AS cost_price, COALESCE(last_updated, 0.0) AS last_updated";

/// Column list shared by every query that returns a raw [`stockroom_core::Sale`].
pub(crate) const SALE_COLUMNS: &str = "id, product_id, product_name, quantity_sold, total_price, \
     COALESCE(profit, 0.0) AS profit, timestamp, transaction_id, \
     COALESCE(last_updated, 0.0) AS last_updated";

/// Joined projection for [`stockroom_core::SaleRecord`] rows (`s` = sales, `p` = products).
pub(crate) const SALE_RECORD_COLUMNS: &str = "s.id, s.product_id, \
     COALESCE(p.name, s.product_name, 'Unknown product') AS product_name, \
     s.quantity_sold, s.total_price, COALESCE(s.profit, 0.0) AS profit, \
     s.timestamp, s.transaction_id";
