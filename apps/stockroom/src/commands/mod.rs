//! # Commands Module
//!
//! One function per subcommand. Each takes the state it needs and returns
//! the text to print.
//!
//! ```text
//! commands/
//! ├── mod.rs      ◄─── You are here (exports, table formatting)
//! ├── product.rs  ◄─── Catalog CRUD, categories, low stock
//! ├── sale.rs     ◄─── Sell, checkout, sale/transaction lookup
//! ├── report.rs   ◄─── Totals and best seller
//! ├── staff.rs    ◄─── Login, accounts, admin password
//! ├── backup.rs   ◄─── Remote snapshot + local archives
//! ├── sync.rs     ◄─── One-shot push/pull, migration log
//! └── run.rs      ◄─── Long-running sync daemon
//! ```
//!
//! ## Command Flow
//! ```text
//! stockroom sale sell 4 2
//!      │
//!      ▼
//! lib::run ──► AppState::open ──► sale::sell(&state, 4, 2)
//!                                      │
//!                                      ├─ SaleRepository::record_sale
//!                                      ├─ state.after_sales (push + backup)
//!                                      ▼
//!                                 "Sale #12 recorded: ..."  ──► stdout
//! ```

pub mod backup;
pub mod product;
pub mod report;
pub mod run;
pub mod sale;
pub mod staff;
pub mod sync;

use stockroom_core::Money;

/// Money column, two decimals.
pub(crate) fn money(amount: f64) -> String {
    Money::from_major(amount).to_string()
}
