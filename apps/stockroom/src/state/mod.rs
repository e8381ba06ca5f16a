//! # State Module
//!
//! What a command needs besides its arguments.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    State Architecture                                   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                         AppState                                │   │
//! │  │                                                                 │   │
//! │  │  ┌──────────────┐  ┌──────────────┐  ┌──────────────────────┐  │   │
//! │  │  │  Config      │  │  Database    │  │  Option<Remote>      │  │   │
//! │  │  │  stockroom   │  │  (SQLite     │  │  store + change feed │  │   │
//! │  │  │  .toml + env │  │   pool)      │  │  (None when offline) │  │   │
//! │  │  └──────────────┘  └──────────────┘  └──────────────────────┘  │   │
//! │  │                                                                 │   │
//! │  │  after-change hooks: push to remote, rotate local archive      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  TracingEmitter: SyncAgent progress as log lines                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod app;
mod sync;

pub use app::{open_database, rotating_backup, AppState, Remote};
pub use sync::TracingEmitter;
