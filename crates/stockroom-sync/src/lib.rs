//! # stockroom-sync: Remote Mirror and Backups for Stockroom
//!
//! Keeps the local SQLite database and a realtime remote store (Firebase
//! Realtime Database) in step, and owns both backup flavours.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Agent Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                      SyncAgent (startup orchestrator)            │  │
//! │  │  ensure columns → push_all → pull_all → start listeners          │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  Synchronizer  │  │   Listeners    │  │  Remote                │    │
//! │  │                │  │                │  │                        │    │
//! │  │ push (stamp +  │  │ one task per   │  │ RemoteStore: REST      │    │
//! │  │ set), pull     │◄─│ collection,    │◄─│ ChangeFeed: SSE with   │    │
//! │  │ (apply if      │  │ handle_event   │  │ reconnect backoff      │    │
//! │  │ newer)         │  │                │  │ MemoryRemote for tests │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  Records       │  │  Backups       │  │  Config                │    │
//! │  │                │  │                │  │                        │    │
//! │  │ typed remote   │  │ base64 snapshot│  │ stockroom.toml + env   │    │
//! │  │ payloads,      │  │ rotating zips  │  │                        │    │
//! │  │ quarantine     │  │                │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Conflict Rule
//! A remote record replaces the local row only when its `last_updated` is
//! strictly newer. Pushing stamps the local row with the current time first,
//! so a fresh local edit wins the next comparison everywhere.
//!
//! ## Module Organization
//! - [`agent`] - `SyncAgent` startup sequence and status
//! - [`backup`] - remote snapshot and rotating zip archives
//! - [`config`] - `StockroomConfig` (TOML + environment)
//! - [`error`] - Sync error types
//! - [`listener`] - change-stream consumers
//! - [`merge`] - `Synchronizer` push/pull/event handling
//! - [`record`] - typed remote records
//! - [`remote`] - remote store traits, Firebase client, in-memory store

pub mod agent;
pub mod backup;
pub mod config;
pub mod error;
pub mod listener;
pub mod merge;
pub mod record;
pub mod remote;

pub use agent::{NoOpEmitter, SyncAgent, SyncEventEmitter, SyncStatus};
pub use backup::{BackupEntry, RotatingBackup, SnapshotBackup, SnapshotStatus};
pub use config::StockroomConfig;
pub use error::{SyncError, SyncResult};
pub use listener::{Listener, ListenerHandle, Listeners};
pub use merge::{SyncReport, Synchronizer};
pub use record::{ProductRecord, SaleRecord, UserRecord};
pub use remote::{
    ChangeEvent, ChangeFeed, Collection, EventKind, FirebaseClient, FirebaseConfig, MemoryRemote,
    RemotePath, RemoteStore,
};
