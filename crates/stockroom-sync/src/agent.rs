//! # Sync Agent
//!
//! Orchestrates the mirror once the database is open.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncAgent::start()                               │
//! │                                                                         │
//! │  1. ensure_last_updated_columns    older databases gain the column      │
//! │  2. push_all                       every local row stamped + uploaded   │
//! │  3. pull_all                       remote rows applied if newer         │
//! │  4. Listeners::start               products + sales change streams      │
//! │                                                                         │
//! │  Failures in 2 and 3 are per-record: counted in the reports, never      │
//! │  fatal. Only a schema failure in 1 aborts the start.                    │
//! │                                                                         │
//! │  STATUS EVENTS (SyncEventEmitter):                                      │
//! │  emit_report("push" | "pull", report)                                   │
//! │  emit_status(status)   after start and shutdown                         │
//! │  emit_error(message, retryable)                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use std::sync::Arc;
use stockroom_core::timestamp::now_iso;
use stockroom_db::Database;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::SyncResult;
use crate::listener::Listeners;
use crate::merge::{SyncReport, Synchronizer};
use crate::remote::{ChangeFeed, RemoteStore};

// =============================================================================
// Sync Status
// =============================================================================

/// Current sync status for external queries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStatus {
    /// Whether both listeners are alive.
    pub listeners_running: bool,

    /// Report of the startup upload.
    pub last_push: Option<SyncReport>,

    /// Report of the startup download.
    pub last_pull: Option<SyncReport>,

    /// Events applied by the listeners so far.
    pub listener_totals: SyncReport,

    /// Last completed sync step (ISO 8601).
    pub last_sync: Option<String>,

    /// Last error message (if any).
    pub last_error: Option<String>,
}

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Receives sync progress (implemented by the CLI as log lines).
pub trait SyncEventEmitter: Send + Sync {
    /// Emits a sync status change event.
    fn emit_status(&self, status: &SyncStatus);

    /// Emits the report of one push or pull pass.
    fn emit_report(&self, phase: &str, report: &SyncReport);

    /// Emits a sync error event.
    fn emit_error(&self, message: &str, retryable: bool);
}

/// No-op event emitter for testing.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_status(&self, _status: &SyncStatus) {}
    fn emit_report(&self, _phase: &str, _report: &SyncReport) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// Sync Agent
// =============================================================================

/// Runs the startup sync and owns the listeners.
pub struct SyncAgent {
    synchronizer: Synchronizer,
    feed: Arc<dyn ChangeFeed>,
    status: Arc<RwLock<SyncStatus>>,
    emitter: Arc<dyn SyncEventEmitter>,
    listeners: Option<Listeners>,
}

impl SyncAgent {
    /// Creates a new sync agent.
    pub fn new<R>(db: Database, remote: Arc<R>) -> Self
    where
        R: RemoteStore + ChangeFeed + 'static,
    {
        Self::with_emitter(db, remote, Arc::new(NoOpEmitter))
    }

    /// Creates a new sync agent with a custom event emitter.
    pub fn with_emitter<R>(db: Database, remote: Arc<R>, emitter: Arc<dyn SyncEventEmitter>) -> Self
    where
        R: RemoteStore + ChangeFeed + 'static,
    {
        let store: Arc<dyn RemoteStore> = remote.clone();
        Self::from_parts(db, store, remote, emitter)
    }

    /// Creates an agent from separately held store and feed handles.
    pub fn from_parts(
        db: Database,
        store: Arc<dyn RemoteStore>,
        feed: Arc<dyn ChangeFeed>,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> Self {
        SyncAgent {
            synchronizer: Synchronizer::new(db, store),
            feed,
            status: Arc::new(RwLock::new(SyncStatus::default())),
            emitter,
            listeners: None,
        }
    }

    /// Shared push/pull engine, for mutations made while the agent runs.
    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    /// Returns the current sync status.
    pub async fn status(&self) -> SyncStatus {
        let mut status = self.status.read().await.clone();
        if let Some(listeners) = &self.listeners {
            status.listeners_running = listeners.is_running();
            status.listener_totals = listeners.totals();
        }
        status
    }

    /// Runs the startup sequence and starts the listeners.
    pub async fn start(&mut self) -> SyncResult<SyncStatus> {
        if self.listeners.is_some() {
            warn!("Sync agent already started");
            return Ok(self.status().await);
        }

        info!("Starting sync agent");
        if let Err(e) = self.synchronizer.database().ensure_last_updated_columns().await {
            self.emitter.emit_error(&e.to_string(), false);
            self.status.write().await.last_error = Some(e.to_string());
            return Err(e.into());
        }

        let pushed = self.synchronizer.push_all().await;
        self.record("push", pushed).await;

        let pulled = self.synchronizer.pull_all().await;
        self.record("pull", pulled).await;

        self.listeners = Some(Listeners::start(Arc::clone(&self.feed), &self.synchronizer));

        let status = self.status().await;
        self.emitter.emit_status(&status);
        info!("Sync agent started");
        Ok(status)
    }

    async fn record(&self, phase: &str, report: SyncReport) {
        self.emitter.emit_report(phase, &report);

        let mut status = self.status.write().await;
        match phase {
            "push" => status.last_push = Some(report),
            _ => status.last_pull = Some(report),
        }
        status.last_sync = Some(now_iso());

        if !report.is_clean() {
            let message = format!("{phase} finished with errors: {report}");
            self.emitter.emit_error(&message, report.failed > 0);
            status.last_error = Some(message);
        }
    }

    /// Stops the listeners gracefully.
    pub async fn shutdown(&mut self) -> SyncResult<()> {
        info!("Shutting down sync agent");

        let result = match self.listeners.take() {
            Some(listeners) => {
                let totals = listeners.totals();
                let result = listeners.shutdown().await;
                let mut status = self.status.write().await;
                status.listeners_running = false;
                status.listener_totals = totals;
                result
            }
            None => Ok(()),
        };

        let status = self.status().await;
        self.emitter.emit_status(&status);
        info!("Sync agent stopped");
        result
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
