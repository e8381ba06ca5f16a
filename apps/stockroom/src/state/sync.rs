//! # Sync Event Logging
//!
//! The CLI has no window to push events to, so agent progress becomes
//! structured log lines.
//!
//! ```text
//! SyncAgent ──emit_report("push", report)──► INFO  phase=push applied=.. pushed=..
//!           ──emit_error(msg, retryable)───► WARN  (retryable) / ERROR
//!           ──emit_status(status)──────────► DEBUG listeners_running=..
//! ```

use stockroom_sync::{SyncEventEmitter, SyncReport, SyncStatus};
use tracing::{debug, error, info, warn};

/// Emits sync events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEmitter;

impl SyncEventEmitter for TracingEmitter {
    fn emit_status(&self, status: &SyncStatus) {
        debug!(
            listeners_running = status.listeners_running,
            last_sync = status.last_sync.as_deref().unwrap_or("never"),
            applied = status.listener_totals.applied,
            "Sync status"
        );
    }

    fn emit_report(&self, phase: &str, report: &SyncReport) {
        info!(
            phase,
            applied = report.applied,
            skipped = report.skipped,
            pushed = report.pushed,
            failed = report.failed,
            quarantined = report.quarantined,
            "Sync pass finished"
        );
    }

    fn emit_error(&self, message: &str, retryable: bool) {
        if retryable {
            warn!(retryable, "{}", message);
        } else {
            error!(retryable, "{}", message);
        }
    }
}
