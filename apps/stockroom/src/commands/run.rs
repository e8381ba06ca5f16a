//! # Sync Daemon
//!
//! ```text
//! restore_on_start? ──► snapshot download (database still closed)
//!        │
//!        ▼
//! open database ──► local archive
//!        │
//!        ▼
//! SyncAgent::start ──► push all ──► pull all ──► listeners (products, sales)
//!        │
//!        ▼
//! ... until the shutdown future resolves (Ctrl-C / SIGTERM) ...
//!        │
//!        ▼
//! agent.shutdown ──► checkpoint ──► upload_on_exit? snapshot upload ──► close
//! ```

use std::future::Future;
use std::sync::Arc;
use stockroom_sync::{SnapshotBackup, StockroomConfig, SyncAgent};
use tracing::{info, warn};

use super::backup;
use crate::error::{ApiError, ApiResult};
use crate::state::{AppState, Remote, TracingEmitter};

/// Runs the sync daemon until `shutdown` resolves. Returns a summary line.
pub async fn run_until<F>(
    config: StockroomConfig,
    remote: Option<Remote>,
    shutdown: F,
) -> ApiResult<String>
where
    F: Future<Output = ()>,
{
    let remote = remote.ok_or_else(ApiError::remote_disabled)?;

    if config.backup.restore_on_start {
        match backup::download(&config, Some(&remote)).await {
            Ok(status) => info!(%status, "Startup restore"),
            Err(e) => warn!(error = %e, "Startup restore skipped"),
        }
    }

    let state = AppState::open_with(config, Some(remote.clone())).await?;
    state.auto_backup().await;

    let mut agent = SyncAgent::from_parts(
        state.db().clone(),
        remote.store(),
        remote.feed(),
        Arc::new(TracingEmitter),
    );
    if let Err(e) = agent.start().await {
        state.db().close().await;
        return Err(e.into());
    }
    info!("Listening for remote changes; press Ctrl-C to stop");

    shutdown.await;

    if let Err(e) = agent.shutdown().await {
        warn!(error = %e, "Listeners did not stop cleanly");
    }
    let status = agent.status().await;

    if let Err(e) = state.db().checkpoint().await {
        warn!(error = %e, "Checkpoint before exit failed");
    }
    if state.config().backup.upload_on_exit {
        let status = SnapshotBackup::new(remote.store(), state.db().path())
            .upload()
            .await;
        if status.is_success() {
            info!(%status, "Exit upload");
        } else {
            warn!(%status, "Exit upload failed");
        }
    }
    state.db().close().await;

    let mut summary = vec!["Sync stopped.".to_string()];
    if let Some(push) = status.last_push {
        summary.push(format!("  startup push: {push}"));
    }
    if let Some(pull) = status.last_pull {
        summary.push(format!("  startup pull: {pull}"));
    }
    summary.push(format!("  listeners:    {}", status.listener_totals));
    if let Some(error) = status.last_error {
        summary.push(format!("  last error:   {error}"));
    }
    Ok(summary.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::file_config;
    use crate::error::ErrorCode;
    use serde_json::json;
    use stockroom_sync::{MemoryRemote, RemoteStore};

    #[tokio::test]
    async fn test_daemon_syncs_and_uploads_on_exit() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = file_config(dir.path());
        config.backup.upload_on_exit = true;

        let memory = Arc::new(MemoryRemote::new());
        memory
            .set(
                "/products/3",
                &json!({"name": "Oats", "category": "Grains", "quantity": 9,
                        "price": 20.0, "cost_price": 12.0, "last_updated": 50.0}),
            )
            .await
            .unwrap();

        let out = run_until(config.clone(), Some(Remote::new(memory.clone())), async {})
            .await
            .unwrap();
        assert!(out.starts_with("Sync stopped."));
        assert!(out.contains("startup pull: applied=1"));

        let blob = memory.get("/backups/inventory_db").await.unwrap();
        assert!(matches!(blob, Some(serde_json::Value::String(s)) if !s.is_empty()));

        let state = AppState::open_with(config, None).await.unwrap();
        assert_eq!(state.db().products().require(3).await.unwrap().name, "Oats");
        assert!(!crate::state::rotating_backup(state.config()).list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_daemon_needs_remote() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_until(file_config(dir.path()), None, async {})
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigError);
    }
}
