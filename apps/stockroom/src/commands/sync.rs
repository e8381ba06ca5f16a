//! # Sync Commands
//!
//! One-shot passes of the same engine the `run` daemon uses at startup,
//! plus the schema migration log.

use stockroom_sync::SyncReport;
use tracing::info;

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::state::AppState;

fn finished(phase: &str, report: SyncReport) -> ApiResult<String> {
    info!(phase, %report, "Sync pass finished");
    let line = format!("{phase} finished: {report}");
    if report.failed > 0 {
        return Err(ApiError::new(ErrorCode::RemoteError, line));
    }
    Ok(line)
}

/// Stamps and uploads every local product and sale.
pub async fn push(state: &AppState) -> ApiResult<String> {
    let report = state.require_synchronizer()?.push_all().await;
    finished("Push", report)
}

/// Applies remote records newer than the local rows.
pub async fn pull(state: &AppState) -> ApiResult<String> {
    let report = state.require_synchronizer()?.pull_all().await;
    if report.applied > 0 {
        state.auto_backup().await;
    }
    finished("Pull", report)
}

pub async fn migrations(state: &AppState) -> ApiResult<String> {
    let entries = state.db().migration_log().entries().await?;
    if entries.is_empty() {
        return Ok("No migrations recorded.".to_string());
    }
    Ok(entries
        .iter()
        .map(|e| format!("{}  {}", e.timestamp, e.message))
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{add, mirrored_state, offline_state, product};
    use serde_json::json;
    use stockroom_sync::RemoteStore;

    #[tokio::test]
    async fn test_push_uploads_everything() {
        let (state, remote) = mirrored_state().await;
        let id = add(&state, product("Rice", None, 10, 100.0)).await;
        state.db().sales().record_sale(id, 2, None).await.unwrap();

        let out = push(&state).await.unwrap();
        assert_eq!(
            out,
            "Push finished: applied=0 skipped=0 pushed=2 failed=0 quarantined=0"
        );
        assert!(remote.get("/sales/1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_pull_applies_remote_rows() {
        let (state, remote) = mirrored_state().await;
        remote
            .set(
                "/products/7",
                &json!({"name": "Oats", "category": "Grains", "quantity": 3,
                        "price": 20.0, "cost_price": 12.0, "last_updated": 100.0}),
            )
            .await
            .unwrap();

        let out = pull(&state).await.unwrap();
        assert!(out.starts_with("Pull finished: applied=1"));
        let oats = state.db().products().require(7).await.unwrap();
        assert_eq!(oats.quantity, 3);
    }

    #[tokio::test]
    async fn test_offline_remote_fails_the_command() {
        let (state, remote) = mirrored_state().await;
        add(&state, product("Rice", None, 10, 100.0)).await;
        remote.set_offline(true);

        let err = push(&state).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::RemoteError);
        assert!(err.message.contains("failed=1"));
    }

    #[tokio::test]
    async fn test_sync_needs_remote() {
        let state = offline_state().await;
        let err = pull(&state).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigError);
    }

    #[tokio::test]
    async fn test_migration_log_lists_entries() {
        let state = offline_state().await;
        let out = migrations(&state).await.unwrap();
        assert!(!out.is_empty());
        assert!(out.lines().all(|line| line.contains("  ")));
    }
}
