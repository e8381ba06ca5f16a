//! # Backup Commands
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  needs the database open           │  must run with the database closed │
//! │  ────────────────────────          │  ─────────────────────────────     │
//! │  upload   checkpoint + base64 blob │  download  remote blob ► file      │
//! │  local    checkpoint + backup zip  │  restore   zip / .db ► file        │
//! │  save     checkpoint + file copy   │  list      reads the backup dir    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Snapshot outcomes that are not a success become `BACKUP_ERROR`, with the
//! status line as the message.

use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use stockroom_sync::{SnapshotBackup, SnapshotStatus, StockroomConfig};

use crate::error::{ApiError, ApiResult};
use crate::state::{rotating_backup, AppState, Remote};

fn status_result(status: SnapshotStatus) -> ApiResult<String> {
    if status.is_success() {
        Ok(status.to_string())
    } else {
        Err(ApiError::backup(status.to_string()))
    }
}

pub async fn upload(state: &AppState) -> ApiResult<String> {
    let remote = state.remote().ok_or_else(ApiError::remote_disabled)?;
    state.db().checkpoint().await?;
    let status = SnapshotBackup::new(remote.store(), state.db().path())
        .upload()
        .await;
    status_result(status)
}

/// Replaces the database file with the remote snapshot.
pub async fn download(config: &StockroomConfig, remote: Option<&Remote>) -> ApiResult<String> {
    let remote = remote.ok_or_else(ApiError::remote_disabled)?;
    let status = SnapshotBackup::new(remote.store(), &config.database.path)
        .download()
        .await;
    status_result(status)
}

pub async fn local(state: &AppState) -> ApiResult<String> {
    let path = state.backup_now().await?;
    Ok(format!("Backup saved: {}", path.display()))
}

pub fn list(config: &StockroomConfig) -> ApiResult<String> {
    let rotation = rotating_backup(config);
    let entries = rotation.list()?;
    if entries.is_empty() {
        return Ok(format!(
            "No backups in {}.",
            rotation.backup_dir().display()
        ));
    }

    Ok(entries
        .iter()
        .map(|entry| {
            let modified: DateTime<Local> = entry.modified.into();
            format!(
                "{:<40} {:>12} bytes  {}",
                entry.name,
                entry.size,
                modified.format("%Y-%m-%d %H:%M:%S")
            )
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Overwrites the database file from an archive or a `.db` copy.
pub async fn restore(config: &StockroomConfig, source: PathBuf) -> ApiResult<String> {
    if !source.is_file() {
        return Err(ApiError::not_found("Backup", source.display()));
    }
    let rotation = rotating_backup(config);
    let shown = source.display().to_string();
    tokio::task::spawn_blocking(move || rotation.restore(&source))
        .await
        .map_err(|e| ApiError::internal(format!("Restore task failed: {e}")))??;
    Ok(format!("Database restored from {shown}."))
}

pub async fn save(state: &AppState, dest: &Path) -> ApiResult<String> {
    state.db().checkpoint().await?;
    let rotation = rotating_backup(state.config());
    let target = dest.to_path_buf();
    let bytes = tokio::task::spawn_blocking(move || rotation.save_copy(&target))
        .await
        .map_err(|e| ApiError::internal(format!("Copy task failed: {e}")))??;
    Ok(format!("Saved {bytes} bytes to {}.", dest.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{file_config, product};
    use crate::error::ErrorCode;
    use std::sync::Arc;
    use stockroom_sync::MemoryRemote;

    async fn open(config: &StockroomConfig, remote: Option<Remote>) -> AppState {
        AppState::open_with(config.clone(), remote).await.unwrap()
    }

    #[tokio::test]
    async fn test_upload_then_download_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(dir.path());
        let memory = Arc::new(MemoryRemote::new());
        let remote = Remote::new(memory.clone());

        let state = open(&config, Some(remote.clone())).await;
        state.db().products().insert(&product("Rice", None, 10, 100.0)).await.unwrap();
        assert_eq!(upload(&state).await.unwrap(), "Backup uploaded to remote store.");
        state.db().products().clear_all().await.unwrap();
        state.db().close().await;
        assert!(!dir.path().join("inventory.db-wal").exists());

        let out = download(&config, Some(&remote)).await.unwrap();
        assert!(out.starts_with("Backup restored locally: "));
        assert!(dir.path().join("inventory.db.local.bak").is_file());

        let state = open(&config, None).await;
        assert_eq!(state.db().products().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_commands_need_remote() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(dir.path());
        let err = download(&config, None).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ConfigError);

        let remote = Remote::new(Arc::new(MemoryRemote::new()));
        let err = download(&config, Some(&remote)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BackupError);
        assert_eq!(err.message, "No backup found in remote store.");
    }

    #[tokio::test]
    async fn test_local_archive_restore() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(dir.path());

        let state = open(&config, None).await;
        state.db().products().insert(&product("Rice", None, 10, 100.0)).await.unwrap();
        let out = local(&state).await.unwrap();
        assert!(out.starts_with("Backup saved: "));
        state.db().products().clear_all().await.unwrap();
        state.db().close().await;
        assert!(!dir.path().join("inventory.db-wal").exists());

        assert_eq!(list(&config).unwrap().lines().count(), 1);
        let archive = rotating_backup(&config).list().unwrap().remove(0).path;
        restore(&config, archive).await.unwrap();

        let state = open(&config, None).await;
        assert_eq!(state.db().products().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_restore_survives_repeated_rounds() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(dir.path());

        for round in 1..=5 {
            let state = open(&config, None).await;
            state.db().products().insert(&product("Rice", None, 10, 100.0)).await.unwrap();
            local(&state).await.unwrap();
            state.db().products().clear_all().await.unwrap();
            state.db().close().await;

            let archive = rotating_backup(&config).list().unwrap().remove(0).path;
            restore(&config, archive).await.unwrap();

            let state = open(&config, None).await;
            let restored = state.db().products().count().await.unwrap();
            assert_eq!(restored, round, "round {round}");
            state.db().close().await;
        }
    }

    #[tokio::test]
    async fn test_save_copy_and_missing_restore_source() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(dir.path());
        let state = open(&config, None).await;

        let dest = dir.path().join("copy.db");
        let out = save(&state, &dest).await.unwrap();
        assert!(out.starts_with("Saved "));
        assert!(dest.is_file());
        state.db().close().await;

        let err = restore(&config, dir.path().join("absent.zip")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(
            list(&config).unwrap(),
            format!("No backups in {}.", dir.path().join("backups").display())
        );
    }
}
