//! # Remote Snapshot
//!
//! Uploads the whole database file to the remote store and brings it back.
//!
//! ```text
//! upload:    inventory.db ──read──► base64 ──set──► /backups/inventory_db
//! download:  /backups/inventory_db ──get──► base64 decode
//!                 │
//!                 ├─ inventory.db ──rename──► inventory.db.local.bak
//!                 ├─ inventory.db-wal/-shm ──► inventory.db.local.bak-wal/-shm
//!                 └─ decoded bytes ──write──► inventory.db
//! ```
//!
//! Both operations report a [`SnapshotStatus`] instead of failing: the
//! caller shows the status line and carries on.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::{set_aside_wal, with_suffix};
use crate::error::{SyncError, SyncResult};
use crate::remote::{RemotePath, RemoteStore};

/// Outcome of a snapshot upload or download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStatus {
    NoLocalDatabase,
    EncodeFailed,
    Uploaded,
    UploadFailed(String),
    NoRemoteBackup,
    Restored(PathBuf),
    RestoreFailed(String),
}

impl SnapshotStatus {
    /// True for `Uploaded` and `Restored`.
    pub fn is_success(&self) -> bool {
        matches!(self, SnapshotStatus::Uploaded | SnapshotStatus::Restored(_))
    }
}

impl fmt::Display for SnapshotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotStatus::NoLocalDatabase => write!(f, "No local database found."),
            SnapshotStatus::EncodeFailed => write!(f, "Failed to encode database."),
            SnapshotStatus::Uploaded => write!(f, "Backup uploaded to remote store."),
            SnapshotStatus::UploadFailed(e) => write!(f, "Upload failed: {e}"),
            SnapshotStatus::NoRemoteBackup => write!(f, "No backup found in remote store."),
            SnapshotStatus::Restored(path) => {
                write!(f, "Backup restored locally: {}", path.display())
            }
            SnapshotStatus::RestoreFailed(e) => write!(f, "Restore failed: {e}"),
        }
    }
}

/// Whole-file backup to `/backups/inventory_db`.
#[derive(Clone)]
pub struct SnapshotBackup {
    remote: Arc<dyn RemoteStore>,
    db_path: PathBuf,
}

impl SnapshotBackup {
    pub fn new(remote: Arc<dyn RemoteStore>, db_path: impl Into<PathBuf>) -> Self {
        SnapshotBackup {
            remote,
            db_path: db_path.into(),
        }
    }

    /// Where the previous local file is kept after a download.
    pub fn local_backup_path(&self) -> PathBuf {
        with_suffix(&self.db_path, ".local.bak")
    }

    /// Encodes the database file and overwrites the remote snapshot.
    pub async fn upload(&self) -> SnapshotStatus {
        if !tokio::fs::try_exists(&self.db_path).await.unwrap_or(false) {
            warn!(path = %self.db_path.display(), "No local database to upload");
            return SnapshotStatus::NoLocalDatabase;
        }

        let bytes = match tokio::fs::read(&self.db_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %self.db_path.display(), error = %e, "Failed to read database");
                return SnapshotStatus::EncodeFailed;
            }
        };
        let encoded = STANDARD.encode(bytes);

        let status = match self.remote.set(RemotePath::BACKUP, &Value::String(encoded)).await {
            Ok(()) => SnapshotStatus::Uploaded,
            Err(e) => SnapshotStatus::UploadFailed(e.to_string()),
        };
        info!(%status, "Snapshot upload finished");
        status
    }

    /// Replaces the local database with the remote snapshot.
    ///
    /// Must run while no pool holds the file open.
    pub async fn download(&self) -> SnapshotStatus {
        let encoded = match self.remote.get(RemotePath::BACKUP).await {
            Ok(Some(Value::String(s))) if !s.is_empty() => s,
            Ok(Some(Value::String(_))) | Ok(None) => return SnapshotStatus::NoRemoteBackup,
            Ok(Some(_)) => {
                return SnapshotStatus::RestoreFailed("remote backup is not a base64 string".into())
            }
            Err(e) => return SnapshotStatus::RestoreFailed(e.to_string()),
        };

        let status = match self.restore_bytes(&encoded).await {
            Ok(()) => SnapshotStatus::Restored(self.db_path.clone()),
            Err(e) => SnapshotStatus::RestoreFailed(e.to_string()),
        };
        info!(%status, "Snapshot download finished");
        status
    }

    async fn restore_bytes(&self, encoded: &str) -> SyncResult<()> {
        let bytes = STANDARD.decode(encoded)?;

        if let Some(parent) = self.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let local_backup = self.local_backup_path();
        if tokio::fs::try_exists(&self.db_path).await? {
            tokio::fs::rename(&self.db_path, &local_backup).await?;
        }
        // The old log travels with the old file.
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || set_aside_wal(&db_path, Some(&local_backup)))
            .await
            .map_err(|e| SyncError::BackupFailed(e.to_string()))??;
        tokio::fs::write(&self.db_path, bytes)
            .await
            .map_err(|e| SyncError::BackupFailed(format!("{}: {e}", self.db_path.display())))
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
