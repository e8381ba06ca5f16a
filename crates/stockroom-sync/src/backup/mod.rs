//! # Backups
//!
//! Two independent safety nets for the SQLite file.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  SNAPSHOT (snapshot.rs)            ROTATION (rotation.rs)               │
//! │  ──────────────────────            ──────────────────────               │
//! │  whole file, base64                backup_<timestamp>.zip               │
//! │  /backups/inventory_db             one deflated entry: inventory.db     │
//! │  upload on exit                    after every mutation                 │
//! │  download before the pool opens    newest N kept, rest pruned           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both restore paths replace `inventory.db` while it is closed. Any
//! `inventory.db-wal` / `-shm` left beside it belong to the old file and
//! are moved away first; SQLite would otherwise replay that log over the
//! restored pages on the next open.

pub mod rotation;
pub mod snapshot;

pub use rotation::{BackupEntry, RotatingBackup, ARCHIVE_ENTRY};
pub use snapshot::{SnapshotBackup, SnapshotStatus};

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

/// SQLite's write-ahead log and shared-memory index for `db_path`.
pub(crate) const WAL_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Moves `<db>-wal` and `<db>-shm` to `<keep>-wal` / `<keep>-shm`, or
/// deletes them when `keep` is `None`. Missing files are fine.
pub(crate) fn set_aside_wal(db_path: &Path, keep: Option<&Path>) -> io::Result<()> {
    for suffix in WAL_SUFFIXES {
        let sidecar = with_suffix(db_path, suffix);
        let moved = match keep {
            Some(keep) => std::fs::rename(&sidecar, with_suffix(keep, suffix)),
            None => std::fs::remove_file(&sidecar),
        };
        match moved {
            Ok(()) => tracing::debug!(path = %sidecar.display(), "Stale WAL file set aside"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
