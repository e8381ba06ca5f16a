//! # Rotating Local Backups
//!
//! Timestamped zip archives of the database file, newest N kept.
//!
//! ## Layout
//! ```text
//! backups/
//! ├── backup_2024-06-10_07-13-20.zip      ┐
//! ├── backup_2024-06-10_07-13-20_1.zip    │ newest `max_backups` kept
//! ├── backup_2024-06-10_07-15-02.zip      ┘ (mtime, then stamp + numeric _N)
//! └── notes.txt                           ignored
//!
//! each archive ─► inventory.db (deflated)
//! ```
//!
//! File work is synchronous; async callers wrap it in `spawn_blocking`.

use chrono::Local;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use stockroom_core::DEFAULT_MAX_BACKUPS;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::set_aside_wal;
use crate::error::{SyncError, SyncResult};

/// Name of the single entry inside every archive.
pub const ARCHIVE_ENTRY: &str = "inventory.db";

const PREFIX: &str = "backup_";
const EXTENSION: &str = ".zip";

/// One archive found in the backup directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub modified: SystemTime,
}

/// Creates, prunes, lists and restores `backup_*.zip` archives.
#[derive(Debug, Clone)]
pub struct RotatingBackup {
    db_path: PathBuf,
    backup_dir: PathBuf,
    max_backups: usize,
}

impl RotatingBackup {
    pub fn new(db_path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        RotatingBackup {
            db_path: db_path.into(),
            backup_dir: backup_dir.into(),
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }

    /// Archives to keep; values below 1 are raised to 1.
    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups.max(1);
        self
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // =========================================================================
    // Create + Prune
    // =========================================================================

    /// Writes a new archive, then prunes old ones. Returns the archive path.
    pub fn create(&self) -> SyncResult<PathBuf> {
        if !self.db_path.is_file() {
            return Err(SyncError::BackupFailed(format!(
                "no database at {}",
                self.db_path.display()
            )));
        }
        fs::create_dir_all(&self.backup_dir)?;

        let path = self.next_archive_path();
        let mut writer = ZipWriter::new(File::create(&path)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file(ARCHIVE_ENTRY, options)?;
        io::copy(&mut File::open(&self.db_path)?, &mut writer)?;
        writer.finish()?;

        info!(path = %path.display(), "Backup saved");
        self.prune()?;
        Ok(path)
    }

    /// `backup_<stamp>.zip`, or `_N` above the highest suffix already used
    /// this second (pruned names are never reused).
    fn next_archive_path(&self) -> PathBuf {
        let base = format!("{PREFIX}{}", Local::now().format("%Y-%m-%d_%H-%M-%S"));

        let highest = fs::read_dir(&self.backup_dir)
            .into_iter()
            .flatten()
            .filter_map(|item| item.ok())
            .filter_map(|item| {
                let name = item.file_name().to_string_lossy().into_owned();
                let rest = name.strip_prefix(&base)?.strip_suffix(EXTENSION)?;
                match rest {
                    "" => Some(0),
                    _ => rest.strip_prefix('_')?.parse::<u32>().ok(),
                }
            })
            .max();

        let name = match highest {
            None => format!("{base}{EXTENSION}"),
            Some(n) => format!("{base}_{}{EXTENSION}", n + 1),
        };
        self.backup_dir.join(name)
    }

    /// Deletes every archive beyond the newest `max_backups`.
    pub fn prune(&self) -> SyncResult<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for entry in self.list()?.into_iter().skip(self.max_backups) {
            fs::remove_file(&entry.path)?;
            debug!(name = %entry.name, "Deleted old backup");
            removed.push(entry.path);
        }
        Ok(removed)
    }

    /// Archives newest first. A missing directory lists as empty.
    pub fn list(&self) -> SyncResult<Vec<BackupEntry>> {
        let dir = match fs::read_dir(&self.backup_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for item in dir {
            let item = item?;
            let name = item.file_name().to_string_lossy().into_owned();
            if !name.starts_with(PREFIX) || !name.ends_with(EXTENSION) {
                continue;
            }
            let meta = item.metadata()?;
            if !meta.is_file() {
                continue;
            }
            entries.push(BackupEntry {
                path: item.path(),
                name,
                size: meta.len(),
                modified: meta.modified()?,
            });
        }

        entries.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| name_order(&b.name).cmp(&name_order(&a.name)))
        });
        Ok(entries)
    }

    // =========================================================================
    // Restore + Copy
    // =========================================================================

    /// Overwrites the live database from an archive or a raw `.db` file.
    ///
    /// Must run while no pool holds the file open.
    pub fn restore(&self, source: &Path) -> SyncResult<()> {
        let is_raw_db = source
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("db"));
        if is_raw_db {
            set_aside_wal(&self.db_path, None)?;
            fs::copy(source, &self.db_path)?;
            info!(source = %source.display(), "Database restored from copy");
            return Ok(());
        }

        let mut archive = ZipArchive::new(File::open(source)?)?;
        let mut entry = archive.by_name(ARCHIVE_ENTRY).map_err(|e| match e {
            zip::result::ZipError::FileNotFound => SyncError::ArchiveEntryMissing {
                archive: source.display().to_string(),
                entry: ARCHIVE_ENTRY.to_string(),
            },
            other => other.into(),
        })?;

        let mut staging = self.db_path.as_os_str().to_owned();
        staging.push(".restore");
        let staging = PathBuf::from(staging);

        let copied = File::create(&staging).and_then(|mut out| io::copy(&mut entry, &mut out));
        if let Err(e) = copied {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }
        set_aside_wal(&self.db_path, None)?;
        fs::rename(&staging, &self.db_path)?;

        info!(source = %source.display(), "Database restored from archive");
        Ok(())
    }

    /// Copies the live database to `dest`. Returns bytes copied.
    pub fn save_copy(&self, dest: &Path) -> SyncResult<u64> {
        let bytes = fs::copy(&self.db_path, dest)?;
        info!(dest = %dest.display(), bytes, "Database copy saved");
        Ok(bytes)
    }
}

/// Sort key for archives written in the same second: the stamp, then the
/// `_N` collision suffix as a number (so `_10` follows `_9`).
fn name_order(name: &str) -> (&str, u32) {
    let stem = name
        .strip_prefix(PREFIX)
        .and_then(|rest| rest.strip_suffix(EXTENSION))
        .unwrap_or(name);
    match stem.rsplit_once('_') {
        Some((stamp, n)) => match n.parse::<u32>() {
            Ok(n) => (stamp, n),
            Err(_) => (stem, 0),
        },
        None => (stem, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::time::Duration;

    fn touch(path: &Path, modified: SystemTime) {
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(modified)
            .unwrap();
    }

    fn setup(contents: &[u8]) -> (tempfile::TempDir, RotatingBackup) {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("inventory.db");
        fs::write(&db, contents).unwrap();
        let backup = RotatingBackup::new(db, dir.path().join("backups"));
        (dir, backup)
    }

    #[test]
    fn test_create_writes_single_deflated_entry() {
        let (_dir, backup) = setup(b"database bytes");
        let path = backup.create().unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("backup_") && name.ends_with(".zip"));

        let mut archive = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(archive.len(), 1);
        let mut entry = archive.by_name(ARCHIVE_ENTRY).unwrap();
        assert_eq!(entry.compression(), CompressionMethod::Deflated);
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"database bytes");
    }

    #[test]
    fn test_same_second_names_get_suffix() {
        let (_dir, backup) = setup(b"db");
        let first = backup.create().unwrap();
        let second = backup.create().unwrap();
        assert_ne!(first, second);
        assert_eq!(backup.list().unwrap().len(), 2);
    }

    #[test]
    fn test_prune_keeps_newest() {
        let (_dir, backup) = setup(b"db");
        let backup = backup.with_max_backups(3);

        let mut created = Vec::new();
        for _ in 0..7 {
            created.push(backup.create().unwrap());
        }

        let remaining: Vec<PathBuf> = backup.list().unwrap().into_iter().map(|e| e.path).collect();
        assert_eq!(remaining.len(), 3);
        assert!(remaining.contains(created.last().unwrap()));
        assert!(!created[0].exists());
    }

    #[test]
    fn test_prune_follows_mtime_not_name() {
        let (_dir, backup) = setup(b"db");
        let backup = backup.with_max_backups(3);
        let oldest_name = backup.create().unwrap();
        let middle = backup.create().unwrap();
        let newest_name = backup.create().unwrap();

        // The first-named archive is the most recently modified one.
        let now = SystemTime::now();
        touch(&oldest_name, now + Duration::from_secs(3600));
        touch(&middle, now - Duration::from_secs(60));
        touch(&newest_name, now - Duration::from_secs(120));

        let backup = backup.with_max_backups(1);
        let removed = backup.prune().unwrap();
        assert_eq!(removed.len(), 2);
        assert!(oldest_name.exists());
        assert!(!middle.exists());
        assert!(!newest_name.exists());
    }

    #[test]
    fn test_equal_mtime_ranks_suffix_numerically() {
        let (_dir, backup) = setup(b"db");
        fs::create_dir_all(backup.backup_dir()).unwrap();
        let stamp = SystemTime::now() - Duration::from_secs(30);
        for name in [
            "backup_2024-06-10_07-13-20.zip",
            "backup_2024-06-10_07-13-20_9.zip",
            "backup_2024-06-10_07-13-20_10.zip",
        ] {
            let path = backup.backup_dir().join(name);
            fs::write(&path, b"zip").unwrap();
            touch(&path, stamp);
        }

        let names: Vec<String> = backup.list().unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(
            names,
            [
                "backup_2024-06-10_07-13-20_10.zip",
                "backup_2024-06-10_07-13-20_9.zip",
                "backup_2024-06-10_07-13-20.zip",
            ]
        );

        let backup = backup.with_max_backups(1);
        backup.prune().unwrap();
        assert!(backup
            .backup_dir()
            .join("backup_2024-06-10_07-13-20_10.zip")
            .exists());
    }

    #[test]
    fn test_unrelated_files_are_ignored() {
        let (_dir, backup) = setup(b"db");
        fs::create_dir_all(backup.backup_dir()).unwrap();
        fs::write(backup.backup_dir().join("notes.txt"), b"x").unwrap();
        fs::write(backup.backup_dir().join("other.zip"), b"x").unwrap();

        let backup = backup.with_max_backups(1);
        backup.create().unwrap();
        backup.create().unwrap();

        assert_eq!(backup.list().unwrap().len(), 1);
        assert!(backup.backup_dir().join("notes.txt").exists());
        assert!(backup.backup_dir().join("other.zip").exists());
    }

    #[test]
    fn test_missing_database_fails() {
        let dir = tempfile::tempdir().unwrap();
        let backup = RotatingBackup::new(dir.path().join("absent.db"), dir.path().join("b"));
        assert!(matches!(backup.create(), Err(SyncError::BackupFailed(_))));
        assert!(backup.list().unwrap().is_empty());
    }

    #[test]
    fn test_restore_from_archive() {
        let (_dir, backup) = setup(b"version one");
        let archive = backup.create().unwrap();

        fs::write(backup.db_path(), b"version two").unwrap();
        backup.restore(&archive).unwrap();
        assert_eq!(fs::read(backup.db_path()).unwrap(), b"version one");
    }

    #[test]
    fn test_restore_discards_stale_wal() {
        let (dir, backup) = setup(b"version one");
        let archive = backup.create().unwrap();
        let copy = dir.path().join("manual.db");
        backup.save_copy(&copy).unwrap();

        let wal = dir.path().join("inventory.db-wal");
        let shm = dir.path().join("inventory.db-shm");
        for source in [&archive, &copy] {
            fs::write(backup.db_path(), b"version two").unwrap();
            fs::write(&wal, b"frames for version two").unwrap();
            fs::write(&shm, b"index").unwrap();

            backup.restore(source).unwrap();
            assert_eq!(fs::read(backup.db_path()).unwrap(), b"version one");
            assert!(!wal.exists());
            assert!(!shm.exists());
        }
    }

    #[test]
    fn test_restore_from_raw_copy() {
        let (dir, backup) = setup(b"live");
        let copy = dir.path().join("manual.db");
        assert_eq!(backup.save_copy(&copy).unwrap(), 4);

        fs::write(backup.db_path(), b"overwritten").unwrap();
        backup.restore(&copy).unwrap();
        assert_eq!(fs::read(backup.db_path()).unwrap(), b"live");
    }

    #[test]
    fn test_restore_rejects_archive_without_entry() {
        let (dir, backup) = setup(b"live");
        let bogus = dir.path().join("backup_bogus.zip");
        let mut writer = ZipWriter::new(File::create(&bogus).unwrap());
        writer
            .start_file("something_else.db", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"nope").unwrap();
        writer.finish().unwrap();

        let err = backup.restore(&bogus).unwrap_err();
        assert!(matches!(err, SyncError::ArchiveEntryMissing { .. }));
        assert_eq!(fs::read(backup.db_path()).unwrap(), b"live");
    }
}
