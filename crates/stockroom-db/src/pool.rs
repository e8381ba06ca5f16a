//! # Database Session
//!
//! Opens the inventory file, applies the schema and hands out repositories.
//!
//! ```text
//! DbConfig::new("inventory.db")              DbConfig::in_memory()
//!        │                                          │ one connection, never
//!        ▼                                          │ reaped (the data lives
//! Database::new ──► WAL + NORMAL sync + FK on       │ in that connection)
//!        │                                          ▼
//!        ├─ run_migrations: tables, missing columns, migration_log
//!        └─ bootstrap_admin: `admin` when the users table is empty
//!
//! Database (Clone, pool is shared)
//!   ├── products()  sales()  transactions()  users()
//!   ├── merge()          apply-if-newer for remote records
//!   ├── migration_log()
//!   ├── checkpoint()     fold -wal into the file before any copy / upload
//!   └── close()          pool down, then journal_mode=DELETE (no -wal left)
//! ```
//!
//! The CLI command and both change listeners each borrow a pooled
//! connection per statement; nothing holds one across an await on the
//! network.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Connection, SqliteConnection, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::merge::MergeRepository;
use crate::repository::migration_log::MigrationLogRepository;
use crate::repository::product::ProductRepository;
use crate::repository::sale::SaleRepository;
use crate::repository::transaction::TransactionRepository;
use crate::repository::user::UserRepository;

/// Password given to the bootstrap `admin` account on an empty users table.
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

// =============================================================================
// Configuration
// =============================================================================

/// Pool and startup settings.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/path/to/inventory.db")
///     .max_connections(5)
///     .bootstrap_admin_password("change-me");
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file, or `:memory:`.
    pub database_path: PathBuf,

    /// Pool ceiling. 5 covers a command plus the two listeners.
    pub max_connections: u32,

    pub min_connections: u32,

    /// How long a caller waits for a free connection.
    pub acquire_timeout: Duration,

    /// Idle connections are closed after this; `None` keeps them.
    pub idle_timeout: Option<Duration>,

    /// Apply the schema (and bootstrap admin) while opening.
    pub run_migrations: bool,

    /// Password for the `admin` account created when no users exist.
    pub bootstrap_admin_password: String,
}

impl DbConfig {
    /// Settings for a file database; the file is created when missing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            run_migrations: true,
            bootstrap_admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
        }
    }

    /// A private database that disappears with its pool.
    ///
    /// ```rust,ignore
    /// let db = Database::new(DbConfig::in_memory()).await?;
    /// ```
    pub fn in_memory() -> Self {
        DbConfig {
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            idle_timeout: None,
            ..DbConfig::new(":memory:")
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Skip the schema step (the caller runs [`Database::run_migrations`]).
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn bootstrap_admin_password(mut self, password: impl Into<String>) -> Self {
        self.bootstrap_admin_password = password.into();
        self
    }
}

// =============================================================================
// Database
// =============================================================================

/// Database session handle providing repository access.
///
/// Every data-access operation goes through a `Database` value that is
/// passed to it explicitly; there are no global connections. Cloning is
/// cheap (the pool is reference counted), so the CLI, the synchronizer and
/// both listeners each hold their own clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
}

impl Database {
    /// Opens the pool and, unless disabled, migrates and bootstraps.
    ///
    /// The parent directory must already exist.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        let path = config.database_path.display().to_string();
        info!(%path, "Opening inventory database");

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}?mode=rwc"))
            .map_err(|e| DbError::ConnectionFailed(format!("{path}: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout);
        if config.idle_timeout.is_none() {
            pool_options = pool_options.max_lifetime(None::<Duration>);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| DbError::ConnectionFailed(format!("{path}: {e}")))?;
        debug!(max_connections = config.max_connections, "Pool ready");

        let db = Database {
            pool,
            path: config.database_path.clone(),
        };

        if config.run_migrations {
            db.run_migrations().await?;
            migrations::bootstrap_admin(&db.pool, &config.bootstrap_admin_password).await?;
        }

        Ok(db)
    }

    /// Runs the schema migrations.
    ///
    /// Idempotent: tables are created if missing and columns are added if
    /// missing, so this is safe on every start.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Ensures `products.last_updated` and `sales.last_updated` exist.
    ///
    /// Called by the sync agent before its first push, for databases that
    /// were opened without running migrations.
    pub async fn ensure_last_updated_columns(&self) -> DbResult<()> {
        migrations::ensure_last_updated_columns(&self.pool).await
    }

    /// Raw pool, for queries no repository covers.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Returns the database file path (`:memory:` for test databases).
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone())
    }

    pub fn transactions(&self) -> TransactionRepository {
        TransactionRepository::new(self.pool.clone())
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    /// Apply-if-newer writes for records pulled from the remote store.
    pub fn merge(&self) -> MergeRepository {
        MergeRepository::new(self.pool.clone())
    }

    pub fn migration_log(&self) -> MigrationLogRepository {
        MigrationLogRepository::new(self.pool.clone())
    }

    /// Folds the write-ahead log back into the main database file.
    ///
    /// After this returns, the database file on disk is a complete snapshot
    /// and can be copied, zipped or uploaded. A reader holding an older
    /// snapshot (another process, a listener mid-query) can leave frames
    /// behind in `-wal`; that is reported as `QueryFailed`.
    ///
    /// ```text
    /// PRAGMA wal_checkpoint(TRUNCATE) → (busy, log, checkpointed)
    ///   (0, n, n)    complete
    ///   (0, -1, -1)  not in WAL mode (`:memory:`), nothing to fold
    ///   otherwise    incomplete → error
    /// ```
    pub async fn checkpoint(&self) -> DbResult<()> {
        let (busy, log, checkpointed): (i64, i64, i64) =
            sqlx::query_as("PRAGMA wal_checkpoint(TRUNCATE)")
                .fetch_one(&self.pool)
                .await?;
        checkpoint_outcome(busy, log, checkpointed)?;
        debug!(path = %self.path.display(), log, "WAL checkpoint complete");
        Ok(())
    }

    /// Waits for every connection to close, then takes the file out of
    /// WAL mode. Later queries fail.
    ///
    /// Switching back to a rollback journal folds and removes `-wal` and
    /// `-shm`, so a file restored over this one cannot have a stale log
    /// replayed onto it at the next open. Leaving WAL mode needs the only
    /// open handle, so it runs on a fresh connection after the pool is
    /// gone. Failures are logged, never returned.
    pub async fn close(&self) {
        let was_open = !self.pool.is_closed();
        debug!(path = %self.path.display(), "Closing inventory database");
        self.pool.close().await;

        if was_open && !self.is_memory() {
            if let Err(e) = self.leave_wal_mode().await {
                warn!(path = %self.path.display(), error = %e, "Could not fold WAL on close");
            }
        }
    }

    async fn leave_wal_mode(&self) -> DbResult<()> {
        let options = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(false);
        let mut conn = SqliteConnection::connect_with(&options)
            .await
            .map_err(|e| DbError::ConnectionFailed(format!("{}: {e}", self.path.display())))?;

        let (busy, log, checkpointed): (i64, i64, i64) =
            sqlx::query_as("PRAGMA wal_checkpoint(TRUNCATE)")
                .fetch_one(&mut conn)
                .await?;
        checkpoint_outcome(busy, log, checkpointed)?;
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode=DELETE")
            .fetch_one(&mut conn)
            .await?;
        conn.close().await?;

        if !mode.eq_ignore_ascii_case("delete") {
            return Err(DbError::QueryFailed(format!("journal mode is still {mode}")));
        }
        Ok(())
    }

    fn is_memory(&self) -> bool {
        self.path.as_os_str() == ":memory:"
    }

    /// True while a trivial query succeeds.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

fn checkpoint_outcome(busy: i64, log: i64, checkpointed: i64) -> DbResult<()> {
    if busy != 0 || (log != -1 && log != checkpointed) {
        return Err(DbError::QueryFailed(format!(
            "checkpoint incomplete: busy={busy} log={log} checkpointed={checkpointed}"
        )));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_database_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);
        assert_eq!(db.path(), Path::new(":memory:"));
        assert_eq!(db.users().count().await.unwrap(), 1);
    }

    #[test]
    fn test_in_memory_keeps_its_connection() {
        let config = DbConfig::in_memory().bootstrap_admin_password("s3cret!");
        assert_eq!(config.max_connections, 1);
        assert!(config.idle_timeout.is_none());
        assert_eq!(config.bootstrap_admin_password, "s3cret!");

        let file = DbConfig::new("shop.db").max_connections(8).run_migrations(false);
        assert_eq!(file.max_connections, 8);
        assert!(!file.run_migrations);
    }

    #[tokio::test]
    async fn test_file_database_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.db");

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        assert!(path.exists());

        sqlx::query("CREATE TABLE scratch (n INTEGER)")
            .execute(db.pool())
            .await
            .unwrap();
        db.checkpoint().await.unwrap();
        db.close().await;
    }

    #[tokio::test]
    async fn test_close_leaves_no_wal_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.db");
        let wal = dir.path().join("inventory.db-wal");
        let shm = dir.path().join("inventory.db-shm");

        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        for n in 0..20 {
            sqlx::query("INSERT INTO migration_log (timestamp, message) VALUES (?, ?)")
                .bind(format!("t{n}"))
                .bind("filler")
                .execute(db.pool())
                .await
                .unwrap();
        }
        assert!(wal.exists());

        db.close().await;
        assert!(!wal.exists());
        assert!(!shm.exists());

        // Reopening switches back to WAL and still sees every row.
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let (rows,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM migration_log WHERE message = 'filler'")
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(rows, 20);
        db.close().await;
    }

    #[tokio::test]
    async fn test_memory_checkpoint_is_a_no_op() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.checkpoint().await.unwrap();
        db.close().await;
    }

    #[test]
    fn test_incomplete_checkpoint_is_an_error() {
        assert!(checkpoint_outcome(0, 12, 12).is_ok());
        assert!(checkpoint_outcome(0, -1, -1).is_ok());
        assert!(checkpoint_outcome(0, 0, 0).is_ok());

        let err = checkpoint_outcome(1, 12, 4).unwrap_err();
        assert!(matches!(err, DbError::QueryFailed(ref m) if m.contains("busy=1")));
        assert!(checkpoint_outcome(0, 12, 4).is_err());
    }

    #[tokio::test]
    async fn test_closed_pool_fails_health_check() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;
        assert!(!db.health_check().await);
    }
}
