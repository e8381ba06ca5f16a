//! # Migration Log Repository
//!
//! Read access to the append-only history of schema changes, plus manual
//! entries for operator notes.

use sqlx::SqlitePool;
use stockroom_core::timestamp::log_timestamp;
use stockroom_core::MigrationLogEntry;

use crate::error::DbResult;

/// Repository for the `migration_log` table.
#[derive(Debug, Clone)]
pub struct MigrationLogRepository {
    pool: SqlitePool,
}

impl MigrationLogRepository {
    /// Creates a new MigrationLogRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MigrationLogRepository { pool }
    }

    /// All entries, newest first.
    pub async fn entries(&self) -> DbResult<Vec<MigrationLogEntry>> {
        let entries = sqlx::query_as::<_, MigrationLogEntry>(
            "SELECT id, timestamp, message FROM migration_log ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }

    /// Appends an entry stamped with the current local time.
    pub async fn record(&self, message: &str) -> DbResult<MigrationLogEntry> {
        let timestamp = log_timestamp();
        let result = sqlx::query("INSERT INTO migration_log (timestamp, message) VALUES (?1, ?2)")
            .bind(&timestamp)
            .bind(message)
            .execute(&self.pool)
            .await?;

        Ok(MigrationLogEntry {
            id: result.last_insert_rowid(),
            timestamp,
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::migrations::MIGRATION_COMPLETE;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_entries_newest_first() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let log = db.migration_log();

        let recorded = log.record("Restored from backup").await.unwrap();
        let entries = log.entries().await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], recorded);
        assert_eq!(entries[1].message, MIGRATION_COMPLETE);
    }
}
