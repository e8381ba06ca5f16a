//! # Database Migrations
//!
//! Schema creation and "add column if missing" upgrades for Stockroom.
//!
//! ## How Migrations Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Migration Process                                  │
//! │                                                                         │
//! │  App Startup                                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CREATE TABLE IF NOT EXISTS  products, sales, transactions,            │
//! │                              users, migration_log                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  For each expected column:                                             │
//! │       │                                                                 │
//! │       ├── products.cost_price    ✓ present → nothing to do             │
//! │       ├── products.last_updated  ✓ present → nothing to do             │
//! │       └── sales.transaction_id   ⬜ missing → ALTER TABLE ADD COLUMN    │
//! │                                              + migration_log entry     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Indexes, uid backfill, "Database migration completed successfully."  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no version table: the live schema itself is the version. A
//! database written by an older release gains the columns it lacks and
//! keeps every existing row and `last_updated` value.

use sqlx::SqlitePool;
use stockroom_core::Role;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::migration_log::MigrationLogRepository;
use crate::repository::user::UserRepository;

/// Message written at the end of every migration run.
pub const MIGRATION_COMPLETE: &str = "Database migration completed successfully.";

const CREATE_TABLES: [&str; 5] = [
    r#"
    CREATE TABLE IF NOT EXISTS products (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        name         TEXT NOT NULL,
        category     TEXT,
        quantity     INTEGER NOT NULL DEFAULT 0,
        price        REAL NOT NULL DEFAULT 0,
        cost_price   REAL DEFAULT 0,
        last_updated REAL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sales (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        product_id     INTEGER NOT NULL,
        product_name   TEXT,
        quantity_sold  INTEGER NOT NULL,
        total_price    REAL NOT NULL,
        profit         REAL DEFAULT 0,
        timestamp      TEXT NOT NULL,
        transaction_id INTEGER,
        last_updated   REAL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp   TEXT NOT NULL,
        grand_total REAL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id       INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        password TEXT NOT NULL,
        role     TEXT NOT NULL DEFAULT 'staff',
        uid      TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS migration_log (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        message   TEXT NOT NULL
    )
    "#,
];

/// Columns added after the first release: (table, column, type + default).
const COLUMN_MIGRATIONS: [(&str, &str, &str); 7] = [
    ("products", "cost_price", "REAL DEFAULT 0"),
    ("products", "last_updated", "REAL DEFAULT 0"),
    ("sales", "product_name", "TEXT"),
    ("sales", "profit", "REAL DEFAULT 0"),
    ("sales", "transaction_id", "INTEGER"),
    ("sales", "last_updated", "REAL DEFAULT 0"),
    ("users", "uid", "TEXT"),
];

const CREATE_INDEXES: [&str; 3] = [
    "CREATE INDEX IF NOT EXISTS idx_sales_product ON sales(product_id)",
    "CREATE INDEX IF NOT EXISTS idx_sales_transaction ON sales(transaction_id)",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_uid ON users(uid)",
];

/// Runs all migrations.
///
/// ## Safety
/// - Idempotent: safe to run on every start
/// - Additive only: never drops or rewrites existing data
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    info!("Checking schema");

    for ddl in CREATE_TABLES {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| DbError::MigrationFailed(e.to_string()))?;
    }

    let mut added = 0usize;
    for (table, column, column_type) in COLUMN_MIGRATIONS {
        if add_column_if_missing(pool, table, column, column_type).await? {
            added += 1;
        }
    }

    backfill_user_uids(pool).await?;

    for ddl in CREATE_INDEXES {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| DbError::MigrationFailed(e.to_string()))?;
    }

    log_migration(pool, MIGRATION_COMPLETE).await?;

    info!(columns_added = added, "All migrations applied successfully");
    Ok(())
}

/// Adds the `last_updated` column to products and sales if missing.
///
/// Idempotent; existing timestamps are left untouched.
pub async fn ensure_last_updated_columns(pool: &SqlitePool) -> DbResult<()> {
    for table in ["products", "sales"] {
        add_column_if_missing(pool, table, "last_updated", "REAL DEFAULT 0").await?;
    }
    Ok(())
}

/// Returns the column names of `table`.
pub async fn table_columns(pool: &SqlitePool, table: &str) -> DbResult<Vec<String>> {
    let columns = sqlx::query_scalar::<_, String>("SELECT name FROM pragma_table_info(?)")
        .bind(table)
        .fetch_all(pool)
        .await?;
    Ok(columns)
}

/// Adds `column` to `table` unless it already exists. Returns true when the
/// column was added.
async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    column_type: &str,
) -> DbResult<bool> {
    let columns = table_columns(pool, table).await?;
    if columns.iter().any(|c| c == column) {
        debug!(table, column, "Column present");
        return Ok(false);
    }

    // Identifiers come from the constant tables above, never from input.
    let ddl = format!("ALTER TABLE {table} ADD COLUMN {column} {column_type}");
    sqlx::query(&ddl)
        .execute(pool)
        .await
        .map_err(|e| DbError::MigrationFailed(format!("{table}.{column}: {e}")))?;

    let base_type = column_type.split_whitespace().next().unwrap_or(column_type);
    let message = format!("Added column '{column}' ({base_type}) to table '{table}'");
    info!(table, column, "{}", message);
    log_migration(pool, &message).await?;

    Ok(true)
}

/// Gives every user without a remote key a fresh UUID.
async fn backfill_user_uids(pool: &SqlitePool) -> DbResult<()> {
    let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM users WHERE uid IS NULL OR uid = ''")
        .fetch_all(pool)
        .await?;

    for id in &ids {
        sqlx::query("UPDATE users SET uid = ? WHERE id = ?")
            .bind(Uuid::new_v4().to_string())
            .bind(id)
            .execute(pool)
            .await?;
    }

    if !ids.is_empty() {
        info!(count = ids.len(), "Assigned remote keys to existing users");
    }
    Ok(())
}

async fn log_migration(pool: &SqlitePool, message: &str) -> DbResult<()> {
    MigrationLogRepository::new(pool.clone()).record(message).await?;
    Ok(())
}

/// Creates the `admin` account when the users table is empty.
///
/// The operator is warned to change the password; the account exists so
/// that a fresh install can log in at all.
pub async fn bootstrap_admin(pool: &SqlitePool, password: &str) -> DbResult<()> {
    let users = UserRepository::new(pool.clone());
    if users.count().await? > 0 {
        return Ok(());
    }

    users.create("admin", password, Role::Admin).await?;
    warn!("Created default 'admin' account; change its password with `stockroom admin passwd`");
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    async fn messages(pool: &SqlitePool) -> Vec<String> {
        sqlx::query_scalar("SELECT message FROM migration_log ORDER BY id")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_schema_has_all_columns() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let products = table_columns(db.pool(), "products").await.unwrap();
        for col in ["id", "name", "category", "quantity", "price", "cost_price", "last_updated"] {
            assert!(products.contains(&col.to_string()), "missing products.{col}");
        }

        let sales = table_columns(db.pool(), "sales").await.unwrap();
        for col in ["product_name", "profit", "transaction_id", "last_updated"] {
            assert!(sales.contains(&col.to_string()), "missing sales.{col}");
        }

        // Nothing to add on a fresh schema, only the completion entry.
        assert_eq!(messages(db.pool()).await, vec![MIGRATION_COMPLETE.to_string()]);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.run_migrations().await.unwrap();
        db.run_migrations().await.unwrap();

        let log = messages(db.pool()).await;
        assert_eq!(log.len(), 3);
        assert!(log.iter().all(|m| m == MIGRATION_COMPLETE));
    }

    #[tokio::test]
    async fn test_old_schema_gains_missing_columns() {
        let db = Database::new(DbConfig::in_memory().run_migrations(false))
            .await
            .unwrap();
        let pool = db.pool();

        sqlx::query(
            "CREATE TABLE products (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, \
             category TEXT, quantity INTEGER NOT NULL DEFAULT 0, price REAL NOT NULL DEFAULT 0)",
        )
        .execute(pool)
        .await
        .unwrap();
        sqlx::query(
            "CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, username TEXT NOT NULL UNIQUE, \
             password TEXT NOT NULL, role TEXT NOT NULL DEFAULT 'staff')",
        )
        .execute(pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO products (name, quantity, price) VALUES ('Soap', 4, 1.5)")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO users (username, password, role) VALUES ('old', 'x', 'staff')")
            .execute(pool)
            .await
            .unwrap();

        db.run_migrations().await.unwrap();

        let log = messages(pool).await;
        assert!(log.contains(&"Added column 'cost_price' (REAL) to table 'products'".to_string()));
        assert!(log.contains(&"Added column 'last_updated' (REAL) to table 'products'".to_string()));
        assert!(log.contains(&"Added column 'uid' (TEXT) to table 'users'".to_string()));
        assert_eq!(log.last().map(String::as_str), Some(MIGRATION_COMPLETE));

        // Existing rows survive with defaults.
        let (qty, cost, ts): (i64, f64, f64) =
            sqlx::query_as("SELECT quantity, cost_price, last_updated FROM products WHERE name = 'Soap'")
                .fetch_one(pool)
                .await
                .unwrap();
        assert_eq!((qty, cost, ts), (4, 0.0, 0.0));

        let uid: Option<String> = sqlx::query_scalar("SELECT uid FROM users WHERE username = 'old'")
            .fetch_one(pool)
            .await
            .unwrap();
        assert!(uid.is_some_and(|u| Uuid::parse_str(&u).is_ok()));
    }

    #[tokio::test]
    async fn test_migrations_keep_last_updated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        sqlx::query("INSERT INTO products (name, quantity, price, last_updated) VALUES ('Tea', 1, 2.0, 1700000000.0)")
            .execute(db.pool())
            .await
            .unwrap();

        db.run_migrations().await.unwrap();
        db.ensure_last_updated_columns().await.unwrap();

        let ts: f64 = sqlx::query_scalar("SELECT last_updated FROM products WHERE name = 'Tea'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(ts, 1700000000.0);
    }

    #[tokio::test]
    async fn test_bootstrap_admin_only_on_empty_table() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert_eq!(db.users().count().await.unwrap(), 1);

        let admin = db.users().authenticate("admin", "admin123").await.unwrap();
        assert_eq!(admin.map(|u| u.role), Some(Role::Admin));

        bootstrap_admin(db.pool(), "other-password").await.unwrap();
        assert_eq!(db.users().count().await.unwrap(), 1);
    }
}
