//! # Merge Repository
//!
//! The local half of last-write-wins synchronization: apply a remote copy
//! of a row only if it is strictly newer than the local one.
//!
//! ## Apply-If-Newer
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  remote record R (t_r)              local row L (t_l, absent → 0)       │
//! │                                                                         │
//! │        t_r > t_l ?                                                      │
//! │          │                                                              │
//! │     yes ─┴─ no                                                          │
//! │      │      │                                                           │
//! │      ▼      ▼                                                           │
//! │   L := R    L unchanged      → MergeOutcome::Skipped                    │
//! │   t_l := t_r                 → MergeOutcome::Applied                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The comparison lives inside the upsert statement itself
//! (`INSERT … SELECT … WHERE` + `ON CONFLICT … DO UPDATE … WHERE`), so two
//! listeners applying copies of the same row can interleave freely: SQLite
//! runs each statement atomically and the newer timestamp always wins.

use sqlx::SqlitePool;
use stockroom_core::{Product, Sale};
use tracing::debug;

use super::product::ProductRepository;
use super::sale::SaleRepository;
use crate::error::DbResult;

/// What happened to one incoming remote record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeOutcome {
    /// The remote copy replaced (or created) the local row.
    Applied,
    /// The local row was as new or newer; nothing changed.
    Skipped { local_ts: f64, remote_ts: f64 },
}

impl MergeOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, MergeOutcome::Applied)
    }
}

/// Repository for apply-if-newer upserts.
#[derive(Debug, Clone)]
pub struct MergeRepository {
    pool: SqlitePool,
}

impl MergeRepository {
    /// Creates a new MergeRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MergeRepository { pool }
    }

    /// Local `last_updated` of a product, 0.0 when the row is absent.
    pub async fn product_ts(&self, id: i64) -> DbResult<f64> {
        let ts: Option<f64> =
            sqlx::query_scalar("SELECT COALESCE(last_updated, 0.0) FROM products WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(ts.unwrap_or(0.0))
    }

    /// Local `last_updated` of a sale, 0.0 when the row is absent.
    pub async fn sale_ts(&self, id: i64) -> DbResult<f64> {
        let ts: Option<f64> =
            sqlx::query_scalar("SELECT COALESCE(last_updated, 0.0) FROM sales WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(ts.unwrap_or(0.0))
    }

    /// Applies a remote product whose `last_updated` is the remote timestamp.
    pub async fn apply_product(&self, remote: &Product) -> DbResult<MergeOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO products (id, name, category, quantity, price, cost_price, last_updated)
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7
            WHERE ?7 > COALESCE((SELECT last_updated FROM products WHERE id = ?1), 0.0)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                category = excluded.category,
                quantity = excluded.quantity,
                price = excluded.price,
                cost_price = excluded.cost_price,
                last_updated = excluded.last_updated
            WHERE excluded.last_updated > COALESCE(products.last_updated, 0.0)
            "#,
        )
        .bind(remote.id)
        .bind(&remote.name)
        .bind(&remote.category)
        .bind(remote.quantity)
        .bind(remote.price)
        .bind(remote.cost_price)
        .bind(remote.last_updated)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!(id = remote.id, remote_ts = remote.last_updated, "Product applied");
            return Ok(MergeOutcome::Applied);
        }

        let local_ts = self.product_ts(remote.id).await?;
        debug!(id = remote.id, local_ts, remote_ts = remote.last_updated, "Product skipped");
        Ok(MergeOutcome::Skipped {
            local_ts,
            remote_ts: remote.last_updated,
        })
    }

    /// Applies a remote sale whose `last_updated` is the remote timestamp.
    ///
    /// Mirrored sales never move stock; the selling device already did.
    pub async fn apply_sale(&self, remote: &Sale) -> DbResult<MergeOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO sales (
                id, product_id, product_name, quantity_sold, total_price, profit,
                timestamp, transaction_id, last_updated
            )
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9
            WHERE ?9 > COALESCE((SELECT last_updated FROM sales WHERE id = ?1), 0.0)
            ON CONFLICT(id) DO UPDATE SET
                product_id = excluded.product_id,
                product_name = excluded.product_name,
                quantity_sold = excluded.quantity_sold,
                total_price = excluded.total_price,
                profit = excluded.profit,
                timestamp = excluded.timestamp,
                transaction_id = excluded.transaction_id,
                last_updated = excluded.last_updated
            WHERE excluded.last_updated > COALESCE(sales.last_updated, 0.0)
            "#,
        )
        .bind(remote.id)
        .bind(remote.product_id)
        .bind(&remote.product_name)
        .bind(remote.quantity_sold)
        .bind(remote.total_price)
        .bind(remote.profit)
        .bind(&remote.timestamp)
        .bind(remote.transaction_id)
        .bind(remote.last_updated)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!(id = remote.id, remote_ts = remote.last_updated, "Sale applied");
            return Ok(MergeOutcome::Applied);
        }

        let local_ts = self.sale_ts(remote.id).await?;
        debug!(id = remote.id, local_ts, remote_ts = remote.last_updated, "Sale skipped");
        Ok(MergeOutcome::Skipped {
            local_ts,
            remote_ts: remote.last_updated,
        })
    }

    /// Stamps a product before it is pushed. Returns false if missing.
    pub async fn stamp_product(&self, id: i64, now: f64) -> DbResult<bool> {
        ProductRepository::new(self.pool.clone()).touch(id, now).await
    }

    /// Stamps a sale before it is pushed. Returns false if missing.
    pub async fn stamp_sale(&self, id: i64, now: f64) -> DbResult<bool> {
        SaleRepository::new(self.pool.clone()).touch(id, now).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
