//! # Transaction Repository
//!
//! A transaction groups the sale lines of one checkout.
//!
//! ## Checkout Flow
//! ```text
//! checkout([1:2, 4:1, 9:3])
//!      │
//!      ├── create()                      → transaction #12, grand_total 0
//!      │
//!      ├── record_sale(1, 2, Some(12))   ✓ committed
//!      ├── record_sale(4, 1, Some(12))   ✓ committed
//!      ├── record_sale(9, 3, Some(12))   ✗ insufficient stock → stop
//!      │
//!      └── finalize(12)                  → grand_total = Σ total_price
//!                                          of the committed lines
//! ```
//!
//! Each line is atomic on its own; the grand total is always recomputed
//! from the sales table, never accumulated.

use sqlx::SqlitePool;
use stockroom_core::timestamp::now_iso;
use stockroom_core::{CartLine, CoreError, Sale, Transaction, TransactionDetails};
use tracing::{info, warn};

use super::sale::SaleRepository;
use crate::error::{DbError, DbResult};

/// A line that was not sold during checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedLine {
    pub line: CartLine,
    pub reason: String,
}

/// Result of a checkout.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutSummary {
    /// The finalized transaction.
    pub transaction: Transaction,
    /// Sale lines that were committed.
    pub sales: Vec<Sale>,
    /// The first line that was rejected; later lines were not attempted.
    pub rejected: Option<RejectedLine>,
}

/// Repository for transaction database operations.
#[derive(Debug, Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
}

impl TransactionRepository {
    /// Creates a new TransactionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TransactionRepository { pool }
    }

    /// Opens a new transaction with a zero grand total.
    pub async fn create(&self) -> DbResult<Transaction> {
        let timestamp = now_iso();
        let result = sqlx::query("INSERT INTO transactions (timestamp, grand_total) VALUES (?1, 0.0)")
            .bind(&timestamp)
            .execute(&self.pool)
            .await?;

        Ok(Transaction {
            id: result.last_insert_rowid(),
            timestamp,
            grand_total: 0.0,
        })
    }

    /// Gets a transaction by id.
    pub async fn get(&self, id: i64) -> DbResult<Option<Transaction>> {
        let transaction = sqlx::query_as::<_, Transaction>(
            "SELECT id, timestamp, COALESCE(grand_total, 0.0) AS grand_total \
             FROM transactions WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(transaction)
    }

    /// All transactions, newest first.
    pub async fn list(&self) -> DbResult<Vec<Transaction>> {
        let transactions = sqlx::query_as::<_, Transaction>(
            "SELECT id, timestamp, COALESCE(grand_total, 0.0) AS grand_total \
             FROM transactions ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(transactions)
    }

    /// Recomputes and stores the grand total from the linked sales.
    pub async fn finalize(&self, id: i64) -> DbResult<f64> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET grand_total = (
                SELECT COALESCE(SUM(total_price), 0.0) FROM sales WHERE transaction_id = ?1
            )
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::TransactionNotFound(id).into());
        }

        let grand_total: f64 =
            sqlx::query_scalar("SELECT COALESCE(grand_total, 0.0) FROM transactions WHERE id = ?1")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;

        info!(transaction_id = id, grand_total, "Transaction finalized");
        Ok(grand_total)
    }

    /// A transaction with its sale lines.
    pub async fn details(&self, id: i64) -> DbResult<Option<TransactionDetails>> {
        let Some(transaction) = self.get(id).await? else {
            return Ok(None);
        };
        let sales = SaleRepository::new(self.pool.clone())
            .by_transaction(id)
            .await?;
        Ok(Some(TransactionDetails { transaction, sales }))
    }

    /// Sells every line under one new transaction, then finalizes it.
    ///
    /// A rejected line (missing product, insufficient stock, bad quantity)
    /// stops the checkout; lines already committed stay committed and are
    /// included in the grand total.
    pub async fn checkout(&self, lines: &[CartLine]) -> DbResult<CheckoutSummary> {
        if lines.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }

        let transaction = self.create().await?;
        let sales_repo = SaleRepository::new(self.pool.clone());

        let mut sales = Vec::with_capacity(lines.len());
        let mut rejected = None;

        for line in lines {
            match sales_repo
                .record_sale(line.product_id, line.quantity, Some(transaction.id))
                .await
            {
                Ok(outcome) => sales.push(outcome.sale),
                Err(DbError::Rejected(reason)) => {
                    warn!(
                        transaction_id = transaction.id,
                        product_id = line.product_id,
                        %reason,
                        "Checkout line rejected"
                    );
                    rejected = Some(RejectedLine {
                        line: *line,
                        reason: reason.to_string(),
                    });
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let grand_total = self.finalize(transaction.id).await?;

        Ok(CheckoutSummary {
            transaction: Transaction {
                grand_total,
                ..transaction
            },
            sales,
            rejected,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};
    use stockroom_core::{CartLine, NewProduct};

    async fn setup() -> (Database, i64, i64) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let a = db
            .products()
            .insert(&NewProduct {
                name: "Bread".to_string(),
                category: None,
                quantity: 10,
                price: 2.5,
                cost_price: 1.0,
            })
            .await
            .unwrap();
        let b = db
            .products()
            .insert(&NewProduct {
                name: "Butter".to_string(),
                category: None,
                quantity: 1,
                price: 4.0,
                cost_price: 3.0,
            })
            .await
            .unwrap();
        (db, a.id, b.id)
    }

    #[tokio::test]
    async fn test_finalize_sums_linked_sales() {
        let (db, bread, butter) = setup().await;
        let tx = db.transactions().create().await.unwrap();

        db.sales().record_sale(bread, 3, Some(tx.id)).await.unwrap();
        db.sales().record_sale(butter, 1, Some(tx.id)).await.unwrap();
        // Unrelated sale
        db.sales().record_sale(bread, 1, None).await.unwrap();

        assert_eq!(db.transactions().finalize(tx.id).await.unwrap(), 11.5);

        let details = db.transactions().details(tx.id).await.unwrap().unwrap();
        assert_eq!(details.transaction.grand_total, 11.5);
        assert_eq!(details.sales.len(), 2);
        let sum: f64 = details.sales.iter().map(|s| s.total_price).sum();
        assert_eq!(sum, details.transaction.grand_total);
    }

    #[tokio::test]
    async fn test_finalize_empty_and_missing() {
        let (db, _, _) = setup().await;
        let tx = db.transactions().create().await.unwrap();
        assert_eq!(db.transactions().finalize(tx.id).await.unwrap(), 0.0);

        assert!(db.transactions().finalize(999).await.unwrap_err().is_rejection());
        assert!(db.transactions().details(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_checkout_all_lines() {
        let (db, bread, butter) = setup().await;
        let summary = db
            .transactions()
            .checkout(&[
                CartLine { product_id: bread, quantity: 2 },
                CartLine { product_id: butter, quantity: 1 },
            ])
            .await
            .unwrap();

        assert!(summary.rejected.is_none());
        assert_eq!(summary.sales.len(), 2);
        assert_eq!(summary.transaction.grand_total, 9.0);
        assert!(summary.sales.iter().all(|s| s.transaction_id == Some(summary.transaction.id)));
    }

    #[tokio::test]
    async fn test_checkout_stops_at_rejected_line() {
        let (db, bread, butter) = setup().await;
        let summary = db
            .transactions()
            .checkout(&[
                CartLine { product_id: bread, quantity: 1 },
                CartLine { product_id: butter, quantity: 5 },
                CartLine { product_id: bread, quantity: 1 },
            ])
            .await
            .unwrap();

        assert_eq!(summary.sales.len(), 1);
        let rejected = summary.rejected.unwrap();
        assert_eq!(rejected.line.product_id, butter);
        assert_eq!(summary.transaction.grand_total, 2.5);

        // Butter untouched, bread sold once
        assert_eq!(db.products().require(butter).await.unwrap().quantity, 1);
        assert_eq!(db.products().require(bread).await.unwrap().quantity, 9);
    }

    #[tokio::test]
    async fn test_checkout_empty_cart() {
        let (db, _, _) = setup().await;
        assert!(db.transactions().checkout(&[]).await.is_err());
        assert!(db.transactions().list().await.unwrap().is_empty());
    }
}
