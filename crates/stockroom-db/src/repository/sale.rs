//! # Sale Repository
//!
//! Sale recording and the sales reports.
//!
//! ## Recording a Sale
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                   record_sale(product_id=1, qty=3)                      │
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │    │                                                                    │
//! │    ├── SELECT product 1            → missing?      ROLLBACK, NotFound  │
//! │    │   {price 100, cost 60, qty 10}                                    │
//! │    │                                                                    │
//! │    ├── qty 3 <= stock 10?          → no?           ROLLBACK, Insuff.   │
//! │    │                                                                    │
//! │    ├── total = 300, profit = 120   (integer cents)                     │
//! │    │                                                                    │
//! │    ├── UPDATE products SET quantity = quantity - 3                     │
//! │    │   WHERE id = 1 AND quantity >= 3                                  │
//! │    │                               → 0 rows?       ROLLBACK, Insuff.   │
//! │    │                                                                    │
//! │    └── INSERT INTO sales (...)                                         │
//! │  COMMIT                             → stock 7, one sale row            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The guarded UPDATE keeps stock from going negative even if another
//! writer sold the same product between the SELECT and the UPDATE.

use sqlx::SqlitePool;
use stockroom_core::timestamp::now_iso;
use stockroom_core::validation::validate_sale_quantity;
use stockroom_core::{
    BestSeller, CategoryFilter, CoreError, Product, ProductSalesTotal, Sale, SaleAmounts,
    SaleDetail, SaleRecord, NO_CATEGORY,
};
use tracing::{debug, info, warn};

use super::{PRODUCT_COLUMNS, SALE_COLUMNS, SALE_RECORD_COLUMNS};
use crate::error::{DbError, DbResult};

/// Result of a committed sale.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleOutcome {
    pub sale: Sale,
    /// Product stock after the decrement.
    pub remaining_stock: i64,
}

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Sells `quantity` units of a product, atomically.
    ///
    /// ## Returns
    /// * `Ok(SaleOutcome)` - sale row written, stock decremented once
    /// * `Err(DbError::Rejected(ProductNotFound | InsufficientStock))` -
    ///   nothing written, stock unchanged
    /// * `Err(DbError::Rejected(Validation(OutOfRange)))` - total or profit
    ///   does not fit in cents; nothing written
    pub async fn record_sale(
        &self,
        product_id: i64,
        quantity: i64,
        transaction_id: Option<i64>,
    ) -> DbResult<SaleOutcome> {
        validate_sale_quantity(quantity)?;

        let mut tx = self.pool.begin().await?;

        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(CoreError::ProductNotFound(product_id))?;

        let insufficient = |available: i64| CoreError::InsufficientStock {
            product: product.name.clone(),
            available,
            requested: quantity,
        };

        // Reject unrepresentable amounts before touching stock.
        let amounts = SaleAmounts::compute(product.price, product.cost_price, quantity)?;

        if !product.can_sell(quantity) {
            warn!(
                product_id,
                available = product.quantity,
                requested = quantity,
                "Sale rejected: insufficient stock"
            );
            return Err(insufficient(product.quantity).into());
        }

        let decremented = sqlx::query(
            "UPDATE products SET quantity = quantity - ?2 WHERE id = ?1 AND quantity >= ?2",
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;

        if decremented.rows_affected() == 0 {
            // Stock changed underneath us; the transaction is rolled back on drop.
            return Err(insufficient(product.quantity).into());
        }

        let timestamp = now_iso();

        let inserted = sqlx::query(
            r#"
            INSERT INTO sales (
                product_id, product_name, quantity_sold, total_price, profit,
                timestamp, transaction_id, last_updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0.0)
            "#,
        )
        .bind(product_id)
        .bind(&product.name)
        .bind(quantity)
        .bind(amounts.total.to_major())
        .bind(amounts.profit.to_major())
        .bind(&timestamp)
        .bind(transaction_id)
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let sale = Sale {
            id: inserted.last_insert_rowid(),
            product_id,
            product_name: Some(product.name.clone()),
            quantity_sold: quantity,
            total_price: amounts.total.to_major(),
            profit: amounts.profit.to_major(),
            timestamp,
            transaction_id,
            last_updated: 0.0,
        };

        info!(
            sale_id = sale.id,
            product_id,
            quantity,
            total = %amounts.total,
            profit = %amounts.profit,
            "Sale recorded"
        );

        Ok(SaleOutcome {
            sale,
            remaining_stock: product.quantity - quantity,
        })
    }

    /// Inserts a sale row without touching stock.
    ///
    /// `total_price` and `profit` default to the product's current price and
    /// cost when not given; in that case the product must exist.
    pub async fn add(
        &self,
        product_id: i64,
        quantity: i64,
        total_price: Option<f64>,
        profit: Option<f64>,
        transaction_id: Option<i64>,
    ) -> DbResult<Sale> {
        validate_sale_quantity(quantity)?;

        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;

        let (total_price, profit) = match (total_price, profit, &product) {
            (Some(t), Some(p), _) => (t, p),
            (t, p, Some(prod)) => {
                let amounts = SaleAmounts::compute(prod.price, prod.cost_price, quantity)?;
                (
                    t.unwrap_or_else(|| amounts.total.to_major()),
                    p.unwrap_or_else(|| amounts.profit.to_major()),
                )
            }
            (_, _, None) => return Err(CoreError::ProductNotFound(product_id).into()),
        };

        let product_name = product.map(|p| p.name);
        let timestamp = now_iso();

        let result = sqlx::query(
            r#"
            INSERT INTO sales (
                product_id, product_name, quantity_sold, total_price, profit,
                timestamp, transaction_id, last_updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0.0)
            "#,
        )
        .bind(product_id)
        .bind(&product_name)
        .bind(quantity)
        .bind(total_price)
        .bind(profit)
        .bind(&timestamp)
        .bind(transaction_id)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        debug!(id, product_id, quantity, "Sale row added");

        Ok(Sale {
            id,
            product_id,
            product_name,
            quantity_sold: quantity,
            total_price,
            profit,
            timestamp,
            transaction_id,
            last_updated: 0.0,
        })
    }

    /// Gets the raw sale row (used when pushing to the remote mirror).
    pub async fn get(&self, id: i64) -> DbResult<Option<Sale>> {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(sale)
    }

    /// All sales joined with product names, newest first.
    pub async fn get_all(&self) -> DbResult<Vec<SaleRecord>> {
        let sql = format!(
            "SELECT {SALE_RECORD_COLUMNS} FROM sales s \
             LEFT JOIN products p ON p.id = s.product_id \
             ORDER BY s.timestamp DESC, s.id DESC"
        );
        let sales = sqlx::query_as::<_, SaleRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(sales)
    }

    /// One sale with its product's category.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<SaleDetail>> {
        let sale = sqlx::query_as::<_, SaleDetail>(
            r#"
            SELECT
                s.id,
                s.product_id,
                COALESCE(p.name, s.product_name, 'Unknown product') AS product_name,
                CASE
                    WHEN p.category IS NULL OR TRIM(p.category) = '' THEN ?2
                    ELSE TRIM(p.category)
                END AS category,
                s.quantity_sold,
                s.total_price,
                COALESCE(s.profit, 0.0) AS profit,
                s.timestamp,
                s.transaction_id
            FROM sales s
            LEFT JOIN products p ON p.id = s.product_id
            WHERE s.id = ?1
            "#,
        )
        .bind(id)
        .bind(NO_CATEGORY)
        .fetch_optional(&self.pool)
        .await?;
        Ok(sale)
    }

    /// The product with the most units sold, if any sales exist.
    pub async fn best_seller(&self) -> DbResult<Option<BestSeller>> {
        let best = sqlx::query_as::<_, BestSeller>(
            r#"
            SELECT
                s.product_id,
                COALESCE(p.name, MAX(s.product_name), 'Unknown product') AS product_name,
                SUM(s.quantity_sold) AS total_quantity,
                COALESCE(SUM(s.total_price), 0.0) AS revenue
            FROM sales s
            LEFT JOIN products p ON p.id = s.product_id
            GROUP BY s.product_id
            ORDER BY total_quantity DESC, revenue DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(best)
    }

    /// Sum of profit over all sales.
    pub async fn total_profit(&self) -> DbResult<f64> {
        let total = sqlx::query_scalar("SELECT COALESCE(SUM(profit), 0.0) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    /// Sum of `total_price` over all sales.
    pub async fn total_revenue(&self) -> DbResult<f64> {
        let total = sqlx::query_scalar("SELECT COALESCE(SUM(total_price), 0.0) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(total)
    }

    /// Quantity, revenue and profit per product, highest revenue first.
    pub async fn summary_per_product(&self) -> DbResult<Vec<ProductSalesTotal>> {
        let rows = sqlx::query_as::<_, ProductSalesTotal>(
            r#"
            SELECT
                COALESCE(p.name, MAX(s.product_name), 'Unknown product') AS product_name,
                SUM(s.quantity_sold) AS total_quantity,
                COALESCE(SUM(s.total_price), 0.0) AS total_revenue,
                COALESCE(SUM(s.profit), 0.0) AS total_profit
            FROM sales s
            LEFT JOIN products p ON p.id = s.product_id
            GROUP BY s.product_id
            ORDER BY total_revenue DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Sales whose product belongs to the selected category, newest first.
    pub async fn with_category(&self, filter: &CategoryFilter) -> DbResult<Vec<SaleRecord>> {
        let base = format!(
            "SELECT {SALE_RECORD_COLUMNS} FROM sales s LEFT JOIN products p ON p.id = s.product_id"
        );
        let order = "ORDER BY s.timestamp DESC, s.id DESC";

        let sales = match filter {
            CategoryFilter::All => {
                sqlx::query_as::<_, SaleRecord>(&format!("{base} {order}"))
                    .fetch_all(&self.pool)
                    .await?
            }
            _ if filter.is_no_category() => {
                let sql =
                    format!("{base} WHERE p.category IS NULL OR TRIM(p.category) = '' {order}");
                sqlx::query_as::<_, SaleRecord>(&sql)
                    .fetch_all(&self.pool)
                    .await?
            }
            CategoryFilter::Named(name) => {
                let sql =
                    format!("{base} WHERE LOWER(TRIM(p.category)) = LOWER(TRIM(?1)) {order}");
                sqlx::query_as::<_, SaleRecord>(&sql)
                    .bind(name)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(sales)
    }

    /// Sale lines of one transaction, in the order they were recorded.
    pub async fn by_transaction(&self, transaction_id: i64) -> DbResult<Vec<SaleRecord>> {
        let sql = format!(
            "SELECT {SALE_RECORD_COLUMNS} FROM sales s \
             LEFT JOIN products p ON p.id = s.product_id \
             WHERE s.transaction_id = ?1 ORDER BY s.id"
        );
        let sales = sqlx::query_as::<_, SaleRecord>(&sql)
            .bind(transaction_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(sales)
    }

    /// All sale ids, for bulk push.
    pub async fn ids(&self) -> DbResult<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT id FROM sales ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Number of sale rows.
    pub async fn count(&self) -> DbResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Sets `last_updated` to `ts`. Returns false when the row is missing.
    pub async fn touch(&self, id: i64, ts: f64) -> DbResult<bool> {
        let result = sqlx::query("UPDATE sales SET last_updated = ?2 WHERE id = ?1")
            .bind(id)
            .bind(ts)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes every sale. Stock is not restored.
    pub async fn clear_all(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM sales").execute(&self.pool).await?;
        info!(count = result.rows_affected(), "All sales cleared");
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use stockroom_core::{NewProduct, ValidationError};

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn add_product(db: &Database, name: &str, category: Option<&str>, qty: i64) -> Product {
        db.products()
            .insert(&NewProduct {
                name: name.to_string(),
                category: category.map(str::to_string),
                quantity: qty,
                price: 100.0,
                cost_price: 60.0,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sell_decrements_stock_and_records_amounts() {
        let db = setup().await;
        let p = add_product(&db, "Rice 5kg", None, 10).await;

        let outcome = db.sales().record_sale(p.id, 3, None).await.unwrap();
        assert_eq!(outcome.remaining_stock, 7);
        assert_eq!(outcome.sale.total_price, 300.0);
        assert_eq!(outcome.sale.profit, 120.0);
        assert_eq!(outcome.sale.product_name.as_deref(), Some("Rice 5kg"));

        assert_eq!(db.products().require(p.id).await.unwrap().quantity, 7);

        let stored = db.sales().get(outcome.sale.id).await.unwrap().unwrap();
        assert_eq!(stored, outcome.sale);
    }

    #[tokio::test]
    async fn test_oversell_is_rejected_without_side_effects() {
        let db = setup().await;
        let p = add_product(&db, "Rice 5kg", None, 2).await;

        let err = db.sales().record_sale(p.id, 3, None).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Rejected(CoreError::InsufficientStock {
                available: 2,
                requested: 3,
                ..
            })
        ));

        assert_eq!(db.products().require(p.id).await.unwrap().quantity, 2);
        assert_eq!(db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sell_missing_product_and_bad_quantity() {
        let db = setup().await;

        let err = db.sales().record_sale(42, 1, None).await.unwrap_err();
        assert!(matches!(err, DbError::Rejected(CoreError::ProductNotFound(42))));

        let p = add_product(&db, "Soap", None, 5).await;
        assert!(db.sales().record_sale(p.id, 0, None).await.unwrap_err().is_rejection());
        assert_eq!(db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unrepresentable_amounts_are_rejected() {
        let db = setup().await;
        let p = db
            .products()
            .insert(&NewProduct {
                name: "Gold bar".to_string(),
                category: None,
                quantity: 1_000_000_000,
                price: 1e9,
                cost_price: 0.0,
            })
            .await
            .unwrap();

        let err = db.sales().record_sale(p.id, 10_000_000_000, None).await.unwrap_err();
        assert!(err.is_rejection());
        let err = db.sales().record_sale(p.id, 1_000_000_000, None).await.unwrap_err();
        assert!(err.is_rejection());

        // A price that only the remote mirror could have written.
        sqlx::query("UPDATE products SET price = 1e16, quantity = 10 WHERE id = ?1")
            .bind(p.id)
            .execute(db.pool())
            .await
            .unwrap();
        let err = db.sales().record_sale(p.id, 10, None).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Rejected(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));
        assert!(db.sales().add(p.id, 10, None, None, None).await.unwrap_err().is_rejection());

        assert_eq!(db.products().require(p.id).await.unwrap().quantity, 10);
        assert_eq!(db.sales().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_selling_entire_stock() {
        let db = setup().await;
        let p = add_product(&db, "Last one", None, 1).await;

        db.sales().record_sale(p.id, 1, None).await.unwrap();
        assert_eq!(db.products().require(p.id).await.unwrap().quantity, 0);
        assert!(db.sales().record_sale(p.id, 1, None).await.is_err());
    }

    #[tokio::test]
    async fn test_add_does_not_touch_stock() {
        let db = setup().await;
        let p = add_product(&db, "Tea", None, 10).await;

        let sale = db.sales().add(p.id, 2, None, None, None).await.unwrap();
        assert_eq!(sale.total_price, 200.0);
        assert_eq!(sale.profit, 80.0);

        let custom = db.sales().add(p.id, 1, Some(90.0), Some(30.0), None).await.unwrap();
        assert_eq!(custom.total_price, 90.0);

        assert_eq!(db.products().require(p.id).await.unwrap().quantity, 10);
        assert!(db.sales().add(999, 1, None, None, None).await.is_err());
    }

    #[tokio::test]
    async fn test_reports() {
        let db = setup().await;
        let rice = add_product(&db, "Rice", Some("Grains"), 20).await;
        let cola = add_product(&db, "Cola", Some("Drinks"), 20).await;
        let misc = add_product(&db, "Misc", None, 20).await;

        db.sales().record_sale(rice.id, 2, None).await.unwrap();
        db.sales().record_sale(cola.id, 5, None).await.unwrap();
        db.sales().record_sale(rice.id, 1, None).await.unwrap();
        db.sales().record_sale(misc.id, 1, None).await.unwrap();

        let best = db.sales().best_seller().await.unwrap().unwrap();
        assert_eq!(best.product_id, cola.id);
        assert_eq!(best.total_quantity, 5);
        assert_eq!(best.revenue, 500.0);

        // 9 units at 40 profit each
        assert_eq!(db.sales().total_profit().await.unwrap(), 360.0);
        assert_eq!(db.sales().total_revenue().await.unwrap(), 900.0);

        let summary = db.sales().summary_per_product().await.unwrap();
        assert_eq!(summary.len(), 3);
        assert_eq!(summary[0].product_name, "Cola");
        assert_eq!(summary[1].total_quantity, 3);

        let grains = db
            .sales()
            .with_category(&CategoryFilter::parse(Some("grains")))
            .await
            .unwrap();
        assert_eq!(grains.len(), 2);

        let uncategorized = db
            .sales()
            .with_category(&CategoryFilter::parse(Some(NO_CATEGORY)))
            .await
            .unwrap();
        assert_eq!(uncategorized.len(), 1);

        let all = db.sales().with_category(&CategoryFilter::All).await.unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(db.sales().get_all().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_get_by_id_includes_category() {
        let db = setup().await;
        let p = add_product(&db, "Loose", None, 3).await;
        let sale = db.sales().record_sale(p.id, 1, None).await.unwrap().sale;

        let detail = db.sales().get_by_id(sale.id).await.unwrap().unwrap();
        assert_eq!(detail.category, NO_CATEGORY);
        assert_eq!(detail.product_name, "Loose");
    }

    #[tokio::test]
    async fn test_history_survives_product_delete() {
        let db = setup().await;
        let p = add_product(&db, "Discontinued", None, 3).await;
        db.sales().record_sale(p.id, 1, None).await.unwrap();
        db.products().delete(p.id).await.unwrap();

        let all = db.sales().get_all().await.unwrap();
        assert_eq!(all[0].product_name, "Discontinued");
    }

    #[tokio::test]
    async fn test_empty_reports() {
        let db = setup().await;
        assert!(db.sales().best_seller().await.unwrap().is_none());
        assert_eq!(db.sales().total_profit().await.unwrap(), 0.0);
        assert!(db.sales().summary_per_product().await.unwrap().is_empty());
    }
}
