//! # Product Repository
//!
//! Database operations for the product catalog.
//!
//! ## Key Operations
//! - CRUD and restocking
//! - Category listing and renaming (with the "No Category" pseudo-category)
//! - Low-stock report and filtered listing
//!
//! ## Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products.category         categories()         filter "No Category"   │
//! │  ─────────────────         ─────────────        ───────────────────    │
//! │  NULL            ─┐                                                     │
//! │  ''              ─┼──────► "No Category" ◄────── matches these rows    │
//! │  '   '           ─┘        (listed first)                              │
//! │  'Drinks'        ────────► "Drinks"                                    │
//! │  'Grains'        ────────► "Grains"                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Mutations here never touch `last_updated`; the timestamp is stamped
//! when the row is pushed to the remote mirror.

use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use stockroom_core::validation::{
    normalize_category, validate_new_product, validate_product_update, validate_restock_amount,
    validate_stock_quantity,
};
use stockroom_core::{
    CategoryFilter, CoreError, LowStockItem, NewProduct, Product, ProductUpdate, NO_CATEGORY,
};
use tracing::{debug, info};

use super::PRODUCT_COLUMNS;
use crate::error::{DbError, DbResult};

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let repo = db.products();
///
/// let rice = repo.insert(&NewProduct { name: "Rice 5kg".into(), .. }).await?;
/// repo.restock(rice.id, 20).await?;
/// let low = repo.low_stock(DEFAULT_LOW_STOCK_THRESHOLD).await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Inserts a new product and returns it with its assigned id.
    pub async fn insert(&self, input: &NewProduct) -> DbResult<Product> {
        let input = validate_new_product(input)?;

        let result = sqlx::query(
            r#"
            INSERT INTO products (name, category, quantity, price, cost_price, last_updated)
            VALUES (?1, ?2, ?3, ?4, ?5, 0.0)
            "#,
        )
        .bind(&input.name)
        .bind(&input.category)
        .bind(input.quantity)
        .bind(input.price)
        .bind(input.cost_price)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid();
        info!(id, name = %input.name, "Product added");

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Gets every product, ordered by id.
    pub async fn get_all(&self) -> DbResult<Vec<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY id");
        let products = sqlx::query_as::<_, Product>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Gets a product by id.
    pub async fn get_by_id(&self, id: i64) -> DbResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1");
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    /// Gets a product by id, or `CoreError::ProductNotFound`.
    pub async fn require(&self, id: i64) -> DbResult<Product> {
        self.get_by_id(id)
            .await?
            .ok_or(DbError::Rejected(CoreError::ProductNotFound(id)))
    }

    /// Sets the stock level of a product.
    pub async fn update_quantity(&self, id: i64, quantity: i64) -> DbResult<()> {
        validate_stock_quantity(quantity)?;

        let result = sqlx::query("UPDATE products SET quantity = ?2 WHERE id = ?1")
            .bind(id)
            .bind(quantity)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ProductNotFound(id).into());
        }

        debug!(id, quantity, "Stock level set");
        Ok(())
    }

    /// Replaces the editable fields of a product.
    pub async fn update(&self, id: i64, input: &ProductUpdate) -> DbResult<Product> {
        let input = validate_product_update(input)?;

        let result = sqlx::query(
            r#"
            UPDATE products
            SET name = ?2, category = ?3, quantity = ?4, price = ?5, cost_price = ?6
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.category)
        .bind(input.quantity)
        .bind(input.price)
        .bind(input.cost_price)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ProductNotFound(id).into());
        }

        info!(id, "Product updated");
        self.require(id).await
    }

    /// Adds `amount` units to a product's stock.
    pub async fn restock(&self, id: i64, amount: i64) -> DbResult<Product> {
        validate_restock_amount(amount)?;

        let result = sqlx::query("UPDATE products SET quantity = quantity + ?2 WHERE id = ?1")
            .bind(id)
            .bind(amount)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::ProductNotFound(id).into());
        }

        info!(id, amount, "Product restocked");
        self.require(id).await
    }

    /// Deletes a product. Returns false when it did not exist.
    ///
    /// Sales keep their denormalized `product_name`, so history survives.
    pub async fn delete(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(id, "Product deleted");
        }
        Ok(deleted)
    }

    /// Deletes every product. Returns the number of rows removed.
    pub async fn clear_all(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM products")
            .execute(&self.pool)
            .await?;
        info!(count = result.rows_affected(), "All products cleared");
        Ok(result.rows_affected())
    }

    /// Lists distinct categories, with "No Category" first when any product
    /// has a NULL or blank category.
    pub async fn categories(&self) -> DbResult<Vec<String>> {
        let named: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT TRIM(category)
            FROM products
            WHERE category IS NOT NULL AND TRIM(category) <> ''
            ORDER BY TRIM(category) COLLATE NOCASE
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let uncategorized: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE category IS NULL OR TRIM(category) = ''",
        )
        .fetch_one(&self.pool)
        .await?;

        let mut categories = Vec::with_capacity(named.len() + 1);
        if uncategorized > 0 {
            categories.push(NO_CATEGORY.to_string());
        }
        categories.extend(named);
        Ok(categories)
    }

    /// Renames a category and returns the number of products moved.
    ///
    /// `old` matches case-insensitively after trimming; "No Category"
    /// selects the NULL/blank rows. A blank `new` clears the category.
    pub async fn rename_category(&self, old: &str, new: &str) -> DbResult<u64> {
        let new = normalize_category(Some(new))?;

        let result = if old.trim().eq_ignore_ascii_case(NO_CATEGORY) {
            sqlx::query(
                "UPDATE products SET category = ?1 WHERE category IS NULL OR TRIM(category) = ''",
            )
            .bind(&new)
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                "UPDATE products SET category = ?1 WHERE LOWER(TRIM(category)) = LOWER(TRIM(?2))",
            )
            .bind(&new)
            .bind(old)
            .execute(&self.pool)
            .await?
        };

        info!(
            old,
            new = new.as_deref().unwrap_or(NO_CATEGORY),
            count = result.rows_affected(),
            "Category renamed"
        );
        Ok(result.rows_affected())
    }

    /// Products with `quantity < threshold`, lowest stock first.
    pub async fn low_stock(&self, threshold: i64) -> DbResult<Vec<LowStockItem>> {
        let items = sqlx::query_as::<_, LowStockItem>(
            "SELECT id, name, quantity FROM products WHERE quantity < ?1 ORDER BY quantity, id",
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    /// Products whose name contains `search` (case-insensitive) within the
    /// selected category.
    pub async fn filtered(
        &self,
        search: Option<&str>,
        category: &CategoryFilter,
    ) -> DbResult<Vec<Product>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE 1 = 1"));

        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            query.push(" AND name LIKE ");
            query.push_bind(format!("%{term}%"));
        }

        if category.is_no_category() {
            query.push(" AND (category IS NULL OR TRIM(category) = '')");
        } else if let CategoryFilter::Named(name) = category {
            query.push(" AND LOWER(TRIM(category)) = LOWER(TRIM(");
            query.push_bind(name.clone());
            query.push("))");
        }

        query.push(" ORDER BY name COLLATE NOCASE, id");

        let products = query
            .build_query_as::<Product>()
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// All product ids, for bulk push.
    pub async fn ids(&self) -> DbResult<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT id FROM products ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Sets `last_updated` to `ts`. Returns false when the row is missing.
    pub async fn touch(&self, id: i64, ts: f64) -> DbResult<bool> {
        let result = sqlx::query("UPDATE products SET last_updated = ?2 WHERE id = ?1")
            .bind(id)
            .bind(ts)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Number of products in the catalog.
    pub async fn count(&self) -> DbResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
