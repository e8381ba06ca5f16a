//! # Product Commands
//!
//! Catalog maintenance. Every write is followed by the product hook, so the
//! remote copy and the local archive follow the change.
//!
//! ```text
//! add / update / restock ──► repo write ──► after_product_change([id])
//! rename-category ─────────► repo write ──► after_product_change(moved ids)
//! delete / clear ──────────► repo delete ─► after_products_removed(ids)
//! list / show / categories / low-stock ──► read only
//! ```

use stockroom_core::{CategoryFilter, NewProduct, Product, ProductUpdate};
use tracing::info;

use super::money;
use crate::cli::ProductChanges;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn add(state: &AppState, input: NewProduct) -> ApiResult<String> {
    let product = state.db().products().insert(&input).await?;
    state.after_product_change(&[product.id]).await;
    Ok(format!(
        "Product added: #{} {} ({} in stock at {})",
        product.id,
        product.name,
        product.quantity,
        money(product.price)
    ))
}

pub async fn list(
    state: &AppState,
    search: Option<&str>,
    category: Option<&str>,
) -> ApiResult<String> {
    let filter = CategoryFilter::parse(category);
    let products = state.db().products().filtered(search, &filter).await?;
    if products.is_empty() {
        return Ok("No products found.".to_string());
    }

    let mut lines = vec![format!(
        "{:>5}  {:<28} {:<16} {:>6} {:>10} {:>10}",
        "ID", "NAME", "CATEGORY", "QTY", "PRICE", "COST"
    )];
    lines.extend(products.iter().map(row));
    Ok(lines.join("\n"))
}

fn row(p: &Product) -> String {
    format!(
        "{:>5}  {:<28} {:<16} {:>6} {:>10} {:>10}",
        p.id,
        p.name,
        p.display_category(),
        p.quantity,
        money(p.price),
        money(p.cost_price)
    )
}

pub async fn show(state: &AppState, id: i64) -> ApiResult<String> {
    let p = state.db().products().require(id).await?;
    Ok([
        format!("Product #{}", p.id),
        format!("  Name:       {}", p.name),
        format!("  Category:   {}", p.display_category()),
        format!("  Quantity:   {}", p.quantity),
        format!("  Price:      {}", money(p.price)),
        format!("  Cost price: {}", money(p.cost_price)),
    ]
    .join("\n"))
}

pub async fn update(state: &AppState, id: i64, changes: ProductChanges) -> ApiResult<String> {
    let repo = state.db().products();
    let current = repo.require(id).await?;

    let mut update = ProductUpdate::from(&current);
    if let Some(name) = changes.name {
        update.name = name;
    }
    if let Some(category) = changes.category {
        update.category = Some(category).filter(|c| !c.trim().is_empty());
    }
    if let Some(quantity) = changes.quantity {
        update.quantity = quantity;
    }
    if let Some(price) = changes.price {
        update.price = price;
    }
    if let Some(cost_price) = changes.cost_price {
        update.cost_price = cost_price;
    }

    let product = repo.update(id, &update).await?;
    state.after_product_change(&[id]).await;
    Ok(format!("Product updated: {}", row(&product).trim_start()))
}

pub async fn restock(state: &AppState, id: i64, amount: i64) -> ApiResult<String> {
    let product = state.db().products().restock(id, amount).await?;
    state.after_product_change(&[id]).await;
    Ok(format!(
        "Restocked {}: quantity now {}",
        product.name, product.quantity
    ))
}

pub async fn delete(state: &AppState, id: i64) -> ApiResult<String> {
    if !state.db().products().delete(id).await? {
        return Err(ApiError::not_found("Product", id));
    }
    state.after_products_removed(&[id]).await;
    Ok(format!("Product #{id} deleted."))
}

pub async fn categories(state: &AppState) -> ApiResult<String> {
    let categories = state.db().products().categories().await?;
    if categories.is_empty() {
        return Ok("No categories.".to_string());
    }
    Ok(categories.join("\n"))
}

pub async fn rename_category(state: &AppState, old: &str, new: &str) -> ApiResult<String> {
    let repo = state.db().products();
    let moved = repo.rename_category(old, new).await?;
    if moved == 0 {
        return Ok(format!("No products in category '{old}'."));
    }

    let target = match new.trim() {
        "" => CategoryFilter::Named(stockroom_core::NO_CATEGORY.to_string()),
        name => CategoryFilter::Named(name.to_string()),
    };
    let ids: Vec<i64> = repo
        .filtered(None, &target)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();
    state.after_product_change(&ids).await;

    Ok(format!("Moved {moved} product(s) from '{old}' to '{}'.", new.trim()))
}

pub async fn low_stock(state: &AppState, threshold: i64) -> ApiResult<String> {
    let items = state.db().products().low_stock(threshold).await?;
    if items.is_empty() {
        return Ok(format!("No products below {threshold}."));
    }
    Ok(items
        .iter()
        .map(|i| format!("{:>5}  {:<28} {:>6}", i.id, i.name, i.quantity))
        .collect::<Vec<_>>()
        .join("\n"))
}

pub async fn clear(state: &AppState, confirmed: bool) -> ApiResult<String> {
    if !confirmed {
        return Err(ApiError::validation(
            "This deletes every product. Re-run with --yes to confirm.",
        ));
    }
    let repo = state.db().products();
    let ids = repo.ids().await?;
    let removed = repo.clear_all().await?;
    info!(removed, "Product catalog cleared");

    state.after_products_removed(&ids).await;
    Ok(format!("Deleted {removed} product(s)."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{add as seed, mirrored_state, offline_state, product};
    use crate::error::ErrorCode;
    use stockroom_sync::RemoteStore;

    #[tokio::test]
    async fn test_add_pushes_to_remote() {
        let (state, remote) = mirrored_state().await;
        let out = add(&state, product("Rice", Some("Grains"), 10, 100.0))
            .await
            .unwrap();
        assert_eq!(out, "Product added: #1 Rice (10 in stock at 100.00)");

        let stored = remote.get("/products/1").await.unwrap().unwrap();
        assert_eq!(stored["category"], "Grains");
        assert!(stored["last_updated"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_invalid_product_is_rejected() {
        let state = offline_state().await;
        let err = add(&state, product("", None, 1, 1.0)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(state.db().products().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_filters_by_category() {
        let state = offline_state().await;
        seed(&state, product("Rice", Some("Grains"), 10, 100.0)).await;
        seed(&state, product("Cola", Some("Drinks"), 4, 2.5)).await;
        seed(&state, product("Mystery", None, 1, 1.0)).await;

        let out = list(&state, None, Some("drinks")).await.unwrap();
        assert_eq!(out.lines().count(), 2);
        assert!(out.contains("Cola"));

        let out = list(&state, None, Some("No Category")).await.unwrap();
        assert!(out.contains("Mystery") && !out.contains("Rice"));

        let out = list(&state, Some("zzz"), None).await.unwrap();
        assert_eq!(out, "No products found.");
    }

    #[tokio::test]
    async fn test_update_keeps_unchanged_fields() {
        let state = offline_state().await;
        let id = seed(&state, product("Rice", Some("Grains"), 10, 100.0)).await;

        let changes = ProductChanges {
            price: Some(120.0),
            category: Some(String::new()),
            ..Default::default()
        };
        update(&state, id, changes).await.unwrap();

        let p = state.db().products().require(id).await.unwrap();
        assert_eq!(p.name, "Rice");
        assert_eq!(p.quantity, 10);
        assert_eq!(p.price, 120.0);
        assert_eq!(p.display_category(), stockroom_core::NO_CATEGORY);
    }

    #[tokio::test]
    async fn test_restock_and_low_stock() {
        let state = offline_state().await;
        let id = seed(&state, product("Cola", None, 2, 2.5)).await;

        assert!(low_stock(&state, 5).await.unwrap().contains("Cola"));
        assert_eq!(
            restock(&state, id, 10).await.unwrap(),
            "Restocked Cola: quantity now 12"
        );
        assert_eq!(low_stock(&state, 5).await.unwrap(), "No products below 5.");

        let err = restock(&state, id, 0).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_delete_removes_remote_copy() {
        let (state, remote) = mirrored_state().await;
        add(&state, product("Rice", None, 10, 100.0)).await.unwrap();
        assert!(remote.get("/products/1").await.unwrap().is_some());

        assert_eq!(delete(&state, 1).await.unwrap(), "Product #1 deleted.");
        assert!(remote.get("/products/1").await.unwrap().is_none());

        let err = delete(&state, 1).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_rename_category_pushes_moved_products() {
        let (state, remote) = mirrored_state().await;
        add(&state, product("Cola", Some("Drinks"), 4, 2.5)).await.unwrap();
        add(&state, product("Rice", Some("Grains"), 4, 9.0)).await.unwrap();

        let out = rename_category(&state, "drinks", "Beverages").await.unwrap();
        assert_eq!(out, "Moved 1 product(s) from 'drinks' to 'Beverages'.");
        assert_eq!(
            remote.get("/products/1/category").await.unwrap(),
            Some(serde_json::json!("Beverages"))
        );
        assert_eq!(categories(&state).await.unwrap(), "Beverages\nGrains");

        let out = rename_category(&state, "Snacks", "Chips").await.unwrap();
        assert_eq!(out, "No products in category 'Snacks'.");
    }

    #[tokio::test]
    async fn test_clear_requires_confirmation() {
        let (state, remote) = mirrored_state().await;
        add(&state, product("Rice", None, 10, 100.0)).await.unwrap();
        add(&state, product("Cola", None, 10, 2.0)).await.unwrap();

        assert!(clear(&state, false).await.is_err());
        assert_eq!(state.db().products().count().await.unwrap(), 2);

        assert_eq!(clear(&state, true).await.unwrap(), "Deleted 2 product(s).");
        assert!(remote.get("/products").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_show_missing_product() {
        let state = offline_state().await;
        let err = show(&state, 42).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NotFound);
        assert_eq!(err.message, "Product not found: 42");
    }
}
