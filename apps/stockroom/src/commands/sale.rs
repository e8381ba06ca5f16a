//! # Sale Commands
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Checkout Flow                                        │
//! │                                                                         │
//! │  stockroom sale checkout 1:2 4:1 9:5                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  TransactionRepository::checkout                                        │
//! │       │  new transaction                                                │
//! │       │  1:2  ✓ sold (stock check + insert + decrement, one DB tx)      │
//! │       │  4:1  ✓ sold                                                    │
//! │       │  9:5  ✗ insufficient stock ── later lines not attempted         │
//! │       │  finalize: grand_total = sum of committed lines                 │
//! │       ▼                                                                 │
//! │  after_sales: push sales + touched products, rotate backup              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use stockroom_core::{CartLine, CategoryFilter, Sale, SaleRecord};

use super::money;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn sell(state: &AppState, product_id: i64, quantity: i64) -> ApiResult<String> {
    let outcome = state
        .db()
        .sales()
        .record_sale(product_id, quantity, None)
        .await?;
    state.after_sales(std::slice::from_ref(&outcome.sale)).await;

    Ok(format!(
        "{} {} left in stock.",
        describe(&outcome.sale),
        outcome.remaining_stock
    ))
}

fn describe(sale: &Sale) -> String {
    format!(
        "Sale #{} recorded: {} x {} = {} (profit {}).",
        sale.id,
        sale.quantity_sold,
        sale.product_name.as_deref().unwrap_or("Unknown product"),
        money(sale.total_price),
        money(sale.profit)
    )
}

pub async fn checkout(state: &AppState, lines: &[CartLine]) -> ApiResult<String> {
    let summary = state.db().transactions().checkout(lines).await?;
    if !summary.sales.is_empty() {
        state.after_sales(&summary.sales).await;
    }

    let mut out = vec![format!(
        "Transaction #{}: {} line(s), grand total {}",
        summary.transaction.id,
        summary.sales.len(),
        money(summary.transaction.grand_total)
    )];
    out.extend(summary.sales.iter().map(|s| format!("  {}", describe(s))));
    if let Some(rejected) = &summary.rejected {
        out.push(format!(
            "  Stopped at product {} x {}: {}",
            rejected.line.product_id, rejected.line.quantity, rejected.reason
        ));
    }
    Ok(out.join("\n"))
}

pub async fn list(state: &AppState, category: Option<&str>) -> ApiResult<String> {
    let sales = state
        .db()
        .sales()
        .with_category(&CategoryFilter::parse(category))
        .await?;
    if sales.is_empty() {
        return Ok("No sales found.".to_string());
    }

    let mut lines = vec![format!(
        "{:>5}  {:<26} {:<28} {:>5} {:>10} {:>10} {:>5}",
        "ID", "TIME", "PRODUCT", "QTY", "TOTAL", "PROFIT", "TXN"
    )];
    lines.extend(sales.iter().map(row));
    Ok(lines.join("\n"))
}

fn row(s: &SaleRecord) -> String {
    format!(
        "{:>5}  {:<26} {:<28} {:>5} {:>10} {:>10} {:>5}",
        s.id,
        s.timestamp,
        s.product_name,
        s.quantity_sold,
        money(s.total_price),
        money(s.profit),
        s.transaction_id.map(|t| t.to_string()).unwrap_or_default()
    )
}

pub async fn show(state: &AppState, id: i64) -> ApiResult<String> {
    let sale = state
        .db()
        .sales()
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Sale", id))?;

    let mut lines = vec![
        format!("Sale #{}", sale.id),
        format!("  Product:  {} (#{})", sale.product_name, sale.product_id),
        format!("  Category: {}", sale.category),
        format!("  Quantity: {}", sale.quantity_sold),
        format!("  Total:    {}", money(sale.total_price)),
        format!("  Profit:   {}", money(sale.profit)),
        format!("  Time:     {}", sale.timestamp),
    ];
    if let Some(tx) = sale.transaction_id {
        lines.push(format!("  Transaction: #{tx}"));
    }
    Ok(lines.join("\n"))
}

pub async fn transaction(state: &AppState, id: i64) -> ApiResult<String> {
    let details = state
        .db()
        .transactions()
        .details(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Transaction", id))?;

    let mut lines = vec![format!(
        "Transaction #{} at {}: grand total {}",
        details.transaction.id,
        details.transaction.timestamp,
        money(details.transaction.grand_total)
    )];
    lines.extend(details.sales.iter().map(|s| {
        format!(
            "  {} x {} = {}",
            s.quantity_sold,
            s.product_name,
            money(s.total_price)
        )
    }));
    Ok(lines.join("\n"))
}

pub async fn clear(state: &AppState, confirmed: bool) -> ApiResult<String> {
    if !confirmed {
        return Err(ApiError::validation(
            "This deletes every sale. Re-run with --yes to confirm.",
        ));
    }
    let repo = state.db().sales();
    let ids = repo.ids().await?;
    let removed = repo.clear_all().await?;
    state.after_sales_removed(&ids).await;
    Ok(format!("Deleted {removed} sale(s)."))
}
