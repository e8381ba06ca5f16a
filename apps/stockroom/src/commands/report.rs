//! # Report Command
//!
//! One screen of numbers: counts, revenue, profit, the best seller,
//! per-product totals and the low-stock list.

use super::money;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn report(state: &AppState, threshold: i64) -> ApiResult<String> {
    let products = state.db().products();
    let sales = state.db().sales();

    let mut lines = vec![
        format!("Products:      {}", products.count().await?),
        format!("Sales:         {}", sales.count().await?),
        format!("Total revenue: {}", money(sales.total_revenue().await?)),
        format!("Total profit:  {}", money(sales.total_profit().await?)),
    ];

    lines.push(match sales.best_seller().await? {
        Some(best) => format!(
            "Best seller:   {} ({} sold, {})",
            best.product_name,
            best.total_quantity,
            money(best.revenue)
        ),
        None => "Best seller:   none".to_string(),
    });

    let low = products.low_stock(threshold).await?;
    if low.is_empty() {
        lines.push(format!("Low stock (< {threshold}): none"));
    } else {
        let names: Vec<String> = low
            .iter()
            .map(|item| format!("{} ({})", item.name, item.quantity))
            .collect();
        lines.push(format!("Low stock (< {threshold}): {}", names.join(", ")));
    }

    let totals = sales.summary_per_product().await?;
    if !totals.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "{:<28} {:>6} {:>12} {:>12}",
            "PRODUCT", "QTY", "REVENUE", "PROFIT"
        ));
        lines.extend(totals.iter().map(|t| {
            format!(
                "{:<28} {:>6} {:>12} {:>12}",
                t.product_name,
                t.total_quantity,
                money(t.total_revenue),
                money(t.total_profit)
            )
        }));
    }

    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::sale;
    use crate::commands::test_support::{add, offline_state, product};

    #[tokio::test]
    async fn test_empty_report() {
        let state = offline_state().await;
        let out = report(&state, 5).await.unwrap();
        assert_eq!(
            out,
            "Products:      0\nSales:         0\nTotal revenue: 0.00\nTotal profit:  0.00\n\
             Best seller:   none\nLow stock (< 5): none"
        );
    }

    #[tokio::test]
    async fn test_report_totals() {
        let state = offline_state().await;
        let rice = add(&state, product("Rice", None, 10, 100.0)).await;
        let cola = add(&state, product("Cola", None, 20, 2.0)).await;
        sale::sell(&state, rice, 3).await.unwrap();
        sale::sell(&state, cola, 16).await.unwrap();

        let out = report(&state, 5).await.unwrap();
        assert!(out.contains("Sales:         2"));
        assert!(out.contains("Total revenue: 332.00"));
        assert!(out.contains("Best seller:   Cola (16 sold, 32.00)"));
        assert!(out.contains("Low stock (< 5): Cola (4)"));
        assert!(out.contains("Rice"));
    }
}
