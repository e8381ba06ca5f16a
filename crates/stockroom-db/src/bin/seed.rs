//! # Seed Data Generator
//!
//! Populates a database with a demo catalog and a few sales.
//!
//! ## Usage
//! ```bash
//! # 200 products (default) into ./stockroom_dev.db
//! cargo run -p stockroom-db --bin seed
//!
//! # Custom amount and path
//! cargo run -p stockroom-db --bin seed -- --count 1000 --db ./data/inventory.db
//! ```
//!
//! ## Generated Data
//! - Products across five categories plus a handful without a category
//! - Prices 1.00 - 40.00, cost price 55-80% of price
//! - Stock 0 - 60, so the low-stock report has something to show
//! - One sale for every seventh product, grouped into transactions of three

use std::env;
use stockroom_core::{CartLine, NewProduct, DEFAULT_LOW_STOCK_THRESHOLD};
use stockroom_db::{Database, DbConfig};

/// Product categories for realistic demo data
const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Beverages",
        &[
            "Cola", "Lemon Soda", "Orange Juice", "Apple Juice", "Mineral Water",
            "Iced Tea", "Ground Coffee", "Cocoa", "Energy Drink", "Malt Drink",
        ],
    ),
    (
        "Grains",
        &[
            "Rice", "Brown Rice", "Spaghetti", "Macaroni", "Oats", "Corn Flour",
            "Wheat Flour", "Semolina", "Couscous", "Beans",
        ],
    ),
    (
        "Dairy",
        &[
            "Milk", "Evaporated Milk", "Powdered Milk", "Yogurt", "Butter",
            "Cheddar", "Cream Cheese", "Custard",
        ],
    ),
    (
        "Household",
        &[
            "Bar Soap", "Detergent", "Bleach", "Dish Liquid", "Toilet Roll",
            "Matches", "Candles", "Sponges",
        ],
    ),
    (
        "Snacks",
        &[
            "Plantain Chips", "Groundnuts", "Biscuits", "Chocolate Bar", "Chin Chin",
            "Popcorn", "Cabin Biscuits", "Toffee",
        ],
    ),
];

/// Size variants for products
const SIZES: &[(&str, f64)] = &[
    ("Small", 0.0),
    ("Medium", 1.5),
    ("Large", 3.0),
    ("Family", 6.0),
    ("Carton", 15.0),
];

/// Products without a category, shown under "No Category"
const UNCATEGORIZED: &[&str] = &["Gift Bag", "Umbrella", "Phone Charger"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut count: usize = 200;
    let mut db_path = String::from("./stockroom_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(200);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stockroom Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Number of products to generate (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./stockroom_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Stockroom Seed Data Generator");
    println!("=============================");
    println!("Database: {}", db_path);
    println!("Products: {}", count);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database, migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    println!();
    println!("Generating products...");

    let start = std::time::Instant::now();
    let mut ids = Vec::with_capacity(count);

    let catalog = CATEGORIES
        .iter()
        .flat_map(|(category, names)| {
            names.iter().flat_map(move |name| {
                SIZES
                    .iter()
                    .map(move |(size, addon)| (Some(*category), format!("{name} {size}"), *addon))
            })
        })
        .chain(UNCATEGORIZED.iter().map(|name| (None, name.to_string(), 0.0)));

    for (seed, (category, name, addon)) in catalog.take(count).enumerate() {
        let product = generate_product(category, name, addon, seed);
        match db.products().insert(&product).await {
            Ok(p) => ids.push(p.id),
            Err(e) => eprintln!("Failed to insert {}: {}", product.name, e),
        }
    }

    println!("✓ Generated {} products in {:?}", ids.len(), start.elapsed());

    println!();
    println!("Recording demo sales...");

    let lines: Vec<CartLine> = ids
        .iter()
        .step_by(7)
        .map(|&product_id| CartLine {
            product_id,
            quantity: 1,
        })
        .collect();

    let mut sold = 0;
    for chunk in lines.chunks(3) {
        let summary = db.transactions().checkout(chunk).await?;
        sold += summary.sales.len();
    }
    println!("✓ Recorded {} sales", sold);

    let low = db.products().low_stock(DEFAULT_LOW_STOCK_THRESHOLD).await?;
    println!("  Low-stock products: {}", low.len());
    println!("  Categories: {}", db.products().categories().await?.join(", "));

    db.checkpoint().await?;
    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// Generates a single product with deterministic demo data.
fn generate_product(category: Option<&str>, name: String, addon: f64, seed: usize) -> NewProduct {
    // Base price 1.00 - 25.00 in whole cents
    let base_cents = 100 + ((seed * 37) % 2400) as i64;
    let price = (base_cents as f64 / 100.0) + addon;

    // Cost 55-80% of price, rounded to cents
    let cost_pct = 55 + (seed % 26) as i64;
    let cost_price = ((price * cost_pct as f64).round()) / 100.0;

    NewProduct {
        name,
        category: category.map(str::to_string),
        quantity: (seed % 61) as i64,
        price,
        cost_price,
    }
}
