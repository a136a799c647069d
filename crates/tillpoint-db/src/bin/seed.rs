//! # Seed Data Generator
//!
//! Populates a database with demo inventory and promotions for development.
//!
//! ## Usage
//! ```bash
//! # Seed ./tillpoint_dev.db
//! cargo run -p tillpoint-db --bin seed
//!
//! # Specify database path
//! cargo run -p tillpoint-db --bin seed -- --db ./data/tillpoint.db
//! ```
//!
//! ## Generated Data
//! - In-store items: `{CATEGORY}-{INDEX}` SKUs, stock 0 - 40
//! - Online items: the same catalog with an `WEB-` prefix, split across the
//!   online and both-channel listings
//! - Promotions: a category percentage, a product fixed amount, a store-wide
//!   percentage

use chrono::{Duration, Utc};
use std::env;
use tillpoint_core::promotion::{AppliesTo, Promotion, PromotionType};
use tillpoint_core::Channel;
use tillpoint_db::{Database, DbConfig, NewInventoryItem};

/// Demo categories and their items
const CATEGORIES: &[(&str, &[&str])] = &[
    ("MUG", &["Enamel Mug", "Travel Mug", "Espresso Cup", "Latte Bowl"]),
    ("TEA", &["Green Tea", "Earl Grey", "Chai Blend", "Rooibos"]),
    ("BAG", &["Tote Bag", "Canvas Pouch", "Lunch Bag"]),
    ("PEN", &["Gel Pen", "Fountain Pen", "Marker Set", "Pencil Pack"]),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tillpoint_db::init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut db_path = String::from("./tillpoint_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Tillpoint Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: ./tillpoint_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Tillpoint Seed Data Generator");
    println!("=============================");
    println!("Database: {}", db_path);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.inventory().list_all().await?;
    if !existing.is_empty() {
        println!("⚠ Database already has {} items", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        return Ok(());
    }

    let mut generated = 0;
    for (category_idx, (category, names)) in CATEGORIES.iter().enumerate() {
        for (item_idx, name) in names.iter().enumerate() {
            let seed = category_idx * 10 + item_idx;
            for item in demo_items(category, name, seed) {
                if let Err(e) = db.inventory().create(item).await {
                    eprintln!("Failed to insert {}-{:02}: {}", category, seed, e);
                    continue;
                }
                generated += 1;
            }
        }
    }
    println!("✓ Generated {} inventory items", generated);

    let promotions = demo_promotions();
    for (sort_order, promotion) in promotions.iter().enumerate() {
        db.promotions().upsert(promotion, sort_order as i64).await?;
    }
    println!("✓ Generated {} promotions", promotions.len());

    println!();
    println!("✓ Seed complete!");
    Ok(())
}

/// One in-store listing and one online listing for a catalog entry.
fn demo_items(category: &str, name: &str, seed: usize) -> [NewInventoryItem; 2] {
    let unit_price_cents = 499 + ((seed * 37) % 2500) as i64;
    let quantity = (seed * 7 % 41) as i64;
    let category_id = Some(category.to_lowercase());

    let online_channel = if seed % 2 == 0 {
        Channel::Online
    } else {
        Channel::Both
    };

    [
        NewInventoryItem {
            sku: format!("{}-{:02}", category, seed),
            name: name.to_string(),
            category_id: category_id.clone(),
            unit_price_cents,
            quantity,
            channel: Channel::InStore,
        },
        NewInventoryItem {
            sku: format!("WEB-{}-{:02}", category, seed),
            name: format!("{} (web)", name),
            category_id,
            unit_price_cents,
            quantity: quantity + 10,
            channel: online_channel,
        },
    ]
}

fn demo_promotions() -> Vec<Promotion> {
    let now = Utc::now();

    vec![
        Promotion {
            id: "mug-week".to_string(),
            title: "15% off all mugs".to_string(),
            promotion_type: PromotionType::Percentage,
            value: 1500,
            min_purchase_cents: 0,
            sale_channel: Channel::Both,
            activation_date: now - Duration::days(1),
            expiration_date: Some(now + Duration::days(7)),
            applies_to: AppliesTo::Category,
            applies_to_id: Some("mug".to_string()),
        },
        Promotion {
            id: "tea-bundle".to_string(),
            title: "5.00 off Green Tea over 20.00".to_string(),
            promotion_type: PromotionType::Fixed,
            value: 500,
            min_purchase_cents: 2000,
            sale_channel: Channel::InStore,
            activation_date: now - Duration::days(1),
            expiration_date: None,
            applies_to: AppliesTo::Product,
            applies_to_id: Some("TEA-10".to_string()),
        },
        Promotion {
            id: "store-wide".to_string(),
            title: "5% off everything".to_string(),
            promotion_type: PromotionType::Percentage,
            value: 500,
            min_purchase_cents: 0,
            sale_channel: Channel::Both,
            activation_date: now - Duration::days(1),
            expiration_date: None,
            applies_to: AppliesTo::All,
            applies_to_id: None,
        },
    ]
}
