//! Shared fixtures for the unit tests of this crate.

use tillpoint_core::{Channel, InventoryItem};
use uuid::Uuid;

use crate::pool::{Database, DbConfig};
use crate::repository::inventory::NewInventoryItem;

pub(crate) async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory())
        .await
        .expect("in-memory database")
}

/// A fresh database file under the temp dir, so that `connections` pool
/// connections really run side by side.
pub(crate) async fn file_db(connections: u32) -> Database {
    let path = std::env::temp_dir().join(format!("tillpoint-test-{}.db", Uuid::new_v4()));
    Database::new(DbConfig::new(path).max_connections(connections))
        .await
        .expect("file database")
}

pub(crate) fn new_item(sku: &str, channel: Channel, quantity: i64) -> NewInventoryItem {
    NewInventoryItem {
        sku: sku.to_string(),
        name: format!("Item {sku}"),
        category_id: Some("general".to_string()),
        unit_price_cents: 1000,
        quantity,
        channel,
    }
}

/// Inserts an item with the given price and stock.
pub(crate) async fn stock_item(
    db: &Database,
    sku: &str,
    channel: Channel,
    unit_price_cents: i64,
    quantity: i64,
) -> InventoryItem {
    let mut item = new_item(sku, channel, quantity);
    item.unit_price_cents = unit_price_cents;
    db.inventory().create(item).await.expect("create item")
}
