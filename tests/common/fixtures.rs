//! Test fixture creation for the catalog database

use super::constants::*;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use top5_catalog_server::catalog_store::{CatalogStore, Item, Rank, SqliteCatalogStore};

fn seeded_item(id: &str, title: &str, rank: Option<i64>, created_at: i64) -> Result<Item> {
    Ok(Item {
        id: id.to_string(),
        title: title.to_string(),
        media_ref: format!("media://{}", title.to_lowercase()),
        rank: rank.map(Rank::new).transpose()?,
        activated_at: Some(created_at),
        created_at,
        updated_at: created_at,
    })
}

/// Creates a temporary catalog with A..E on ranks 1..5 and F unranked.
/// Returns (temp_dir, store)
pub fn create_test_catalog() -> Result<(TempDir, Arc<dyn CatalogStore>)> {
    let dir = TempDir::new()?;
    let store: Arc<dyn CatalogStore> = Arc::new(SqliteCatalogStore::new(
        dir.path().join("catalog.db"),
        2,
        Duration::from_millis(2000),
    )?);

    let ids = [ITEM_A_ID, ITEM_B_ID, ITEM_C_ID, ITEM_D_ID, ITEM_E_ID];
    let mut items = Vec::new();
    for (n, (id, title)) in ids.iter().zip(RANKED_TITLES).enumerate() {
        items.push(seeded_item(id, title, Some(n as i64 + 1), 1_000 + n as i64)?);
    }
    items.push(seeded_item(ITEM_F_ID, ITEM_F_TITLE, None, 2_000)?);

    store.in_transaction(|tx| {
        for item in &items {
            tx.insert_item(item)?;
        }
        Ok(())
    })?;

    Ok((dir, store))
}
