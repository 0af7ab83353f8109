//! Direct item administration.
//!
//! Items created or updated here become visible immediately. Every rank
//! change is delegated to the ranking engine inside the same transaction
//! as the rest of the write.

use crate::catalog_store::validation::{validate_media_ref, validate_title};
use crate::catalog_store::{
    CatalogError, CatalogResult, Item, ItemUpdate, ItemsPage, NewItem, PageRequest, Rank,
};
use crate::ranking::{
    now_timestamp, release_in_transaction, ClaimOutcome, RankingEngine, ReleaseOutcome,
};
use std::sync::Arc;
use tracing::info;

/// What an update does to the item's rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RankChange {
    Keep,
    Release,
    Claim(Rank),
}

impl RankChange {
    fn from_request(rank: Option<Option<i64>>) -> CatalogResult<Self> {
        Ok(match rank {
            None => RankChange::Keep,
            Some(None) => RankChange::Release,
            Some(Some(value)) => RankChange::Claim(Rank::new(value)?),
        })
    }
}

enum RankEffect {
    None,
    Claimed(ClaimOutcome),
    Released(ReleaseOutcome),
}

pub struct ItemManager {
    engine: Arc<RankingEngine>,
}

impl ItemManager {
    pub fn new(engine: Arc<RankingEngine>) -> Self {
        Self { engine }
    }

    pub fn get_item(&self, id: &str) -> CatalogResult<Item> {
        self.engine
            .store()
            .get_item(id)?
            .ok_or_else(|| CatalogError::ItemNotFound(id.to_string()))
    }

    /// Active items outside the ranked set, newest first.
    pub fn list_unranked(&self, page: PageRequest) -> CatalogResult<ItemsPage> {
        self.engine.store().list_unranked_items(page)
    }

    /// Create an active item, claiming `rank` in the same transaction if given.
    pub fn create_item(&self, new_item: NewItem) -> CatalogResult<Item> {
        validate_title(&new_item.title)?;
        validate_media_ref(&new_item.media_ref)?;
        let rank = new_item.rank.map(Rank::new).transpose()?;

        let (item, claim) = self.engine.retry_policy().execute("create_item", || {
            self.engine.store().in_transaction(|tx| {
                let now = now_timestamp();
                let item = Item::new_active(&new_item.title, &new_item.media_ref, now);
                tx.insert_item(&item)?;
                match rank {
                    Some(rank) => {
                        let outcome = self.engine.claim_within(tx, rank, &item.id, now)?;
                        Ok((outcome.item.clone(), Some(outcome)))
                    }
                    None => Ok((item, None)),
                }
            })
        })?;

        info!("Created item {} ({})", item.id, item.title);
        if let Some(outcome) = &claim {
            self.engine.report_claim(outcome);
        }
        self.engine.refresh_catalog_gauges();
        Ok(item)
    }

    /// Apply a partial update. The item is (re)activated whatever changes.
    pub fn update_item(&self, id: &str, update: ItemUpdate) -> CatalogResult<Item> {
        if let Some(title) = &update.title {
            validate_title(title)?;
        }
        if let Some(media_ref) = &update.media_ref {
            validate_media_ref(media_ref)?;
        }
        let rank_change = RankChange::from_request(update.rank)?;

        let (item, effect) = self.engine.retry_policy().execute("update_item", || {
            self.engine.store().in_transaction(|tx| {
                let now = now_timestamp();
                let current = tx
                    .get_item(id)?
                    .ok_or_else(|| CatalogError::ItemNotFound(id.to_string()))?;
                let title = update
                    .title
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or(current.title.as_str());
                let media_ref = update
                    .media_ref
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or(current.media_ref.as_str());
                tx.update_item_details(id, title, media_ref, now)?;

                let effect = match rank_change {
                    RankChange::Keep => RankEffect::None,
                    RankChange::Release => {
                        RankEffect::Released(release_in_transaction(tx, id, now)?)
                    }
                    RankChange::Claim(rank) => {
                        RankEffect::Claimed(self.engine.claim_within(tx, rank, id, now)?)
                    }
                };
                // A claim already activated the item
                if !matches!(effect, RankEffect::Claimed(_)) {
                    tx.activate_item(id, now)?;
                }

                let item = tx
                    .get_item(id)?
                    .ok_or_else(|| CatalogError::ItemNotFound(id.to_string()))?;
                Ok((item, effect))
            })
        })?;

        info!("Updated item {} ({})", item.id, item.title);
        match &effect {
            RankEffect::None => {}
            RankEffect::Claimed(outcome) => self.engine.report_claim(outcome),
            RankEffect::Released(outcome) => self.engine.report_release(outcome),
        }
        self.engine.refresh_catalog_gauges();
        Ok(item)
    }

    /// Remove an item, vacating its rank first.
    pub fn delete_item(&self, id: &str) -> CatalogResult<()> {
        let released = self.engine.retry_policy().execute("delete_item", || {
            self.engine.store().in_transaction(|tx| {
                let outcome = release_in_transaction(tx, id, now_timestamp())?;
                if !tx.delete_item(id)? {
                    return Err(CatalogError::ItemNotFound(id.to_string()));
                }
                Ok(outcome)
            })
        })?;

        info!("Deleted item {} ({})", released.item.id, released.item.title);
        self.engine.report_release(&released);
        self.engine.refresh_catalog_gauges();
        Ok(())
    }
}
