//! Ranked-slot engine.
//!
//! Keeps at most one item on each of the slots 1..=5. Claiming an occupied
//! slot pushes the occupant and everything below it one slot down; whatever
//! falls off the last slot is evicted (unranked, but kept in the catalog).
//!
//! The claim and release steps are plain functions over a
//! [`CatalogTransaction`] so the item and moderation managers can run them
//! inside their own transactions. [`RankingEngine`] wraps them with a
//! transaction, conflict retries, logging and metrics.

mod retry_policy;

pub use retry_policy::ConflictRetryPolicy;

use crate::catalog_store::{
    CatalogError, CatalogResult, CatalogStore, CatalogTransaction, Item, Rank,
};
use crate::config::RankingSettings;
use crate::server::metrics;
use std::sync::Arc;
use tracing::{debug, info};

/// What a claim does when its shift chain would push an item off the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum EvictionPolicy {
    /// Unrank the item that falls off the last slot.
    #[default]
    Evict,
    /// Refuse the claim instead, leaving the board untouched.
    Reject,
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvictionPolicy::Evict => f.write_str("evict"),
            EvictionPolicy::Reject => f.write_str("reject"),
        }
    }
}

/// One item pushed down the board by a claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankShift {
    pub item_id: String,
    pub from: Rank,
    pub to: Rank,
}

#[derive(Debug, Clone)]
pub struct ClaimOutcome {
    /// The claiming item, as stored after the claim.
    pub item: Item,
    pub shifted: Vec<RankShift>,
    /// The item pushed off the last slot, if any.
    pub evicted: Option<Item>,
    /// The item already held the rank; only its activation was refreshed.
    pub unchanged: bool,
}

#[derive(Debug, Clone)]
pub struct ReleaseOutcome {
    pub item: Item,
    /// The rank that was vacated, `None` if the item was not ranked.
    pub released: Option<Rank>,
}

/// Row counts backing the catalog gauges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogCounts {
    /// Active items.
    pub items: usize,
    pub ranked: usize,
    pub pending_suggestions: usize,
}

pub(crate) fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Put `item_id` on `rank`, shifting the current occupants down.
///
/// Must run inside a write transaction: on error the caller's transaction
/// is expected to roll back, since some writes may already have happened.
pub fn claim_in_transaction(
    tx: &dyn CatalogTransaction,
    rank: Rank,
    item_id: &str,
    policy: EvictionPolicy,
    now: i64,
) -> CatalogResult<ClaimOutcome> {
    let mut item = tx
        .get_item(item_id)?
        .ok_or_else(|| CatalogError::ItemNotFound(item_id.to_string()))?;

    if item.rank == Some(rank) {
        tx.activate_item(item_id, now)?;
        item.activated_at = Some(now);
        item.updated_at = now;
        return Ok(ClaimOutcome {
            item,
            shifted: Vec::new(),
            evicted: None,
            unchanged: true,
        });
    }

    // Descending by rank: 4->5 is written before 3->4, so the unique index
    // on rank never sees two items on one slot.
    let to_shift = tx.ranked_items_from(rank, item_id)?;
    debug_assert!(to_shift.windows(2).all(|pair| pair[0].rank > pair[1].rank));

    if policy == EvictionPolicy::Reject {
        if let Some(victim) = to_shift
            .iter()
            .find(|other| other.rank.and_then(Rank::next).is_none())
        {
            return Err(CatalogError::EvictionRejected {
                rank: rank.get(),
                item_id: victim.id.clone(),
            });
        }
    }

    // Vacate the old slot first so the walk below cannot collide with it
    if item.rank.is_some() {
        tx.set_item_rank(item_id, None, now)?;
    }

    let mut shifted = Vec::with_capacity(to_shift.len());
    let mut evicted = None;
    for mut other in to_shift {
        let Some(from) = other.rank else {
            continue;
        };
        let to = from.next();
        tx.set_item_rank(&other.id, to, now)?;
        other.rank = to;
        other.updated_at = now;
        match to {
            Some(to) => shifted.push(RankShift {
                item_id: other.id,
                from,
                to,
            }),
            None => evicted = Some(other),
        }
    }

    tx.set_item_rank(item_id, Some(rank), now)?;
    tx.activate_item(item_id, now)?;
    item.rank = Some(rank);
    item.activated_at = Some(now);
    item.updated_at = now;

    Ok(ClaimOutcome {
        item,
        shifted,
        evicted,
        unchanged: false,
    })
}

/// Take `item_id` off the board. Other items keep their ranks.
pub fn release_in_transaction(
    tx: &dyn CatalogTransaction,
    item_id: &str,
    now: i64,
) -> CatalogResult<ReleaseOutcome> {
    let mut item = tx
        .get_item(item_id)?
        .ok_or_else(|| CatalogError::ItemNotFound(item_id.to_string()))?;

    let released = item.rank.take();
    if released.is_some() {
        tx.set_item_rank(item_id, None, now)?;
        item.updated_at = now;
    }
    Ok(ReleaseOutcome { item, released })
}

/// Shared entry point for every rank change.
pub struct RankingEngine {
    store: Arc<dyn CatalogStore>,
    eviction_policy: EvictionPolicy,
    retry_policy: ConflictRetryPolicy,
}

impl RankingEngine {
    pub fn new(store: Arc<dyn CatalogStore>, settings: &RankingSettings) -> Self {
        Self {
            store,
            eviction_policy: settings.eviction_policy,
            retry_policy: ConflictRetryPolicy::new(settings),
        }
    }

    pub fn store(&self) -> &Arc<dyn CatalogStore> {
        &self.store
    }

    pub fn retry_policy(&self) -> &ConflictRetryPolicy {
        &self.retry_policy
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.eviction_policy
    }

    pub fn claim_rank(&self, rank: i64, item_id: &str) -> CatalogResult<Item> {
        let rank = Rank::new(rank)?;
        let outcome = self.retry_policy.execute("claim_rank", || {
            self.store
                .in_transaction(|tx| self.claim_within(tx, rank, item_id, now_timestamp()))
        })?;
        self.report_claim(&outcome);
        self.refresh_catalog_gauges();
        Ok(outcome.item)
    }

    pub fn release_rank(&self, item_id: &str) -> CatalogResult<Item> {
        let outcome = self.retry_policy.execute("release_rank", || {
            self.store
                .in_transaction(|tx| release_in_transaction(tx, item_id, now_timestamp()))
        })?;
        self.report_release(&outcome);
        self.refresh_catalog_gauges();
        Ok(outcome.item)
    }

    pub fn current_ranked_set(&self) -> CatalogResult<Vec<Item>> {
        self.store.list_ranked_items()
    }

    /// [`claim_in_transaction`] with this engine's eviction policy.
    pub fn claim_within(
        &self,
        tx: &dyn CatalogTransaction,
        rank: Rank,
        item_id: &str,
        now: i64,
    ) -> CatalogResult<ClaimOutcome> {
        claim_in_transaction(tx, rank, item_id, self.eviction_policy, now)
    }

    /// Log and count a committed claim.
    pub fn report_claim(&self, outcome: &ClaimOutcome) {
        let rank = outcome.item.rank.map(Rank::get).unwrap_or_default();
        if outcome.unchanged {
            debug!("Item {} already holds rank {}", outcome.item.id, rank);
            metrics::record_rank_claim("unchanged");
        } else {
            debug!(
                "Item {} claimed rank {}, shifted {} item(s)",
                outcome.item.id,
                rank,
                outcome.shifted.len()
            );
            metrics::record_rank_claim("claimed");
        }
        if let Some(evicted) = &outcome.evicted {
            info!(
                "Item {} ({}) evicted from the ranked set by {} claiming rank {}",
                evicted.id, evicted.title, outcome.item.id, rank
            );
            metrics::record_eviction();
        }
    }

    /// Log and count a committed release.
    pub fn report_release(&self, outcome: &ReleaseOutcome) {
        match outcome.released {
            Some(rank) => {
                debug!("Item {} released rank {}", outcome.item.id, rank);
                metrics::record_rank_release();
            }
            None => debug!("Item {} had no rank to release", outcome.item.id),
        }
    }

    pub fn catalog_counts(&self) -> CatalogResult<CatalogCounts> {
        Ok(CatalogCounts {
            items: self.store.get_items_count(),
            ranked: self.store.list_ranked_items()?.len(),
            pending_suggestions: self.store.get_pending_suggestions_count(),
        })
    }

    /// Publish slot occupancy and catalog counts. Call once per committed write.
    pub fn refresh_catalog_gauges(&self) {
        match self.catalog_counts() {
            Ok(counts) => {
                metrics::set_ranked_slots_occupied(counts.ranked);
                metrics::set_catalog_counts(counts.items, counts.pending_suggestions);
            }
            Err(e) => debug!("Could not refresh catalog gauges: {}", e),
        }
    }
}
