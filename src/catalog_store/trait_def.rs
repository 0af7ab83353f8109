//! CatalogStore trait definition.
//!
//! Reads go straight to the store. Every mutation happens inside
//! [`CatalogStore::write_transaction`], which hands the caller a
//! [`CatalogTransaction`] and commits only if the whole closure succeeds.

use super::error::CatalogResult;
use super::models::{Item, ItemsPage, PageRequest, Rank, Suggestion, SuggestionStatus};

/// Operations available inside one atomic write transaction.
pub trait CatalogTransaction {
    fn get_item(&self, id: &str) -> CatalogResult<Option<Item>>;

    fn insert_item(&self, item: &Item) -> CatalogResult<()>;

    /// Overwrite title and media ref, leaving rank and activation untouched.
    fn update_item_details(
        &self,
        id: &str,
        title: &str,
        media_ref: &str,
        updated_at: i64,
    ) -> CatalogResult<()>;

    /// Returns whether a row was removed.
    fn delete_item(&self, id: &str) -> CatalogResult<bool>;

    /// Ranked items at `from` or below on the board, excluding `excluding_id`,
    /// ordered by rank **descending**. Callers shifting items down rely on
    /// this order to never write two items to the same slot.
    fn ranked_items_from(&self, from: Rank, excluding_id: &str) -> CatalogResult<Vec<Item>>;

    fn set_item_rank(&self, id: &str, rank: Option<Rank>, updated_at: i64) -> CatalogResult<()>;

    /// Mark the item visible as of `at`, refreshing an earlier activation.
    fn activate_item(&self, id: &str, at: i64) -> CatalogResult<()>;

    fn insert_suggestion(&self, suggestion: &Suggestion) -> CatalogResult<()>;

    fn get_suggestion(&self, id: &str) -> CatalogResult<Option<Suggestion>>;

    fn mark_suggestion_reviewed(
        &self,
        id: &str,
        status: SuggestionStatus,
        reviewer_id: &str,
        reviewed_at: i64,
        resulting_rank: Option<Rank>,
    ) -> CatalogResult<()>;
}

/// Trait for catalog storage backends.
pub trait CatalogStore: Send + Sync {
    /// Run `work` inside one atomic transaction. Any error returned by `work`
    /// (or a panic unwinding through it) rolls back every write it made.
    fn write_transaction(
        &self,
        work: &mut dyn FnMut(&dyn CatalogTransaction) -> CatalogResult<()>,
    ) -> CatalogResult<()>;

    fn get_item(&self, id: &str) -> CatalogResult<Option<Item>>;

    /// All ranked items, ascending by rank.
    fn list_ranked_items(&self) -> CatalogResult<Vec<Item>>;

    /// Active items outside the ranked set, newest first.
    fn list_unranked_items(&self, page: PageRequest) -> CatalogResult<ItemsPage>;

    fn get_suggestion(&self, id: &str) -> CatalogResult<Option<Suggestion>>;

    /// Suggestions newest first, optionally filtered by status.
    fn list_suggestions(
        &self,
        status: Option<SuggestionStatus>,
        limit: usize,
    ) -> CatalogResult<Vec<Suggestion>>;

    // =========================================================================
    // Counts (for metrics)
    // =========================================================================

    fn get_items_count(&self) -> usize;

    fn get_pending_suggestions_count(&self) -> usize;
}

impl dyn CatalogStore {
    /// Typed wrapper over [`CatalogStore::write_transaction`].
    ///
    /// The closure may run more than once when the caller retries, so it must
    /// not have side effects outside the transaction.
    pub fn in_transaction<T>(
        &self,
        mut work: impl FnMut(&dyn CatalogTransaction) -> CatalogResult<T>,
    ) -> CatalogResult<T> {
        let mut output = None;
        self.write_transaction(&mut |tx: &dyn CatalogTransaction| {
            output = Some(work(tx)?);
            Ok(())
        })?;
        output.ok_or_else(|| anyhow::anyhow!("transaction committed without a result").into())
    }
}
