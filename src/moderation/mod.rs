//! Suggestion moderation.
//!
//! A suggestion starts `pending` and moves exactly once, to `approved` or
//! `rejected`. Approval materializes a catalog item and, when a rank is
//! requested, claims it through the ranking engine in the same transaction,
//! so a failed claim leaves the suggestion pending and the board untouched.

use crate::catalog_store::validation::{validate_media_ref, validate_reviewer_id, validate_title};
use crate::catalog_store::{
    Approval, CatalogError, CatalogResult, CatalogTransaction, Item, NewSuggestion, Rank,
    Suggestion, SuggestionStatus,
};
use crate::ranking::{now_timestamp, ClaimOutcome, RankingEngine};
use crate::server::metrics;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_LIST_LIMIT: usize = 50;
pub const MAX_LIST_LIMIT: usize = 200;

fn load_pending(tx: &dyn CatalogTransaction, id: &str) -> CatalogResult<Suggestion> {
    let suggestion = tx
        .get_suggestion(id)?
        .ok_or_else(|| CatalogError::SuggestionNotFound(id.to_string()))?;
    if suggestion.status.is_terminal() {
        return Err(CatalogError::AlreadyReviewed {
            id: suggestion.id,
            status: suggestion.status,
        });
    }
    Ok(suggestion)
}

pub struct ModerationManager {
    engine: Arc<RankingEngine>,
}

impl ModerationManager {
    pub fn new(engine: Arc<RankingEngine>) -> Self {
        Self { engine }
    }

    pub fn submit(&self, new_suggestion: NewSuggestion) -> CatalogResult<Suggestion> {
        validate_title(&new_suggestion.title)?;
        validate_media_ref(&new_suggestion.media_ref)?;
        let desired_rank = new_suggestion.desired_rank.map(Rank::new).transpose()?;
        let submitter_id = new_suggestion
            .submitter_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let suggestion = Suggestion {
            id: uuid::Uuid::new_v4().to_string(),
            submitter_id,
            title: new_suggestion.title.trim().to_string(),
            media_ref: new_suggestion.media_ref.trim().to_string(),
            desired_rank,
            status: SuggestionStatus::Pending,
            reviewer_id: None,
            reviewed_at: None,
            resulting_rank: None,
            created_at: now_timestamp(),
        };
        self.engine.retry_policy().execute("submit_suggestion", || {
            self.engine
                .store()
                .in_transaction(|tx| tx.insert_suggestion(&suggestion))
        })?;

        info!(
            "Suggestion {} submitted ({}, desired rank {:?})",
            suggestion.id,
            suggestion.title,
            suggestion.desired_rank.map(Rank::get)
        );
        metrics::record_suggestion_submitted();
        self.engine.refresh_catalog_gauges();
        Ok(suggestion)
    }

    pub fn get(&self, id: &str) -> CatalogResult<Suggestion> {
        self.engine
            .store()
            .get_suggestion(id)?
            .ok_or_else(|| CatalogError::SuggestionNotFound(id.to_string()))
    }

    /// Newest first. `limit` defaults to 50 and is capped at 200.
    pub fn list(
        &self,
        status: Option<SuggestionStatus>,
        limit: Option<usize>,
    ) -> CatalogResult<Vec<Suggestion>> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        self.engine.store().list_suggestions(status, limit)
    }

    /// Accept a pending suggestion. `rank_override` wins over the
    /// submitter's desired rank; with neither the item stays unranked.
    pub fn approve(
        &self,
        id: &str,
        reviewer_id: &str,
        rank_override: Option<i64>,
    ) -> CatalogResult<Approval> {
        validate_reviewer_id(reviewer_id)?;
        let rank_override = rank_override.map(Rank::new).transpose()?;
        let reviewer_id = reviewer_id.trim();

        let (approval, claim) = self.engine.retry_policy().execute("approve_suggestion", || {
            self.engine.store().in_transaction(|tx| {
                let now = now_timestamp();
                let mut suggestion = load_pending(tx, id)?;

                let item = Item::new_active(&suggestion.title, &suggestion.media_ref, now);
                tx.insert_item(&item)?;

                let (item, claim): (Item, Option<ClaimOutcome>) =
                    match rank_override.or(suggestion.desired_rank) {
                        Some(rank) => {
                            let outcome = self.engine.claim_within(tx, rank, &item.id, now)?;
                            (outcome.item.clone(), Some(outcome))
                        }
                        None => (item, None),
                    };

                tx.mark_suggestion_reviewed(
                    id,
                    SuggestionStatus::Approved,
                    reviewer_id,
                    now,
                    item.rank,
                )?;
                suggestion.status = SuggestionStatus::Approved;
                suggestion.reviewer_id = Some(reviewer_id.to_string());
                suggestion.reviewed_at = Some(now);
                suggestion.resulting_rank = item.rank;

                Ok((Approval { suggestion, item }, claim))
            })
        })?;

        info!(
            "Suggestion {} approved by {} as item {} (rank {:?})",
            approval.suggestion.id,
            reviewer_id,
            approval.item.id,
            approval.item.rank.map(Rank::get)
        );
        metrics::record_moderation_decision(SuggestionStatus::Approved.as_str());
        if let Some(outcome) = &claim {
            self.engine.report_claim(outcome);
        }
        self.engine.refresh_catalog_gauges();
        Ok(approval)
    }

    /// Decline a pending suggestion. The catalog is not touched.
    pub fn reject(&self, id: &str, reviewer_id: &str) -> CatalogResult<Suggestion> {
        validate_reviewer_id(reviewer_id)?;
        let reviewer_id = reviewer_id.trim();

        let suggestion = self.engine.retry_policy().execute("reject_suggestion", || {
            self.engine.store().in_transaction(|tx| {
                let now = now_timestamp();
                let mut suggestion = load_pending(tx, id)?;
                tx.mark_suggestion_reviewed(
                    id,
                    SuggestionStatus::Rejected,
                    reviewer_id,
                    now,
                    None,
                )?;
                suggestion.status = SuggestionStatus::Rejected;
                suggestion.reviewer_id = Some(reviewer_id.to_string());
                suggestion.reviewed_at = Some(now);
                Ok(suggestion)
            })
        })?;

        info!("Suggestion {} rejected by {}", suggestion.id, reviewer_id);
        metrics::record_moderation_decision(SuggestionStatus::Rejected.as_str());
        self.engine.refresh_catalog_gauges();
        Ok(suggestion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::{CatalogStore, PageRequest};
    use crate::config::RankingSettings;
    use crate::ranking::CatalogCounts;
    use crate::ranking::tests::{add_item, board, open_store, FlakyStore};
    use std::sync::atomic::Ordering;

    fn manager(store: &Arc<dyn CatalogStore>) -> ModerationManager {
        let settings = RankingSettings {
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            ..Default::default()
        };
        ModerationManager::new(Arc::new(RankingEngine::new(store.clone(), &settings)))
    }

    fn suggestion(title: &str, desired_rank: Option<i64>) -> NewSuggestion {
        NewSuggestion {
            submitter_id: Some("listener-1".to_string()),
            title: title.to_string(),
            media_ref: format!("media://{}", title),
            desired_rank,
        }
    }

    #[test]
    fn submit_creates_pending_suggestion() {
        let (_dir, store) = open_store();
        let manager = manager(&store);

        let submitted = manager.submit(suggestion("S", Some(2))).unwrap();

        assert_eq!(submitted.status, SuggestionStatus::Pending);
        assert_eq!(submitted.desired_rank, Rank::new(2).ok());
        assert_eq!(submitted.submitter_id.as_deref(), Some("listener-1"));
        assert_eq!(manager.get(&submitted.id).unwrap(), submitted);
        assert_eq!(store.get_items_count(), 0);
    }

    #[test]
    fn submit_validates_input() {
        let (_dir, store) = open_store();
        let manager = manager(&store);

        assert!(matches!(
            manager.submit(suggestion(&"x".repeat(256), None)),
            Err(CatalogError::InvalidInput { field: "title", .. })
        ));
        assert!(matches!(
            manager.submit(suggestion("S", Some(0))),
            Err(CatalogError::InvalidRank(0))
        ));
        let mut no_media = suggestion("S", None);
        no_media.media_ref = " ".to_string();
        assert!(matches!(
            manager.submit(no_media),
            Err(CatalogError::InvalidInput { field: "media_ref", .. })
        ));
        assert!(manager.list(None, None).unwrap().is_empty());
    }

    #[test]
    fn anonymous_submission_has_no_submitter() {
        let (_dir, store) = open_store();
        let mut anonymous = suggestion("S", None);
        anonymous.submitter_id = Some("  ".to_string());

        let submitted = manager(&store).submit(anonymous).unwrap();
        assert_eq!(submitted.submitter_id, None);
    }

    #[test]
    fn approve_with_desired_rank_claims_it() {
        let (_dir, store) = open_store();
        add_item(&store, "A", Some(1));
        add_item(&store, "B", Some(2));
        let manager = manager(&store);
        let s = manager.submit(suggestion("S", Some(2))).unwrap();

        let approval = manager.approve(&s.id, "mod-1", None).unwrap();

        assert_eq!(approval.item.rank, Rank::new(2).ok());
        assert!(approval.item.is_active());
        assert_eq!(approval.suggestion.status, SuggestionStatus::Approved);
        assert_eq!(approval.suggestion.resulting_rank, Rank::new(2).ok());
        assert_eq!(approval.suggestion.reviewer_id.as_deref(), Some("mod-1"));
        assert_eq!(
            board(&store),
            vec![
                ("A".to_string(), 1),
                ("S".to_string(), 2),
                ("B".to_string(), 3)
            ]
        );
        assert_eq!(manager.get(&s.id).unwrap(), approval.suggestion);
    }

    #[test]
    fn approve_override_wins_over_desired_rank() {
        let (_dir, store) = open_store();
        let manager = manager(&store);
        let s = manager.submit(suggestion("S", Some(2))).unwrap();

        let approval = manager.approve(&s.id, "mod-1", Some(5)).unwrap();

        assert_eq!(approval.item.rank, Rank::new(5).ok());
        assert_eq!(approval.suggestion.resulting_rank, Rank::new(5).ok());
    }

    #[test]
    fn approve_without_any_rank_leaves_item_unranked() {
        let (_dir, store) = open_store();
        let manager = manager(&store);
        let s = manager.submit(suggestion("S", None)).unwrap();

        let approval = manager.approve(&s.id, "mod-1", None).unwrap();

        assert_eq!(approval.item.rank, None);
        assert_eq!(approval.suggestion.resulting_rank, None);
        assert!(board(&store).is_empty());
        let page = store.list_unranked_items(PageRequest::default()).unwrap();
        assert_eq!(page.items[0].id, approval.item.id);
    }

    #[test]
    fn second_review_is_refused_and_changes_nothing() {
        let (_dir, store) = open_store();
        let manager = manager(&store);
        let s = manager.submit(suggestion("S", Some(1))).unwrap();
        let approval = manager.approve(&s.id, "mod-1", None).unwrap();

        let err = manager.approve(&s.id, "mod-2", Some(3)).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::AlreadyReviewed {
                status: SuggestionStatus::Approved,
                ..
            }
        ));
        let err = manager.reject(&s.id, "mod-2").unwrap_err();
        assert!(matches!(err, CatalogError::AlreadyReviewed { .. }));

        assert_eq!(store.get_items_count(), 1);
        assert_eq!(board(&store), vec![("S".to_string(), 1)]);
        assert_eq!(manager.get(&s.id).unwrap(), approval.suggestion);
    }

    #[test]
    fn reject_stamps_reviewer_and_leaves_catalog_alone() {
        let (_dir, store) = open_store();
        let manager = manager(&store);
        let s = manager.submit(suggestion("S", Some(1))).unwrap();

        let rejected = manager.reject(&s.id, "mod-1").unwrap();

        assert_eq!(rejected.status, SuggestionStatus::Rejected);
        assert_eq!(rejected.reviewer_id.as_deref(), Some("mod-1"));
        assert!(rejected.reviewed_at.is_some());
        assert_eq!(store.get_items_count(), 0);

        let err = manager.approve(&s.id, "mod-2", None).unwrap_err();
        assert!(matches!(
            err,
            CatalogError::AlreadyReviewed {
                status: SuggestionStatus::Rejected,
                ..
            }
        ));
        assert_eq!(store.get_items_count(), 0);
    }

    #[test]
    fn approve_with_duplicate_media_ref_rolls_back() {
        let (_dir, store) = open_store();
        add_item(&store, "A", Some(1));
        let manager = manager(&store);
        let mut duplicate = suggestion("Copy", Some(1));
        duplicate.media_ref = "media://A".to_string();
        let s = manager.submit(duplicate).unwrap();

        let err = manager.approve(&s.id, "mod-1", None).unwrap_err();

        assert!(matches!(err, CatalogError::DuplicateMediaRef(ref m) if m == "media://A"));
        assert_eq!(manager.get(&s.id).unwrap().status, SuggestionStatus::Pending);
        assert_eq!(store.get_items_count(), 1);
        assert_eq!(board(&store), vec![("A".to_string(), 1)]);
    }

    #[test]
    fn unknown_suggestion_is_not_found() {
        let (_dir, store) = open_store();
        let manager = manager(&store);
        assert!(matches!(
            manager.approve("missing", "mod-1", None),
            Err(CatalogError::SuggestionNotFound(_))
        ));
        assert!(matches!(
            manager.reject("missing", "mod-1"),
            Err(CatalogError::SuggestionNotFound(_))
        ));
        assert!(matches!(
            manager.get("missing"),
            Err(CatalogError::SuggestionNotFound(_))
        ));
    }

    #[test]
    fn reviewer_id_is_required() {
        let (_dir, store) = open_store();
        let manager = manager(&store);
        let s = manager.submit(suggestion("S", None)).unwrap();

        assert!(matches!(
            manager.approve(&s.id, "", None),
            Err(CatalogError::InvalidInput { field: "reviewer_id", .. })
        ));
        assert!(matches!(
            manager.approve(&s.id, "mod", Some(7)),
            Err(CatalogError::InvalidRank(7))
        ));
        assert_eq!(manager.get(&s.id).unwrap().status, SuggestionStatus::Pending);
    }

    #[test]
    fn list_filters_by_status() {
        let (_dir, store) = open_store();
        let manager = manager(&store);
        let first = manager.submit(suggestion("one", None)).unwrap();
        manager.submit(suggestion("two", None)).unwrap();
        manager.reject(&first.id, "mod").unwrap();

        assert_eq!(manager.list(None, None).unwrap().len(), 2);
        let pending = manager.list(Some(SuggestionStatus::Pending), None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].title, "two");
        assert_eq!(manager.list(None, Some(0)).unwrap().len(), 1);
    }

    #[test]
    fn approval_retries_conflicts_as_one_unit() {
        let (_dir, store) = open_store();
        let s = manager(&store).submit(suggestion("S", Some(1))).unwrap();
        let flaky = Arc::new(FlakyStore::new(store.clone(), 1));
        let settings = RankingSettings {
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
            ..Default::default()
        };
        let manager = ModerationManager::new(Arc::new(RankingEngine::new(flaky.clone(), &settings)));

        manager.approve(&s.id, "mod-1", None).unwrap();

        assert_eq!(flaky.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(store.get_items_count(), 1);
        assert_eq!(board(&store), vec![("S".to_string(), 1)]);
    }

    #[test]
    fn catalog_counts_follow_each_decision() {
        let (_dir, store) = open_store();
        let manager = manager(&store);
        let counts = |items, ranked, pending_suggestions| CatalogCounts {
            items,
            ranked,
            pending_suggestions,
        };

        let kept = manager.submit(suggestion("S", Some(1))).unwrap();
        let dropped = manager.submit(suggestion("T", None)).unwrap();
        assert_eq!(manager.engine.catalog_counts().unwrap(), counts(0, 0, 2));

        manager.approve(&kept.id, "moderator-1", None).unwrap();
        assert_eq!(manager.engine.catalog_counts().unwrap(), counts(1, 1, 1));

        manager.reject(&dropped.id, "moderator-1").unwrap();
        assert_eq!(manager.engine.catalog_counts().unwrap(), counts(1, 1, 0));
    }
}
