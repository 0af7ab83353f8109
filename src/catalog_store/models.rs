//! Data models for the ranked catalog.
//!
//! Items are the publicly listed entries, a subset of which occupy the
//! ranked slots 1..=5. Suggestions are externally submitted candidates
//! waiting for a moderator decision.

use super::error::{CatalogError, CatalogResult};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize};

pub const MIN_RANK: u8 = 1;
pub const MAX_RANK: u8 = 5;

/// A validated ranked-slot position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Rank(u8);

impl Rank {
    pub fn new(value: i64) -> CatalogResult<Self> {
        if (MIN_RANK as i64..=MAX_RANK as i64).contains(&value) {
            Ok(Rank(value as u8))
        } else {
            Err(CatalogError::InvalidRank(value))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// The slot one step further down the board, `None` past the last slot.
    pub fn next(self) -> Option<Rank> {
        (self.0 < MAX_RANK).then(|| Rank(self.0 + 1))
    }

    pub fn all() -> impl Iterator<Item = Rank> {
        (MIN_RANK..=MAX_RANK).map(Rank)
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ToSql for Rank {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0 as i64))
    }
}

impl FromSql for Rank {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = i64::column_result(value)?;
        Rank::new(raw).map_err(|_| FromSqlError::OutOfRange(raw))
    }
}

/// A catalog entry, possibly holding one of the ranked slots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub media_ref: String,
    pub rank: Option<Rank>,
    /// When the item became publicly visible, unix seconds.
    pub activated_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Item {
    /// A fresh unranked item, visible from `now`.
    pub fn new_active(title: &str, media_ref: &str, now: i64) -> Self {
        Item {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.trim().to_string(),
            media_ref: media_ref.trim().to_string(),
            rank: None,
            activated_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.activated_at.is_some()
    }
}

/// Moderation state of a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Approved, // terminal
    Rejected, // terminal
}

impl SuggestionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SuggestionStatus::Approved | SuggestionStatus::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionStatus::Pending => "pending",
            SuggestionStatus::Approved => "approved",
            SuggestionStatus::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SuggestionStatus::Pending),
            "approved" => Some(SuggestionStatus::Approved),
            "rejected" => Some(SuggestionStatus::Rejected),
            _ => None,
        }
    }
}

impl std::fmt::Display for SuggestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An externally submitted candidate for the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub id: String,
    pub submitter_id: Option<String>,
    pub title: String,
    pub media_ref: String,
    /// Hint only; the moderator may override it or ignore it.
    pub desired_rank: Option<Rank>,
    pub status: SuggestionStatus,
    pub reviewer_id: Option<String>,
    pub reviewed_at: Option<i64>,
    /// Rank the created item ended up with at approval time.
    pub resulting_rank: Option<Rank>,
    pub created_at: i64,
}

/// Input for a directly created item.
#[derive(Debug, Clone, Deserialize)]
pub struct NewItem {
    pub title: String,
    pub media_ref: String,
    #[serde(default)]
    pub rank: Option<i64>,
}

/// Partial update of an item.
///
/// `rank` distinguishes an absent field (keep the current rank) from an
/// explicit `null` (release the rank).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub media_ref: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub rank: Option<Option<i64>>,
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Input for a new suggestion.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSuggestion {
    #[serde(default)]
    pub submitter_id: Option<String>,
    pub title: String,
    pub media_ref: String,
    #[serde(default)]
    pub desired_rank: Option<i64>,
}

/// Result of approving a suggestion.
#[derive(Debug, Clone, Serialize)]
pub struct Approval {
    pub suggestion: Suggestion,
    pub item: Item,
}

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 50;

/// A 1-based page request, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub per_page: usize,
}

impl PageRequest {
    pub fn new(page: Option<usize>, per_page: Option<usize>) -> Self {
        PageRequest {
            page: page.unwrap_or(1).max(1),
            per_page: per_page
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Saturates instead of overflowing on absurdly large page numbers.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemsPage {
    pub items: Vec<Item>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub last_page: usize,
}

impl ItemsPage {
    pub fn new(items: Vec<Item>, request: PageRequest, total: usize) -> Self {
        ItemsPage {
            items,
            page: request.page,
            per_page: request.per_page,
            total,
            last_page: total.div_ceil(request.per_page).max(1),
        }
    }
}
