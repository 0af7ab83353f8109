//! SQLite schema definitions for the ranked catalog database.
//!
//! Slot exclusivity is enforced by the database itself: a partial unique
//! index lets any number of items stay unranked while at most one item holds
//! each rank, and a column CHECK keeps ranks inside the board.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, PartialUniqueIndex, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

/// Items table - every catalog entry, ranked or not
const ITEMS_TABLE: Table = Table {
    name: "items",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", &SqlType::Text, non_null = true), // UUID v4
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("media_ref", &SqlType::Text, non_null = true),
        sqlite_column!(
            "rank",
            &SqlType::Integer,
            check = Some("rank IS NULL OR rank BETWEEN 1 AND 5")
        ),
        sqlite_column!("activated_at", &SqlType::Integer), // NULL = not yet visible
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
        sqlite_column!(
            "updated_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_items_activated_at", "activated_at"),
        ("idx_items_created_at", "created_at"),
    ],
    unique_constraints: &[&["id"]],
    partial_unique_indices: &[
        PartialUniqueIndex {
            name: "idx_items_rank_unique",
            columns: "rank",
            predicate: "rank IS NOT NULL",
        },
        PartialUniqueIndex {
            name: "idx_items_active_media_ref_unique",
            columns: "media_ref",
            predicate: "activated_at IS NOT NULL",
        },
    ],
};

/// Suggestions table - moderation queue and its audit trail
const SUGGESTIONS_TABLE: Table = Table {
    name: "suggestions",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", &SqlType::Text, non_null = true), // UUID v4
        sqlite_column!("submitter_id", &SqlType::Text),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("media_ref", &SqlType::Text, non_null = true),
        sqlite_column!(
            "desired_rank",
            &SqlType::Integer,
            check = Some("desired_rank IS NULL OR desired_rank BETWEEN 1 AND 5")
        ),
        sqlite_column!(
            "status",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'pending'")
        ), // 'pending', 'approved', 'rejected'
        sqlite_column!("reviewer_id", &SqlType::Text),
        sqlite_column!("reviewed_at", &SqlType::Integer),
        sqlite_column!("resulting_rank", &SqlType::Integer),
        sqlite_column!(
            "created_at",
            &SqlType::Integer,
            non_null = true,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_suggestions_status_created", "status, created_at")],
    unique_constraints: &[&["id"]],
    partial_unique_indices: &[],
};

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 0,
    tables: &[ITEMS_TABLE, SUGGESTIONS_TABLE],
    migration: None,
}];
