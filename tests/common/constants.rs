//! Shared constants for end-to-end tests
//!
//! When the seeded catalog changes, update only this file.

#![allow(dead_code)]

// ============================================================================
// Seeded Catalog
// ============================================================================

/// Ranked 1..=5 in this order on a freshly spawned server.
pub const RANKED_TITLES: [&str; 5] = ["A", "B", "C", "D", "E"];

pub const ITEM_A_ID: &str = "item-a";
pub const ITEM_B_ID: &str = "item-b";
pub const ITEM_C_ID: &str = "item-c";
pub const ITEM_D_ID: &str = "item-d";
pub const ITEM_E_ID: &str = "item-e";

/// Active but unranked on a freshly spawned server.
pub const ITEM_F_ID: &str = "item-f";
pub const ITEM_F_TITLE: &str = "F";

/// Media refs are `media://<lowercase title>`.
pub const ITEM_A_MEDIA_REF: &str = "media://a";

// ============================================================================
// Moderation
// ============================================================================

pub const REVIEWER_ID: &str = "moderator-1";
pub const SUBMITTER_ID: &str = "listener-1";

// ============================================================================
// Test Timeouts and Configuration
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Timeout for individual HTTP requests (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Polling interval when waiting for server ready (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 50;
