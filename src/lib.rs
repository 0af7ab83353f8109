//! Top-5 Catalog Server Library
//!
//! A catalog of items with a bounded ranked set (slots 1..=5), direct item
//! administration and a moderated suggestion workflow, served over HTTP.

pub mod catalog_store;
pub mod config;
pub mod items;
pub mod moderation;
pub mod ranking;
pub mod server;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use catalog_store::{CatalogError, CatalogStore, SqliteCatalogStore};
pub use items::ItemManager;
pub use moderation::ModerationManager;
pub use ranking::{EvictionPolicy, RankingEngine};
pub use server::{run_server, RequestsLoggingLevel};
