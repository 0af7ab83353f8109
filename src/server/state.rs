use axum::extract::FromRef;

use crate::catalog_store::CatalogStore;
use crate::items::ItemManager;
use crate::moderation::ModerationManager;
use crate::ranking::RankingEngine;
use std::sync::Arc;
use std::time::Instant;

use super::ServerConfig;

pub type GuardedCatalogStore = Arc<dyn CatalogStore>;
pub type GuardedRankingEngine = Arc<RankingEngine>;
pub type GuardedItemManager = Arc<ItemManager>;
pub type GuardedModerationManager = Arc<ModerationManager>;

#[derive(Clone)]
pub struct ServerState {
    pub config: ServerConfig,
    pub start_time: Instant,
    pub catalog_store: GuardedCatalogStore,
    pub ranking_engine: GuardedRankingEngine,
    pub item_manager: GuardedItemManager,
    pub moderation_manager: GuardedModerationManager,
    pub hash: String,
}

impl ServerState {
    /// Wires the managers around one shared engine.
    pub fn new(config: ServerConfig, ranking_engine: Arc<RankingEngine>) -> Self {
        ServerState {
            config,
            start_time: Instant::now(),
            catalog_store: ranking_engine.store().clone(),
            item_manager: Arc::new(ItemManager::new(ranking_engine.clone())),
            moderation_manager: Arc::new(ModerationManager::new(ranking_engine.clone())),
            ranking_engine,
            hash: env!("GIT_HASH").to_string(),
        }
    }
}

impl FromRef<ServerState> for GuardedCatalogStore {
    fn from_ref(input: &ServerState) -> Self {
        input.catalog_store.clone()
    }
}

impl FromRef<ServerState> for GuardedRankingEngine {
    fn from_ref(input: &ServerState) -> Self {
        input.ranking_engine.clone()
    }
}

impl FromRef<ServerState> for GuardedItemManager {
    fn from_ref(input: &ServerState) -> Self {
        input.item_manager.clone()
    }
}

impl FromRef<ServerState> for GuardedModerationManager {
    fn from_ref(input: &ServerState) -> Self {
        input.moderation_manager.clone()
    }
}

impl FromRef<ServerState> for ServerConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
