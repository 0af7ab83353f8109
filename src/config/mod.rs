mod file_config;

pub use file_config::{CatalogStoreConfig, FileConfig, RankingConfig};

use crate::ranking::EvictionPolicy;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub content_cache_age_sec: usize,
    pub frontend_dir_path: Option<String>,
    pub eviction_policy: EvictionPolicy,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub content_cache_age_sec: usize,
    pub frontend_dir_path: Option<String>,

    // Feature configs (with defaults)
    pub ranking: RankingSettings,
    pub catalog_store: CatalogStoreSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = match file.logging_level {
            Some(s) => match parse_logging_level(&s) {
                Some(level) => level,
                None => bail!(
                    "Unknown logging_level '{}', expected one of none, path, headers, body",
                    s
                ),
            },
            None => cli.logging_level.clone(),
        };

        let content_cache_age_sec = file
            .content_cache_age_sec
            .unwrap_or(cli.content_cache_age_sec);
        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let ranking_file = file.ranking.unwrap_or_default();
        let defaults = RankingSettings::default();
        let eviction_policy = match ranking_file.eviction_policy {
            Some(s) => match parse_eviction_policy(&s) {
                Some(policy) => policy,
                None => bail!(
                    "Unknown ranking.eviction_policy '{}', expected 'evict' or 'reject'",
                    s
                ),
            },
            None => cli.eviction_policy,
        };
        let ranking = RankingSettings {
            eviction_policy,
            max_conflict_retries: ranking_file
                .max_conflict_retries
                .unwrap_or(defaults.max_conflict_retries),
            initial_backoff_ms: ranking_file
                .initial_backoff_ms
                .unwrap_or(defaults.initial_backoff_ms),
            max_backoff_ms: ranking_file
                .max_backoff_ms
                .unwrap_or(defaults.max_backoff_ms),
            backoff_multiplier: ranking_file
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
        };
        if ranking.backoff_multiplier < 1.0 {
            bail!(
                "ranking.backoff_multiplier must be at least 1.0, got {}",
                ranking.backoff_multiplier
            );
        }

        let store_file = file.catalog_store.unwrap_or_default();
        let store_defaults = CatalogStoreSettings::default();
        let catalog_store = CatalogStoreSettings {
            read_pool_size: store_file
                .read_pool_size
                .unwrap_or(store_defaults.read_pool_size),
            busy_timeout_ms: store_file
                .busy_timeout_ms
                .unwrap_or(store_defaults.busy_timeout_ms),
        };
        if catalog_store.read_pool_size == 0 {
            bail!("catalog_store.read_pool_size must be at least 1");
        }

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            content_cache_age_sec,
            frontend_dir_path,
            ranking,
            catalog_store,
        })
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }
}

/// Knobs for the ranked-slot engine.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingSettings {
    pub eviction_policy: EvictionPolicy,
    /// Extra attempts after the first one when a write transaction conflicts.
    pub max_conflict_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RankingSettings {
    fn default() -> Self {
        Self {
            eviction_policy: EvictionPolicy::Evict,
            max_conflict_retries: 3,
            initial_backoff_ms: 10,
            max_backoff_ms: 200,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogStoreSettings {
    pub read_pool_size: usize,
    pub busy_timeout_ms: u64,
}

impl CatalogStoreSettings {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl Default for CatalogStoreSettings {
    fn default() -> Self {
        Self {
            read_pool_size: 4,
            busy_timeout_ms: 5000,
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

fn parse_eviction_policy(s: &str) -> Option<EvictionPolicy> {
    EvictionPolicy::from_str(s, true).ok()
}
