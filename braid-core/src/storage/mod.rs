//! Storage engine - coordinates the cache and the input log

mod engine;

pub use engine::{EngineStats, PageStore, StorageEngine};

use crate::cache::CacheConfig;
use crate::config;
use std::path::PathBuf;

/// Storage engine configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Data directory; the input log lives in `<data_dir>/inputlog`
    pub data_dir: PathBuf,
    /// Cache configuration
    pub cache: CacheConfig,
    /// Maximum live input log volumes
    pub max_log_volumes: usize,
    /// Input log volume size in bytes
    pub log_volume_size: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            cache: CacheConfig::default(),
            max_log_volumes: config::INPUT_LOG_MAX_VOLUMES,
            log_volume_size: config::INPUT_LOG_VOLUME_SIZE,
        }
    }
}
