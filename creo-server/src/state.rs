//! Shared application state.

use std::sync::Arc;

use creo_core::store::{GenerationStore, MemoryStore};
use creo_core::{CloneWithFallback, SheetCloner};

use crate::config::ServerConfig;
use crate::downloads::DownloadLog;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn GenerationStore>,
    pub downloads: Arc<DownloadLog>,
    pub cloner: Arc<dyn SheetCloner>,
}

impl AppState {
    pub fn new(config: ServerConfig, store: Arc<dyn GenerationStore>) -> Self {
        let downloads = Arc::new(DownloadLog::new(config.recent_downloads_capacity));
        let cloner: CloneWithFallback = CloneWithFallback::default();
        Self {
            config: Arc::new(config),
            store,
            downloads,
            cloner: Arc::new(cloner),
        }
    }

    /// State backed by a fresh [`MemoryStore`].
    pub fn in_memory(config: ServerConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
    }
}
