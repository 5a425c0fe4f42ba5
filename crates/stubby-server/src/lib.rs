// Library exports for the binary, benchmarks and integration tests

// ===== Stub core =====
pub mod cache;
pub mod predicate;
pub mod recording;
pub mod stubs;
pub mod template;

// ===== Configuration and loading =====
pub mod config;
pub mod loader;
pub mod watcher;

// ===== Listeners =====
pub mod admin_api;
pub mod server;

use crate::cache::{create_match_cache, MatchCacheConfig};
use crate::config::ServerConfig;
use crate::recording::RequestRecorder;
use crate::stubs::StubRepository;
use anyhow::Context;
use std::sync::Arc;
use tracing::info;

/// Build the repository described by `config` and load its stubs file, if any.
pub fn build_repository(config: &ServerConfig) -> Result<Arc<StubRepository>, anyhow::Error> {
    let cache = create_match_cache(&MatchCacheConfig::from(&config.match_cache));
    let recorder = Arc::new(RequestRecorder::new(config.recorder_capacity));
    let repository = Arc::new(StubRepository::new(cache, recorder));

    if let Some(path) = &config.data {
        let loaded = loader::load_file(path)
            .with_context(|| format!("Failed to load stubs from {}", path.display()))?;
        repository
            .replace_all_with_web_sockets(loaded.lifecycles, loaded.web_sockets)
            .with_context(|| format!("Stubs in {} were rejected", path.display()))?;
        info!("Loaded stubs from {}", path.display());
    }
    Ok(repository)
}
