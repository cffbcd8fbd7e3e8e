//! Shared CLI helpers used across multiple command handlers.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use vos_agent::config::Config;
use vos_agent::memory::{Embedder, HashEmbedder, OpenAIEmbedder};
use vos_agent::session::{FileHistoryStore, MessageHistory};
use vos_agent::state::{FileStatusStore, StatusStore};

/// Load the config file (default path unless overridden) with env overrides.
pub(crate) fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().context("Failed to load config")?,
    };
    Ok(config)
}

/// History backed by JSONL files under the data dir.
pub(crate) fn file_history(config: &Config) -> Result<MessageHistory> {
    let dir = config.data_dir().join("history");
    let store = FileHistoryStore::with_path(&dir)
        .with_context(|| format!("Failed to open history store at {}", dir.display()))?;
    Ok(MessageHistory::new(Arc::new(store)))
}

/// Status records backed by JSON files under the data dir.
pub(crate) fn file_status_store(config: &Config) -> Result<Arc<dyn StatusStore>> {
    let dir = config.data_dir().join("status");
    let store = FileStatusStore::with_path(&dir)
        .with_context(|| format!("Failed to open status store at {}", dir.display()))?;
    Ok(Arc::new(store))
}

/// Remote embeddings when an API key is configured, local hashing otherwise.
pub(crate) fn embedder(config: &Config) -> Arc<dyn Embedder> {
    let openai = config
        .providers
        .openai
        .as_ref()
        .and_then(|p| p.api_key.as_deref().map(|key| (key, p)));
    match openai {
        Some((key, p)) if !key.trim().is_empty() => Arc::new(OpenAIEmbedder::new(
            key,
            p.api_base.as_deref(),
            p.embedding_model.as_deref(),
        )),
        _ => {
            info!("No embedding API key configured; using local hash embeddings");
            Arc::new(HashEmbedder::default())
        }
    }
}
