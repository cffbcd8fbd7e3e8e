//! Vector store boundary and the in-process implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{Result, VosError};

use super::types::{cosine_similarity, MemoryRecord, MemoryUpdate, ScoredMemory, SearchFilters};

/// Semantic store for embedded memory records.
///
/// Implementations must tolerate concurrent access from independent agents.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert(&self, record: MemoryRecord) -> Result<String>;

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>>;

    /// Apply a partial update in place. Fails with `NotFound` for unknown ids.
    async fn update(&self, id: &str, update: MemoryUpdate) -> Result<MemoryRecord>;

    /// Rank records visible to `viewer` by cosine distance to `vector`.
    async fn search(
        &self,
        vector: &[f32],
        filters: &SearchFilters,
        viewer: &str,
        limit: usize,
    ) -> Result<Vec<ScoredMemory>>;

    /// Records created by `agent_id`, newest first.
    async fn recent_created(&self, agent_id: &str, n: usize) -> Result<Vec<MemoryRecord>>;

    /// Records most recently provided to `agent_id`, newest first.
    async fn recently_accessed(&self, agent_id: &str, n: usize) -> Result<Vec<MemoryRecord>>;

    /// Bump access bookkeeping for records provided to `agent_id`.
    async fn mark_accessed(&self, agent_id: &str, ids: &[String]) -> Result<()>;
}

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<String, MemoryRecord>,
    /// Insertion order, oldest first
    order: Vec<String>,
    /// Per-agent access log, oldest first
    accessed: HashMap<String, Vec<String>>,
}

/// Brute-force cosine search over records held in memory.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    state: RwLock<StoreState>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert(&self, record: MemoryRecord) -> Result<String> {
        let mut state = self.state.write().await;
        let id = record.id.clone();
        if state.records.insert(id.clone(), record).is_none() {
            state.order.push(id.clone());
        }
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
        Ok(self.state.read().await.records.get(id).cloned())
    }

    async fn update(&self, id: &str, update: MemoryUpdate) -> Result<MemoryRecord> {
        let mut state = self.state.write().await;
        let record = state
            .records
            .get_mut(id)
            .ok_or_else(|| VosError::NotFound(format!("memory '{}'", id)))?;
        if let Some(content) = update.content {
            record.content = content;
        }
        if let Some(embedding) = update.embedding {
            record.embedding = embedding;
        }
        if let Some(importance) = update.importance {
            record.importance = importance;
        }
        if let Some(tags) = update.tags {
            record.tags = tags;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn search(
        &self,
        vector: &[f32],
        filters: &SearchFilters,
        viewer: &str,
        limit: usize,
    ) -> Result<Vec<ScoredMemory>> {
        let state = self.state.read().await;
        let mut hits: Vec<ScoredMemory> = state
            .records
            .values()
            .filter(|r| r.visible_to(viewer) && filters.matches(r))
            .map(|r| ScoredMemory {
                distance: 1.0 - cosine_similarity(vector, &r.embedding),
                record: r.clone(),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn recent_created(&self, agent_id: &str, n: usize) -> Result<Vec<MemoryRecord>> {
        let state = self.state.read().await;
        Ok(state
            .order
            .iter()
            .rev()
            .filter_map(|id| state.records.get(id))
            .filter(|r| r.agent_id == agent_id)
            .take(n)
            .cloned()
            .collect())
    }

    async fn recently_accessed(&self, agent_id: &str, n: usize) -> Result<Vec<MemoryRecord>> {
        let state = self.state.read().await;
        let Some(log) = state.accessed.get(agent_id) else {
            return Ok(Vec::new());
        };
        Ok(log
            .iter()
            .rev()
            .filter_map(|id| state.records.get(id))
            .take(n)
            .cloned()
            .collect())
    }

    async fn mark_accessed(&self, agent_id: &str, ids: &[String]) -> Result<()> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut touched = Vec::new();
        for id in ids {
            if let Some(record) = state.records.get_mut(id) {
                record.last_accessed = Some(now);
                record.access_count += 1;
                touched.push(id.clone());
            }
        }
        let log = state.accessed.entry(agent_id.to_string()).or_default();
        for id in touched {
            log.retain(|existing| existing != &id);
            log.push(id);
        }
        Ok(())
    }
}
