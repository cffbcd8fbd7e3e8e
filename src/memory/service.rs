//! Memory service: embedding plus vector store behind one handle.
//!
//! This is the search interface shared by the retriever, the creator and the
//! explicit memory tools.

use std::sync::Arc;

use tracing::debug;

use crate::error::Result;

use super::embedding::Embedder;
use super::store::VectorStore;
use super::types::{MemoryRecord, MemoryUpdate, NewMemory, ScoredMemory, SearchFilters};

#[derive(Clone)]
pub struct MemoryService {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl MemoryService {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embedder.embed(text).await
    }

    /// Validate, embed and insert a memory.
    pub async fn create(&self, memory: NewMemory) -> Result<MemoryRecord> {
        memory.validate()?;
        let embedding = self.embedder.embed(&memory.content).await?;
        self.create_with_embedding(memory, embedding).await
    }

    /// Insert a memory whose embedding the caller already computed.
    pub async fn create_with_embedding(
        &self,
        memory: NewMemory,
        embedding: Vec<f32>,
    ) -> Result<MemoryRecord> {
        memory.validate()?;
        let record = MemoryRecord::from_new(memory, embedding);
        self.store.insert(record.clone()).await?;
        debug!(
            memory_id = %record.id,
            agent_id = %record.agent_id,
            memory_type = %record.memory_type,
            "Memory created"
        );
        Ok(record)
    }

    /// Semantic search for `query` as seen by `viewer`.
    pub async fn search_text(
        &self,
        query: &str,
        filters: &SearchFilters,
        viewer: &str,
        limit: usize,
    ) -> Result<Vec<ScoredMemory>> {
        let vector = self.embedder.embed(query).await?;
        self.store.search(&vector, filters, viewer, limit).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
        self.store.get(id).await
    }

    /// Update in place, re-embedding when the content changes.
    pub async fn update(&self, id: &str, mut update: MemoryUpdate) -> Result<MemoryRecord> {
        update.validate()?;
        if let Some(content) = &update.content {
            update.embedding = Some(self.embedder.embed(content).await?);
        }
        self.store.update(id, update).await
    }

    pub async fn recent_created(&self, agent_id: &str, n: usize) -> Result<Vec<MemoryRecord>> {
        self.store.recent_created(agent_id, n).await
    }

    pub async fn recently_provided(&self, agent_id: &str, n: usize) -> Result<Vec<MemoryRecord>> {
        self.store.recently_accessed(agent_id, n).await
    }

    pub async fn mark_provided(&self, agent_id: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.store.mark_accessed(agent_id, ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VosError;
    use crate::memory::embedding::{HashEmbedder, MockEmbedder};
    use crate::memory::store::InMemoryVectorStore;
    use crate::memory::types::MemoryType;

    fn service() -> MemoryService {
        MemoryService::new(
            Arc::new(HashEmbedder::default()),
            Arc::new(InMemoryVectorStore::new()),
        )
    }

    #[tokio::test]
    async fn test_create_and_search() {
        let svc = service();
        svc.create(NewMemory::new("a", MemoryType::UserPreference, "Prefers tea over coffee"))
            .await
            .unwrap();
        svc.create(NewMemory::new("a", MemoryType::UserFact, "Works as a nurse in Lyon"))
            .await
            .unwrap();

        let hits = svc
            .search_text("does the user like tea", &SearchFilters::default(), "a", 1)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.content, "Prefers tea over coffee");
    }

    #[tokio::test]
    async fn test_create_rejects_invalid() {
        let svc = service();
        let err = svc
            .create(NewMemory::new("a", MemoryType::Knowledge, ""))
            .await
            .unwrap_err();
        assert!(matches!(err, VosError::Validation(_)));
        assert!(svc.recent_created("a", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_reembeds_content() {
        let svc = service();
        let record = svc
            .create(NewMemory::new("a", MemoryType::UserFact, "Lives in Paris"))
            .await
            .unwrap();
        let updated = svc
            .update(
                &record.id,
                MemoryUpdate {
                    content: Some("Lives in Berlin".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.content, "Lives in Berlin");
        assert_ne!(updated.embedding, record.embedding);
    }

    #[tokio::test]
    async fn test_embedder_failure_propagates() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .times(1)
            .returning(|_| Err(VosError::Memory("connection refused".into())));
        let svc = MemoryService::new(Arc::new(embedder), Arc::new(InMemoryVectorStore::new()));
        let result = svc
            .search_text("anything", &SearchFilters::default(), "a", 3)
            .await;
        assert!(result.is_err());
    }
}
