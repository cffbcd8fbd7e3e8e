//! Long-term memory
//!
//! - [`types`]: memory records, filters and similarity
//! - [`store`]: the vector store boundary and an in-process implementation
//! - [`embedding`]: text-to-vector backends
//! - [`service`]: embedding plus store behind one search interface
//! - [`retriever`]: pre-turn decision loop that surfaces memories
//! - [`creator`]: post-turn decision loop that distills new memories

pub mod creator;
pub mod decision;
pub mod embedding;
pub mod retriever;
pub mod service;
pub mod store;
pub mod types;

pub use creator::{CreatorOutcome, MemoryCreator};
pub use embedding::{Embedder, HashEmbedder, OpenAIEmbedder};
pub use retriever::{MemoryRetriever, RetrievalEnd, RetrievalOutcome};
pub use service::MemoryService;
pub use store::{InMemoryVectorStore, VectorStore};
pub use types::{
    cosine_similarity, MemoryRecord, MemoryScope, MemorySource, MemoryType, MemoryUpdate,
    NewMemory, ScoredMemory, SearchFilters,
};

use crate::session::{Message, Role};

/// Cadence gate shared by both memory modules.
pub(crate) fn should_run(enabled: bool, every_n_turns: u64, turn: u64) -> bool {
    enabled && every_n_turns > 0 && turn % every_n_turns == 0
}

/// Render a conversation window as `role: content` lines.
pub(crate) fn render_window(window: &[Message]) -> String {
    if window.is_empty() {
        return "(no messages)".to_string();
    }
    window
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            format!("{}: {}", role, m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
