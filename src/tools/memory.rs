//! Long-term memory tools.
//!
//! Provides:
//! - `search_memories`: semantic search over memories visible to the caller.
//! - `create_memory`: store an explicit memory for the caller.
//! - `update_memory`: change content, importance or tags in place.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{Result, VosError};
use crate::memory::{
    MemoryScope, MemoryService, MemorySource, MemoryType, MemoryUpdate, NewMemory, SearchFilters,
};

use super::{ParamType, Tool, ToolContext, ToolSchema};

const DEFAULT_SEARCH_LIMIT: usize = 5;
const MAX_SEARCH_LIMIT: usize = 50;

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| VosError::Tool(format!("Missing '{}' parameter", key)))
}

fn optional_f32(args: &Value, key: &str) -> Option<f32> {
    args.get(key).and_then(Value::as_f64).map(|v| v as f32)
}

fn optional_tags(args: &Value) -> Option<Vec<String>> {
    args.get("tags").and_then(Value::as_array).map(|tags| {
        tags.iter()
            .filter_map(Value::as_str)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    })
}

/// Semantic search over memories visible to the calling agent.
pub struct SearchMemoriesTool {
    memory: MemoryService,
}

impl SearchMemoriesTool {
    pub fn new(memory: MemoryService) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for SearchMemoriesTool {
    fn name(&self) -> &str {
        "search_memories"
    }

    fn description(&self) -> &str {
        "Search long-term memories by meaning. Returns the closest records with their distance."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new()
            .required("query", ParamType::String, "What to look for")
            .optional("memory_type", ParamType::String, "Restrict to one memory type")
            .optional("scope", ParamType::String, "individual or shared")
            .optional("tags", ParamType::Array, "Match records carrying any of these tags")
            .optional("min_importance", ParamType::Number, "Minimum importance (0.0-1.0)")
            .optional("min_confidence", ParamType::Number, "Minimum confidence (0.0-1.0)")
            .optional("limit", ParamType::Integer, "Maximum number of results (1-50)")
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value> {
        let query = required_str(&args, "query")?;

        let filters = SearchFilters {
            memory_type: args
                .get("memory_type")
                .and_then(Value::as_str)
                .map(str::parse::<MemoryType>)
                .transpose()?,
            scope: args
                .get("scope")
                .and_then(Value::as_str)
                .map(str::parse::<MemoryScope>)
                .transpose()?,
            tags: optional_tags(&args).filter(|t| !t.is_empty()),
            min_importance: optional_f32(&args, "min_importance"),
            min_confidence: optional_f32(&args, "min_confidence"),
            ..Default::default()
        };
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map(|v| (v as usize).clamp(1, MAX_SEARCH_LIMIT))
            .unwrap_or(DEFAULT_SEARCH_LIMIT);

        let results = self
            .memory
            .search_text(query, &filters, &ctx.agent_id, limit)
            .await?;

        let memories: Vec<Value> = results
            .iter()
            .map(|scored| {
                let mut summary = scored.record.summary();
                summary["distance"] = json!(scored.distance);
                summary
            })
            .collect();

        Ok(json!({
            "query": query,
            "count": memories.len(),
            "memories": memories,
        }))
    }
}

/// Stores a memory the agent was explicitly asked to remember.
pub struct CreateMemoryTool {
    memory: MemoryService,
}

impl CreateMemoryTool {
    pub fn new(memory: MemoryService) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for CreateMemoryTool {
    fn name(&self) -> &str {
        "create_memory"
    }

    fn description(&self) -> &str {
        "Save a fact, preference or procedure to long-term memory."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new()
            .required("content", ParamType::String, "The memory, as one self-contained statement")
            .required("memory_type", ParamType::String, "Memory category, e.g. user_preference")
            .optional("scope", ParamType::String, "individual or shared (default shared)")
            .optional("importance", ParamType::Number, "Importance 0.0-1.0 (default 0.5)")
            .optional("confidence", ParamType::Number, "Confidence 0.0-1.0 (default 1.0)")
            .optional("tags", ParamType::Array, "Tags for filtering")
    }

    fn validate(&self, args: &Value) -> std::result::Result<(), String> {
        if let Some(kind) = args.get("memory_type").and_then(Value::as_str) {
            kind.parse::<MemoryType>().map_err(|e| e.to_string())?;
        }
        if let Some(scope) = args.get("scope").and_then(Value::as_str) {
            scope.parse::<MemoryScope>().map_err(|e| e.to_string())?;
        }
        Ok(())
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value> {
        let content = required_str(&args, "content")?;
        let memory_type: MemoryType = required_str(&args, "memory_type")?.parse()?;

        let mut memory = NewMemory::new(&ctx.agent_id, memory_type, content)
            .with_source(MemorySource::UserExplicit);
        if let Some(scope) = args.get("scope").and_then(Value::as_str) {
            memory = memory.with_scope(scope.parse()?);
        }
        if let Some(importance) = optional_f32(&args, "importance") {
            memory = memory.with_importance(importance);
        }
        if let Some(confidence) = optional_f32(&args, "confidence") {
            memory.confidence = confidence;
        }
        if let Some(tags) = optional_tags(&args) {
            memory = memory.with_tags(tags);
        }

        let record = self.memory.create(memory).await?;
        Ok(json!({
            "memory_id": record.id,
            "memory": record.summary(),
        }))
    }
}

/// Edits an existing memory in place.
pub struct UpdateMemoryTool {
    memory: MemoryService,
}

impl UpdateMemoryTool {
    pub fn new(memory: MemoryService) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for UpdateMemoryTool {
    fn name(&self) -> &str {
        "update_memory"
    }

    fn description(&self) -> &str {
        "Correct or refine a stored memory. Only the given fields change."
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new()
            .required("memory_id", ParamType::String, "Id of the memory to update")
            .optional("content", ParamType::String, "Replacement content")
            .optional("importance", ParamType::Number, "New importance (0.0-1.0)")
            .optional("tags", ParamType::Array, "Replacement tags")
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value> {
        let memory_id = required_str(&args, "memory_id")?;

        let update = MemoryUpdate {
            content: args
                .get("content")
                .and_then(Value::as_str)
                .map(str::to_string),
            importance: optional_f32(&args, "importance"),
            tags: optional_tags(&args),
            embedding: None,
        };
        if update.is_empty() {
            return Err(VosError::Tool(
                "Nothing to update: pass content, importance or tags".to_string(),
            ));
        }

        let existing = self
            .memory
            .get(memory_id)
            .await?
            .ok_or_else(|| VosError::NotFound(format!("memory {}", memory_id)))?;
        if !existing.visible_to(&ctx.agent_id) {
            return Err(VosError::NotFound(format!("memory {}", memory_id)));
        }

        let record = self.memory.update(memory_id, update).await?;
        Ok(json!({
            "memory_id": record.id,
            "memory": record.summary(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::memory::{HashEmbedder, InMemoryVectorStore};
    use crate::tools::ToolRegistry;

    fn service() -> MemoryService {
        MemoryService::new(
            Arc::new(HashEmbedder::default()),
            Arc::new(InMemoryVectorStore::new()),
        )
    }

    fn registry(memory: &MemoryService) -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SearchMemoriesTool::new(memory.clone())));
        registry.register(Arc::new(CreateMemoryTool::new(memory.clone())));
        registry.register(Arc::new(UpdateMemoryTool::new(memory.clone())));
        registry
    }

    #[tokio::test]
    async fn test_create_then_search() {
        let memory = service();
        let tools = registry(&memory);
        let ctx = ToolContext::new("notes_agent");

        let created = tools
            .execute(
                "create_memory",
                json!({
                    "content": "User is allergic to peanuts",
                    "memory_type": "user_fact",
                    "importance": 0.9,
                    "tags": ["health"]
                }),
                &ctx,
            )
            .await;
        assert!(created.is_success(), "{:?}", created.error_message);
        let stored = created.result.unwrap();
        assert_eq!(stored["memory"]["scope"], "shared");
        assert_eq!(stored["memory"]["tags"], json!(["health"]));

        let found = tools
            .execute(
                "search_memories",
                json!({"query": "peanuts allergy", "tags": ["health"]}),
                &ctx,
            )
            .await;
        let found = found.result.unwrap();
        assert_eq!(found["count"], 1);
        assert_eq!(found["memories"][0]["id"], stored["memory_id"]);
        assert!(found["memories"][0]["distance"].is_number());
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_type_before_running() {
        let memory = service();
        let tools = registry(&memory);
        let result = tools
            .execute(
                "create_memory",
                json!({"content": "x", "memory_type": "gossip"}),
                &ToolContext::new("a"),
            )
            .await;
        assert!(!result.is_success());
        assert!(result.error_message.unwrap().contains("gossip"));
        assert_eq!(memory.store().recent_created("a", 10).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_create_out_of_range_importance_fails() {
        let tools = registry(&service());
        let result = tools
            .execute(
                "create_memory",
                json!({"content": "x", "memory_type": "knowledge", "importance": 1.5}),
                &ToolContext::new("a"),
            )
            .await;
        assert!(result.error_message.unwrap().contains("importance"));
    }

    #[tokio::test]
    async fn test_individual_memories_stay_private() {
        let memory = service();
        let tools = registry(&memory);
        tools
            .execute(
                "create_memory",
                json!({
                    "content": "Door code is 4512",
                    "memory_type": "user_fact",
                    "scope": "individual"
                }),
                &ToolContext::new("owner"),
            )
            .await;

        let other = tools
            .execute("search_memories", json!({"query": "door code"}), &ToolContext::new("other"))
            .await;
        assert_eq!(other.result.unwrap()["count"], 0);

        let owner = tools
            .execute("search_memories", json!({"query": "door code"}), &ToolContext::new("owner"))
            .await;
        assert_eq!(owner.result.unwrap()["count"], 1);
    }

    #[tokio::test]
    async fn test_update_memory() {
        let memory = service();
        let tools = registry(&memory);
        let ctx = ToolContext::new("a");
        let record = memory
            .create(NewMemory::new("a", MemoryType::UserPreference, "Likes jazz"))
            .await
            .unwrap();

        let updated = tools
            .execute(
                "update_memory",
                json!({"memory_id": record.id, "content": "Likes jazz and blues", "importance": 0.8}),
                &ctx,
            )
            .await;
        assert!(updated.is_success(), "{:?}", updated.error_message);

        let stored = memory.get(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.content, "Likes jazz and blues");
        assert!((stored.importance - 0.8).abs() < f32::EPSILON);
        assert_ne!(stored.embedding, record.embedding);
    }

    #[tokio::test]
    async fn test_update_requires_a_field_and_known_id() {
        let tools = registry(&service());
        let ctx = ToolContext::new("a");

        let empty = tools
            .execute("update_memory", json!({"memory_id": "m-1"}), &ctx)
            .await;
        assert!(empty.error_message.unwrap().contains("Nothing to update"));

        let missing = tools
            .execute("update_memory", json!({"memory_id": "m-1", "importance": 0.2}), &ctx)
            .await;
        assert!(missing.error_message.unwrap().contains("m-1"));
    }
}
