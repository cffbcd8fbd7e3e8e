//! Memory record types, search filters and similarity helpers.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, VosError};

// ============================================================================
// Enumerations
// ============================================================================

/// Category of a long-term memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    UserPreference,
    UserFact,
    ConversationContext,
    #[serde(alias = "procedure")]
    AgentProcedure,
    Knowledge,
    EventPattern,
    ErrorHandling,
    ProactiveAction,
}

impl MemoryType {
    pub const ALL: [MemoryType; 8] = [
        MemoryType::UserPreference,
        MemoryType::UserFact,
        MemoryType::ConversationContext,
        MemoryType::AgentProcedure,
        MemoryType::Knowledge,
        MemoryType::EventPattern,
        MemoryType::ErrorHandling,
        MemoryType::ProactiveAction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::UserPreference => "user_preference",
            MemoryType::UserFact => "user_fact",
            MemoryType::ConversationContext => "conversation_context",
            MemoryType::AgentProcedure => "agent_procedure",
            MemoryType::Knowledge => "knowledge",
            MemoryType::EventPattern => "event_pattern",
            MemoryType::ErrorHandling => "error_handling",
            MemoryType::ProactiveAction => "proactive_action",
        }
    }
}

impl FromStr for MemoryType {
    type Err = VosError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase();
        if normalized == "procedure" {
            return Ok(MemoryType::AgentProcedure);
        }
        MemoryType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| VosError::Validation(format!("unknown memory type '{}'", s)))
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who can see a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryScope {
    /// Visible only to the owning agent
    Individual,
    /// Visible to every agent
    #[default]
    Shared,
}

impl FromStr for MemoryScope {
    type Err = VosError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "individual" => Ok(MemoryScope::Individual),
            "shared" => Ok(MemoryScope::Shared),
            other => Err(VosError::Validation(format!(
                "unknown memory scope '{}'",
                other
            ))),
        }
    }
}

/// How a memory came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    /// Stored on explicit request through a tool call
    #[default]
    UserExplicit,
    /// Distilled from conversation by the memory creator
    Inferred,
    ProactiveAgent,
    AgentLearning,
}

// ============================================================================
// Records
// ============================================================================

/// A stored, embedded memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    /// Owning agent
    pub agent_id: String,
    pub memory_type: MemoryType,
    pub content: String,
    #[serde(default, skip_serializing)]
    pub embedding: Vec<f32>,
    pub scope: MemoryScope,
    #[serde(default)]
    pub source: MemorySource,
    pub importance: f32,
    pub confidence: f32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub related_memory_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_accessed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub access_count: u64,
}

impl MemoryRecord {
    /// Build a record from a validated proposal and its embedding.
    pub fn from_new(memory: NewMemory, embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: memory.agent_id,
            memory_type: memory.memory_type,
            content: memory.content,
            embedding,
            scope: memory.scope,
            source: memory.source,
            importance: memory.importance,
            confidence: memory.confidence,
            tags: memory.tags,
            related_memory_ids: memory.related_memory_ids,
            created_at: now,
            updated_at: now,
            last_accessed: None,
            access_count: 0,
        }
    }

    /// Shared records are visible to everyone, individual ones only to their owner.
    pub fn visible_to(&self, agent_id: &str) -> bool {
        self.scope == MemoryScope::Shared || self.agent_id == agent_id
    }

    /// Compact JSON view shown to decision models and returned by tools.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "memory_type": self.memory_type,
            "content": self.content,
            "scope": self.scope,
            "importance": self.importance,
            "confidence": self.confidence,
            "tags": self.tags,
            "created_at": self.created_at.to_rfc3339(),
        })
    }
}

/// A memory proposal before embedding and insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMemory {
    pub agent_id: String,
    pub memory_type: MemoryType,
    pub content: String,
    #[serde(default)]
    pub scope: MemoryScope,
    #[serde(default)]
    pub source: MemorySource,
    #[serde(default = "default_importance")]
    pub importance: f32,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub related_memory_ids: Vec<String>,
}

fn default_importance() -> f32 {
    0.5
}

fn default_confidence() -> f32 {
    1.0
}

impl NewMemory {
    pub fn new(agent_id: &str, memory_type: MemoryType, content: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            memory_type,
            content: content.to_string(),
            scope: MemoryScope::default(),
            source: MemorySource::default(),
            importance: default_importance(),
            confidence: default_confidence(),
            tags: Vec::new(),
            related_memory_ids: Vec::new(),
        }
    }

    pub fn with_scope(mut self, scope: MemoryScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_source(mut self, source: MemorySource) -> Self {
        self.source = source;
        self
    }

    pub fn with_importance(mut self, importance: f32) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(VosError::Validation("memory content is empty".to_string()));
        }
        check_unit("importance", self.importance)?;
        check_unit("confidence", self.confidence)
    }
}

/// Partial in-place update of a memory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryUpdate {
    pub content: Option<String>,
    pub importance: Option<f32>,
    pub tags: Option<Vec<String>>,
    /// New embedding, required whenever `content` changes
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl MemoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.content.is_none() && self.importance.is_none() && self.tags.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(content) = &self.content {
            if content.trim().is_empty() {
                return Err(VosError::Validation("memory content is empty".to_string()));
            }
        }
        if let Some(importance) = self.importance {
            check_unit("importance", importance)?;
        }
        Ok(())
    }
}

fn check_unit(field: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(VosError::Validation(format!(
            "{} must be within [0, 1], got {}",
            field, value
        )))
    }
}

// ============================================================================
// Search
// ============================================================================

/// Structured filters for memory search. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    pub memory_type: Option<MemoryType>,
    pub scope: Option<MemoryScope>,
    /// Restrict to records owned by this agent
    pub agent_id: Option<String>,
    /// Match records carrying any of these tags
    pub tags: Option<Vec<String>>,
    pub min_importance: Option<f32>,
    pub min_confidence: Option<f32>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

impl SearchFilters {
    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if self.memory_type.is_some_and(|t| t != record.memory_type) {
            return false;
        }
        if self.scope.is_some_and(|s| s != record.scope) {
            return false;
        }
        if let Some(agent_id) = &self.agent_id {
            if &record.agent_id != agent_id {
                return false;
            }
        }
        if let Some(tags) = &self.tags {
            if !tags.is_empty() && !tags.iter().any(|t| record.tags.contains(t)) {
                return false;
            }
        }
        if self.min_importance.is_some_and(|m| record.importance < m) {
            return false;
        }
        if self.min_confidence.is_some_and(|m| record.confidence < m) {
            return false;
        }
        if self.created_after.is_some_and(|t| record.created_at < t) {
            return false;
        }
        if self.created_before.is_some_and(|t| record.created_at > t) {
            return false;
        }
        true
    }
}

/// A search hit with its cosine distance to the query (lower is closer).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMemory {
    pub record: MemoryRecord,
    pub distance: f32,
}

/// Cosine similarity of two vectors. Mismatched or zero-length vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Lowercased, whitespace-collapsed text used for exact-duplicate checks.
pub fn normalize_content(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_type_parsing() {
        assert_eq!(
            "user_preference".parse::<MemoryType>().unwrap(),
            MemoryType::UserPreference
        );
        assert_eq!(
            "Procedure".parse::<MemoryType>().unwrap(),
            MemoryType::AgentProcedure
        );
        assert!("gossip".parse::<MemoryType>().is_err());
        let parsed: MemoryType = serde_json::from_str("\"procedure\"").unwrap();
        assert_eq!(parsed, MemoryType::AgentProcedure);
    }

    #[test]
    fn test_new_memory_defaults() {
        let json = r#"{"agent_id":"a","memory_type":"user_fact","content":"Lives in Lyon"}"#;
        let memory: NewMemory = serde_json::from_str(json).unwrap();
        assert_eq!(memory.scope, MemoryScope::Shared);
        assert_eq!(memory.importance, 0.5);
        assert_eq!(memory.confidence, 1.0);
        assert!(memory.validate().is_ok());
    }

    #[test]
    fn test_new_memory_validation() {
        let empty = NewMemory::new("a", MemoryType::Knowledge, "   ");
        assert!(empty.validate().is_err());
        let loud = NewMemory::new("a", MemoryType::Knowledge, "x").with_importance(1.5);
        assert!(loud.validate().is_err());
    }

    #[test]
    fn test_visibility() {
        let private = MemoryRecord::from_new(
            NewMemory::new("owner", MemoryType::UserFact, "secret")
                .with_scope(MemoryScope::Individual),
            vec![1.0],
        );
        assert!(private.visible_to("owner"));
        assert!(!private.visible_to("other"));

        let shared = MemoryRecord::from_new(NewMemory::new("owner", MemoryType::UserFact, "x"), vec![]);
        assert!(shared.visible_to("other"));
    }

    #[test]
    fn test_filters_match() {
        let record = MemoryRecord::from_new(
            NewMemory::new("a", MemoryType::UserPreference, "Likes tea")
                .with_importance(0.8)
                .with_tags(vec!["drinks".into()]),
            vec![],
        );
        assert!(SearchFilters::default().matches(&record));
        let filters = SearchFilters {
            memory_type: Some(MemoryType::UserPreference),
            tags: Some(vec!["food".into(), "drinks".into()]),
            min_importance: Some(0.7),
            ..Default::default()
        };
        assert!(filters.matches(&record));
        let too_strict = SearchFilters {
            min_importance: Some(0.9),
            ..Default::default()
        };
        assert!(!too_strict.matches(&record));
        let other_owner = SearchFilters {
            agent_id: Some("b".into()),
            ..Default::default()
        };
        assert!(!other_owner.matches(&record));
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_normalize_content() {
        assert_eq!(normalize_content("  User  LIKES\ttea "), "user likes tea");
    }
}
