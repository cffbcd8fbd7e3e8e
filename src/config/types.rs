//! Configuration type definitions
//!
//! All types implement serde traits for JSON serialization and have sensible
//! defaults, so a partial config file only needs the keys it changes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Global agent defaults (model, context window, step ceiling)
    pub agent: AgentDefaults,
    /// Memory retriever and creator settings
    pub memory: MemoryConfig,
    /// Per-agent overrides keyed by agent id
    pub agents: HashMap<String, AgentOverrides>,
    /// Broker retry and reconnect settings
    pub broker: BrokerConfig,
    /// LLM and embedding provider settings
    pub providers: ProvidersConfig,
    /// Where file-backed stores keep their data
    pub storage: StorageConfig,
    /// Logging output
    pub logging: LoggingConfig,
}

// ============================================================================
// Agent Configuration
// ============================================================================

/// Default model to use
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default system instructions presented to the model on every cycle.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an autonomous agent. You receive notifications \
from users, other agents and the system. Use the available tools when they help, and reply \
concisely once you have what you need.";

/// Global agent defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentDefaults {
    /// Model identifier passed to the provider
    pub model: String,
    /// Maximum tokens per model response
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum model invocations per cycle once tools are involved
    pub max_tool_iterations: u32,
    /// Number of history messages shown to the model (0 = unlimited)
    pub context_window: usize,
    /// Redelivery attempts for a transiently failing notification before dead-lettering
    pub max_retries: u32,
    /// System instructions
    pub system_prompt: String,
    /// Seconds after which a stored thinking/executing_tools state is considered stale
    pub stale_state_secs: u64,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            max_tool_iterations: 10,
            context_window: 50,
            max_retries: 3,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            stale_state_secs: 300,
        }
    }
}

// ============================================================================
// Memory Configuration
// ============================================================================

/// Memory module configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MemoryConfig {
    /// Pre-turn retrieval loop
    pub retriever: RetrieverConfig,
    /// Post-turn creation loop
    pub creator: CreatorConfig,
}

/// Memory retriever configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrieverConfig {
    pub enabled: bool,
    /// Run on turns where `turn % every_n_turns == 0`
    pub every_n_turns: u64,
    /// Recent user/assistant messages shown to the decision model
    pub context_messages: usize,
    /// Hard ceiling on decision-model calls per run
    pub max_iterations: u32,
    /// Results fetched per query
    pub top_k: usize,
    /// Maximum memories returned to the agent
    pub max_selected: usize,
    /// Recently provided memories shown to the model and excluded from the pool
    pub past_provided: usize,
    /// Cosine similarity at or above which two selected memories are duplicates
    pub dedup_threshold: f32,
    /// Maximum queries accepted in one GET_MEMORIES decision
    pub max_queries: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            every_n_turns: 1,
            context_messages: 10,
            max_iterations: 3,
            top_k: 3,
            max_selected: 9,
            past_provided: 10,
            dedup_threshold: 0.85,
            max_queries: 5,
        }
    }
}

/// Memory creator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CreatorConfig {
    pub enabled: bool,
    /// Run on turns where `turn % every_n_turns == 0`
    pub every_n_turns: u64,
    /// Recent user/assistant messages shown to the decision model
    pub context_messages: usize,
    /// Recently created memories checked for duplicates
    pub recent_memories: usize,
    /// Cosine similarity at or above which a proposed memory is a duplicate
    pub duplicate_threshold: f32,
}

impl Default for CreatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            every_n_turns: 1,
            context_messages: 10,
            recent_memories: 5,
            duplicate_threshold: 0.95,
        }
    }
}

// ============================================================================
// Per-Agent Overrides
// ============================================================================

/// Per-agent overrides. Unset fields fall back to the global value.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AgentOverrides {
    pub context_window: Option<usize>,
    pub max_tool_iterations: Option<u32>,
    pub system_prompt: Option<String>,
    pub model: Option<String>,
    pub retriever_enabled: Option<bool>,
    pub retriever_every_n_turns: Option<u64>,
    pub creator_enabled: Option<bool>,
    pub creator_every_n_turns: Option<u64>,
}

/// Effective settings for one agent after applying overrides.
#[derive(Debug, Clone, Serialize)]
pub struct AgentSettings {
    pub agent_id: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_tool_iterations: u32,
    pub context_window: usize,
    pub max_retries: u32,
    pub system_prompt: String,
    pub stale_state_secs: u64,
    pub retriever: RetrieverConfig,
    pub creator: CreatorConfig,
    pub broker: BrokerConfig,
}

// ============================================================================
// Broker Configuration
// ============================================================================

/// Broker reconnect and redelivery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Base delay for reconnect backoff
    pub reconnect_base_delay_ms: u64,
    /// Cap for reconnect backoff
    pub reconnect_max_delay_ms: u64,
    /// Consecutive consume failures before the loop gives up
    pub max_reconnect_attempts: u32,
    /// Base delay before a requeued notification is released again
    pub retry_delay_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: 10,
            retry_delay_ms: 250,
        }
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Provider settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    /// OpenAI or any OpenAI-compatible endpoint
    pub openai: Option<ProviderConfig>,
}

/// Generic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key for authentication
    pub api_key: Option<String>,
    /// Custom API base URL
    pub api_base: Option<String>,
    /// Embedding model used for memory vectors
    pub embedding_model: Option<String>,
}

// ============================================================================
// Storage Configuration
// ============================================================================

/// File-backed store locations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory for status records and history logs.
    /// Defaults to `~/.vos-agent/data` when unset.
    pub data_dir: Option<PathBuf>,
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Default tracing pretty-print
    Pretty,
    /// Compact text with component tags
    #[default]
    Component,
    /// JSON lines
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Log level filter used when `RUST_LOG` is unset
    pub level: String,
    /// Optional log file (JSON format only)
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: "info".to_string(),
            file: None,
        }
    }
}
