//! Configuration management
//!
//! Configuration is loaded from `~/.vos-agent/config.json` with environment
//! variable overrides. Global values can be overridden per agent, either in
//! the `agents` section of the file or through `VOS_<AGENT_ID>_<KEY>`
//! variables.

mod types;
pub mod validate;

pub use types::*;

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Prefix shared by every environment override.
const ENV_PREFIX: &str = "VOS";

impl Config {
    /// Returns the configuration directory path (~/.vos-agent)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".vos-agent")
    }

    /// Returns the path to the config file (~/.vos-agent/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    /// Environment variables can override config values using the pattern:
    /// `VOS_SECTION_KEY`
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Directory for file-backed status and history stores.
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(|| Self::dir().join("data"))
    }

    /// Apply environment variable overrides to the global configuration.
    ///
    /// Environment variables follow the pattern: VOS_SECTION_KEY
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("VOS_AGENT_MODEL") {
            self.agent.model = val;
        }
        if let Some(v) = env_parse("VOS_AGENT_MAX_TOKENS") {
            self.agent.max_tokens = v;
        }
        if let Some(v) = env_parse("VOS_AGENT_TEMPERATURE") {
            self.agent.temperature = v;
        }
        if let Some(v) = env_parse("VOS_AGENT_MAX_TOOL_ITERATIONS") {
            self.agent.max_tool_iterations = v;
        }
        if let Some(v) = env_parse("VOS_AGENT_CONTEXT_WINDOW") {
            self.agent.context_window = v;
        }
        if let Some(v) = env_parse("VOS_AGENT_MAX_RETRIES") {
            self.agent.max_retries = v;
        }

        // Memory modules
        if let Some(v) = env_parse("VOS_MEMORY_RETRIEVER_ENABLED") {
            self.memory.retriever.enabled = v;
        }
        if let Some(v) = env_parse("VOS_MEMORY_RETRIEVER_MAX_ITERATIONS") {
            self.memory.retriever.max_iterations = v;
        }
        if let Some(v) = env_parse("VOS_MEMORY_CREATOR_ENABLED") {
            self.memory.creator.enabled = v;
        }

        // Provider
        if let Ok(val) = std::env::var("VOS_PROVIDERS_OPENAI_API_KEY") {
            let provider = self
                .providers
                .openai
                .get_or_insert_with(ProviderConfig::default);
            provider.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("VOS_PROVIDERS_OPENAI_API_BASE") {
            let provider = self
                .providers
                .openai
                .get_or_insert_with(ProviderConfig::default);
            provider.api_base = Some(val);
        }

        if let Ok(val) = std::env::var("VOS_STORAGE_DATA_DIR") {
            self.storage.data_dir = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("VOS_LOGGING_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Resolve the effective settings for one agent.
    ///
    /// Precedence, highest first: `VOS_<AGENT_ID>_<KEY>` environment
    /// variables, the `agents.<id>` section, then the global values.
    pub fn for_agent(&self, agent_id: &str) -> AgentSettings {
        let mut overrides = self.agents.get(agent_id).cloned().unwrap_or_default();
        apply_agent_env_overrides(agent_id, &mut overrides);

        let mut retriever = self.memory.retriever.clone();
        if let Some(enabled) = overrides.retriever_enabled {
            retriever.enabled = enabled;
        }
        if let Some(n) = overrides.retriever_every_n_turns {
            retriever.every_n_turns = n;
        }

        let mut creator = self.memory.creator.clone();
        if let Some(enabled) = overrides.creator_enabled {
            creator.enabled = enabled;
        }
        if let Some(n) = overrides.creator_every_n_turns {
            creator.every_n_turns = n;
        }

        AgentSettings {
            agent_id: agent_id.to_string(),
            model: overrides.model.unwrap_or_else(|| self.agent.model.clone()),
            max_tokens: self.agent.max_tokens,
            temperature: self.agent.temperature,
            max_tool_iterations: overrides
                .max_tool_iterations
                .unwrap_or(self.agent.max_tool_iterations),
            context_window: overrides
                .context_window
                .unwrap_or(self.agent.context_window),
            max_retries: self.agent.max_retries,
            system_prompt: overrides
                .system_prompt
                .unwrap_or_else(|| self.agent.system_prompt.clone()),
            stale_state_secs: self.agent.stale_state_secs,
            retriever,
            creator,
            broker: self.broker.clone(),
        }
    }
}

impl AgentSettings {
    /// Settings for `agent_id` built from the default configuration.
    pub fn with_defaults(agent_id: &str) -> Self {
        Config::default().for_agent(agent_id)
    }
}

/// Environment key prefix for one agent: `VOS_<AGENT_ID>_`.
pub fn agent_env_prefix(agent_id: &str) -> String {
    let normalized: String = agent_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}_", ENV_PREFIX, normalized)
}

fn apply_agent_env_overrides(agent_id: &str, overrides: &mut AgentOverrides) {
    let prefix = agent_env_prefix(agent_id);
    let key = |name: &str| format!("{}{}", prefix, name);

    if let Some(v) = env_parse(&key("CONTEXT_WINDOW")) {
        overrides.context_window = Some(v);
    }
    if let Some(v) = env_parse(&key("MAX_TOOL_ITERATIONS")) {
        overrides.max_tool_iterations = Some(v);
    }
    if let Some(v) = env_parse(&key("RETRIEVER_ENABLED")) {
        overrides.retriever_enabled = Some(v);
    }
    if let Some(v) = env_parse(&key("RETRIEVER_EVERY_N_TURNS")) {
        overrides.retriever_every_n_turns = Some(v);
    }
    if let Some(v) = env_parse(&key("CREATOR_ENABLED")) {
        overrides.creator_enabled = Some(v);
    }
    if let Some(v) = env_parse(&key("CREATOR_EVERY_N_TURNS")) {
        overrides.creator_every_n_turns = Some(v);
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.agent.model, DEFAULT_MODEL);
        assert_eq!(config.agent.max_tool_iterations, 10);
        assert_eq!(config.agent.context_window, 50);
        assert_eq!(config.agent.max_retries, 3);
        assert_eq!(config.memory.retriever.max_iterations, 3);
        assert_eq!(config.memory.retriever.top_k, 3);
        assert_eq!(config.memory.retriever.max_selected, 9);
        assert_eq!(config.memory.creator.context_messages, 10);
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{"agent": {"context_window": 20}, "memory": {"creator": {"enabled": false}}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.agent.context_window, 20);
        assert!(!config.memory.creator.enabled);
        // Defaults should apply to unspecified fields
        assert_eq!(config.agent.max_retries, 3);
        assert!(config.memory.retriever.enabled);
        assert_eq!(config.memory.creator.every_n_turns, 1);
    }

    #[test]
    fn test_for_agent_uses_globals_without_overrides() {
        let config = Config::default();
        let settings = config.for_agent("planner");
        assert_eq!(settings.agent_id, "planner");
        assert_eq!(settings.context_window, 50);
        assert!(settings.retriever.enabled);
        assert_eq!(settings.creator.every_n_turns, 1);
    }

    #[test]
    fn test_for_agent_file_overrides() {
        let json = r#"{
            "agent": {"context_window": 40},
            "agents": {
                "weather_agent": {
                    "context_window": 12,
                    "retriever_enabled": false,
                    "creator_every_n_turns": 3
                }
            }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        let weather = config.for_agent("weather_agent");
        assert_eq!(weather.context_window, 12);
        assert!(!weather.retriever.enabled);
        assert_eq!(weather.creator.every_n_turns, 3);

        let other = config.for_agent("notes_agent");
        assert_eq!(other.context_window, 40);
        assert!(other.retriever.enabled);
    }

    #[test]
    fn test_agent_env_prefix_normalizes_id() {
        assert_eq!(agent_env_prefix("weather-agent"), "VOS_WEATHER_AGENT_");
        assert_eq!(agent_env_prefix("primary"), "VOS_PRIMARY_");
    }

    #[test]
    fn test_for_agent_env_overrides_beat_file() {
        env::set_var("VOS_ENV_OVERRIDE_AGENT_CONTEXT_WINDOW", "7");
        env::set_var("VOS_ENV_OVERRIDE_AGENT_CREATOR_ENABLED", "false");

        let mut config = Config::default();
        config.agents.insert(
            "env-override-agent".to_string(),
            AgentOverrides {
                context_window: Some(30),
                ..Default::default()
            },
        );
        let settings = config.for_agent("env-override-agent");
        assert_eq!(settings.context_window, 7);
        assert!(!settings.creator.enabled);

        env::remove_var("VOS_ENV_OVERRIDE_AGENT_CONTEXT_WINDOW");
        env::remove_var("VOS_ENV_OVERRIDE_AGENT_CREATOR_ENABLED");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let mut config = Config::default();
        config.agent.system_prompt = "test prompt".to_string();
        config.memory.retriever.top_k = 5;
        config.save_to_path(&config_path).unwrap();

        let loaded = Config::load_from_path(&config_path).unwrap();
        assert_eq!(loaded.agent.system_prompt, "test prompt");
        assert_eq!(loaded.memory.retriever.top_k, 5);
    }

    #[test]
    fn test_load_nonexistent() {
        let path = PathBuf::from("/nonexistent/path/config.json");
        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.memory.creator.recent_memories, 5);
    }

    #[test]
    fn test_config_dir() {
        let dir = Config::dir();
        assert!(dir.ends_with(".vos-agent"));
        assert!(Config::path().ends_with(".vos-agent/config.json"));
    }

    #[test]
    fn test_data_dir_override() {
        let mut config = Config::default();
        assert!(config.data_dir().ends_with(".vos-agent/data"));
        config.storage.data_dir = Some(PathBuf::from("/var/lib/vos"));
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/vos"));
    }
}
