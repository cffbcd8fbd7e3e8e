//! Configuration validation with unknown field detection and range checks.

use serde_json::Value;
use std::collections::HashSet;

use super::Config;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &[
    "agent",
    "memory",
    "agents",
    "broker",
    "providers",
    "storage",
    "logging",
];

/// Known fields of a per-agent override block.
const KNOWN_AGENT_OVERRIDES: &[&str] = &[
    "context_window",
    "max_tool_iterations",
    "system_prompt",
    "model",
    "retriever_enabled",
    "retriever_every_n_turns",
    "creator_enabled",
    "creator_every_n_turns",
];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            path: path.into(),
            message: message.into(),
        }
    }

    fn warn(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warn,
            path: path.into(),
            message: message.into(),
        }
    }

    fn ok(message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Ok,
            path: String::new(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.iter().enumerate() {
        let mut current = vec![i + 1; b.len() + 1];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (prev[j + 1] + 1).min(current[j] + 1).min(prev[j] + cost);
        }
        prev = current;
    }
    prev[b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn unknown_field(path: String, key: &str, known: &[&str]) -> Diagnostic {
    let message = match suggest_field(key, known) {
        Some(suggestion) => format!("Unknown field '{}' ({})", key, suggestion),
        None => format!("Unknown field '{}'", key),
    };
    Diagnostic::error(path, message)
}

/// Validate a raw JSON config value against known field names.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match raw.as_object() {
        Some(o) => o,
        None => {
            diagnostics.push(Diagnostic::error("", "Config must be a JSON object"));
            return diagnostics;
        }
    };

    diagnostics.push(Diagnostic::ok("Valid JSON"));

    let known_set: HashSet<&str> = KNOWN_TOP_LEVEL.iter().copied().collect();
    let mut has_unknown = false;
    for key in obj.keys() {
        if !known_set.contains(key.as_str()) {
            has_unknown = true;
            diagnostics.push(unknown_field(key.clone(), key, KNOWN_TOP_LEVEL));
        }
    }

    if let Some(agents) = obj.get("agents").and_then(|v| v.as_object()) {
        let known_set: HashSet<&str> = KNOWN_AGENT_OVERRIDES.iter().copied().collect();
        for (agent_id, block) in agents {
            let Some(block) = block.as_object() else {
                diagnostics.push(Diagnostic::error(
                    format!("agents.{}", agent_id),
                    "Override block must be an object",
                ));
                continue;
            };
            for key in block.keys() {
                if !known_set.contains(key.as_str()) {
                    has_unknown = true;
                    diagnostics.push(unknown_field(
                        format!("agents.{}.{}", agent_id, key),
                        key,
                        KNOWN_AGENT_OVERRIDES,
                    ));
                }
            }
        }
    }

    if !has_unknown {
        diagnostics.push(Diagnostic::ok("All fields recognized"));
    }

    diagnostics
}

/// Check value ranges on a parsed configuration.
pub fn validate_ranges(config: &Config) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let retriever = &config.memory.retriever;
    let creator = &config.memory.creator;

    if retriever.every_n_turns == 0 {
        diagnostics.push(Diagnostic::error(
            "memory.retriever.every_n_turns",
            "Must be at least 1",
        ));
    }
    if creator.every_n_turns == 0 {
        diagnostics.push(Diagnostic::error(
            "memory.creator.every_n_turns",
            "Must be at least 1",
        ));
    }
    if retriever.max_iterations == 0 {
        diagnostics.push(Diagnostic::error(
            "memory.retriever.max_iterations",
            "Must be at least 1",
        ));
    }
    if !(0.0..=1.0).contains(&retriever.dedup_threshold) {
        diagnostics.push(Diagnostic::error(
            "memory.retriever.dedup_threshold",
            "Must be between 0 and 1",
        ));
    }
    if !(0.0..=1.0).contains(&creator.duplicate_threshold) {
        diagnostics.push(Diagnostic::error(
            "memory.creator.duplicate_threshold",
            "Must be between 0 and 1",
        ));
    }
    if config.agent.max_tool_iterations == 0 {
        diagnostics.push(Diagnostic::error(
            "agent.max_tool_iterations",
            "Must be at least 1",
        ));
    }
    if config.agent.max_retries == 0 {
        diagnostics.push(Diagnostic::warn(
            "agent.max_retries",
            "Transient failures will be dead-lettered immediately",
        ));
    }
    for (agent_id, overrides) in &config.agents {
        if overrides.retriever_every_n_turns == Some(0) || overrides.creator_every_n_turns == Some(0)
        {
            diagnostics.push(Diagnostic::error(
                format!("agents.{}", agent_id),
                "every_n_turns overrides must be at least 1",
            ));
        }
    }
    if config
        .providers
        .openai
        .as_ref()
        .and_then(|p| p.api_key.as_ref())
        .is_none()
    {
        diagnostics.push(Diagnostic::warn(
            "providers.openai.api_key",
            "Not set; the run command will fail to start",
        ));
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("hello", "hello"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("hello", "helo"), 1);
    }

    #[test]
    fn test_levenshtein_different() {
        assert!(levenshtein("hello", "world") > 3);
    }

    #[test]
    fn test_suggest_field_match() {
        let result = suggest_field("memroy", KNOWN_TOP_LEVEL);
        assert!(result.unwrap().contains("memory"));
    }

    #[test]
    fn test_suggest_field_no_match() {
        assert!(suggest_field("xyzabcdef", KNOWN_TOP_LEVEL).is_none());
    }

    #[test]
    fn test_validate_valid_config() {
        let raw = json!({
            "agent": {"model": "gpt-4o"},
            "agents": {"notes": {"context_window": 5}}
        });
        let diags = validate_config(&raw);
        assert!(diags.iter().all(|d| d.level != DiagnosticLevel::Error));
    }

    #[test]
    fn test_validate_unknown_top_level() {
        let diags = validate_config(&json!({"brokr": {}}));
        assert!(diags
            .iter()
            .any(|d| d.level == DiagnosticLevel::Error && d.message.contains("broker")));
    }

    #[test]
    fn test_validate_unknown_override_key() {
        let diags = validate_config(&json!({"agents": {"notes": {"retriever_enable": true}}}));
        assert!(diags
            .iter()
            .any(|d| d.path == "agents.notes.retriever_enable"));
    }

    #[test]
    fn test_validate_not_an_object() {
        let diags = validate_config(&json!("not an object"));
        assert!(diags.iter().any(|d| {
            d.level == DiagnosticLevel::Error && d.message.contains("must be a JSON object")
        }));
    }

    #[test]
    fn test_validate_ranges_defaults_have_no_errors() {
        let diags = validate_ranges(&Config::default());
        assert!(diags.iter().all(|d| d.level != DiagnosticLevel::Error));
    }

    #[test]
    fn test_validate_ranges_flags_zero_cadence() {
        let mut config = Config::default();
        config.memory.retriever.every_n_turns = 0;
        config.memory.creator.duplicate_threshold = 1.5;
        let diags = validate_ranges(&config);
        assert!(diags
            .iter()
            .any(|d| d.path == "memory.retriever.every_n_turns"));
        assert!(diags
            .iter()
            .any(|d| d.path == "memory.creator.duplicate_threshold"));
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::warn("agent.max_retries", "low");
        assert_eq!(d.to_string(), "[WARN] agent.max_retries: low");
    }
}
