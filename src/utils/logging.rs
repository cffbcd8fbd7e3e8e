//! Logging initialization.
//!
//! Supports three formats:
//! - `pretty`: default tracing pretty-print (human-readable, coloured)
//! - `component`: compact `[timestamp] [LEVEL] target message {fields}` lines;
//!   use the [`log_component!`] macro to add a `component` field
//! - `json`: structured JSON lines for log aggregators, optionally to a file

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Result, VosError};

/// Initialize the global tracing subscriber from config.
///
/// Events go to stderr (or the configured file) so stdout stays free for
/// command output.
///
/// Call this once at startup before any tracing events are emitted.
/// Falls back to `RUST_LOG` env var; if unset, uses `cfg.level`.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    let installed = match cfg.format {
        LogFormat::Json => match &cfg.file {
            Some(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| {
                        VosError::Config(format!("cannot open log file {}: {}", path, e))
                    })?;
                let file = Arc::new(file);
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_writer(file)
                    .try_init()
            }
            None => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init(),
        },
        LogFormat::Pretty => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
        LogFormat::Component => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact()
            .with_writer(std::io::stderr)
            .try_init(),
    };

    installed.map_err(|e| VosError::Config(format!("logging already initialized: {}", e)))
}

/// Emit a component-tagged tracing event.
///
/// Works with any tracing level (`trace`, `debug`, `info`, `warn`, `error`).
/// The `component` field makes it easy to grep logs by subsystem:
///
/// ```
/// # use vos_agent::log_component;
/// log_component!(info, "broker", "delivery acknowledged");
/// log_component!(warn, "retriever", "iteration ceiling reached", iterations = 3u32);
/// let agent_id = "notes_agent";
/// log_component!(debug, "agent", "cycle done", agent_id = %agent_id, turn = 7u64);
/// ```
#[macro_export]
macro_rules! log_component {
    ($level:ident, $component:expr, $msg:expr) => {
        tracing::$level!(component = $component, $msg)
    };
    ($level:ident, $component:expr, $msg:expr, $($fields:tt)+) => {
        tracing::$level!(component = $component, $($fields)+, $msg)
    };
}

#[cfg(test)]
mod tests {
    use crate::config::{LogFormat, LoggingConfig};

    #[test]
    fn test_default_logging_config() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.format, LogFormat::Component);
        assert_eq!(cfg.level, "info");
        assert!(cfg.file.is_none());
    }

    #[test]
    fn test_log_format_deserialize_json() {
        let cfg: LoggingConfig =
            serde_json::from_str(r#"{"format":"json","level":"debug"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Json);
        assert_eq!(cfg.level, "debug");
    }

    #[test]
    fn test_log_format_partial_config_uses_defaults() {
        let cfg: LoggingConfig = serde_json::from_str(r#"{"level":"trace"}"#).unwrap();
        assert_eq!(cfg.format, LogFormat::Component);
        assert!(cfg.file.is_none());
        assert_eq!(cfg.level, "trace");
    }

    #[test]
    fn test_unopenable_log_file_is_config_error() {
        let cfg = LoggingConfig {
            format: LogFormat::Json,
            level: "info".to_string(),
            file: Some("/nonexistent-dir/vos/agent.log".to_string()),
        };
        let err = super::init_logging(&cfg).unwrap_err();
        assert!(err.to_string().contains("cannot open log file"));
    }

    #[test]
    fn test_log_component_macro_compiles() {
        crate::log_component!(debug, "tools", "registry ready", tools = 3usize);
    }
}
