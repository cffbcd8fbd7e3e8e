//! Config show/check command handlers.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::Value;

use vos_agent::config::validate::{validate_config, validate_ranges, DiagnosticLevel};
use vos_agent::config::Config;

use super::common::load_config;
use super::ConfigAction;

const MASK: &str = "********";

pub(crate) async fn cmd_config(action: ConfigAction, config_path: Option<PathBuf>) -> Result<()> {
    match action {
        ConfigAction::Show { agent } => {
            let config = load_config(config_path.as_deref())?;
            let mut value = match agent {
                Some(agent_id) => serde_json::to_value(config.for_agent(&agent_id))?,
                None => serde_json::to_value(&config)?,
            };
            mask_secrets(&mut value);
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        ConfigAction::Check => {
            let path = config_path.unwrap_or_else(Config::path);
            println!("Config file: {}", path.display());

            if !path.exists() {
                println!("[OK] No config file found (using defaults)");
                return Ok(());
            }

            let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
            let raw: Value = match serde_json::from_str(&content) {
                Ok(v) => v,
                Err(e) => {
                    println!("[ERROR] Invalid JSON: {}", e);
                    return Ok(());
                }
            };

            let mut diagnostics = validate_config(&raw);
            // Range checks need a typed config; skip them if it does not parse.
            if let Ok(config) = load_config(Some(&path)) {
                diagnostics.extend(validate_ranges(&config));
            }
            for diag in &diagnostics {
                println!("{}", diag);
            }

            let errors = diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Error)
                .count();
            let warnings = diagnostics
                .iter()
                .filter(|d| d.level == DiagnosticLevel::Warn)
                .count();

            if errors == 0 && warnings == 0 {
                println!("\nConfiguration looks good!");
            } else {
                println!("\nFound {} error(s), {} warning(s)", errors, warnings);
            }
        }
    }
    Ok(())
}

/// Replace every non-empty `api_key` value with a fixed mask.
fn mask_secrets(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if key == "api_key" && v.as_str().is_some_and(|s| !s.is_empty()) {
                    *v = Value::String(MASK.to_string());
                } else {
                    mask_secrets(v);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_secrets),
        _ => {}
    }
}
