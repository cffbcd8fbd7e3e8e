//! History command handler.

use std::path::PathBuf;

use anyhow::Result;

use vos_agent::session::Message;
use vos_agent::utils::string::preview;

use super::common::{file_history, load_config};

const PREVIEW_CHARS: usize = 120;

/// Print stored turns for one agent; `limit == 0` prints everything.
pub(crate) async fn cmd_history(
    agent_id: String,
    limit: usize,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let history = file_history(&config)?;

    let total = history.count(&agent_id).await?;
    if total == 0 {
        println!("No history for agent '{}'", agent_id);
        return Ok(());
    }

    let turns = if limit == 0 {
        history.read_full(&agent_id).await?
    } else {
        history.read_context(&agent_id, limit).await?
    };

    println!("History for '{}' ({} of {} turns)", agent_id, turns.len(), total);
    println!();
    for turn in &turns {
        println!("{}", format_turn(turn));
    }
    Ok(())
}

fn format_turn(turn: &Message) -> String {
    let role = serde_json::to_value(turn.role)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let mut line = format!(
        "{} {:<9} {}",
        turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
        role,
        preview(&turn.content.replace('\n', " "), PREVIEW_CHARS)
    );
    if let Some(calls) = &turn.tool_calls {
        let names: Vec<&str> = calls.iter().map(|c| c.name.as_str()).collect();
        line.push_str(&format!(" [calls: {}]", names.join(", ")));
    }
    if let Some(id) = &turn.tool_call_id {
        line.push_str(&format!(" [result of {}]", id));
    }
    line
}
