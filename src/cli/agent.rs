//! `run` command: one agent fed from stdin.
//!
//! Each stdin line is either a notification envelope (JSON) or plain text,
//! which is wrapped as a `user_message`. Final replies are printed as they
//! arrive.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use vos_agent::agent::{AgentDeps, AgentLoop};
use vos_agent::bus::{Broker, InMemoryBroker, Notification};
use vos_agent::memory::{InMemoryVectorStore, MemoryCreator, MemoryRetriever, MemoryService};
use vos_agent::providers::provider_from_config;
use vos_agent::tools::{register_builtin, ToolRegistry};

use super::common::{embedder, file_history, file_status_store, load_config};

/// Source recorded on notifications typed at the terminal.
const CLI_SOURCE: &str = "cli";

pub(crate) async fn cmd_run(agent_id: String, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_deref())?;
    let settings = config.for_agent(&agent_id);

    let provider = provider_from_config(&config).context("Failed to configure provider")?;
    let history = file_history(&config)?;
    let status_store = file_status_store(&config)?;
    let broker = Arc::new(InMemoryBroker::new());
    let memory = MemoryService::new(embedder(&config), Arc::new(InMemoryVectorStore::new()));

    let mut tools = ToolRegistry::new();
    register_builtin(&mut tools, Some(&memory), broker.clone());

    let retriever = MemoryRetriever::new(
        provider.clone(),
        memory.clone(),
        history.clone(),
        settings.retriever.clone(),
    )
    .with_model(&settings.model);
    let creator = MemoryCreator::new(
        provider.clone(),
        memory.clone(),
        history.clone(),
        status_store.clone(),
        settings.creator.clone(),
    )
    .with_model(&settings.model);

    let (reply_tx, mut reply_rx) = mpsc::channel(16);
    let agent = Arc::new(AgentLoop::new(
        settings,
        AgentDeps {
            broker: broker.clone(),
            history,
            status_store,
            provider,
            tools,
            retriever: Some(retriever),
            creator: Some(creator),
            outbound: Some(reply_tx),
        },
    ));
    let handle = agent.handle();

    let runner = {
        let agent = agent.clone();
        tokio::spawn(async move { agent.run().await })
    };
    let printer = tokio::spawn(async move {
        while let Some(reply) = reply_rx.recv().await {
            println!("{}", reply.content);
        }
    });

    info!(agent_id = %agent_id, "Agent started; reading notifications from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let notification = if line.starts_with('{') {
                    match Notification::from_json(line) {
                        Ok(n) => n,
                        Err(e) => {
                            warn!(error = %e, "Skipping invalid notification line");
                            continue;
                        }
                    }
                } else {
                    Notification::user_message(&agent_id, CLI_SOURCE, line)
                };
                broker.publish(&notification).await?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    // Let queued notifications finish before shutting down.
    while broker.ready_count(&agent_id).await > 0 || broker.unacked_count(&agent_id).await > 0 {
        if runner.is_finished() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    handle.shutdown();
    let result = runner.await.context("Agent task panicked")?;
    drop(agent);
    printer.await.ok();
    result.context("Agent loop failed")?;
    Ok(())
}
