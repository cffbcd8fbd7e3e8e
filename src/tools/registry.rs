//! Tool registry and executor
//!
//! The registry maps tool names to handlers, validates arguments against
//! each tool's schema and runs the handler. `execute` never fails: unknown
//! tools, invalid arguments, handler errors, panics and non-object results
//! all come back as a FAILURE [`ToolResult`] the agent loop feeds to the
//! model like any other result.

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::providers::ToolDefinition;

use super::{Tool, ToolContext, ToolResult, ToolSchema};

type Handler = dyn Fn(Value, ToolContext) -> BoxFuture<'static, Result<Value>> + Send + Sync;

/// Tool built from a closure by [`ToolRegistry::register_fn`].
struct FnTool {
    name: String,
    description: String,
    schema: ToolSchema,
    handler: Box<Handler>,
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> ToolSchema {
        self.schema.clone()
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value> {
        (self.handler)(args, ctx.clone()).await
    }
}

/// Holds the tools an agent may call.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use vos_agent::tools::{ParamType, ToolContext, ToolRegistry, ToolSchema};
///
/// # tokio_test::block_on(async {
/// let mut registry = ToolRegistry::new();
/// registry.register_fn(
///     "get_weather",
///     "Current weather for a location",
///     ToolSchema::new().required("location", ParamType::String, "City name"),
///     |_args, _ctx| async { Ok(json!({"temp": 15, "unit": "C"})) },
/// );
///
/// let ctx = ToolContext::new("weather_agent");
/// let result = registry.execute("get_weather", json!({"location": "Paris"}), &ctx).await;
/// assert!(result.is_success());
/// # });
/// ```
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Replacing previously registered tool");
        } else {
            info!(tool = %name, "Registering tool");
        }
    }

    /// Register an async closure as a tool.
    pub fn register_fn<F, Fut>(&mut self, name: &str, description: &str, schema: ToolSchema, f: F)
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler: Box<Handler> = Box::new(move |args, ctx| f(args, ctx).boxed());
        self.register(Arc::new(FnTool {
            name: name.to_string(),
            description: description.to_string(),
            schema,
            handler,
        }));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Check a call without running it.
    pub fn validate(&self, name: &str, args: &Value) -> std::result::Result<(), String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| format!("unknown tool '{}'", name))?;
        tool.schema().check(args)?;
        tool.validate(args)
    }

    /// Validate and run a call. Always yields exactly one result.
    pub async fn execute(&self, name: &str, args: Value, ctx: &ToolContext) -> ToolResult {
        if let Err(reason) = self.validate(name, &args) {
            warn!(tool = %name, agent_id = %ctx.agent_id, reason = %reason, "Tool call rejected");
            return ToolResult::failure(name, reason);
        }
        let Some(tool) = self.get(name) else {
            return ToolResult::failure(name, format!("unknown tool '{}'", name));
        };

        let start = Instant::now();
        let outcome = AssertUnwindSafe(tool.execute(args, ctx)).catch_unwind().await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(value)) if value.is_object() => {
                info!(tool = %name, agent_id = %ctx.agent_id, duration_ms, "Tool executed successfully");
                ToolResult::success(name, value)
            }
            Ok(Ok(value)) => {
                warn!(tool = %name, duration_ms, "Tool returned a non-object result");
                ToolResult::failure(
                    name,
                    format!("tool returned invalid output: expected a JSON object, got {}", value),
                )
            }
            Ok(Err(e)) => {
                error!(tool = %name, agent_id = %ctx.agent_id, error = %e, duration_ms, "Tool execution failed");
                ToolResult::failure(name, e.to_string())
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(tool = %name, agent_id = %ctx.agent_id, panic = %detail, duration_ms, "Tool panicked");
                ToolResult::failure(name, format!("tool panicked: {}", detail))
            }
        }
    }

    /// Declarations in the `{name, description, parameters}` contract.
    pub fn declarations(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|t| {
                json!({
                    "name": t.name(),
                    "description": t.description(),
                    "parameters": t.schema().params,
                })
            })
            .collect()
    }

    /// Definitions for function-calling providers.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.schema().to_json_schema()))
            .collect()
    }
}
