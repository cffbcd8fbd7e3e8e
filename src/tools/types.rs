//! Tool types
//!
//! The `Tool` trait every capability handler implements, the parameter
//! schema the registry validates against, and the `ToolResult` record the
//! executor hands back to the agent loop.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::Result;

// ============================================================================
// Schema
// ============================================================================

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    /// Whether `value` has this type. Integers count as numbers.
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

/// Declaration of one tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    pub description: String,
}

/// Parameter declarations keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub params: BTreeMap<String, ParamSpec>,
}

impl ToolSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a required parameter.
    pub fn required(mut self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.params.insert(
            name.to_string(),
            ParamSpec {
                param_type,
                required: true,
                description: description.to_string(),
            },
        );
        self
    }

    /// Add an optional parameter.
    pub fn optional(mut self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.params.insert(
            name.to_string(),
            ParamSpec {
                param_type,
                required: false,
                description: description.to_string(),
            },
        );
        self
    }

    /// Check arguments against the declared parameters.
    ///
    /// Returns a human-readable reason on the first violation. Parameters
    /// that are not declared pass through untouched.
    pub fn check(&self, args: &Value) -> std::result::Result<(), String> {
        let Some(object) = args.as_object() else {
            return Err("arguments must be a JSON object".to_string());
        };
        for (name, spec) in &self.params {
            match object.get(name) {
                None | Some(Value::Null) if spec.required => {
                    return Err(format!("missing required parameter '{}'", name));
                }
                None | Some(Value::Null) => {}
                Some(value) if !spec.param_type.accepts(value) => {
                    return Err(format!(
                        "parameter '{}' must be of type {}",
                        name,
                        spec.param_type.as_str()
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Render as JSON Schema for function-calling providers.
    pub fn to_json_schema(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .params
            .iter()
            .map(|(name, spec)| {
                (
                    name.clone(),
                    json!({"type": spec.param_type.as_str(), "description": spec.description}),
                )
            })
            .collect();
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

// ============================================================================
// Context and results
// ============================================================================

/// Who is calling a tool, and for which cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolContext {
    pub agent_id: String,
    /// Id of the notification being processed
    pub correlation_id: Option<String>,
}

impl ToolContext {
    pub fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            correlation_id: None,
        }
    }

    pub fn with_correlation(mut self, correlation_id: &str) -> Self {
        self.correlation_id = Some(correlation_id.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ToolStatus {
    Success,
    Failure,
}

/// Outcome of one tool call, as shown to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ToolResult {
    pub fn success(tool_name: &str, result: Value) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            status: ToolStatus::Success,
            result: Some(result),
            error_message: None,
        }
    }

    pub fn failure(tool_name: &str, error_message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            status: ToolStatus::Failure,
            result: None,
            error_message: Some(error_message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// JSON text stored in history as the tool result turn.
    pub fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"tool_name":"{}","status":"FAILURE","error_message":"unserializable result"}}"#,
                self.tool_name
            )
        })
    }
}

// ============================================================================
// Tool trait
// ============================================================================

/// A named, schema-validated capability the model can call.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
/// use vos_agent::error::Result;
/// use vos_agent::tools::{ParamType, Tool, ToolContext, ToolSchema};
///
/// struct WeatherTool;
///
/// #[async_trait]
/// impl Tool for WeatherTool {
///     fn name(&self) -> &str { "get_weather" }
///     fn description(&self) -> &str { "Current weather for a location" }
///     fn schema(&self) -> ToolSchema {
///         ToolSchema::new().required("location", ParamType::String, "City name")
///     }
///     async fn execute(&self, _args: Value, _ctx: &ToolContext) -> Result<Value> {
///         Ok(json!({"temp": 15, "unit": "C"}))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Sent to the model so it knows when to call the tool.
    fn description(&self) -> &str;

    fn schema(&self) -> ToolSchema;

    /// Extra checks beyond the schema. Runs after schema validation.
    fn validate(&self, _args: &Value) -> std::result::Result<(), String> {
        Ok(())
    }

    /// Run the tool. The result must be a JSON object.
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<Value>;
}
