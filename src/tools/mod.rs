//! Tool definitions, the result envelope, and the dispatch boundary.
//!
//! A tool is a named operation with a declared parameter schema. Tools are
//! registered once at startup into a [`ToolRegistry`], which is then frozen
//! into an immutable [`Dispatcher`]. Every invocation, successful or not,
//! produces the same [`ToolResult`] envelope:
//!
//! ```json
//! { "success": false, "data": null, "error": "tool not found", "message": "..." }
//! ```
//!
//! # Built-in Tools
//!
//! | Tool | Parameters | Effect |
//! |------|-----------|--------|
//! | `list_files` | `path?` | List a vault folder |
//! | `read_note` | `path` | Read a document |
//! | `create_note` | `path`, `content`, `overwrite?` | Create a document |
//! | `update_note` | `path`, `content` | Replace an existing document |
//! | `append_note` | `path`, `content` | Append to a document |
//! | `delete_note` | `path` | Delete a document |
//! | `search` | `query`, `mode?`, `limit?`, `folder?`, `explain?` | Hybrid search |
//! | `ask_vault` | `question`, `top_k?` | Answer from top search hits |

pub mod builtin;
pub mod params;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{GatewayError, GatewayResult};
use crate::inference::InferenceProvider;
use crate::search::SearchEngine;
use crate::vault::VaultClient;

pub use registry::{Dispatcher, ToolRegistry};

// ============ Definitions ============

/// JSON type a parameter must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Array => value.is_array(),
            ParamType::Object => value.is_object(),
        }
    }
}

/// Schema for one parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    #[serde(rename = "type")]
    pub param_type: ParamType,
    pub required: bool,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    /// Lower bound for integers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
}

impl ParamSpec {
    pub fn required(param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            param_type,
            required: true,
            description: description.into(),
            default: None,
            allowed: None,
            minimum: None,
        }
    }

    pub fn optional(param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(param_type, description)
        }
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Value>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn at_least(mut self, minimum: i64) -> Self {
        self.minimum = Some(minimum);
        self
    }
}

/// A tool's public description. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: BTreeMap<String, ParamSpec>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, spec: ParamSpec) -> Self {
        self.parameters.insert(name.into(), spec);
        self
    }
}

// ============ Invocation ============

/// A client call: tool name plus a JSON object of parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolInvocationRequest {
    #[serde(alias = "toolName")]
    pub tool_name: String,
    /// `null` is treated as an empty object.
    #[serde(default)]
    pub parameters: Value,
}

impl ToolInvocationRequest {
    pub fn new(tool_name: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
        }
    }
}

/// Uniform result envelope returned for every invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub data: Value,
    /// Empty on success, otherwise a [`GatewayError::category`].
    pub error: String,
    pub message: String,
}

impl ToolResult {
    pub fn ok(data: Value, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            error: String::new(),
            message: message.into(),
        }
    }

    pub fn failure(err: &GatewayError) -> Self {
        Self {
            success: false,
            data: Value::Null,
            error: err.category().to_string(),
            message: err.to_string(),
        }
    }
}

impl From<GatewayResult<ToolOutput>> for ToolResult {
    fn from(result: GatewayResult<ToolOutput>) -> Self {
        match result {
            Ok(output) => ToolResult::ok(output.data, output.message),
            Err(e) => ToolResult::failure(&e),
        }
    }
}

/// What a tool hands back on success.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub data: Value,
    pub message: String,
}

impl ToolOutput {
    pub fn new(data: Value, message: impl Into<String>) -> Self {
        Self {
            data,
            message: message.into(),
        }
    }
}

// ============ Tool Trait ============

/// Shared services available to every tool.
pub struct ToolContext {
    pub vault: VaultClient,
    pub search: Arc<SearchEngine>,
    pub inference: Arc<dyn InferenceProvider>,
}

impl ToolContext {
    pub fn new(
        vault: VaultClient,
        search: Arc<SearchEngine>,
        inference: Arc<dyn InferenceProvider>,
    ) -> Self {
        Self {
            vault,
            search,
            inference,
        }
    }
}

/// A named operation exposed through the dispatcher.
///
/// [`definition`](Tool::definition) is read once at registration.
/// [`execute`](Tool::execute) receives parameters that already passed
/// schema validation, with defaults filled in.
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use serde_json::{json, Map, Value};
/// use vault_gateway::error::GatewayResult;
/// use vault_gateway::tools::{Tool, ToolContext, ToolDefinition, ToolOutput};
///
/// struct Ping;
///
/// #[async_trait]
/// impl Tool for Ping {
///     fn definition(&self) -> ToolDefinition {
///         ToolDefinition::new("ping", "Reply with pong")
///     }
///
///     async fn execute(&self, _params: Map<String, Value>, _ctx: &ToolContext) -> GatewayResult<ToolOutput> {
///         Ok(ToolOutput::new(json!("pong"), "pong"))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    async fn execute(
        &self,
        params: Map<String, Value>,
        ctx: &ToolContext,
    ) -> GatewayResult<ToolOutput>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_param_type_matches() {
        assert!(ParamType::Integer.matches(&json!(3)));
        assert!(!ParamType::Integer.matches(&json!(3.5)));
        assert!(ParamType::Number.matches(&json!(3.5)));
        assert!(ParamType::String.matches(&json!("x")));
        assert!(!ParamType::Boolean.matches(&json!("true")));
    }

    #[test]
    fn test_definition_serializes_schema() {
        let def = ToolDefinition::new("search", "Search")
            .param(
                "mode",
                ParamSpec::optional(ParamType::String, "Ranking mode").one_of(["keyword", "hybrid"]),
            )
            .param("query", ParamSpec::required(ParamType::String, "Text"));
        let json = serde_json::to_value(&def).unwrap();
        assert_eq!(json["parameters"]["query"]["type"], "string");
        assert_eq!(json["parameters"]["query"]["required"], true);
        assert_eq!(json["parameters"]["mode"]["enum"], json!(["keyword", "hybrid"]));
        assert!(json["parameters"]["query"].get("default").is_none());
    }

    #[test]
    fn test_result_envelope_shape() {
        let ok = ToolResult::ok(json!([1, 2]), "two");
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json, json!({"success": true, "data": [1, 2], "error": "", "message": "two"}));

        let failed = ToolResult::failure(&GatewayError::ToolNotFound("nope".into()));
        assert!(!failed.success);
        assert_eq!(failed.data, Value::Null);
        assert_eq!(failed.error, "tool not found");
        assert!(failed.message.contains("nope"));
    }

    #[test]
    fn test_invocation_request_accepts_both_spellings() {
        let a: ToolInvocationRequest =
            serde_json::from_value(json!({"tool_name": "x", "parameters": {"a": 1}})).unwrap();
        let b: ToolInvocationRequest = serde_json::from_value(json!({"toolName": "x"})).unwrap();
        assert_eq!(a.tool_name, "x");
        assert_eq!(b.parameters, Value::Null);
    }
}
