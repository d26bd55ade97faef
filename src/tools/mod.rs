//! Tool service boundary.
//!
//! The bridge only knows tools through [`ToolService`]: list them, call
//! one by name, and ask the service to stop. [`ToolRegistry`] is the
//! built-in implementation, backed by individually registered [`Tool`]s;
//! an external engine can implement [`ToolService`] directly instead.

pub mod chess;
mod registry;

pub use registry::ToolRegistry;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ToolError;

/// A tool definition for the `tools/list` response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool reports a domain-level failure.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde skip_serializing_if signature
const fn is_false(b: &bool) -> bool {
    !*b
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates a successful result holding pretty-printed JSON text.
    #[must_use]
    pub fn json(value: &Value) -> Self {
        Self::text(serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()))
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }
}

/// The collaborator that owns tool listing and execution.
///
/// Implementations must tolerate concurrent calls: the server keeps
/// several invocations in flight at once.
#[async_trait]
pub trait ToolService: Send + Sync {
    /// Lists the tools available for this run.
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError>;

    /// Executes the named tool.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolCallResult, ToolError>;

    /// Asks the service to release its resources. Called once during
    /// shutdown, bounded by the grace period.
    async fn shutdown(&self) {}
}

/// A single named tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Describes the tool; the name must be stable for the process lifetime.
    fn descriptor(&self) -> ToolDescriptor;

    /// Runs the tool.
    async fn call(&self, arguments: Map<String, Value>) -> Result<ToolCallResult, ToolError>;
}

/// Fetches a required string argument.
///
/// # Errors
///
/// Returns [`ToolError::InvalidArguments`] if `key` is missing or not a string.
pub fn require_str<'a>(
    tool: &str,
    arguments: &'a Map<String, Value>,
    key: &str,
) -> Result<&'a str, ToolError> {
    arguments
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments {
            tool: tool.to_string(),
            message: format!("missing required string argument '{key}'"),
        })
}
