//! Built-in tool registry.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{Map, Value};

use super::{Tool, ToolCallResult, ToolDescriptor, ToolService};
use crate::error::ToolError;

/// Insertion-ordered set of uniquely named tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the chess position tools.
    #[must_use]
    pub fn with_chess_tools() -> Self {
        let mut registry = Self::new();
        for tool in super::chess::tools() {
            if let Err(e) = registry.register(tool) {
                tracing::error!(error = %e, "Skipping built-in tool");
            }
        }
        registry
    }

    /// Registers a tool under its descriptor name.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Duplicate`] if the name is already taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.descriptor().name;
        if self.tools.contains_key(&name) {
            return Err(ToolError::Duplicate { name });
        }
        tracing::debug!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns `true` if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolService for ToolRegistry {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, ToolError> {
        Ok(self.tools.values().map(|t| t.descriptor()).collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolCallResult, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })?;
        tool.call(arguments).await
    }
}
