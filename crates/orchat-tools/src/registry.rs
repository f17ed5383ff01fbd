//! Static mapping from tool name to tool

use crate::base::{AiTool, ToolDefinition};
use std::sync::Arc;
use tracing::debug;

/// The tools offered to the model, in registration order
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn AiTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration
    pub fn with_tool<T: AiTool + 'static>(mut self, tool: T) -> Self {
        self.register(Arc::new(tool));
        self
    }

    /// Register a tool, replacing any tool with the same name
    pub fn register(&mut self, tool: Arc<dyn AiTool>) {
        if let Some(pos) = self.tools.iter().position(|t| t.name() == tool.name()) {
            debug!("Replacing registered tool '{}'", tool.name());
            self.tools[pos] = tool;
        } else {
            self.tools.push(tool);
        }
    }

    /// Find a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn AiTool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// List all available tools
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.to_definition()).collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::ToolError;
    use async_trait::async_trait;
    use serde_json::{Value, json};

    struct Named(&'static str, &'static str);

    #[async_trait]
    impl AiTool for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            self.1
        }

        fn schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn execute(&self, _params: Value) -> Result<String, ToolError> {
            Ok(self.1.to_string())
        }
    }

    #[test]
    fn test_lookup_and_replace() {
        let mut registry = ToolRegistry::new()
            .with_tool(Named("web_search", "v1"))
            .with_tool(Named("calc", "math"));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["web_search", "calc"]);

        registry.register(Arc::new(Named("web_search", "v2")));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("web_search").unwrap().description(), "v2");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_empty_registry() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.definitions().is_empty());
    }
}
