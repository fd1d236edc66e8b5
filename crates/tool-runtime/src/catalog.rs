use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::BridgeError;
use crate::provider::ToolProvider;
use crate::session::SessionToken;
use crate::tool::{Tool, ToolDescriptor, ToolError, ToolInvocation, ToolResult};

/// Local tools a provider serves, keyed by name.
/// Thread-safe via Arc wrapping of individual tools.
pub struct ToolCatalog {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Returns error if name already registered.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), CatalogError> {
        let def = tool.definition();
        if self.tools.contains_key(&def.name) {
            return Err(CatalogError::DuplicateName(def.name));
        }
        self.tools.insert(def.name, Arc::new(tool));
        Ok(())
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all tool descriptors, sorted by name.
    pub fn list(&self) -> Vec<ToolDescriptor> {
        let mut defs: Vec<_> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Tool with name '{0}' is already registered")]
    DuplicateName(String),
}

/// In-process provider serving a `ToolCatalog` without any transport.
///
/// Useful for wiring local tools through the same bridge as remote ones.
pub struct LocalProvider {
    catalog: Arc<ToolCatalog>,
    session: SessionToken,
}

impl LocalProvider {
    pub fn new(catalog: Arc<ToolCatalog>) -> Self {
        Self {
            catalog,
            session: SessionToken::open(),
        }
    }

    /// End the session. Stubs built from this provider become stale.
    pub fn close(&self) {
        if self.session.close() {
            tracing::info!("Local provider session closed");
        }
    }
}

#[async_trait]
impl ToolProvider for LocalProvider {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BridgeError> {
        Ok(self.catalog.list())
    }

    async fn call_tool(&self, invocation: ToolInvocation) -> Result<ToolResult, BridgeError> {
        let tool = self
            .catalog
            .get(&invocation.tool_name)
            .ok_or_else(|| BridgeError::UnknownTool(invocation.tool_name.clone()))?;

        match tool.execute(serde_json::Value::Object(invocation.arguments)).await {
            Ok(value) => Ok(ToolResult::new(value)),
            Err(ToolError::InvalidInput(msg)) => Err(BridgeError::ArgumentMismatch {
                tool: invocation.tool_name,
                reason: msg,
            }),
            Err(e) => Err(BridgeError::ToolExecution {
                tool: invocation.tool_name,
                message: e.to_string(),
            }),
        }
    }

    fn session(&self) -> SessionToken {
        self.session.clone()
    }

    fn provider_name(&self) -> &str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{demo_catalog, EchoTool};
    use serde_json::json;

    #[test]
    fn test_register_and_lookup() {
        let mut catalog = ToolCatalog::new();
        catalog.register(EchoTool).unwrap();

        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("echo").is_some());
        assert!(catalog.get("nonexistent").is_none());
    }

    #[test]
    fn test_duplicate_registration() {
        let mut catalog = ToolCatalog::new();
        catalog.register(EchoTool).unwrap();
        assert!(catalog.register(EchoTool).is_err());
    }

    #[test]
    fn test_list_is_sorted() {
        let names: Vec<_> = demo_catalog().unwrap().list().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["add", "echo", "reverse"]);
    }

    #[tokio::test]
    async fn test_local_provider_call() {
        let provider = LocalProvider::new(Arc::new(demo_catalog().unwrap()));
        let mut args = crate::tool::ToolArguments::new();
        args.insert("input".into(), json!("abc"));

        let result = provider
            .call_tool(ToolInvocation::new("reverse", args))
            .await
            .unwrap();
        assert_eq!(result.value, json!("cba"));
    }

    #[tokio::test]
    async fn test_local_provider_unknown_tool() {
        let provider = LocalProvider::new(Arc::new(demo_catalog().unwrap()));
        let err = provider
            .call_tool(ToolInvocation::new("missing", Default::default()))
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::UnknownTool("missing".into()));
    }

    #[test]
    fn test_local_provider_close() {
        let provider = LocalProvider::new(Arc::new(ToolCatalog::new()));
        assert!(provider.session().is_open());
        provider.close();
        assert!(!provider.session().is_open());
    }
}
