use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use toolbridge_core::{DuplicatePolicy, RegistryConfig};

use crate::error::BridgeError;
use crate::provider::ToolProvider;
use crate::schema::ParameterSchema;
use crate::session::SessionToken;
use crate::tool::{ToolDescriptor, ToolInvocation, ToolResult};

/// Locally callable proxy for one remote tool.
///
/// A stub owns its tool name, schema and session handle. Nothing is shared
/// with other stubs, so a stub always dispatches to the name it was built for.
#[derive(Clone)]
pub struct ToolStub {
    descriptor: Arc<ToolDescriptor>,
    parameters: Arc<ParameterSchema>,
    provider: Arc<dyn ToolProvider>,
    session: SessionToken,
}

impl ToolStub {
    /// Build a stub for `descriptor`, bound to `provider`'s current session.
    pub fn new(
        provider: Arc<dyn ToolProvider>,
        descriptor: ToolDescriptor,
    ) -> Result<Self, BridgeError> {
        let parameters = ParameterSchema::parse(&descriptor.name, &descriptor.input_schema)?;
        let session = provider.session();
        Ok(Self {
            descriptor: Arc::new(descriptor),
            parameters: Arc::new(parameters),
            provider,
            session,
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    pub fn parameters(&self) -> &ParameterSchema {
        &self.parameters
    }

    /// Whether the session this stub was built from has been torn down.
    pub fn is_stale(&self) -> bool {
        !self.session.is_open()
    }

    /// Package `arguments` into an invocation for this stub's tool.
    pub fn invocation(&self, arguments: Value) -> Result<ToolInvocation, BridgeError> {
        if self.is_stale() {
            return Err(BridgeError::StaleRegistry(self.name().to_string()));
        }
        let arguments = self.parameters.bind(self.name(), arguments)?;
        Ok(ToolInvocation::new(self.name(), arguments))
    }

    /// Forward a call to the provider and return its result unmodified.
    pub async fn call(&self, arguments: Value) -> Result<ToolResult, BridgeError> {
        let invocation = self.invocation(arguments)?;
        debug!(
            tool = %invocation.tool_name,
            provider = %self.provider.provider_name(),
            "Dispatching tool invocation"
        );
        self.provider.call_tool(invocation).await
    }
}

impl fmt::Debug for ToolStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolStub")
            .field("name", &self.descriptor.name)
            .field("parameters", &self.parameters.names().collect::<Vec<_>>())
            .field("stale", &self.is_stale())
            .finish()
    }
}

/// Per-session mapping from tool name to stub, grouped under a plugin name.
///
/// Read-only once built; share it across tasks behind an `Arc` without
/// locking.
pub struct ToolRegistry {
    plugin_name: String,
    stubs: HashMap<String, ToolStub>,
}

impl ToolRegistry {
    /// Build one stub per descriptor.
    ///
    /// Colliding names are resolved by `config.duplicate_tools`: `Reject`
    /// fails with a schema error, `LastWriteWins` keeps the later descriptor.
    pub fn build(
        provider: Arc<dyn ToolProvider>,
        descriptors: Vec<ToolDescriptor>,
        config: &RegistryConfig,
    ) -> Result<Self, BridgeError> {
        let mut stubs = HashMap::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let stub = ToolStub::new(Arc::clone(&provider), descriptor)?;
            let name = stub.name().to_string();
            if stubs.contains_key(&name) {
                match config.duplicate_tools {
                    DuplicatePolicy::Reject => {
                        return Err(BridgeError::schema(
                            name,
                            "duplicate tool name in provider catalog",
                        ));
                    }
                    DuplicatePolicy::LastWriteWins => {
                        warn!(tool = %name, "Duplicate tool name, keeping the later descriptor");
                    }
                }
            }
            stubs.insert(name, stub);
        }

        debug!(plugin = %config.plugin_name, count = stubs.len(), "Tool registry built");

        Ok(Self {
            plugin_name: config.plugin_name.clone(),
            stubs,
        })
    }

    /// A registry with no tools.
    pub fn empty(plugin_name: impl Into<String>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            stubs: HashMap::new(),
        }
    }

    /// Invoke a tool by name.
    ///
    /// Fails with `UnknownTool` when the name is absent (whatever the
    /// session state), `StaleRegistry` when the session is gone, and
    /// `ArgumentMismatch` when the arguments don't fit the schema.
    pub async fn invoke(&self, name: &str, arguments: Value) -> Result<ToolResult, BridgeError> {
        let stub = self
            .stubs
            .get(name)
            .ok_or_else(|| BridgeError::UnknownTool(name.to_string()))?;
        stub.call(arguments).await
    }

    /// Look up a stub by name.
    pub fn get(&self, name: &str) -> Option<&ToolStub> {
        self.stubs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.stubs.contains_key(name)
    }

    /// Tool names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.stubs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Descriptors of every registered tool, sorted by name (for handing to a model).
    pub fn definitions(&self) -> Vec<ToolDescriptor> {
        let mut defs: Vec<_> = self.stubs.values().map(|s| s.descriptor().clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    /// `"{plugin}-{tool}"`, the name a model runtime sees for a tool.
    pub fn qualified_name(&self, tool: &str) -> Option<String> {
        self.stubs
            .contains_key(tool)
            .then(|| format!("{}-{}", self.plugin_name, tool))
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }

    /// True once any stub's session has been torn down. All stubs share one
    /// session, so an empty registry is never stale.
    pub fn is_stale(&self) -> bool {
        self.stubs.values().any(ToolStub::is_stale)
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("plugin_name", &self.plugin_name)
            .field("tools", &self.names())
            .finish()
    }
}
