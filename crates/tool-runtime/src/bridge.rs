//! The tool bridge: discover a provider's catalog and expose every tool as a
//! locally callable stub.
//!
//! ```text
//! provider ──list_tools──▶ [ToolDescriptor] ──build──▶ ToolRegistry
//!                                                        │ invoke(name, args)
//! provider ◀──call_tool── ToolInvocation ◀── ToolStub ◀──┘
//! ```
//!
//! The bridge never owns the transport. Session establishment and teardown
//! belong to the provider; the bridge only reads the session token to decide
//! whether it is `Ready` or `Disconnected`.

use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use toolbridge_core::RegistryConfig;

use crate::error::BridgeError;
use crate::provider::ToolProvider;
use crate::registry::ToolRegistry;
use crate::session::BridgeState;
use crate::tool::{ToolDescriptor, ToolResult};

/// Fetch the provider's catalog. Only valid while its session is open.
pub async fn discover_tools(provider: &dyn ToolProvider) -> Result<Vec<ToolDescriptor>, BridgeError> {
    if !provider.session().is_open() {
        return Err(BridgeError::Connection(format!(
            "{} provider session is not established",
            provider.provider_name()
        )));
    }
    let tools = provider.list_tools().await?;
    info!(
        provider = %provider.provider_name(),
        count = tools.len(),
        "Tool discovery complete"
    );
    Ok(tools)
}

/// Build a registry of stubs bound to `provider`.
pub fn build_registry(
    provider: Arc<dyn ToolProvider>,
    descriptors: Vec<ToolDescriptor>,
    config: &RegistryConfig,
) -> Result<ToolRegistry, BridgeError> {
    ToolRegistry::build(provider, descriptors, config)
}

/// Invoke a tool by name through a registry.
pub async fn invoke(
    registry: &ToolRegistry,
    name: &str,
    arguments: Value,
) -> Result<ToolResult, BridgeError> {
    registry.invoke(name, arguments).await
}

/// One provider session seen through the bridge.
pub struct ToolBridge {
    provider: Arc<dyn ToolProvider>,
    config: RegistryConfig,
}

impl ToolBridge {
    pub fn new(provider: Arc<dyn ToolProvider>) -> Self {
        Self {
            provider,
            config: RegistryConfig::default(),
        }
    }

    /// Set the plugin name and duplicate policy used for built registries.
    pub fn with_config(mut self, config: RegistryConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the plugin name tools are grouped under.
    pub fn with_plugin_name(mut self, name: impl Into<String>) -> Self {
        self.config.plugin_name = name.into();
        self
    }

    pub fn state(&self) -> BridgeState {
        self.provider.session().state()
    }

    pub fn provider(&self) -> &Arc<dyn ToolProvider> {
        &self.provider
    }

    pub async fn discover_tools(&self) -> Result<Vec<ToolDescriptor>, BridgeError> {
        discover_tools(self.provider.as_ref()).await
    }

    pub fn build_registry(&self, descriptors: Vec<ToolDescriptor>) -> Result<ToolRegistry, BridgeError> {
        build_registry(Arc::clone(&self.provider), descriptors, &self.config)
    }

    /// Discover the catalog and build a registry from it in one step.
    pub async fn integrate_tools(&self) -> Result<ToolRegistry, BridgeError> {
        let descriptors = self.discover_tools().await?;
        let registry = self.build_registry(descriptors)?;
        info!(
            plugin = %registry.plugin_name(),
            tools = ?registry.names(),
            "Tools integrated"
        );
        Ok(registry)
    }
}
