//! Tool bridge runtime: descriptors, schemas, stubs and the registry that
//! dispatches them to a `ToolProvider`.

pub mod bridge;
pub mod catalog;
pub mod error;
pub mod provider;
pub mod registry;
pub mod schema;
pub mod session;
pub mod tool;
pub mod tools;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use bridge::{build_registry, discover_tools, invoke, ToolBridge};
pub use catalog::{CatalogError, LocalProvider, ToolCatalog};
pub use error::BridgeError;
pub use provider::ToolProvider;
pub use registry::{ToolRegistry, ToolStub};
pub use schema::ParameterSchema;
pub use session::{BridgeState, SessionToken};
pub use tool::{Tool, ToolArguments, ToolDescriptor, ToolError, ToolInvocation, ToolResult};
pub use toolbridge_core::{DuplicatePolicy, RegistryConfig};
pub use tools::{demo_catalog, AddTool, EchoTool, ReverseTool};
