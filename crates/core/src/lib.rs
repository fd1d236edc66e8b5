pub mod config;

pub use config::{BridgeConfig, DuplicatePolicy, ProviderConfig, RegistryConfig, ServerConfig, TransportKind};
