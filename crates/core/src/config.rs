use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_parsed<T: FromStr + Default>(profile: &str, key: &str) -> T {
    match profiled_env_opt(profile, key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key = %key, value = %raw, "Unrecognised config value, using default");
            T::default()
        }),
        None => T::default(),
    }
}

// ── Enums ─────────────────────────────────────────────────────

/// How the client reaches a tool provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// REST provider (`GET /tools`, `POST /execute`).
    #[default]
    Http,
    /// MCP JSON-RPC over the stdio of a spawned provider process.
    Stdio,
    /// MCP JSON-RPC over HTTP: server-sent events down, posted messages up.
    Sse,
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "stdio" => Ok(Self::Stdio),
            "sse" => Ok(Self::Sse),
            other => Err(format!("unknown transport '{}'", other)),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => f.write_str("http"),
            Self::Stdio => f.write_str("stdio"),
            Self::Sse => f.write_str("sse"),
        }
    }
}

/// What to do when a provider reports the same tool name twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Fail registry construction with a schema error.
    #[default]
    Reject,
    /// Keep the descriptor that appears last in the catalog.
    LastWriteWins,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "last_write_wins" | "last-write-wins" | "overwrite" => Ok(Self::LastWriteWins),
            other => Err(format!("unknown duplicate policy '{}'", other)),
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reject => f.write_str("reject"),
            Self::LastWriteWins => f.write_str("last_write_wins"),
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Active profile name (empty = default).
    pub profile: String,
    pub provider: ProviderConfig,
    pub server: ServerConfig,
    pub registry: RegistryConfig,
}

impl BridgeConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TOOLBRIDGE_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("TOOLBRIDGE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            provider: ProviderConfig::from_env_profiled(p),
            server: ServerConfig::from_env_profiled(p),
            registry: RegistryConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  provider:  transport={}, url={}, timeout={}s",
            self.provider.transport,
            self.provider.url,
            self.provider.request_timeout_secs
        );
        tracing::info!("  command:   {}", self.provider.command);
        tracing::info!("  server:    {}:{}", self.server.host, self.server.port);
        tracing::info!(
            "  registry:  plugin={}, duplicates={}",
            self.registry.plugin_name,
            self.registry.duplicate_tools
        );
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            provider: ProviderConfig::default(),
            server: ServerConfig::default(),
            registry: RegistryConfig::default(),
        }
    }
}

// ── Provider (client side) ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub transport: TransportKind,
    /// Base URL of a REST or SSE provider.
    pub url: String,
    /// Command line used to spawn a stdio provider.
    pub command: String,
    pub request_timeout_secs: u64,
}

impl ProviderConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            transport: profiled_env_parsed(p, "PROVIDER_TRANSPORT"),
            url: profiled_env_or(p, "PROVIDER_URL", DEFAULT_PROVIDER_URL),
            command: profiled_env_or(p, "PROVIDER_COMMAND", DEFAULT_PROVIDER_COMMAND),
            request_timeout_secs: profiled_env_u64(p, "REQUEST_TIMEOUT_SECS", 30),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Split `command` into program and arguments on whitespace.
    pub fn command_parts(&self) -> Option<(String, Vec<String>)> {
        let mut parts = self.command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some((program, parts.collect()))
    }
}

const DEFAULT_PROVIDER_URL: &str = "http://localhost:8080";
const DEFAULT_PROVIDER_COMMAND: &str = "toolbridge-provider --transport stdio";

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Http,
            url: DEFAULT_PROVIDER_URL.to_string(),
            command: DEFAULT_PROVIDER_COMMAND.to_string(),
            request_timeout_secs: 30,
        }
    }
}

// ── Server (provider side) ────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PROVIDER_HOST", "127.0.0.1"),
            port: profiled_env_u16(p, "PROVIDER_PORT", 8080),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

// ── Registry ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Namespace the discovered tools are grouped under.
    pub plugin_name: String,
    pub duplicate_tools: DuplicatePolicy,
}

impl RegistryConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            plugin_name: profiled_env_or(p, "PLUGIN_NAME", DEFAULT_PLUGIN_NAME),
            duplicate_tools: profiled_env_parsed(p, "DUPLICATE_TOOLS"),
        }
    }
}

pub const DEFAULT_PLUGIN_NAME: &str = "MCPPlugin";

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            plugin_name: DEFAULT_PLUGIN_NAME.to_string(),
            duplicate_tools: DuplicatePolicy::Reject,
        }
    }
}
