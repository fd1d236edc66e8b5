//! Test doubles for code that talks to a `ToolProvider`.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::error::BridgeError;
use crate::provider::ToolProvider;
use crate::session::SessionToken;
use crate::tool::{ToolDescriptor, ToolInvocation, ToolResult};

/// Provider that serves a fixed catalog and records every invocation.
///
/// Each call answers `{"tool": <name>, "arguments": {...}}`, so callers can
/// see exactly what was dispatched.
pub struct RecordingProvider {
    catalog: Vec<ToolDescriptor>,
    invocations: Mutex<Vec<ToolInvocation>>,
    session: SessionToken,
}

impl RecordingProvider {
    pub fn new(catalog: Vec<ToolDescriptor>) -> Self {
        Self {
            catalog,
            invocations: Mutex::new(Vec::new()),
            session: SessionToken::open(),
        }
    }

    pub fn catalog(&self) -> Vec<ToolDescriptor> {
        self.catalog.clone()
    }

    /// Invocations received so far, in arrival order.
    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ToolProvider for RecordingProvider {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, BridgeError> {
        if !self.session.is_open() {
            return Err(BridgeError::Connection("recording provider closed".into()));
        }
        Ok(self.catalog.clone())
    }

    async fn call_tool(&self, invocation: ToolInvocation) -> Result<ToolResult, BridgeError> {
        if !self.session.is_open() {
            return Err(BridgeError::Connection("recording provider closed".into()));
        }
        let value = serde_json::json!({
            "tool": invocation.tool_name,
            "arguments": invocation.arguments,
        });
        if let Ok(mut calls) = self.invocations.lock() {
            calls.push(invocation);
        }
        Ok(ToolResult::new(value))
    }

    fn session(&self) -> SessionToken {
        self.session.clone()
    }

    fn provider_name(&self) -> &str {
        "recording"
    }
}
