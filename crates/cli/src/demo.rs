//! The client demo: integrate a provider's tools, list them and call
//! `reverse` and `add`.

use anyhow::{Context, Result};
use serde_json::{json, Number};
use std::io::Write;
use std::sync::Arc;

use toolbridge_runtime::{RegistryConfig, ToolBridge, ToolProvider};

/// What the demo should do once tools are integrated.
#[derive(Debug, Clone)]
pub struct DemoRequest {
    pub input: String,
    pub a: Number,
    pub b: Number,
    /// Stop after printing the tool list.
    pub list_only: bool,
}

impl Default for DemoRequest {
    fn default() -> Self {
        Self {
            input: "Python is fun!".to_string(),
            a: Number::from(123),
            b: Number::from(456),
            list_only: false,
        }
    }
}

/// Run the demo against `provider`, writing human-readable lines to `out`.
///
/// Does not tear the session down; the caller owns the provider.
pub async fn run_demo(
    provider: Arc<dyn ToolProvider>,
    config: RegistryConfig,
    request: &DemoRequest,
    out: &mut impl Write,
) -> Result<()> {
    let bridge = ToolBridge::new(provider).with_config(config);
    let registry = bridge
        .integrate_tools()
        .await
        .context("failed to integrate provider tools")?;

    writeln!(out, "Tools in plugin '{}':", registry.plugin_name())?;
    for def in registry.definitions() {
        writeln!(out, "  {}", def)?;
    }
    if request.list_only {
        return Ok(());
    }

    let reversed = registry
        .invoke("reverse", json!({ "input": request.input }))
        .await
        .context("reverse failed")?;
    writeln!(out, "reverse({:?}) = {}", request.input, reversed)?;

    let sum = registry
        .invoke("add", json!({ "a": request.a, "b": request.b }))
        .await
        .context("add failed")?;
    writeln!(out, "add({}, {}) = {}", request.a, request.b, sum)?;

    Ok(())
}
