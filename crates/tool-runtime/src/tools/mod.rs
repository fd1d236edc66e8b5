//! Demo tools served by the example providers.
//!
//! - **Text tools** (`echo`, `reverse`): take a single `input` string
//! - **Math tools** (`add`): numeric operands `a` and `b`

pub mod math;
pub mod text;

pub use math::AddTool;
pub use text::{EchoTool, ReverseTool};

use crate::catalog::{CatalogError, ToolCatalog};

/// Catalog holding every demo tool.
pub fn demo_catalog() -> Result<ToolCatalog, CatalogError> {
    let mut catalog = ToolCatalog::new();
    catalog.register(EchoTool)?;
    catalog.register(ReverseTool)?;
    catalog.register(AddTool)?;
    Ok(catalog)
}
