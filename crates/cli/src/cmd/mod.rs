mod context;
mod info;
mod plan;
mod provision;
mod release;
mod render;
mod verify;

pub use context::cmd_context;
pub use info::cmd_info;
pub use plan::cmd_plan;
pub use provision::cmd_provision;
pub use release::cmd_release;
pub use render::cmd_render;
pub use verify::cmd_verify;

use std::path::Path;

use anyhow::{Context, Result};

use kiln_lib::manifest::ToolchainSpec;

fn load_manifest(path: &Path) -> Result<ToolchainSpec> {
  ToolchainSpec::load(path).with_context(|| format!("Failed to load manifest: {}", path.display()))
}

fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}
