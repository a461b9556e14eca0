//! Implementation of the `kiln render` command.

use std::path::Path;

use anyhow::{Context, Result};

use kiln_lib::plan::ProvisionPlan;
use kiln_lib::render::render_containerfile;

use crate::output::print_success;

pub fn cmd_render(manifest_path: &Path, output: Option<&Path>) -> Result<()> {
  let spec = super::load_manifest(manifest_path)?;
  let plan = ProvisionPlan::compile(&spec).context("Failed to compile plan")?;

  // The manifest is copied from the build context, which is its own directory.
  let manifest_source = manifest_path.file_name().map(Path::new).unwrap_or(manifest_path);
  let containerfile = render_containerfile(&spec, &plan, manifest_source);

  match output {
    Some(path) => {
      std::fs::write(path, &containerfile).with_context(|| format!("Failed to write {}", path.display()))?;
      print_success(&format!("Wrote {}", path.display()));
    }
    None => print!("{}", containerfile),
  }

  Ok(())
}
