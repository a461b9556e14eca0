//! Implementation of the `kiln provision` command.
//!
//! Runs inside the image build, once per phase. Command output goes straight
//! to the build log and the first failure fails the build.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};

use kiln_lib::execute::ExecuteConfig;
use kiln_lib::manifest::Phase;
use kiln_lib::plan::ProvisionPlan;
use kiln_lib::provision::{ProvisionOptions, provision};

use crate::output::{format_duration, print_stat, print_success, print_warning};

pub fn cmd_provision(manifest_path: &Path, phase: Option<Phase>, force: bool) -> Result<()> {
  let spec = super::load_manifest(manifest_path)?;
  let plan = ProvisionPlan::compile(&spec).context("Failed to compile plan")?;

  for tool in &plan.floating {
    print_warning(&format!("{} is pinned to {}", tool.name, tool.pin));
  }

  let options = ProvisionOptions {
    phase,
    force,
    execute: ExecuteConfig::from_env()?,
    ..ProvisionOptions::default()
  };

  let started = Instant::now();
  let rt = super::runtime()?;
  let result = rt.block_on(provision(&plan, &options)).context("Provisioning failed")?;

  let scope = phase.map(|p| p.to_string()).unwrap_or_else(|| "all phases".to_string());
  print_success(&format!("Provisioned {} in {}", scope, format_duration(started.elapsed())));
  print_stat("Completed", &result.completed.len().to_string());
  print_stat("Skipped", &result.skipped.len().to_string());

  Ok(())
}
