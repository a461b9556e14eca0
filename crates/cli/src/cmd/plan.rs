//! Implementation of the `kiln plan` command.
//!
//! Compiles the manifest into a provisioning plan and prints it without
//! executing anything.

use std::path::Path;

use anyhow::{Context, Result};

use kiln_lib::plan::ProvisionPlan;
use kiln_lib::util::hash::Hashable;

use crate::output::{print_info, print_json, print_stat, print_warning, symbols, truncate_hash};

pub fn cmd_plan(manifest_path: &Path, json: bool) -> Result<()> {
  let spec = super::load_manifest(manifest_path)?;
  let plan = ProvisionPlan::compile(&spec).context("Failed to compile plan")?;
  let plan_hash = plan.compute_hash().context("Failed to compute plan hash")?;

  if json {
    let steps = plan
      .steps
      .iter()
      .map(|step| {
        let hash = step.hash().context("Failed to compute step hash")?;
        Ok(serde_json::json!({
          "id": step.id,
          "hash": hash,
          "phase": step.phase,
          "action": step.action,
          "exports": step.exports,
        }))
      })
      .collect::<Result<Vec<_>>>()?;
    let floating: Vec<_> = plan
      .floating
      .iter()
      .map(|t| serde_json::json!({ "name": t.name, "pin": t.pin.to_string() }))
      .collect();
    return print_json(&serde_json::json!({ "hash": plan_hash, "steps": steps, "floating": floating }));
  }

  print_info(&format!("Plan {} ({} steps)", plan_hash, plan.steps.len()));
  for phase in plan.phases() {
    println!();
    println!("{}:", phase);
    for step in plan.phase_steps(phase) {
      let hash = step.hash().context("Failed to compute step hash")?;
      println!("  {} {} [{}]", symbols::ARROW, step.id, truncate_hash(&hash.0));
      println!("      {}", step.describe());
    }
  }

  let exports = plan.exports();
  if !exports.is_empty() {
    println!();
    println!("Exports:");
    print_stat("PATH", &exports.path_with("$PATH"));
    for (key, value) in &exports.env {
      print_stat(key, value);
    }
  }

  for tool in &plan.floating {
    print_warning(&format!(
      "{} is pinned to {}: rebuilding the image may install a different toolchain",
      tool.name, tool.pin
    ));
  }

  Ok(())
}
