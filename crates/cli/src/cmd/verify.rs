//! Implementation of the `kiln verify` command.

use std::path::Path;

use anyhow::{Result, bail};

use kiln_lib::execute::ExecuteConfig;
use kiln_lib::verify::verify;

use crate::output::{print_error, print_json, print_success, symbols};

pub fn cmd_verify(manifest_path: &Path, json: bool) -> Result<()> {
  let spec = super::load_manifest(manifest_path)?;
  let rt = super::runtime()?;
  let config = ExecuteConfig::from_env()?;
  let report = rt.block_on(verify(&spec, &config));

  if json {
    print_json(&report)?;
  } else {
    for binary in &report.binaries {
      match &binary.found {
        Some(path) => println!("  {} {} ({})", symbols::SUCCESS, binary.binary, path.display()),
        None => println!("  {} {} (from {})", symbols::ERROR, binary.binary, binary.tool),
      }
    }
    for check in report.checks.iter().filter(|c| c.passed) {
      println!("  {} {}: {}", symbols::SUCCESS, check.tool, check.output);
    }
  }

  if !report.is_ok() {
    for failure in report.failures() {
      print_error(&failure);
    }
    bail!("Verification failed");
  }

  if !json {
    print_success(&format!("Entry point {} is launchable", report.entrypoint.display()));
  }
  Ok(())
}
