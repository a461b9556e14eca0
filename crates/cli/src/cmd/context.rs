//! Implementation of the `kiln context` command.
//!
//! Shows what the release driver would see if started here: its working
//! directory, the driver variables (credentials redacted) and the resolved
//! configuration.

use anyhow::{Context, Result};

use kiln_lib::driver::{ReleaseConfig, ReleaseInvocation};

use crate::output::{print_json, print_stat, print_warning};

pub fn cmd_context(json: bool) -> Result<()> {
  let invocation = ReleaseInvocation::capture().context("Working directory is not accessible")?;
  let config = ReleaseConfig::load(&invocation.cwd);

  if json {
    let config = match &config {
      Ok(config) => serde_json::to_value(config).context("Failed to serialize configuration")?,
      Err(err) => serde_json::json!({ "error": err.to_string() }),
    };
    return print_json(&serde_json::json!({ "invocation": invocation, "config": config }));
  }

  print_stat("Working directory", &invocation.cwd.display().to_string());
  print_stat("Command line", &invocation.args.join(" "));
  if !invocation.env.is_empty() {
    println!();
    println!("Environment:");
    for (key, value) in &invocation.env {
      print_stat(key, value);
    }
  }

  println!();
  match config {
    Ok(config) => {
      println!("Configuration:");
      print_stat("Name", config.name.as_deref().unwrap_or("(from Cargo.toml)"));
      let version = config.version.as_ref().map(|v| v.to_string());
      print_stat("Version", version.as_deref().unwrap_or("(from Cargo.toml)"));
      print_stat("Targets", &config.targets.join(", "));
      print_stat("Profile", &config.profile);
      print_stat("Output", &config.output_dir.display().to_string());
      match &config.publish {
        Some(publish) => print_stat("Publish", &format!("{} (token from {})", publish.url, publish.token_env)),
        None => print_stat("Publish", "disabled"),
      }
    }
    Err(err) => print_warning(&format!("Configuration is invalid: {}", err)),
  }

  Ok(())
}
