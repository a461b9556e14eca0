//! Containerfile rendering.
//!
//! The image is built by the driver itself: it is copied in first, then run
//! once per phase against the copied manifest so every phase lands in its own
//! layer. Nothing is piped into a shell.

use std::fmt::Write;
use std::path::Path;

use crate::consts::APP_NAME;
use crate::manifest::ToolchainSpec;
use crate::plan::ProvisionPlan;

/// Render the Containerfile building the image described by `spec`.
///
/// `manifest_source` is the manifest's path inside the build context.
pub fn render_containerfile(spec: &ToolchainSpec, plan: &ProvisionPlan, manifest_source: &Path) -> String {
  let driver = spec.driver.path.display().to_string();
  let manifest = spec.driver.manifest_path.display().to_string();
  let mut out = String::new();

  let _ = writeln!(out, "# Generated by {}. Edit the manifest, not this file.", APP_NAME);
  let _ = writeln!(out, "FROM {}:{}", spec.image.base, spec.image.version);
  let _ = writeln!(out);
  let _ = writeln!(out, "COPY {} {}", spec.driver.source.display(), driver);
  let _ = writeln!(out, "RUN {}", exec_form(&["chmod", "0755", &driver]));
  let _ = writeln!(out, "COPY {} {}", manifest_source.display(), manifest);

  for phase in plan.phases() {
    let _ = writeln!(
      out,
      "RUN {}",
      exec_form(&[&driver, "provision", "--manifest", &manifest, "--phase", phase.as_str()])
    );
  }

  let exports = plan.exports();
  if !exports.path.is_empty() {
    let _ = writeln!(out, "ENV PATH={}", quote(&exports.path_with("$PATH")));
  }
  for (key, value) in &exports.env {
    let _ = writeln!(out, "ENV {}={}", key, quote(value));
  }

  let _ = writeln!(out, "RUN {}", exec_form(&[&driver, "verify", "--manifest", &manifest]));

  for (key, value) in &spec.image.labels {
    let _ = writeln!(out, "LABEL {}={}", quote(key), quote(value));
  }
  for tool in &plan.floating {
    let _ = writeln!(
      out,
      "LABEL {}={}",
      quote(&format!("{}.floating.{}", APP_NAME, tool.name)),
      quote(&tool.pin.to_string())
    );
  }

  let _ = writeln!(out);
  let _ = writeln!(out, "WORKDIR {}", spec.image.workdir.display());
  let _ = writeln!(out, "ENTRYPOINT {}", exec_form(&[&driver]));

  out
}

fn quote(value: &str) -> String {
  format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn exec_form(args: &[&str]) -> String {
  let args: Vec<String> = args.iter().map(|a| quote(a)).collect();
  format!("[{}]", args.join(", "))
}
