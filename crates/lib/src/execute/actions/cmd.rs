//! Command execution with a controlled environment.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use crate::execute::types::{ExecuteConfig, ExecuteError, OutputMode};
use crate::manifest::Exports;
use crate::platform::paths::home_dir;

/// Inherited from the parent environment when set.
const PASSTHROUGH_VARS: &[&str] = &[
  "HTTP_PROXY",
  "HTTPS_PROXY",
  "NO_PROXY",
  "http_proxy",
  "https_proxy",
  "no_proxy",
];

/// Execute a shell command.
///
/// The environment is rebuilt from scratch:
/// - `PATH` is the configured base path with `exports.path` in front
/// - `HOME`, `LANG=C`, `LC_ALL=C`, `DEBIAN_FRONTEND=noninteractive`
/// - `TMPDIR`/`TMP`/`TEMP` point at `tmp_dir`
/// - `SOURCE_DATE_EPOCH` from the config
/// - proxy variables from the parent, then `exports.env`, then `env`
///
/// Returns trimmed stdout when output is captured, an empty string otherwise.
pub async fn execute_cmd(
  cmd: &str,
  exports: &Exports,
  env: Option<&BTreeMap<String, String>>,
  cwd: &Path,
  tmp_dir: &Path,
  config: &ExecuteConfig,
) -> Result<String, ExecuteError> {
  info!(cmd = %cmd, "executing command");

  tokio::fs::create_dir_all(tmp_dir).await?;

  let (shell_cmd, shell_args) = get_shell(config.shell.as_deref());

  let mut command = Command::new(&shell_cmd);
  command
    .args(&shell_args)
    .arg(cmd)
    .current_dir(cwd)
    .env_clear()
    .env("PATH", exports.path_with(&config.base_path))
    .env("HOME", home_dir())
    .env("TMPDIR", tmp_dir)
    .env("TMP", tmp_dir)
    .env("TEMP", tmp_dir)
    .env("LANG", "C")
    .env("LC_ALL", "C")
    .env("DEBIAN_FRONTEND", "noninteractive")
    .env("SOURCE_DATE_EPOCH", config.source_date_epoch.to_string());

  for var in PASSTHROUGH_VARS {
    if let Ok(value) = std::env::var(var) {
      command.env(var, value);
    }
  }

  command.envs(&exports.env);
  if let Some(user_env) = env {
    command.envs(user_env);
  }

  debug!(shell = %shell_cmd, cwd = %cwd.display(), "spawning process");

  match config.output {
    OutputMode::Inherit => {
      let status = command
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await?;

      if !status.success() {
        return Err(ExecuteError::CmdFailed {
          cmd: cmd.to_string(),
          code: status.code(),
          output: String::new(),
        });
      }

      Ok(String::new())
    }
    OutputMode::Capture => {
      let output = command.stdin(Stdio::null()).output().await?;

      if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.is_empty() {
          debug!(stdout = %stdout, "command stdout");
        }
        return Err(ExecuteError::CmdFailed {
          cmd: cmd.to_string(),
          code: output.status.code(),
          output: String::from_utf8_lossy(&output.stderr).to_string(),
        });
      }

      let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
      if !stdout.is_empty() {
        debug!(stdout = %stdout, "command output");
      }
      Ok(stdout)
    }
  }
}

/// Get the shell command and arguments.
///
/// Provisioning always uses `/bin/sh` unless overridden, never `$SHELL`: an
/// interactive shell may source profile files and leak the host environment.
fn get_shell(override_shell: Option<&str>) -> (String, Vec<String>) {
  match override_shell {
    Some(shell) => (shell.to_string(), vec!["-c".to_string()]),
    None => ("/bin/sh".to_string(), vec!["-c".to_string()]),
  }
}
