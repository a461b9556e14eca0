use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use kiln_lib::consts::MANIFEST_FILENAME;
use kiln_lib::manifest::Phase;

mod cmd;
mod output;

/// kiln - reproducible build environments and release driver
///
/// Started without a subcommand, kiln runs the release driver in the current
/// directory. This is how the build image invokes it.
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose (debug) logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Args)]
struct ManifestArgs {
  /// Path to the toolchain manifest
  #[arg(short, long, env = "KILN_MANIFEST", default_value = MANIFEST_FILENAME)]
  manifest: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
  /// Build, package and publish the project in the working directory (default)
  Release {
    /// Build and package only, skip publishing
    #[arg(long)]
    no_publish: bool,
  },

  /// Show the provisioning plan compiled from the manifest
  Plan {
    #[command(flatten)]
    manifest: ManifestArgs,

    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Print the Containerfile building the image
  Render {
    #[command(flatten)]
    manifest: ManifestArgs,

    /// Write to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Install the manifest's toolchain set (run inside the image build)
  Provision {
    #[command(flatten)]
    manifest: ManifestArgs,

    /// Only run this phase (refresh, prerequisites, compilers, toolchains)
    #[arg(long)]
    phase: Option<Phase>,

    /// Re-run steps that already completed
    #[arg(long)]
    force: bool,
  },

  /// Check that every declared tool is installed and the entry point is launchable
  Verify {
    #[command(flatten)]
    manifest: ManifestArgs,

    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Show the driver's working directory, environment and resolved configuration
  Context {
    /// Output as JSON
    #[arg(long)]
    json: bool,
  },

  /// Display platform and path information
  Info,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match run(cli) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      output::print_error(&format!("{:#}", err));
      ExitCode::from(1)
    }
  }
}

fn run(cli: Cli) -> Result<()> {
  match cli.command.unwrap_or(Commands::Release { no_publish: false }) {
    Commands::Release { no_publish } => cmd::cmd_release(no_publish),
    Commands::Plan { manifest, json } => cmd::cmd_plan(&manifest.manifest, json),
    Commands::Render { manifest, output } => cmd::cmd_render(&manifest.manifest, output.as_deref()),
    Commands::Provision { manifest, phase, force } => cmd::cmd_provision(&manifest.manifest, phase, force),
    Commands::Verify { manifest, json } => cmd::cmd_verify(&manifest.manifest, json),
    Commands::Context { json } => cmd::cmd_context(json),
    Commands::Info => {
      cmd::cmd_info();
      Ok(())
    }
  }
}
