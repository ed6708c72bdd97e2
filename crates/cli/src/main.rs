mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cmd::{BuildArgs, BuildFlags};
use mtpack_lib::pipeline::PipelineError;

use crate::output::{OutputFormat, Status, print_status};

/// mtpack - freeze and package a desktop Python app per platform and GPU variant
#[derive(Parser)]
#[command(name = "mtpack")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Freeze the application and package it into an archive
  Build(BuildArgs),

  /// Stage the runtime client bundle into the app's assets
  Bundle {
    /// Project root containing mtpack.toml
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Python interpreter to probe instead of `uv run python`
    #[arg(long)]
    python: Option<PathBuf>,

    /// Restage even if the bundle is up to date
    #[arg(short, long)]
    force: bool,
  },

  /// Show the resolved build configuration and dependency manifest
  Resolve {
    #[command(flatten)]
    flags: BuildFlags,

    /// Project root containing mtpack.toml
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },

  /// Show host platform and naming information
  Info {
    /// Project root containing mtpack.toml
    #[arg(long, default_value = ".")]
    project_dir: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t)]
    output: OutputFormat,
  },
}

fn main() {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if let Err(err) = run(cli.command) {
    print_status(Status::Error, &format!("{:#}", err));
    std::process::exit(exit_code(&err));
  }
}

/// 130 for an interrupted build, as a shell reports SIGINT; 1 otherwise.
fn exit_code(err: &anyhow::Error) -> i32 {
  match err.downcast_ref::<PipelineError>() {
    Some(PipelineError::Interrupted) => 130,
    _ => 1,
  }
}

fn run(command: Commands) -> Result<()> {
  match command {
    Commands::Build(args) => cmd::cmd_build(&args),
    Commands::Bundle {
      project_dir,
      python,
      force,
    } => cmd::cmd_bundle(&project_dir, python, force),
    Commands::Resolve {
      flags,
      project_dir,
      output,
    } => cmd::cmd_resolve(&flags, &project_dir, output),
    Commands::Info { project_dir, output } => cmd::cmd_info(&project_dir, output),
  }
}
