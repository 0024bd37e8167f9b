mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use strata_lib::consts::{CACHE_DIR_ENV, MANIFEST_FILENAME};
use strata_lib::strategy::StrategyRequest;

use cmd::CacheCommand;
use output::{OutputFormat, print_error};

/// strata - content-addressed build orchestrator
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Cache directory (default: .strata next to the manifest)
  #[arg(long, global = true, env = CACHE_DIR_ENV)]
  cache_dir: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build every unit in a manifest
  Build {
    /// Path to the unit manifest
    #[arg(default_value = MANIFEST_FILENAME)]
    manifest: PathBuf,

    /// Execution strategy: auto, sequential, parallel, or incremental
    #[arg(short, long, default_value = "auto")]
    strategy: StrategyRequest,

    /// Maximum number of actions to run at once
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Timeout for actions that declare none (e.g., "90s", "5m")
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Rebuild everything, ignoring cached results
    #[arg(long)]
    no_cache: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show the execution levels of a manifest without building
  Plan {
    /// Path to the unit manifest
    #[arg(default_value = MANIFEST_FILENAME)]
    manifest: PathBuf,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Inspect or clear the build cache
  Cache {
    #[command(subcommand)]
    command: CacheCommand,
  },

  /// Show statistics about previous builds
  History {
    /// Path to the unit manifest
    #[arg(default_value = MANIFEST_FILENAME)]
    manifest: PathBuf,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

fn main() {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "info" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  if let Err(e) = run(cli) {
    print_error(&format!("{:#}", e));
    std::process::exit(1);
  }
}

fn run(cli: Cli) -> Result<()> {
  let cache_dir = cli.cache_dir.as_deref();

  match cli.command {
    Commands::Build {
      manifest,
      strategy,
      jobs,
      timeout,
      no_cache,
      output,
    } => cmd::cmd_build(
      &manifest,
      cache_dir,
      cmd::BuildArgs {
        strategy,
        jobs,
        timeout,
        use_cache: !no_cache,
      },
      output,
    ),
    Commands::Plan { manifest, output } => cmd::cmd_plan(&manifest, output),
    Commands::Cache { command } => cmd::cmd_cache(command, cache_dir),
    Commands::History { manifest, output } => cmd::cmd_history(&manifest, cache_dir, output),
  }
}
