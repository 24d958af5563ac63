mod cmd;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::output::{OutputFormat, print_error};

/// Environment variable holding the log filter, e.g. `PREDEX_LOG=predex_lib=debug`.
const LOG_ENV: &str = "PREDEX_LOG";

/// predex - incremental dex transform
#[derive(Parser)]
#[command(name = "predex")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
  output: OutputFormat,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Dex the given units, incrementally when a previous build is recorded
  Build {
    /// Pipeline configuration (TOML)
    #[arg(short, long)]
    config: PathBuf,

    /// Output root
    #[arg(long)]
    out: PathBuf,

    /// Ignore the recorded state and rebuild everything
    #[arg(long)]
    full: bool,

    /// Units as KIND:SCOPE:PATH, KIND being `dir` or `jar`
    #[arg(required = true)]
    units: Vec<String>,
  },

  /// Inspect or clean the artifact cache
  Cache {
    #[command(subcommand)]
    command: CacheCommands,
  },
}

#[derive(Subcommand)]
enum CacheCommands {
  /// Show entry counts and disk usage
  Stats {
    /// Take the cache root from this configuration
    #[arg(short, long)]
    config: Option<PathBuf>,
  },

  /// Remove incomplete and corrupted entries
  Clean {
    /// Take the cache root from this configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show what would be removed without removing anything
    #[arg(long)]
    dry_run: bool,

    /// Remove every entry, not just broken ones
    #[arg(long)]
    all: bool,
  },
}

fn init_tracing(verbose: bool) {
  let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
    if verbose {
      EnvFilter::new("predex_lib=debug,predex=debug")
    } else {
      EnvFilter::new("warn")
    }
  });

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let result = match cli.command {
    Commands::Build {
      config,
      out,
      full,
      units,
    } => cmd::cmd_build(&config, &out, full, &units, cli.output),
    Commands::Cache { command } => match command {
      CacheCommands::Stats { config } => cmd::cmd_cache_stats(config.as_deref(), cli.output),
      CacheCommands::Clean { config, dry_run, all } => cmd::cmd_cache_clean(config.as_deref(), dry_run, all, cli.output),
    },
  };

  if let Err(e) = result {
    print_error(&format!("{:#}", e));
    std::process::exit(1);
  }
}
