mod cmd;
mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// keyway - affected targets, rule keys and target hashes for build graphs
#[derive(Parser)]
#[command(name = "keyway")]
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
  /// Print the targets affected by a set of files or target names
  Targets(cmd::TargetsArgs),
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = match cli.command {
    Commands::Targets(args) => cmd::cmd_targets(args),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      output::print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}
