//! refresh CLI - live reload server.
//!
//! Provides commands for:
//! - `serve`: Watch a directory and push reloads to connected browsers

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::ServeArgs;
use error::CliError;
use output::Output;

/// Application version from Cargo.toml.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// refresh - Live reload server.
#[derive(Parser)]
#[command(name = "refresh", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch a directory and serve reload notifications.
    Serve(ServeArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    let result = match cli.command {
        Commands::Serve(args) => serve(&args),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}

fn serve(args: &ServeArgs) -> Result<(), CliError> {
    let config = args.load_config()?;
    init_tracing(config.verbose);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(ServeArgs::execute(config, VERSION))
}

/// Initialize tracing.
///
/// Verbose mode enables INFO level, otherwise use `RUST_LOG` or default to WARN.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
