// Lockbox - Application Entry Point
//
// Parses CLI arguments, initializes structured logging (stderr only, with a
// filter that never emits secret values), and dispatches to the command
// handler.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use lockbox::cli::{execute, Cli};

fn main() {
    // RUST_LOG=lockbox=debug for verbose output. Stdout stays reserved for
    // command output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lockbox=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = execute(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
