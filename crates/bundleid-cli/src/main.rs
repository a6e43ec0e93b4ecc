//! Command-line interface for bundleid.
//!
//! Exit status: `0` collision-free, `1` duplicates remain, `2` invalid input
//! (descriptor, classification, base identifier, override map), `3` I/O or
//! archive failure.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "bundleid=debug"
    } else if quiet {
        "warn"
    } else {
        "bundleid=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn run(cli: Cli) -> bundleid::Result<i32> {
    match cli.command {
        Commands::Resolve(args) => commands::resolve(args),
        Commands::ApplyBundle(args) => commands::apply_bundle(args),
        Commands::ApplyArchive(args) => commands::apply_archive(args),
        Commands::Validate(args) => commands::validate(args),
    }
}
