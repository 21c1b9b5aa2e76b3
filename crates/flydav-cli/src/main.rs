#![deny(unsafe_code)]

mod commands;
mod logging;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{hash_password, serve};

/// Scope-authorized WebDAV file server
#[derive(Parser)]
#[command(name = "flydav")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Serve using a config file
    flydav serve --config /etc/flydav.toml

    # Override the port and storage directory
    flydav serve -c flydav.toml --port 8080 --base-dir /srv/files

    # Produce a bcrypt hash for the config file
    flydav hash-password
")]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the file server
    Serve(serve::Args),

    /// Hash a password for the [[auth.users]] section
    HashPassword(hash_password::Args),
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve(args) => serve::run(args, cli.verbose, cli.quiet),
        Commands::HashPassword(args) => hash_password::run(&args),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
