//! Brokkr CLI - vault secret broker
//!
//! This is the main entry point for the brokkr command-line interface.

mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize rustls crypto provider (required for rustls 0.23+)
    // This must be done before any TLS operations
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    let global = cli.global();
    match cli.command {
        Commands::Get(args) => commands::get::run(args, &global).await,
        Commands::Document(args) => commands::document::run(args, &global).await,
        Commands::Signin(args) => commands::signin::run(args, &global).await,
        Commands::Register(args) => commands::register::run(args, &global).await,
        Commands::Render(args) => commands::render::run(args, &global).await,
        Commands::Status(args) => commands::status::run(args, &global).await,
        Commands::Check(cmd) => commands::check::run(cmd).await,
    }
}

/// Initialize tracing with appropriate verbosity
///
/// Logs go to stderr so secret values printed on stdout can be piped.
fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
