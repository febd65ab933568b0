//! CodeKG CLI entry point

use clap::Parser;
use codekg::cli::{self, Cli, Commands};
use codekg::core::error::Result;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_env("CODEKG_LOG"))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build(args) => cli::build::run(args),
        Commands::Query(args) => cli::query::run(args),
        Commands::Pack(args) => cli::pack::run(args),
        Commands::Stats(args) => cli::stats::run(args),
        Commands::Node(args) => cli::node::run(args),
    }
}
