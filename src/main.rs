use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use transit_route::cli::Cli;

fn main() -> Result<()> {
    // Responses go to stdout; diagnostics stay on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    Cli::parse().run()
}
