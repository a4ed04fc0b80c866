//! Autodidact - desktop voice/text assistant

use autodidact::cli::{self, Cli};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // INFO for this crate by default; RUST_LOG overrides, --verbose raises to DEBUG
    let default_directive = if cli.verbose { "autodidact=debug" } else { "autodidact=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    cli::run(cli).await
}
