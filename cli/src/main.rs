//! bosflash - provision Antminers with BraiinsOS

#![cfg_attr(test, allow(clippy::expect_used))]

use bosflash_cli::cli::Cli;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let ansi =
        !cli.no_color && std::env::var_os("NO_COLOR").is_none() && console::Term::stderr().is_term();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_ansi(ansi)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli.run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
