//! CLI argument parsing with clap derive

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands;
use crate::infra::network::TokioNetworkProbe;
use crate::output::{NotificationPrinter, OutputContext};

/// Provision a fleet of Antminers with BraiinsOS
#[derive(Parser)]
#[command(
    name = "bosflash",
    version,
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Suppress notifications; errors are still shown
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Provision every configured miner until quit
    Run(commands::run::RunArgs),

    /// Report reachability and firmware of one miner
    Probe(commands::probe::ProbeArgs),

    /// Print a fresh hardware identifier
    Hwid,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn run(self) -> Result<()> {
        let Cli {
            no_color,
            quiet,
            command,
        } = self;
        let ctx = OutputContext::new(no_color, quiet);
        match command {
            Command::Run(args) => commands::run::run(&ctx, &args).await,
            Command::Probe(args) => {
                let printer = NotificationPrinter::new(ctx.clone());
                commands::probe::run(&ctx, &args, &TokioNetworkProbe, &printer).await;
                Ok(())
            }
            Command::Hwid => {
                commands::hwid::run();
                Ok(())
            }
        }
    }
}
