//! Run command — provisions the whole fleet until the operator quits.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tokio::sync::mpsc;

use crate::application::ports::NotificationSink;
use crate::application::services::orchestrator::{ChannelSink, Controller, DeviceReport, Orchestrator};
use crate::application::services::provisioning::Provisioner;
use crate::domain::control::{ConsoleCommand, ConsoleParseError, parse_console_command};
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::config::{DEFAULT_CONFIG_FILE, load_config};
use crate::infra::network::TokioNetworkProbe;
use crate::infra::ssh::OpenSshConnector;
use crate::infra::unlock::HelperUnlockAgent;
use crate::output::{NotificationPrinter, OutputContext};

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Fleet configuration file (built-in defaults when absent)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

/// What the console loop should do after one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleReply {
    /// Nothing to print (blank line, or the notification stream reports it).
    Quiet,
    Status(Vec<DeviceReport>),
    Warning(String),
    Quit,
}

/// Entry point for `bosflash run`.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded.
pub async fn run(ctx: &OutputContext, args: &RunArgs) -> Result<()> {
    let config = load_config(&args.config, std::env::vars())?;

    let runner = TokioCommandRunner::default();
    let network = TokioNetworkProbe;
    let connector = OpenSshConnector::new(runner.clone(), config.ssh.clone());
    let unlock = HelperUnlockAgent::new(runner, config.files.unlock_helper.clone());
    let (sink, mut notifications) = ChannelSink::new();

    let printer = NotificationPrinter::new(ctx.clone());
    let relay = {
        let printer = printer.clone();
        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                printer.print(&notification);
            }
        })
    };

    let provisioner = Provisioner {
        network: &network,
        connector: &connector,
        unlock: &unlock,
        sink: &sink,
        config: &config,
    };
    let (orchestrator, controller) = Orchestrator::new(provisioner, &config.devices);

    let count = controller.len();
    ctx.info(&format!(
        "Provisioning {count} {}. Commands: pause <id>, resume <id>, status, quit",
        if count == 1 { "miner" } else { "miners" }
    ));

    let shutdown = async {
        tokio::select! {
            () = console(&controller, &sink, &printer) => {}
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "cannot listen for Ctrl-C");
                }
            }
        }
    };
    orchestrator.run(shutdown).await;

    drop(sink);
    if let Err(e) = relay.await {
        tracing::debug!(error = %e, "notification relay ended abnormally");
    }
    Ok(())
}

/// Read operator commands from stdin until `quit`. EOF parks the loop so
/// provisioning keeps going.
async fn console(controller: &Controller, sink: &impl NotificationSink, printer: &NotificationPrinter) {
    let mut lines = spawn_stdin_reader();
    while let Some(line) = lines.recv().await {
        match handle_line(controller, sink, &line) {
            ConsoleReply::Quiet => {}
            ConsoleReply::Status(reports) => printer.print_status(&reports),
            ConsoleReply::Warning(msg) => printer.context().warn(&msg),
            ConsoleReply::Quit => return,
        }
    }
    tracing::debug!("stdin closed, console disabled");
    std::future::pending::<()>().await;
}

/// Forward stdin lines from a detached thread. A blocking read on the
/// runtime's pool would keep the process alive after shutdown until the
/// next line arrives.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    let spawned = std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            for line in std::io::stdin().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "cannot read stdin, console disabled");
                        return;
                    }
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "cannot start console thread, console disabled");
    }
    rx
}

/// Interpret one console line against the fleet.
pub fn handle_line(
    controller: &Controller,
    sink: &impl NotificationSink,
    line: &str,
) -> ConsoleReply {
    let outcome = match parse_console_command(line) {
        Ok(ConsoleCommand::Pause(id)) => controller.pause(id, sink).map(|_| ConsoleReply::Quiet),
        Ok(ConsoleCommand::Resume(id)) => controller.resume(id, sink).map(|_| ConsoleReply::Quiet),
        Ok(ConsoleCommand::Status) => Ok(ConsoleReply::Status(controller.status())),
        Ok(ConsoleCommand::Quit) => Ok(ConsoleReply::Quit),
        Err(ConsoleParseError::Empty) => Ok(ConsoleReply::Quiet),
        Err(e) => Ok(ConsoleReply::Warning(e.to_string())),
    };
    outcome.unwrap_or_else(|e| ConsoleReply::Warning(e.to_string()))
}
