//! Probe command — one-shot reachability and firmware report for one miner.

use std::time::Duration;

use bosflash_common::FirmwareKind;
use clap::Args;

use crate::application::ports::{NetworkProbe, NotificationSink};
use crate::application::services::probe::{
    DeviceInfo, HTTP_PORT, SSH_PORT, is_reachable, query_firmware_identity,
};
use crate::domain::firmware::FirmwareIdentity;
use crate::output::OutputContext;

/// Arguments for the probe command.
#[derive(Args)]
pub struct ProbeArgs {
    /// Miner address (IPv4 or hostname)
    pub address: String,

    /// Seconds to wait for each port connect
    #[arg(long, default_value_t = 1)]
    pub port_timeout: u64,
}

/// Findings of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub http: bool,
    pub ssh: bool,
    pub firmware: FirmwareIdentity,
}

/// Entry point for `bosflash probe`. Probe failures are part of the report.
pub async fn run(
    ctx: &OutputContext,
    args: &ProbeArgs,
    network: &impl NetworkProbe,
    sink: &impl NotificationSink,
) {
    let report = probe(network, sink, &args.address, Duration::from_secs(args.port_timeout)).await;

    ctx.kv("address", &args.address);
    ctx.kv("http", up_down(report.http));
    ctx.kv("ssh", up_down(report.ssh));
    ctx.kv("firmware", firmware_label(report.firmware.kind));
    ctx.kv("version", report.firmware.version.as_deref().unwrap_or("-"));
}

/// Probe both ports, then ask the API for the firmware identity.
pub async fn probe(
    network: &impl NetworkProbe,
    sink: &impl NotificationSink,
    address: &str,
    port_timeout: Duration,
) -> ProbeReport {
    let device = DeviceInfo::new(1, address);
    let http = is_reachable(network, sink, &device, HTTP_PORT, port_timeout).await;
    let ssh = is_reachable(network, sink, &device, SSH_PORT, port_timeout).await;
    let firmware = match query_firmware_identity(network, sink, &device, port_timeout * 5).await {
        Ok(identity) => identity,
        Err(e) => {
            tracing::debug!(address, error = %e, "identity query failed");
            FirmwareIdentity {
                kind: FirmwareKind::Unknown,
                version: None,
            }
        }
    };
    ProbeReport {
        http,
        ssh,
        firmware,
    }
}

fn up_down(up: bool) -> &'static str {
    if up { "up" } else { "down" }
}

fn firmware_label(kind: FirmwareKind) -> &'static str {
    match kind {
        FirmwareKind::UpgradedFirmware => "BraiinsOS",
        FirmwareKind::StockFirmware => "stock",
        FirmwareKind::Unknown => "unknown",
    }
}
