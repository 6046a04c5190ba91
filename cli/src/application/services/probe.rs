//! Reachability and firmware identity probes.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::time::Duration;

use bosflash_common::Notification;

use crate::application::ports::{NetworkProbe, NotificationSink};
use crate::domain::error::ProbeError;
use crate::domain::firmware::{API_PORT, FirmwareIdentity, VERSION_REQUEST, parse_version_response};

/// HTTP port; an open port means the miner is powered and booted.
pub const HTTP_PORT: u16 = 80;

/// SSH port; an open port means the administrative shell is unlocked.
pub const SSH_PORT: u16 = 22;

/// Attempts made against a refusing API port before assuming stock firmware.
pub const REFUSAL_ATTEMPTS: u32 = 3;

/// Identity of the device being probed, used to key notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// 1-based position in the configured address list.
    pub id: usize,
    pub address: String,
}

impl DeviceInfo {
    #[must_use]
    pub fn new(id: usize, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }

    /// Emit `message` for this device.
    pub fn say(&self, sink: &impl NotificationSink, message: impl Into<String>) {
        sink.notify(Notification::new(self.id, &self.address, message));
    }
}

/// Check whether `port` accepts a TCP connection within `timeout`.
///
/// Never fails: timeouts and refusals are `false`, and any other error is
/// reported to the operator and also treated as `false`.
pub async fn is_reachable(
    network: &impl NetworkProbe,
    sink: &impl NotificationSink,
    device: &DeviceInfo,
    port: u16,
    timeout: Duration,
) -> bool {
    match network.connect(&device.address, port, timeout).await {
        Ok(()) => {
            device.say(sink, format!("Connected to port {port}..."));
            true
        }
        Err(ProbeError::Timeout) => false,
        Err(e) => {
            tracing::debug!(address = %device.address, port, error = %e, "probe failed");
            device.say(sink, "Unknown error...");
            false
        }
    }
}

/// Ask the miner API which firmware it runs.
///
/// Connection refusals are retried up to [`REFUSAL_ATTEMPTS`] times in total;
/// when every attempt is refused the miner is assumed to run stock firmware.
///
/// # Errors
///
/// Returns [`ProbeError::Timeout`] when the API does not answer in time,
/// [`ProbeError::Protocol`] for a malformed response, and [`ProbeError::Io`]
/// for other network failures. None of these are retried.
pub async fn query_firmware_identity(
    network: &impl NetworkProbe,
    sink: &impl NotificationSink,
    device: &DeviceInfo,
    timeout: Duration,
) -> Result<FirmwareIdentity, ProbeError> {
    device.say(sink, "Getting version...");
    for attempt in 1..=REFUSAL_ATTEMPTS {
        match network
            .exchange(&device.address, API_PORT, VERSION_REQUEST, timeout)
            .await
        {
            Ok(raw) => {
                device.say(sink, "Received data...");
                let identity = parse_version_response(&raw)?;
                if let Some(version) = &identity.version {
                    device.say(sink, format!("Version is {version}..."));
                }
                return Ok(identity);
            }
            Err(ProbeError::ConnectionRefused) => {
                tracing::debug!(address = %device.address, attempt, "API connection refused");
                device.say(sink, "Connection refused, retrying...");
            }
            Err(ProbeError::Timeout) => {
                device.say(sink, "Get version failed...");
                return Err(ProbeError::Timeout);
            }
            Err(e) => return Err(e),
        }
    }
    device.say(sink, "API unavailable, assuming stock firmware...");
    Ok(FirmwareIdentity::stock_fallback())
}
