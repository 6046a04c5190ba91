use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a provisioned device.
///
/// There is no terminal state: `Done` loops back to `Start` once the device
/// has been physically disconnected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeviceState {
    #[default]
    Start,
    Install,
    Update,
    Referral,
    Done,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Install => "install",
            Self::Update => "update",
            Self::Referral => "referral",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// Classification of the firmware a device is currently running.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FirmwareKind {
    /// BraiinsOS (bosminer family) is already installed.
    UpgradedFirmware,
    /// Factory firmware (cgminer / bmminer family).
    StockFirmware,
    Unknown,
}

/// Observable snapshot of one device's progress.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DeviceStatus {
    pub state: DeviceState,
    /// Set once a destructive step failed; the device needs a manual reset.
    pub stalled: bool,
}

/// Status message emitted by a device task, keyed by device id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    /// 1-based device position in the configured address list.
    pub device_id: usize,
    pub address: String,
    pub message: String,
    pub emitted_at: DateTime<Utc>,
}

impl Notification {
    #[must_use]
    pub fn new(device_id: usize, address: &str, message: impl Into<String>) -> Self {
        Self {
            device_id,
            address: address.to_string(),
            message: message.into(),
            emitted_at: Utc::now(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] - {}", self.address, self.message)
    }
}
