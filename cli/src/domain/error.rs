//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// ── Probe errors ──────────────────────────────────────────────────────────────

/// Failures of a read-only network query against a device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("timed out")]
    Timeout,

    #[error("connection refused")]
    ConnectionRefused,

    #[error("malformed response: {0}")]
    Protocol(String),

    #[error("network error: {0}")]
    Io(String),
}

// ── Transport errors ──────────────────────────────────────────────────────────

/// Failures of the remote shell / file-transfer channel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The channel went away underneath us. The only variant that triggers a
    /// reconnect.
    #[error("session disconnected: {0}")]
    Disconnected(String),

    /// The local client gave up waiting and was killed. Never retried: the
    /// remote command may still be running or may have run partway.
    #[error("remote command timed out: {0}")]
    Timeout(String),

    #[error("could not open session: {0}")]
    Connect(String),

    #[error("command `{command}` exited with {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("transfer failed: {0}")]
    Transfer(String),
}

// ── Process errors ────────────────────────────────────────────────────────────

/// A local child process outlived its budget and was killed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{program} timed out after {}s", .after.as_secs())]
pub struct CommandTimedOut {
    pub program: String,
    pub after: Duration,
}

// ── Provisioning errors ───────────────────────────────────────────────────────

/// Failures that stop a device's provisioning run.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("SSH unlock failed, please reset miner with reset button")]
    UnlockRequiresManualReset,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("local file not found: {}", .0.display())]
    MissingLocalFile(PathBuf),
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to fleet configuration validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No devices configured. Add at least one address under `devices:`.")]
    NoDevices,

    #[error("Invalid device address '{0}'")]
    InvalidAddress(String),

    #[error("Device address '{0}' is listed more than once")]
    DuplicateAddress(String),

    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

// ── Operator control errors ───────────────────────────────────────────────────

/// Errors from operator commands addressed to a device id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    #[error("No device with id {0}")]
    UnknownDevice(usize),
}
