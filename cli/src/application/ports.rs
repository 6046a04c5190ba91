//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain` and the shared types crate —
//! never from `crate::infra`, `crate::commands`, or `crate::output`.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use anyhow::Result;
use bosflash_common::Notification;

use crate::domain::error::{ProbeError, TransportError};

// ── Value Types ───────────────────────────────────────────────────────────────

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `None` when the remote side reported none (killed by signal).
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// `true` when the command printed nothing on either stream.
    #[must_use]
    pub fn is_silent(&self) -> bool {
        self.stdout.trim().is_empty() && self.stderr.trim().is_empty()
    }
}

// ── Network Probe Port ────────────────────────────────────────────────────────

/// Raw TCP access to a device, so probe logic can be tested without sockets.
#[allow(async_fn_in_trait)]
pub trait NetworkProbe {
    /// Open a connection to `address:port` and close it immediately.
    async fn connect(&self, address: &str, port: u16, timeout: Duration) -> Result<(), ProbeError>;

    /// Connect, send `request`, and read one response buffer. `timeout`
    /// bounds the whole exchange.
    async fn exchange(
        &self,
        address: &str,
        port: u16,
        request: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, ProbeError>;
}

// ── Remote Session Ports ──────────────────────────────────────────────────────

/// An authenticated remote shell + file-transfer channel bound to one device.
#[allow(async_fn_in_trait)]
pub trait RemoteSession {
    /// Execute one command in the remote shell.
    ///
    /// A non-zero exit is reported through [`CommandOutput::exit_code`], not
    /// as an error. [`TransportError::Disconnected`] means the channel is
    /// stale; [`TransportError::Timeout`] means the local client gave up.
    async fn run(&self, command: &str) -> Result<CommandOutput, TransportError>;

    /// Upload a single file, replacing `remote` atomically.
    async fn upload_file(&self, local: &Path, remote: &str) -> Result<(), TransportError>;

    /// Recursively upload `local`, preserving its relative layout under `remote`.
    async fn upload_directory(&self, local: &Path, remote: &str) -> Result<(), TransportError>;

    /// Copy a remote file to `local`.
    async fn download_file(&self, remote: &str, local: &Path) -> Result<(), TransportError>;

    /// Tear the channel down. Errors are swallowed: the device may already be gone.
    async fn close(self);
}

/// Opens [`RemoteSession`]s. Shared by all devices; each device owns the
/// sessions it opens.
#[allow(async_fn_in_trait)]
pub trait SessionConnector {
    type Session: RemoteSession;

    /// Authenticate and open a new session to `address`.
    async fn connect(&self, address: &str) -> Result<Self::Session, TransportError>;
}

// ── Unlock Port ───────────────────────────────────────────────────────────────

/// One-shot SSH unlock of a locked miner.
#[allow(async_fn_in_trait)]
pub trait UnlockAgent {
    /// Returns `Ok(true)` when SSH was unlocked, `Ok(false)` when the miner
    /// needs a manual factory reset first.
    ///
    /// # Errors
    ///
    /// Returns an error if the helper could not be run at all.
    async fn unlock(&self, address: &str) -> Result<bool>;
}

// ── Notification Port ─────────────────────────────────────────────────────────

/// Outward status stream consumed by whatever presentation layer exists.
/// Sync trait — implementations must tolerate calls from every device task.
pub trait NotificationSink {
    fn notify(&self, notification: Notification);
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
    /// Run a program with stdin piped from `input`, bounded by `timeout`.
    async fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        input: &[u8],
        timeout: Duration,
    ) -> Result<Output>;
    /// Run a program with extra environment variables, bounded by `timeout`.
    ///
    /// Values are secrets (`SSHPASS`): they must not reach argv or logs.
    async fn run_with_env(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Output>;
}
