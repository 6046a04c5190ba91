//! Application service — the per-device provisioning state machine.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! All I/O is routed through injected port traits.
//!
//! | State    | Entry action                                  | Next                         |
//! |----------|-----------------------------------------------|------------------------------|
//! | Start    | probe HTTP; if down stay                       | probe SSH                    |
//! |          | SSH up: query firmware                         | upgraded → Update, else Install |
//! |          | SSH down: unlock                               | ok → Install, else wait for disconnect |
//! | Install  | run the fixed install plan                    | Referral                     |
//! | Update   | upload archive, `sysupgrade`, wait for reboot | Referral                     |
//! | Referral | install referral package if present locally   | Done                         |
//! | Done     | wait until the miner stops answering          | Start                        |

use std::path::Path;

use bosflash_common::{DeviceState, FirmwareKind};

use crate::application::ports::{
    CommandOutput, NetworkProbe, NotificationSink, SessionConnector, UnlockAgent,
};
use crate::application::services::device::Device;
use crate::application::services::probe::{
    HTTP_PORT, SSH_PORT, is_reachable, query_firmware_identity,
};
use crate::domain::config::FleetConfig;
use crate::domain::error::{ProvisionError, TransportError};

/// Collaborators shared by every device task.
pub struct Provisioner<'a, N, C, U, K> {
    pub network: &'a N,
    pub connector: &'a C,
    pub unlock: &'a U,
    pub sink: &'a K,
    pub config: &'a FleetConfig,
}

impl<N, C, U, K> Provisioner<'_, N, C, U, K>
where
    N: NetworkProbe,
    C: SessionConnector,
    U: UnlockAgent,
    K: NotificationSink,
{
    /// Drive `device` forever, one state per tick.
    ///
    /// Only returns when a destructive step fails; the device is then marked
    /// stalled and needs a manual reset plus a restart of the whole run.
    pub async fn run(&self, device: &mut Device<C::Session>) -> ProvisionError {
        loop {
            tokio::time::sleep(self.config.timings.tick()).await;
            if let Err(e) = self.step(device).await {
                tracing::error!(device = device.info.id, address = %device.info.address, error = %e, state = %device.state(), "provisioning stalled");
                device.say_to(
                    self.sink,
                    format!("{e}. Reset the miner and restart bosflash..."),
                );
                device.session.invalidate().await;
                device.mark_stalled();
                return e;
            }
        }
    }

    /// Execute the entry action of the current state and transition.
    ///
    /// # Errors
    ///
    /// Returns an error when an install, update or referral step fails.
    /// Probe and unlock failures in `Start` are handled here and never
    /// surface.
    pub async fn step(&self, device: &mut Device<C::Session>) -> Result<(), ProvisionError> {
        self.checkpoint(device).await;
        match device.state() {
            DeviceState::Start => {
                self.detect(device).await;
                Ok(())
            }
            DeviceState::Install => {
                self.install(device).await?;
                device.set_state(DeviceState::Referral);
                Ok(())
            }
            DeviceState::Update => {
                self.update(device).await?;
                device.set_state(DeviceState::Referral);
                Ok(())
            }
            DeviceState::Referral => {
                self.referral(device).await?;
                device.set_state(DeviceState::Done);
                Ok(())
            }
            DeviceState::Done => {
                device.say_to(self.sink, "Provisioning complete, unplug the miner...");
                self.await_disconnect(device).await;
                device.set_state(DeviceState::Start);
                Ok(())
            }
        }
    }

    /// Suspension point: block while the device is paused.
    pub async fn checkpoint(&self, device: &Device<C::Session>) {
        if device.gate().is_paused() {
            device.say_to(self.sink, "Paused...");
        }
        device.gate().await_resume().await;
    }

    /// Pause-gated reachability probe.
    pub async fn reachable(&self, device: &Device<C::Session>, port: u16) -> bool {
        self.checkpoint(device).await;
        is_reachable(
            self.network,
            self.sink,
            &device.info,
            port,
            self.config.timings.probe_timeout(),
        )
        .await
    }

    /// Entry action of `Start`.
    async fn detect(&self, device: &Device<C::Session>) {
        if !self.reachable(device, HTTP_PORT).await {
            device.say_to(self.sink, "Down...");
            return;
        }
        if self.reachable(device, SSH_PORT).await {
            device.say_to(self.sink, "SSH Connected...");
            self.checkpoint(device).await;
            let identity = query_firmware_identity(
                self.network,
                self.sink,
                &device.info,
                self.config.timings.identity_timeout(),
            )
            .await;
            match identity {
                Ok(id) if id.kind == FirmwareKind::UpgradedFirmware => {
                    device.say_to(self.sink, "BraiinsOS detected, updating...");
                    device.set_state(DeviceState::Update);
                }
                other => {
                    if let Err(e) = other {
                        tracing::info!(address = %device.info.address, error = %e, "no firmware info, installing");
                    }
                    tokio::time::sleep(self.config.timings.settle()).await;
                    device.set_state(DeviceState::Install);
                }
            }
        } else {
            device.say_to(self.sink, "SSH Down...");
            self.checkpoint(device).await;
            match self.unlock.unlock(&device.info.address).await {
                Ok(true) => {
                    device.say_to(self.sink, "SSH unlock success...");
                    device.set_state(DeviceState::Install);
                }
                Ok(false) => {
                    let reason = ProvisionError::UnlockRequiresManualReset;
                    tracing::info!(address = %device.info.address, "{reason}");
                    device.say_to(self.sink, format!("{reason}..."));
                    self.await_disconnect(device).await;
                }
                Err(e) => {
                    tracing::warn!(address = %device.info.address, error = %e, "unlock helper failed");
                    device.say_to(self.sink, format!("SSH unlock failed: {e:#}..."));
                    self.await_disconnect(device).await;
                }
            }
        }
    }

    /// Poll HTTP reachability every tick until the miner stops answering.
    pub async fn await_disconnect(&self, device: &Device<C::Session>) {
        device.say_to(self.sink, "Waiting for disconnect...");
        while self.reachable(device, HTTP_PORT).await {
            tokio::time::sleep(self.config.timings.tick()).await;
        }
        device.say_to(self.sink, "Disconnected...");
    }

    /// Staged reboot delay in quarters, then poll until the miner is back,
    /// then settle.
    pub async fn await_reboot(&self, device: &Device<C::Session>) {
        let quarter = self.config.timings.reboot() / 4;
        for percent in [25, 50, 75, 100] {
            self.checkpoint(device).await;
            tokio::time::sleep(quarter).await;
            device.say_to(self.sink, format!("Rebooting... {percent}%"));
        }
        while !self.reachable(device, HTTP_PORT).await {
            tokio::time::sleep(self.config.timings.tick()).await;
        }
        self.checkpoint(device).await;
        tokio::time::sleep(self.config.timings.settle()).await;
        device.say_to(self.sink, "Miner is back up...");
    }

    // ── Pause-gated remote operations ────────────────────────────────────────

    /// Run a command, narrate its output, and fail on a non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns a transport error when delivery fails or the command exits
    /// non-zero.
    pub async fn run_remote(
        &self,
        device: &mut Device<C::Session>,
        command: &str,
    ) -> Result<CommandOutput, TransportError> {
        self.checkpoint(device).await;
        let output = device
            .session
            .run_command(self.connector, &device.info.address, command)
            .await?;
        self.narrate(device, command, &output);
        if !output.success() {
            return Err(TransportError::CommandFailed {
                command: command.to_string(),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Run a command that reboots the device. Losing the channel counts as success.
    ///
    /// # Errors
    ///
    /// Returns a transport error for failures other than the expected
    /// disconnect, or when the command exits non-zero before the channel drops.
    pub async fn run_remote_disconnecting(
        &self,
        device: &mut Device<C::Session>,
        command: &str,
    ) -> Result<(), TransportError> {
        self.checkpoint(device).await;
        let output = device
            .session
            .run_disconnecting(self.connector, &device.info.address, command)
            .await?;
        match output {
            Some(output) => {
                self.narrate(device, command, &output);
                if output.exit_code.is_some_and(|code| code != 0) {
                    return Err(TransportError::CommandFailed {
                        command: command.to_string(),
                        code: output.exit_code,
                        stderr: output.stderr.trim().to_string(),
                    });
                }
            }
            None => device.say_to(self.sink, command),
        }
        Ok(())
    }

    /// Upload one file with progress notifications.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::MissingLocalFile`] if `local` does not exist,
    /// or the transport error of the transfer.
    pub async fn send_file(
        &self,
        device: &mut Device<C::Session>,
        local: &Path,
        remote: &str,
    ) -> Result<(), ProvisionError> {
        self.checkpoint(device).await;
        if !local.exists() {
            return Err(ProvisionError::MissingLocalFile(local.to_path_buf()));
        }
        device.say_to(self.sink, format!("Sending file to {}...", device.info.address));
        device
            .session
            .upload_file(self.connector, &device.info.address, local, remote)
            .await?;
        device.say_to(self.sink, "File sent...");
        Ok(())
    }

    /// Upload a directory tree with progress notifications.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::MissingLocalFile`] if `local` is not a
    /// directory, or the transport error of the transfer.
    pub async fn send_directory(
        &self,
        device: &mut Device<C::Session>,
        local: &Path,
        remote: &str,
    ) -> Result<(), ProvisionError> {
        self.checkpoint(device).await;
        if !local.is_dir() {
            return Err(ProvisionError::MissingLocalFile(local.to_path_buf()));
        }
        device.say_to(self.sink, format!("Sending directory to {}...", device.info.address));
        device
            .session
            .upload_directory(self.connector, &device.info.address, local, remote)
            .await?;
        device.say_to(self.sink, "Directory sent...");
        Ok(())
    }

    /// Copy a file off the device with progress notifications.
    ///
    /// # Errors
    ///
    /// Returns the transport error of the transfer.
    pub async fn fetch_file(
        &self,
        device: &mut Device<C::Session>,
        remote: &str,
        local: &Path,
    ) -> Result<(), ProvisionError> {
        self.checkpoint(device).await;
        device.say_to(self.sink, format!("Copying file from {}...", device.info.address));
        device
            .session
            .download_file(self.connector, &device.info.address, remote, local)
            .await?;
        device.say_to(self.sink, "File copied...");
        Ok(())
    }

    fn narrate(&self, device: &Device<C::Session>, command: &str, output: &CommandOutput) {
        if output.is_silent() {
            device.say_to(self.sink, command);
            return;
        }
        for stream in [&output.stdout, &output.stderr] {
            let text = stream.trim();
            if !text.is_empty() {
                device.say_to(self.sink, text);
            }
        }
    }
}
