//! Install, update and referral entry actions of the provisioning state machine.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use crate::application::ports::{NetworkProbe, NotificationSink, SessionConnector, UnlockAgent};
use crate::application::services::device::Device;
use crate::application::services::provisioning::Provisioner;
use crate::domain::error::ProvisionError;
use crate::domain::install_plan::{InstallStep, build_install_plan, generate_hwid, shell_quote};

/// Init script of the mining service restarted after the referral install.
const BOSMINER_SERVICE: &str = "/etc/init.d/bosminer";

impl<N, C, U, K> Provisioner<'_, N, C, U, K>
where
    N: NetworkProbe,
    C: SessionConnector,
    U: UnlockAgent,
    K: NotificationSink,
{
    /// Entry action of `Install`: run the fixed plan with a fresh hardware id.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error; later steps are not attempted.
    pub async fn install(&self, device: &mut Device<C::Session>) -> Result<(), ProvisionError> {
        let hwid = generate_hwid(&mut rand::thread_rng());
        let plan = build_install_plan(&self.config.files, &self.config.install, &hwid);
        device.say_to(self.sink, "Installing BraiinsOS...");
        self.execute_plan(device, &plan).await
    }

    /// Execute `plan` top to bottom, pausing between steps when requested.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error.
    pub async fn execute_plan(
        &self,
        device: &mut Device<C::Session>,
        plan: &[InstallStep],
    ) -> Result<(), ProvisionError> {
        for (index, step) in plan.iter().enumerate() {
            tracing::debug!(device = device.info.id, step = index + 1, label = %step.label(), "install step");
            self.execute_step(device, step).await?;
        }
        Ok(())
    }

    async fn execute_step(
        &self,
        device: &mut Device<C::Session>,
        step: &InstallStep,
    ) -> Result<(), ProvisionError> {
        self.checkpoint(device).await;
        match step {
            InstallStep::EnsureDirectory { path, clean } => {
                let path = shell_quote(path);
                let command = if *clean {
                    format!("rm -fr {path} && mkdir -p {path}")
                } else {
                    format!("mkdir -p {path}")
                };
                self.run_remote(device, &command).await?;
            }
            InstallStep::UploadFile { local, remote } => {
                self.send_file(device, local, remote).await?;
            }
            InstallStep::UploadDirectory { local, remote } => {
                self.send_directory(device, local, remote).await?;
            }
            InstallStep::SetExecutable { path } => {
                self.run_remote(device, &format!("chmod +x {}", shell_quote(path)))
                    .await?;
            }
            InstallStep::RunCommand {
                command,
                disconnects: true,
            } => {
                self.run_remote_disconnecting(device, command).await?;
            }
            InstallStep::RunCommand {
                command,
                disconnects: false,
            } => {
                self.run_remote(device, command).await?;
            }
            InstallStep::InvalidateSession => {
                device.session.invalidate().await;
            }
            InstallStep::AwaitReboot => {
                self.await_reboot(device).await;
            }
        }
        Ok(())
    }

    /// Entry action of `Update`: optional config backup, then `sysupgrade`
    /// and a reboot wait.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive is missing locally or any transfer or
    /// command fails. A failed backup is only reported.
    pub async fn update(&self, device: &mut Device<C::Session>) -> Result<(), ProvisionError> {
        let files = &self.config.files;
        let remote = &self.config.install.remote;

        if let Some(dir) = &files.backup_dir {
            let local = dir.join(format!("{}-bosminer.toml", device.info.address));
            if let Err(e) = self.fetch_file(device, &remote.bosminer_config, &local).await {
                tracing::warn!(address = %device.info.address, error = %e, "config backup failed");
                device.say_to(self.sink, format!("Config backup failed: {e}..."));
            }
        }

        device.say_to(self.sink, "Updating BraiinsOS...");
        self.send_file(device, &files.update_archive, &remote.update_archive)
            .await?;
        self.run_remote_disconnecting(
            device,
            &format!("sysupgrade {}", shell_quote(&remote.update_archive)),
        )
        .await?;
        device.session.invalidate().await;
        self.await_reboot(device).await;
        Ok(())
    }

    /// Entry action of `Referral`: install the referral package when it is
    /// present locally, otherwise skip.
    ///
    /// # Errors
    ///
    /// Returns an error if a transfer or the install command fails.
    pub async fn referral(&self, device: &mut Device<C::Session>) -> Result<(), ProvisionError> {
        let files = &self.config.files;
        let remote = &self.config.install.remote;

        if !files.referral_package.is_file() {
            device.say_to(self.sink, "Referral package not found, skipping...");
            return Ok(());
        }

        device.say_to(
            self.sink,
            format!("Sending referral IPK to {}...", device.info.address),
        );
        self.send_file(device, &files.referral_package, &remote.referral_package)
            .await?;
        self.send_file(device, &files.bosminer_config, &remote.bosminer_config)
            .await?;
        self.run_remote(
            device,
            &format!(
                "opkg install {} && {BOSMINER_SERVICE} restart",
                shell_quote(&remote.referral_package)
            ),
        )
        .await?;
        device.say_to(self.sink, "Referral configuration completed...");
        Ok(())
    }
}
