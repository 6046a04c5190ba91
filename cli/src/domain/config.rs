//! Domain types and validators for fleet configuration.
//!
//! Pure functions only — no I/O, no async, no filesystem access. Loading from
//! disk and the environment lives in `infra::config`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `bosflash.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Fixed device addresses. Device ids are 1-based positions in this list.
    pub devices: Vec<String>,
    pub files: FileSet,
    pub install: InstallConfig,
    pub ssh: SshConfig,
    pub timings: Timings,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            devices: default_devices(),
            files: FileSet::default(),
            install: InstallConfig::default(),
            ssh: SshConfig::default(),
            timings: Timings::default(),
        }
    }
}

fn default_devices() -> Vec<String> {
    ["172.16.1.99", "172.16.1.98", "172.16.1.97", "172.16.1.96"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Local files deployed to each miner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSet {
    /// Replacement dynamic loader.
    pub ld_linux: PathBuf,
    /// Replacement SFTP server binary.
    pub sftp_server: PathBuf,
    /// U-Boot environment helper (`fw_printenv`, also linked as `fw_setenv`).
    pub fw_printenv: PathBuf,
    /// Unpacked BraiinsOS installer directory containing `stage1.sh`.
    pub firmware_dir: PathBuf,
    /// `sysupgrade` archive for miners already running BraiinsOS.
    pub update_archive: PathBuf,
    /// Referral `.ipk` package; optional on disk.
    pub referral_package: PathBuf,
    /// `bosminer.toml` installed alongside the referral package.
    pub bosminer_config: PathBuf,
    /// External SSH unlock helper.
    pub unlock_helper: PathBuf,
    /// When set, the miner's `bosminer.toml` is copied here before an update.
    pub backup_dir: Option<PathBuf>,
}

impl Default for FileSet {
    fn default() -> Self {
        let files = PathBuf::from("files");
        Self {
            ld_linux: files.join("ld-linux-armhf.so.3"),
            sftp_server: files.join("sftp-server"),
            fw_printenv: files.join("fw_printenv"),
            firmware_dir: files.join("install"),
            update_archive: files.join("system_upgrade.tar"),
            referral_package: files.join("bos-referral_2021-04-28_arm_cortex-a9_neon.ipk"),
            bosminer_config: files.join("bosminer.toml"),
            unlock_helper: files.join("asicseer_installer"),
            backup_dir: None,
        }
    }
}

/// Parameters of the fixed install plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Pool identity passed to `stage1.sh`.
    pub pool_user: String,
    /// Numeric parameter passed to `stage1.sh` after the pool identity.
    pub pool_port: u16,
    /// Trailing yes/no/cond flags passed to `stage1.sh`.
    pub stage_flags: Vec<String>,
    pub remote: RemotePaths,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            pool_user: "UpstreamDataInc.test".to_string(),
            pool_port: 8,
            stage_flags: ["yes", "cond", "no", "no", "no"]
                .into_iter()
                .map(String::from)
                .collect(),
            remote: RemotePaths::default(),
        }
    }
}

/// Fixed deployment targets on the miner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemotePaths {
    pub firmware_dir: String,
    pub ld_linux: String,
    pub sftp_server: String,
    pub fw_printenv: String,
    pub fw_setenv: String,
    pub update_archive: String,
    pub referral_package: String,
    pub bosminer_config: String,
}

impl Default for RemotePaths {
    fn default() -> Self {
        Self {
            firmware_dir: "/tmp/firmware".to_string(),
            ld_linux: "/lib/ld-linux-armhf.so.3".to_string(),
            sftp_server: "/usr/lib/openssh/sftp-server".to_string(),
            fw_printenv: "/usr/sbin/fw_printenv".to_string(),
            fw_setenv: "/usr/sbin/fw_setenv".to_string(),
            update_archive: "/tmp/system_upgrade.tar".to_string(),
            referral_package: "/tmp/referral.ipk".to_string(),
            bosminer_config: "/etc/bosminer.toml".to_string(),
        }
    }
}

/// SSH session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub user: String,
    /// Password for miners that do not accept an empty one. Requires `sshpass`.
    pub password: Option<String>,
    pub connect_timeout_secs: u64,
    /// Upper bound for a single remote command.
    pub command_timeout_secs: u64,
    /// Upper bound for a single file or directory upload.
    pub transfer_timeout_secs: u64,
    /// Directory holding the OpenSSH control sockets. Defaults to the system
    /// temp directory.
    pub control_dir: Option<PathBuf>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            password: None,
            connect_timeout_secs: 10,
            command_timeout_secs: 120,
            transfer_timeout_secs: 600,
            control_dir: None,
        }
    }
}

/// Fixed delays of the provisioning loop, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
    /// Delay between state-machine ticks and between reachability polls.
    pub tick_secs: u64,
    /// Reachability probe timeout. The firmware query uses five times this.
    pub probe_timeout_secs: u64,
    /// Pause after identity detection and after a reboot completes.
    pub settle_secs: u64,
    /// Fixed wait after issuing a reboot, before polling starts.
    pub reboot_secs: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            tick_secs: 3,
            probe_timeout_secs: 1,
            settle_secs: 10,
            reboot_secs: 120,
        }
    }
}

impl Timings {
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    #[must_use]
    pub fn identity_timeout(&self) -> Duration {
        self.probe_timeout() * 5
    }

    #[must_use]
    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    #[must_use]
    pub fn reboot(&self) -> Duration {
        Duration::from_secs(self.reboot_secs)
    }
}

// ── Environment overrides ────────────────────────────────────────────────────

/// Values read from `BOSFLASH_*` environment variables. Each set field wins
/// over the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvOverrides {
    pub ssh_user: Option<String>,
    pub ssh_password: Option<String>,
    pub unlock_helper: Option<PathBuf>,
}

impl FleetConfig {
    /// Apply environment overrides on top of file values.
    pub fn apply_overrides(&mut self, overrides: EnvOverrides) {
        if let Some(user) = overrides.ssh_user {
            self.ssh.user = user;
        }
        if let Some(password) = overrides.ssh_password {
            self.ssh.password = Some(password);
        }
        if let Some(helper) = overrides.unlock_helper {
            self.files.unlock_helper = helper;
        }
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a loaded configuration.
///
/// # Errors
///
/// Returns an error if no devices are listed, an address is blank or contains
/// whitespace, an address is duplicated, or a timing is zero where a
/// non-zero value is required.
pub fn validate_config(config: &FleetConfig) -> Result<(), ConfigError> {
    if config.devices.is_empty() {
        return Err(ConfigError::NoDevices);
    }
    let mut seen = HashSet::new();
    for address in &config.devices {
        if address.is_empty() || address.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidAddress(address.clone()));
        }
        if !seen.insert(address.as_str()) {
            return Err(ConfigError::DuplicateAddress(address.clone()));
        }
    }
    if config.timings.tick_secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: "timings.tick_secs".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    if config.timings.probe_timeout_secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: "timings.probe_timeout_secs".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    if config.ssh.user.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "ssh.user".to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

// ── Unit tests ───────────────────────────────────────────────────────────────
