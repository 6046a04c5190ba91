//! The fixed BraiinsOS install plan.
//!
//! The plan is built once per install run from the configured file set and
//! install parameters. Execution lives in `application::services::install`.

use std::path::PathBuf;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use rand::RngCore;

use crate::domain::config::{FileSet, InstallConfig};

/// Number of random bytes behind a hardware identifier.
pub const HWID_BYTES: usize = 12;

/// One unit of the deployment plan. Every step is a suspension point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallStep {
    /// `mkdir -p`, optionally after removing whatever was there.
    EnsureDirectory { path: String, clean: bool },
    UploadFile { local: PathBuf, remote: String },
    /// Recursive upload preserving the relative layout under `local`.
    UploadDirectory { local: PathBuf, remote: String },
    SetExecutable { path: String },
    /// `disconnects` marks a command that takes the device down with it (a
    /// reboot); losing the channel is then the expected outcome.
    RunCommand { command: String, disconnects: bool },
    /// Close and forget the device's session before it disappears.
    InvalidateSession,
    /// Staged reboot delay, then reachability polling, then a settle delay.
    AwaitReboot,
}

impl InstallStep {
    /// Short label used in notifications and logs.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::EnsureDirectory { path, .. } => format!("prepare {path}"),
            Self::UploadFile { remote, .. } => format!("upload {remote}"),
            Self::UploadDirectory { remote, .. } => format!("upload {remote}/"),
            Self::SetExecutable { path } => format!("chmod +x {path}"),
            Self::RunCommand { command, .. } => command.clone(),
            Self::InvalidateSession => "close session".to_string(),
            Self::AwaitReboot => "wait for reboot".to_string(),
        }
    }
}

/// Build the ordered install plan.
///
/// Steps, top to bottom:
/// 1. recreate the scratch firmware directory
/// 2. deploy the dynamic loader
/// 3. deploy the SFTP server
/// 4. deploy `fw_printenv` and link `fw_setenv` to it
/// 5. upload the installer directory and mark `stage1.sh` executable
/// 6. run `stage1.sh` followed by `reboot`
/// 7. invalidate the session
/// 8. wait for the reboot
#[must_use]
pub fn build_install_plan(files: &FileSet, config: &InstallConfig, hwid: &str) -> Vec<InstallStep> {
    let remote = &config.remote;
    let stage1 = format!("{}/stage1.sh", remote.firmware_dir);
    vec![
        InstallStep::EnsureDirectory {
            path: remote.firmware_dir.clone(),
            clean: true,
        },
        InstallStep::UploadFile {
            local: files.ld_linux.clone(),
            remote: remote.ld_linux.clone(),
        },
        InstallStep::SetExecutable {
            path: remote.ld_linux.clone(),
        },
        InstallStep::UploadFile {
            local: files.sftp_server.clone(),
            remote: remote.sftp_server.clone(),
        },
        InstallStep::SetExecutable {
            path: remote.sftp_server.clone(),
        },
        InstallStep::UploadFile {
            local: files.fw_printenv.clone(),
            remote: remote.fw_printenv.clone(),
        },
        InstallStep::SetExecutable {
            path: remote.fw_printenv.clone(),
        },
        InstallStep::RunCommand {
            command: format!(
                "ln -fs {} {}",
                shell_quote(&remote.fw_printenv),
                shell_quote(&remote.fw_setenv)
            ),
            disconnects: false,
        },
        InstallStep::UploadDirectory {
            local: files.firmware_dir.clone(),
            remote: remote.firmware_dir.clone(),
        },
        InstallStep::SetExecutable {
            path: stage1.clone(),
        },
        InstallStep::RunCommand {
            command: format!("{} && reboot", stage1_command(&stage1, config, hwid)),
            disconnects: true,
        },
        InstallStep::InvalidateSession,
        InstallStep::AwaitReboot,
    ]
}

/// Render the `stage1.sh` invocation with its fixed arguments.
#[must_use]
pub fn stage1_command(script: &str, config: &InstallConfig, hwid: &str) -> String {
    let mut parts = vec![
        shell_quote(script),
        shell_quote(hwid),
        shell_quote(&config.pool_user),
        config.pool_port.to_string(),
    ];
    parts.extend(config.stage_flags.iter().map(|f| shell_quote(f)));
    parts.join(" ")
}

/// Generate a hardware identifier: 12 random bytes encoded with the base64
/// alphabet where `+` and `/` are replaced by `a` and `b`.
pub fn generate_hwid(rng: &mut impl RngCore) -> String {
    let mut bytes = [0u8; HWID_BYTES];
    rng.fill_bytes(&mut bytes);
    STANDARD_NO_PAD
        .encode(bytes)
        .chars()
        .map(|c| match c {
            '+' => 'a',
            '/' => 'b',
            other => other,
        })
        .collect()
}

/// Quote `s` for a POSIX shell. Plain words are passed through unchanged.
#[must_use]
pub fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | ':' | '=' | '@' | ','));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
