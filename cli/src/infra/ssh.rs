//! OpenSSH implementation of the session ports.
//!
//! One ControlMaster process per session holds the authenticated channel;
//! every command and transfer is a short-lived `ssh -S <socket>` client
//! multiplexed over it. File payloads travel over the client's stdin.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::application::ports::{CommandOutput, CommandRunner, RemoteSession, SessionConnector};
use crate::domain::config::SshConfig;
use crate::domain::error::{CommandTimedOut, TransportError};
use crate::domain::install_plan::shell_quote;

/// Exit status `ssh` reports when the channel itself failed.
const SSH_CHANNEL_FAILURE: i32 = 255;

/// Bound on `ssh -O exit` when tearing a master down.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Options shared by master and client invocations. Miners ship old
/// dropbear/OpenSSH builds that only offer `ssh-rsa`.
const COMMON_OPTIONS: &[&str] = &[
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "UserKnownHostsFile=/dev/null",
    "-o",
    "LogLevel=ERROR",
    "-o",
    "HostKeyAlgorithms=+ssh-rsa",
    "-o",
    "PubkeyAcceptedAlgorithms=+ssh-rsa",
];

/// Opens ControlMaster sessions using the system `ssh` binary.
#[derive(Debug)]
pub struct OpenSshConnector<R> {
    runner: R,
    settings: SshConfig,
    control_dir: PathBuf,
    sequence: AtomicU64,
}

impl<R: CommandRunner + Clone> OpenSshConnector<R> {
    #[must_use]
    pub fn new(runner: R, settings: SshConfig) -> Self {
        let control_dir = settings
            .control_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        Self {
            runner,
            settings,
            control_dir,
            sequence: AtomicU64::new(0),
        }
    }

    fn socket_path(&self, address: &str) -> PathBuf {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.control_dir
            .join(format!("bosflash-{}-{address}-{n}.sock", std::process::id()))
    }

    /// Program and argv that start a backgrounded master for `address`.
    /// A password is read by `sshpass -e` from `SSHPASS`, never from argv.
    #[must_use]
    pub fn master_command(&self, socket: &Path, address: &str) -> (String, Vec<String>) {
        let mut args: Vec<String> = Vec::new();
        let program = if self.settings.password.is_some() {
            args.extend(["-e".to_string(), "ssh".to_string()]);
            "sshpass".to_string()
        } else {
            "ssh".to_string()
        };
        args.extend(["-M".to_string(), "-S".to_string(), socket.display().to_string()]);
        args.extend(["-o", "ControlPersist=yes", "-f", "-N"].map(String::from));
        args.extend(COMMON_OPTIONS.iter().map(|s| (*s).to_string()));
        args.extend([
            "-o".to_string(),
            format!("ConnectTimeout={}", self.settings.connect_timeout_secs),
            "-o".to_string(),
            format!(
                "BatchMode={}",
                if self.settings.password.is_some() { "no" } else { "yes" }
            ),
            format!("{}@{address}", self.settings.user),
        ]);
        (program, args)
    }
}

impl<R: CommandRunner + Clone> SessionConnector for OpenSshConnector<R> {
    type Session = OpenSshSession<R>;

    async fn connect(&self, address: &str) -> Result<Self::Session, TransportError> {
        let socket = self.socket_path(address);
        let (program, args) = self.master_command(&socket, address);
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        let budget = Duration::from_secs(self.settings.connect_timeout_secs) + CLOSE_TIMEOUT;
        let env: Vec<(&str, &str)> = self
            .settings
            .password
            .as_deref()
            .map(|password| ("SSHPASS", password))
            .into_iter()
            .collect();

        tracing::debug!(address, socket = %socket.display(), "starting ssh master");
        let output = self
            .runner
            .run_with_env(&program, &argv, &env, budget)
            .await
            .map_err(|e| TransportError::Connect(format!("{e:#}")))?;
        if !output.status.success() {
            return Err(TransportError::Connect(stderr_of(&output)));
        }

        Ok(OpenSshSession {
            runner: self.runner.clone(),
            socket,
            destination: format!("{}@{address}", self.settings.user),
            command_timeout: Duration::from_secs(self.settings.command_timeout_secs),
            transfer_timeout: Duration::from_secs(self.settings.transfer_timeout_secs),
        })
    }
}

/// A live ControlMaster channel to one device.
#[derive(Debug)]
pub struct OpenSshSession<R> {
    runner: R,
    socket: PathBuf,
    destination: String,
    command_timeout: Duration,
    transfer_timeout: Duration,
}

impl<R: CommandRunner> OpenSshSession<R> {
    #[must_use]
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    fn client_args(&self, remote_command: &str) -> Vec<String> {
        let mut args = vec!["-S".to_string(), self.socket.display().to_string()];
        args.extend(COMMON_OPTIONS.iter().map(|s| (*s).to_string()));
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            self.destination.clone(),
            remote_command.to_string(),
        ]);
        args
    }

    /// Run one multiplexed client. A local timeout is [`TransportError::Timeout`];
    /// any other runner failure, or exit 255, means the channel is gone.
    async fn exec(
        &self,
        remote_command: &str,
        input: Option<&[u8]>,
        timeout: Duration,
    ) -> Result<Output, TransportError> {
        let args = self.client_args(remote_command);
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        let result = match input {
            Some(input) => self.runner.run_with_stdin("ssh", &argv, input, timeout).await,
            None => self.runner.run_with_timeout("ssh", &argv, timeout).await,
        };
        let output = result.map_err(|e| match e.downcast_ref::<CommandTimedOut>() {
            Some(timed_out) => TransportError::Timeout(timed_out.to_string()),
            None => TransportError::Disconnected(format!("{e:#}")),
        })?;
        if output.status.code() == Some(SSH_CHANNEL_FAILURE) {
            return Err(TransportError::Disconnected(stderr_of(&output)));
        }
        Ok(output)
    }

    /// Like [`Self::exec`], but any non-zero exit is a transfer failure.
    async fn transfer(
        &self,
        remote_command: &str,
        input: Option<&[u8]>,
    ) -> Result<Output, TransportError> {
        let output = self.exec(remote_command, input, self.transfer_timeout).await?;
        if !output.status.success() {
            return Err(TransportError::Transfer(stderr_of(&output)));
        }
        Ok(output)
    }
}

impl<R: CommandRunner> RemoteSession for OpenSshSession<R> {
    async fn run(&self, command: &str) -> Result<CommandOutput, TransportError> {
        tracing::debug!(host = %self.destination, command, "remote command");
        let output = self.exec(command, None, self.command_timeout).await?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let payload = tokio::fs::read(local)
            .await
            .map_err(|e| TransportError::Transfer(format!("cannot read {}: {e}", local.display())))?;
        let staged = shell_quote(&format!("{remote}.part"));
        let command = format!("cat > {staged} && mv {staged} {}", shell_quote(remote));
        tracing::debug!(host = %self.destination, local = %local.display(), remote, bytes = payload.len(), "upload");
        self.transfer(&command, Some(&payload)).await?;
        Ok(())
    }

    async fn upload_directory(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let archive = archive_directory(local).await?;
        let remote = shell_quote(remote);
        let command = format!("mkdir -p {remote} && tar -xf - -C {remote}");
        tracing::debug!(host = %self.destination, local = %local.display(), bytes = archive.len(), "upload tree");
        self.transfer(&command, Some(&archive)).await?;
        Ok(())
    }

    async fn download_file(&self, remote: &str, local: &Path) -> Result<(), TransportError> {
        let output = self
            .transfer(&format!("cat {}", shell_quote(remote)), None)
            .await?;
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                TransportError::Transfer(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(local, &output.stdout)
            .await
            .map_err(|e| TransportError::Transfer(format!("cannot write {}: {e}", local.display())))
    }

    async fn close(self) {
        let socket = self.socket.display().to_string();
        let args = ["-S", socket.as_str(), "-O", "exit", self.destination.as_str()];
        if let Err(e) = self.runner.run_with_timeout("ssh", &args, CLOSE_TIMEOUT).await {
            tracing::debug!(host = %self.destination, error = %e, "ssh master already gone");
        }
        let _ = tokio::fs::remove_file(&self.socket).await;
    }
}

/// Tar `local` in memory with paths relative to its root.
async fn archive_directory(local: &Path) -> Result<Vec<u8>, TransportError> {
    let root = local.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut builder = tar::Builder::new(Vec::new());
        builder.follow_symlinks(false);
        builder.append_dir_all(".", &root)?;
        builder.into_inner()
    })
    .await
    .map_err(|e| TransportError::Transfer(format!("archive task failed: {e}")))?
    .map_err(|e| TransportError::Transfer(format!("cannot archive {}: {e}", local.display())))
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}
