//! Infrastructure implementation of the `CommandRunner` port.
//!
//! `TokioCommandRunner` is the production implementation that uses tokio
//! for async process execution with guaranteed timeout and kill.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};

use crate::application::ports::CommandRunner;
use crate::domain::error::CommandTimedOut;

/// Default timeout for local helper processes (unlock helper, `ssh -O`).
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Production `CommandRunner`.
///
/// The child is killed explicitly when the timeout fires; dropping the
/// `output()` future alone would leave it running.
#[derive(Debug, Clone)]
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_CMD_TIMEOUT)
    }
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        tracing::debug!(program, ?args, "spawning");
        let child = spawn(program, args, &[], false)?;
        collect(child, program, None, timeout).await
    }

    async fn run_with_stdin(
        &self,
        program: &str,
        args: &[&str],
        input: &[u8],
        timeout: Duration,
    ) -> Result<Output> {
        tracing::debug!(program, ?args, bytes = input.len(), "spawning with stdin");
        let child = spawn(program, args, &[], true)?;
        collect(child, program, Some(input), timeout).await
    }

    async fn run_with_env(
        &self,
        program: &str,
        args: &[&str],
        env: &[(&str, &str)],
        timeout: Duration,
    ) -> Result<Output> {
        let keys: Vec<&str> = env.iter().map(|(key, _)| *key).collect();
        tracing::debug!(program, ?args, env = ?keys, "spawning with env");
        let child = spawn(program, args, env, false)?;
        collect(child, program, None, timeout).await
    }
}

fn spawn(program: &str, args: &[&str], env: &[(&str, &str)], piped_stdin: bool) -> Result<Child> {
    tokio::process::Command::new(program)
        .args(args)
        .envs(env.iter().copied())
        .stdin(if piped_stdin { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))
}

/// How long the pipes are still drained once the child has exited. A child
/// that daemonizes (`ssh -f`) hands its pipes to the background process,
/// which keeps them open for its whole lifetime.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Feed `input` (if any), drain both pipes, and wait, all bounded by `timeout`.
async fn collect(
    mut child: Child,
    program: &str,
    input: Option<&[u8]>,
    timeout: Duration,
) -> Result<Output> {
    let stdin_handle = child.stdin.take();
    let mut stdout_handle = child.stdout.take();
    let mut stderr_handle = child.stderr.take();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();

    let run = async {
        let pipes = async {
            tokio::join!(
                drain(stdout_handle.as_mut(), &mut stdout),
                drain(stderr_handle.as_mut(), &mut stderr),
            );
        };
        let exited = async { tokio::join!(child.wait(), feed(stdin_handle, input)).0 };
        tokio::pin!(pipes, exited);
        tokio::select! {
            status = &mut exited => {
                if tokio::time::timeout(DRAIN_GRACE, &mut pipes).await.is_err() {
                    tracing::debug!(program, "output pipes still held after exit");
                }
                status
            }
            () = &mut pipes => exited.await,
        }
    };

    let status = tokio::select! {
        status = run => status.with_context(|| format!("waiting for {program}"))?,
        () = tokio::time::sleep(timeout) => {
            let _ = child.kill().await;
            return Err(CommandTimedOut {
                program: program.to_string(),
                after: timeout,
            }
            .into());
        }
    };
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

/// Append everything readable from `pipe` to `buf` until EOF.
async fn drain<R: AsyncRead + Unpin>(pipe: Option<&mut R>, buf: &mut Vec<u8>) {
    let Some(pipe) = pipe else {
        return;
    };
    let mut chunk = [0u8; 8192];
    loop {
        match pipe.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

async fn feed(stdin: Option<ChildStdin>, input: Option<&[u8]>) {
    if let (Some(mut stdin), Some(input)) = (stdin, input) {
        // A child that exits early closes the pipe; its status reports why.
        let _ = stdin.write_all(input).await;
        let _ = stdin.shutdown().await;
    }
}
