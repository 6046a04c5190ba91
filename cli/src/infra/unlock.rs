//! Unlock port backed by the external SSH unlock helper.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::ports::{CommandRunner, UnlockAgent};
use crate::domain::unlock::{UNLOCK_USER, unlock_succeeded};

/// Runs `<helper> -p -f <address> root` and inspects its combined output.
#[derive(Debug, Clone)]
pub struct HelperUnlockAgent<R> {
    runner: R,
    helper: PathBuf,
}

impl<R: CommandRunner> HelperUnlockAgent<R> {
    #[must_use]
    pub fn new(runner: R, helper: PathBuf) -> Self {
        Self { runner, helper }
    }
}

impl<R: CommandRunner> UnlockAgent for HelperUnlockAgent<R> {
    async fn unlock(&self, address: &str) -> Result<bool> {
        let program = self.helper.display().to_string();
        tracing::debug!(address, helper = %program, "running unlock helper");
        let output = self
            .runner
            .run(&program, &["-p", "-f", address, UNLOCK_USER])
            .await
            .with_context(|| format!("unlock helper {program}"))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let unlocked = unlock_succeeded(&combined);
        tracing::debug!(address, unlocked, status = ?output.status.code(), "unlock helper finished");
        Ok(unlocked)
    }
}
