//! Lazily opened, reused remote session owned by one device.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::path::Path;

use crate::application::ports::{CommandOutput, RemoteSession, SessionConnector};
use crate::domain::error::TransportError;

/// Holder for at most one live session.
///
/// The slot opens a session on first use and hands the same one back until
/// [`SessionSlot::invalidate`] closes it. Every operation gets exactly one
/// transparent reconnect when the channel turns out to be stale.
#[derive(Debug)]
pub struct SessionSlot<S> {
    session: Option<S>,
    opened: u64,
}

impl<S> Default for SessionSlot<S> {
    fn default() -> Self {
        Self {
            session: None,
            opened: 0,
        }
    }
}

impl<S: RemoteSession> SessionSlot<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while a session is held.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.session.is_some()
    }

    /// Number of sessions this slot has opened over its lifetime.
    #[must_use]
    pub fn opened(&self) -> u64 {
        self.opened
    }

    /// Return the live session, opening one first if there is none.
    ///
    /// # Errors
    ///
    /// Returns the connector's error if a new session cannot be opened.
    pub async fn acquire<C>(&mut self, connector: &C, address: &str) -> Result<&S, TransportError>
    where
        C: SessionConnector<Session = S>,
    {
        if self.session.is_none() {
            tracing::debug!(address, "opening session");
            let session = connector.connect(address).await?;
            self.opened += 1;
            self.session = Some(session);
        }
        self.session
            .as_ref()
            .ok_or_else(|| TransportError::Connect("session slot empty after connect".to_string()))
    }

    /// Close and clear the held session, if any. The next operation reopens.
    pub async fn invalidate(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!("closing session");
            session.close().await;
        }
    }

    /// Run `command`, reconnecting once if the channel is stale.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the command cannot be delivered after the
    /// single reconnect attempt.
    pub async fn run_command<C>(
        &mut self,
        connector: &C,
        address: &str,
        command: &str,
    ) -> Result<CommandOutput, TransportError>
    where
        C: SessionConnector<Session = S>,
    {
        let first = {
            let session = self.acquire(connector, address).await?;
            session.run(command).await
        };
        match first {
            Err(TransportError::Disconnected(reason)) => {
                tracing::warn!(address, command, %reason, "session stale, reconnecting");
                self.invalidate().await;
                let session = self.acquire(connector, address).await?;
                session.run(command).await
            }
            other => other,
        }
    }

    /// Run a command that is expected to take the channel down (a reboot).
    ///
    /// No reconnect is attempted: a disconnect is the expected outcome and is
    /// reported as `Ok(None)`. The session is left in place; callers
    /// invalidate it explicitly.
    ///
    /// # Errors
    ///
    /// Returns any transport error other than a disconnect. A
    /// [`TransportError::Timeout`] is an error here: the command was cut off,
    /// not rebooted.
    pub async fn run_disconnecting<C>(
        &mut self,
        connector: &C,
        address: &str,
        command: &str,
    ) -> Result<Option<CommandOutput>, TransportError>
    where
        C: SessionConnector<Session = S>,
    {
        let session = self.acquire(connector, address).await?;
        match session.run(command).await {
            Ok(output) => Ok(Some(output)),
            Err(TransportError::Disconnected(reason)) => {
                tracing::debug!(address, command, %reason, "channel dropped as expected");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Upload one file, reconnecting once if the channel is stale.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the transfer fails.
    pub async fn upload_file<C>(
        &mut self,
        connector: &C,
        address: &str,
        local: &Path,
        remote: &str,
    ) -> Result<(), TransportError>
    where
        C: SessionConnector<Session = S>,
    {
        let first = {
            let session = self.acquire(connector, address).await?;
            session.upload_file(local, remote).await
        };
        match first {
            Err(TransportError::Disconnected(reason)) => {
                tracing::warn!(address, remote, %reason, "session stale, reconnecting");
                self.invalidate().await;
                let session = self.acquire(connector, address).await?;
                session.upload_file(local, remote).await
            }
            other => other,
        }
    }

    /// Upload a directory tree, reconnecting once if the channel is stale.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the transfer fails.
    pub async fn upload_directory<C>(
        &mut self,
        connector: &C,
        address: &str,
        local: &Path,
        remote: &str,
    ) -> Result<(), TransportError>
    where
        C: SessionConnector<Session = S>,
    {
        let first = {
            let session = self.acquire(connector, address).await?;
            session.upload_directory(local, remote).await
        };
        match first {
            Err(TransportError::Disconnected(reason)) => {
                tracing::warn!(address, remote, %reason, "session stale, reconnecting");
                self.invalidate().await;
                let session = self.acquire(connector, address).await?;
                session.upload_directory(local, remote).await
            }
            other => other,
        }
    }

    /// Download one file, reconnecting once if the channel is stale.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the transfer fails.
    pub async fn download_file<C>(
        &mut self,
        connector: &C,
        address: &str,
        remote: &str,
        local: &Path,
    ) -> Result<(), TransportError>
    where
        C: SessionConnector<Session = S>,
    {
        let first = {
            let session = self.acquire(connector, address).await?;
            session.download_file(remote, local).await
        };
        match first {
            Err(TransportError::Disconnected(reason)) => {
                tracing::warn!(address, remote, %reason, "session stale, reconnecting");
                self.invalidate().await;
                let session = self.acquire(connector, address).await?;
                session.download_file(remote, local).await
            }
            other => other,
        }
    }
}
