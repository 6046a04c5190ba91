//! Runs one provisioning task per device and exposes the operator surface.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::future::Future;

use bosflash_common::{DeviceStatus, Notification};
use futures_util::future::join_all;
use tokio::sync::mpsc;

use crate::application::ports::{
    NetworkProbe, NotificationSink, SessionConnector, UnlockAgent,
};
use crate::application::services::device::{Device, DeviceHandle};
use crate::application::services::probe::DeviceInfo;
use crate::application::services::provisioning::Provisioner;
use crate::domain::error::ControlError;

/// Owner of every device in the fleet.
pub struct Orchestrator<'a, N, C: SessionConnector, U, K> {
    provisioner: Provisioner<'a, N, C, U, K>,
    devices: Vec<Device<C::Session>>,
}

impl<'a, N, C, U, K> Orchestrator<'a, N, C, U, K>
where
    N: NetworkProbe,
    C: SessionConnector,
    U: UnlockAgent,
    K: NotificationSink,
{
    /// Build one device per address. Ids are 1-based positions in `addresses`.
    #[must_use]
    pub fn new(provisioner: Provisioner<'a, N, C, U, K>, addresses: &[String]) -> (Self, Controller) {
        let (devices, handles): (Vec<_>, Vec<_>) = addresses
            .iter()
            .enumerate()
            .map(|(index, address)| Device::new(DeviceInfo::new(index + 1, address.as_str())))
            .unzip();
        (
            Self {
                provisioner,
                devices,
            },
            Controller { handles },
        )
    }

    /// Drive every device concurrently until `shutdown` completes.
    ///
    /// A stalled device stops progressing without affecting the others.
    /// Shutdown drops every in-flight operation, then closes live sessions.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let Self {
            provisioner,
            mut devices,
        } = self;
        tracing::info!(devices = devices.len(), "provisioning started");

        {
            let provisioner = &provisioner;
            let tasks = devices
                .iter_mut()
                .map(move |device| supervise(provisioner, device));
            tokio::select! {
                _ = join_all(tasks) => {}
                () = shutdown => tracing::info!("shutdown requested"),
            }
        }

        for device in &mut devices {
            device.session.invalidate().await;
        }
    }
}

/// One device task. Never completes: a stalled device parks forever.
async fn supervise<N, C, U, K>(
    provisioner: &Provisioner<'_, N, C, U, K>,
    device: &mut Device<C::Session>,
) where
    N: NetworkProbe,
    C: SessionConnector,
    U: UnlockAgent,
    K: NotificationSink,
{
    let error = provisioner.run(device).await;
    tracing::warn!(device = device.info.id, error = %error, "device parked until restart");
    std::future::pending::<()>().await;
}

// ── Operator surface ──────────────────────────────────────────────────────────

/// Snapshot of one device for the `status` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReport {
    pub info: DeviceInfo,
    pub status: DeviceStatus,
    pub paused: bool,
}

/// Pause/resume entry points keyed by device id.
#[derive(Debug, Clone)]
pub struct Controller {
    handles: Vec<DeviceHandle>,
}

impl Controller {
    fn handle(&self, id: usize) -> Result<&DeviceHandle, ControlError> {
        id.checked_sub(1)
            .and_then(|index| self.handles.get(index))
            .ok_or(ControlError::UnknownDevice(id))
    }

    /// Pause device `id`. Returns `true` if it was running.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::UnknownDevice`] if no device has that id.
    pub fn pause(&self, id: usize, sink: &impl NotificationSink) -> Result<bool, ControlError> {
        let handle = self.handle(id)?;
        let changed = handle.gate.pause();
        if changed {
            handle.info.say(sink, "Pausing...");
        }
        Ok(changed)
    }

    /// Resume device `id`. Returns `true` if it was paused.
    ///
    /// # Errors
    ///
    /// Returns [`ControlError::UnknownDevice`] if no device has that id.
    pub fn resume(&self, id: usize, sink: &impl NotificationSink) -> Result<bool, ControlError> {
        let handle = self.handle(id)?;
        let changed = handle.gate.resume();
        if changed {
            handle.info.say(sink, "Unpausing...");
        }
        Ok(changed)
    }

    #[must_use]
    pub fn status(&self) -> Vec<DeviceReport> {
        self.handles
            .iter()
            .map(|handle| DeviceReport {
                info: handle.info.clone(),
                status: handle.status(),
                paused: handle.gate.is_paused(),
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

// ── Notification relay ────────────────────────────────────────────────────────

/// Sink that forwards notifications to a single consumer task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::trace!("notification consumer gone");
        }
    }
}
