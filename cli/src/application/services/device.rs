//! The device entity driven by the provisioning state machine.

use std::sync::Arc;

use bosflash_common::{DeviceState, DeviceStatus};
use tokio::sync::watch;

use crate::application::ports::NotificationSink;
use crate::application::services::pause::PauseGate;
use crate::application::services::probe::DeviceInfo;
use crate::application::services::transport::SessionSlot;

/// One physical miner at a fixed address.
///
/// Owned by exactly one provisioning task. The operator side only sees a
/// [`DeviceHandle`].
#[derive(Debug)]
pub struct Device<S> {
    pub info: DeviceInfo,
    pub session: SessionSlot<S>,
    gate: Arc<PauseGate>,
    status: watch::Sender<DeviceStatus>,
}

/// Operator-side view of a device: its pause gate and a live status feed.
#[derive(Debug, Clone)]
pub struct DeviceHandle {
    pub info: DeviceInfo,
    pub gate: Arc<PauseGate>,
    status: watch::Receiver<DeviceStatus>,
}

impl<S> Device<S> {
    /// Create a device in `Start` together with its operator handle.
    #[must_use]
    pub fn new(info: DeviceInfo) -> (Self, DeviceHandle) {
        let gate = Arc::new(PauseGate::new());
        let (status, status_rx) = watch::channel(DeviceStatus::default());
        let handle = DeviceHandle {
            info: info.clone(),
            gate: Arc::clone(&gate),
            status: status_rx,
        };
        let device = Self {
            info,
            session: SessionSlot::default(),
            gate,
            status,
        };
        (device, handle)
    }

    #[must_use]
    pub fn state(&self) -> DeviceState {
        self.status.borrow().state
    }

    #[must_use]
    pub fn is_stalled(&self) -> bool {
        self.status.borrow().stalled
    }

    #[must_use]
    pub fn gate(&self) -> &PauseGate {
        &self.gate
    }

    pub fn set_state(&self, state: DeviceState) {
        let previous = self.state();
        if previous != state {
            tracing::info!(device = self.info.id, address = %self.info.address, from = %previous, to = %state, "state transition");
        }
        self.status.send_modify(|s| s.state = state);
    }

    /// Emit `message` for this device.
    pub fn say_to(&self, sink: &impl NotificationSink, message: impl Into<String>) {
        self.info.say(sink, message);
    }

    pub fn mark_stalled(&self) {
        self.status.send_modify(|s| s.stalled = true);
    }
}

impl DeviceHandle {
    #[must_use]
    pub fn status(&self) -> DeviceStatus {
        *self.status.borrow()
    }
}
