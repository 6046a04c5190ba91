//! Per-device cooperative pause gate.
//!
//! The gate is advisory: it is consulted at suspension points and never
//! interrupts an operation already in flight.

use tokio::sync::watch;

/// Suspension gate toggled by the operator and awaited by a device task.
#[derive(Debug)]
pub struct PauseGate {
    paused: watch::Sender<bool>,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    #[must_use]
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self { paused }
    }

    /// Request a pause. Returns `true` if the gate was running before.
    pub fn pause(&self) -> bool {
        self.paused.send_if_modified(|paused| !std::mem::replace(paused, true))
    }

    /// Lift a pause. Returns `true` if the gate was paused before.
    pub fn resume(&self) -> bool {
        self.paused.send_if_modified(|paused| std::mem::replace(paused, false))
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Wait until the gate is not paused. Returns immediately when running.
    pub async fn await_resume(&self) {
        let mut rx = self.paused.subscribe();
        // The sender lives in `self`, so `wait_for` cannot observe a closed channel.
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}
