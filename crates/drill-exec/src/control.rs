//! Per-execution control plane: pause flag, resume signal, cancellation.
//!
//! External callers write the flags; the driver reads them at checkpoints
//! between waves and inside step waits. Cancellation is one-way.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Control block owned jointly by the driver and the engine façade.
#[derive(Debug, Default)]
pub struct ControlBlock {
    paused: AtomicBool,
    resume: Notify,
    cancel: CancellationToken,
}

impl ControlBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the driver to pause at its next checkpoint.
    pub fn request_pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn clear_pause(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Wake the driver out of its pause wait. A permit is stored if the
    /// driver is not waiting yet, so resume-before-wait is not lost.
    pub fn signal_resume(&self) {
        self.resume.notify_one();
    }

    pub async fn wait_resume(&self) {
        self.resume.notified().await;
    }

    /// Fire the one-way cancellation edge.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token plumbed into the requester and scheduler checkpoints.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn pause_flag_round_trip() {
        let control = ControlBlock::new();
        assert!(!control.is_paused());
        control.request_pause();
        assert!(control.is_paused());
        control.clear_pause();
        assert!(!control.is_paused());
    }

    #[tokio::test]
    async fn resume_signal_is_not_lost_when_sent_first() {
        let control = Arc::new(ControlBlock::new());
        control.signal_resume();
        tokio::time::timeout(Duration::from_millis(100), control.wait_resume())
            .await
            .expect("stored permit wakes the waiter");
    }

    #[tokio::test]
    async fn cancel_is_observable_through_cloned_tokens() {
        let control = ControlBlock::new();
        let token = control.cancel_token();
        assert!(!token.is_cancelled());
        control.cancel();
        assert!(token.is_cancelled());
        token.cancelled().await;
    }
}
