//! Cancelable one-shot timers
//!
//! Gesture classification depends on being able to withdraw a scheduled
//! action (the deferred "show controls", the double-tap seek commit) before
//! it runs. Each timer is a spawned task racing a sleep against a child
//! [`CancellationToken`]; cancelling the parent token cancels every timer
//! created from it.

use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A scheduled action that can be withdrawn until it fires
#[derive(Debug)]
pub struct CancelableTimer {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl CancelableTimer {
    /// Run `action` after `delay` unless cancelled first.
    ///
    /// The action is skipped if the token is cancelled at any point before
    /// the sleep completes, including when cancellation and expiry race.
    pub fn schedule<F>(runtime: &Handle, parent: &CancellationToken, delay: Duration, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let token = parent.child_token();
        let task_token = token.clone();
        let handle = runtime.spawn(async move {
            tokio::select! {
                biased;
                _ = task_token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if !task_token.is_cancelled() {
                        action();
                    }
                }
            }
        });

        Self { token, handle }
    }

    /// Withdraw the action. Synchronous: once this returns the action will
    /// not start.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True while the action has neither fired nor been cancelled
    pub fn is_pending(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for CancelableTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
