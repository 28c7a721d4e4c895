//! [`StopHandle`] / [`StopToken`] / [`Pacer`] – cooperative cancellation for
//! background loops.
//!
//! Every periodic activity (guard poller, autonomy loop, battery watchdog)
//! owns a [`Pacer`] built from a [`StopToken`].  The owner of the matching
//! [`StopHandle`] calls [`StopHandle::stop`] and the loop notices within one
//! interval, either at the top of its cycle or while sleeping.
//!
//! Dropping the handle counts as a stop request.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use rover_kernel::pacer::{Pacer, StopHandle};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let handle = StopHandle::new();
//! let mut pacer = Pacer::new(Duration::from_millis(5), handle.token());
//! assert!(pacer.pause().await);
//! handle.stop();
//! assert!(!pacer.pause().await);
//! # });
//! ```

use std::time::Duration;

use tokio::sync::watch;

/// Sending half.  Owned by whoever may cancel the activity.
#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// A new token observing this handle.
    pub fn token(&self) -> StopToken {
        StopToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Request a stop.  Idempotent.
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for StopHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct StopToken {
    rx: watch::Receiver<bool>,
}

impl StopToken {
    /// `true` once a stop was requested or the handle was dropped.
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once a stop is requested.
    pub async fn stopped(&mut self) {
        // An error means the handle is gone, which also counts as stopped.
        let _ = self.rx.wait_for(|stopped| *stopped).await;
    }
}

/// Fixed-interval pacing for a loop that must stay cancellable.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    token: StopToken,
}

impl Pacer {
    pub fn new(interval: Duration, token: StopToken) -> Self {
        Self { interval, token }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_stopped()
    }

    /// Sleep for one interval.  Returns `false` (possibly early) if a stop
    /// was requested, `true` if the loop should run another cycle.
    pub async fn pause(&mut self) -> bool {
        if self.token.is_stopped() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.interval) => !self.token.is_stopped(),
            _ = self.token.stopped() => false,
        }
    }
}
