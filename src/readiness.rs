//! Frame readiness as an awaitable signal.
//!
//! Hosts mark a frame ready once layout has settled; navigation queries issued
//! before then see [`NavigationErrorKind::GeometryUnavailable`](crate::NavigationErrorKind).

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;
use std::sync::Arc;

use tokio::sync::Notify;

/// Result of a bounded readiness wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadinessOutcome {
    Ready,
    TimedOut,
}

/// One-shot, cloneable readiness flag.
#[derive(Clone, Debug, Default)]
pub struct ReadinessSignal {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    ready: AtomicBool,
    notify: Notify,
}

impl ReadinessSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the frame ready and wake every waiter.
    pub fn mark_ready(&self) {
        self.inner.ready.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Re-arm after the frame is torn down.
    pub fn reset(&self) {
        self.inner.ready.store(false, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Wait until ready, giving up after `limit`.
    pub async fn wait(&self, limit: Duration) -> ReadinessOutcome {
        let ready = async {
            loop {
                let notified = self.inner.notify.notified();
                if self.is_ready() {
                    return;
                }
                notified.await;
            }
        };
        match tokio::time::timeout(limit, ready).await {
            Ok(()) => ReadinessOutcome::Ready,
            Err(_) => {
                log::warn!("frame not ready after {:?}", limit);
                ReadinessOutcome::TimedOut
            }
        }
    }
}
