//! Signal-of-Stop: cooperative cancellation primitive.
//!
//! Provides a thread-safe, async-aware cancellation token that can be:
//! - Cloned and shared across tasks
//! - Awaited for cancellation notification
//! - Used in select! patterns to cancel futures
//! - Linked into parent/child chains so component teardown can be scoped
//!   (cancelling a child never touches the parent)

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A cooperative cancellation token.
///
/// Clones share the same underlying state, so cancelling any clone
/// notifies all waiters.
#[derive(Debug, Default)]
pub struct SignalOfStop {
    internal: Arc<SharedState>,
}

#[derive(Debug, Default)]
struct SharedState {
    closing: AtomicBool,
    notify: Notify,
}

impl SignalOfStop {
    /// Create a new, uncancelled signal.
    pub fn new() -> Self {
        Self {
            internal: Arc::new(SharedState {
                closing: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Signal cancellation to all waiters.
    ///
    /// After this call, `cancelled()` returns `true` and all pending
    /// `wait()` futures complete.
    pub fn cancel(&self) {
        self.internal.closing.store(true, Ordering::Release);
        self.internal.notify.notify_waiters();
    }

    /// Check if cancellation has been signaled.
    pub fn cancelled(&self) -> bool {
        self.internal.closing.load(Ordering::Acquire)
    }

    /// Wait for cancellation to be signaled.
    ///
    /// Returns immediately if already cancelled.
    pub async fn wait(&self) -> bool {
        if self.cancelled() {
            return true;
        }
        self.internal.notify.notified().await;
        self.cancelled()
    }

    /// Create a child token that is cancelled whenever this one is.
    ///
    /// Cancelling the child does NOT cancel the parent, which is what
    /// scoped teardown (one poller, one request) needs.
    pub fn linked(&self) -> SignalOfStop {
        let child = SignalOfStop::new();
        let parent = self.clone();
        let forward = child.clone();
        tokio::spawn(async move {
            if parent.wait().await {
                forward.cancel();
            }
        });
        child
    }

    /// Race a future against cancellation.
    ///
    /// Returns `Ok(T)` if the future completes first,
    /// `Err(())` if cancellation is signaled first.
    pub async fn select<F, T>(&self, fut: F) -> Result<T, ()>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let clone = self.clone();
        tokio::select! {
            res = fut => Ok(res),
            _ = clone.wait() => Err(()),
        }
    }
}

impl Clone for SignalOfStop {
    fn clone(&self) -> Self {
        Self {
            internal: Arc::clone(&self.internal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let sos = SignalOfStop::new();
        let waiter = sos.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });
        sos.cancel();
        assert!(handle.await.unwrap());
        assert!(sos.cancelled());
    }

    #[tokio::test]
    async fn child_cancel_leaves_parent_running() {
        let parent = SignalOfStop::new();
        let child = parent.linked();
        child.cancel();
        tokio::task::yield_now().await;
        assert!(child.cancelled());
        assert!(!parent.cancelled());
    }

    #[tokio::test]
    async fn parent_cancel_propagates_to_child() {
        let parent = SignalOfStop::new();
        let child = parent.linked();
        parent.cancel();
        // Propagation runs on a spawned task; give it a poll.
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert!(child.cancelled());
    }
}
