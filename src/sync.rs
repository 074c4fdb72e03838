//! Fire-and-forget remote writes.
//!
//! Writes are spawned onto the runtime and never awaited by the operation
//! that issued them. Failures are logged and dropped; there is no retry.
//! The tracker exists so a short-lived process can [`drain`] before exit
//! instead of killing writes mid-flight.
//!
//! [`drain`]: BackgroundSync::drain

use std::future::Future;

use tokio_util::task::TaskTracker;

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct BackgroundSync {
    tracker: TaskTracker,
}

impl Default for BackgroundSync {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundSync {
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
        }
    }

    /// Runs `write` in the background. Must be called from within a Tokio
    /// runtime.
    pub fn spawn<F>(&self, operation: &'static str, write: F)
    where
        F: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        self.tracker.spawn(async move {
            match write.await {
                Ok(()) => tracing::debug!(operation, "Background sync completed"),
                Err(e) => tracing::warn!(operation, error = %e, "Background sync failed, local copy kept"),
            }
        });
    }

    /// Number of writes still in flight.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Waits for every write spawned so far. New writes may be spawned again
    /// afterwards.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
