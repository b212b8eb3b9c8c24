use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::info;

/// Tracks scan activity so an unused process can be reclaimed.
#[derive(Debug)]
pub struct ActivityTracker {
    last_activity: Mutex<Instant>,
    in_flight: AtomicUsize,
}

/// Marks a scan as in flight until dropped.
pub struct ActivityGuard {
    tracker: Arc<ActivityTracker>,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self {
            last_activity: Mutex::new(Instant::now()),
            in_flight: AtomicUsize::new(0),
        }
    }
}

impl ActivityTracker {
    pub fn begin(self: &Arc<Self>) -> ActivityGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.touch();
        ActivityGuard {
            tracker: Arc::clone(self),
        }
    }

    fn touch(&self) {
        if let Ok(mut last) = self.last_activity.lock() {
            *last = Instant::now();
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Time since the last scan started or finished, zero while one is running.
    pub fn idle_for(&self) -> Duration {
        if self.in_flight() > 0 {
            return Duration::ZERO;
        }
        self.last_activity
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }

    /// Resolves once the process has been idle for `timeout`.
    pub async fn idle_reached(&self, timeout: Duration) {
        loop {
            let idle = self.idle_for();
            if idle >= timeout {
                info!(idle = ?idle, "Idle timeout reached");
                return;
            }
            tokio::time::sleep(timeout - idle).await;
        }
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.tracker.touch();
        self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
