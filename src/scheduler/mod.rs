//! Deferred completion signaling. The orchestrator's own reconciliation is
//! the source of truth for elapsed time; the scheduler only guarantees the
//! user still hears about a reached target when the foreground loop is not
//! being observed.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use notify_rust::Notification;
use tokio::task::JoinHandle;
use tokio::time;

use crate::log_info;
use crate::models::Category;

const ENABLE_LOGS: bool = true;

/// Upper bound on any single sleep while waiting out a deadline. The async
/// sleep timer runs on a monotonic clock that stops during system suspend,
/// so the wait is sliced and the wall clock re-checked after each slice; a
/// request that came due while the machine slept is then at most one slice
/// late instead of late by the whole suspend duration.
const WAKE_SLICE: Duration = Duration::from_secs(60);

async fn sleep_until_wall(due: DateTime<Utc>) {
    loop {
        let remaining = due - Utc::now();
        if remaining <= TimeDelta::zero() {
            return;
        }
        let slice = remaining
            .to_std()
            .map(|r| r.min(WAKE_SLICE))
            .unwrap_or(WAKE_SLICE);
        time::sleep(slice).await;
    }
}

/// One-shot completion signal, delivered best-effort soon after `delay`.
/// A new `schedule` call supersedes any outstanding request; at most one
/// request exists system-wide, matching the one-running-category invariant.
pub trait CompletionScheduler: Send + Sync {
    fn schedule(&self, delay: Duration, category: Category, message: &str);
    /// Revoke any outstanding request. No-op when none is pending.
    fn cancel(&self);
}

/// Production scheduler: a detached tokio task sleeps out the delay and then
/// raises a desktop notification. The task outlives whatever foreground loop
/// requested it (but not the process).
pub struct NotificationScheduler {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationScheduler {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
        }
    }

    pub fn has_pending(&self) -> bool {
        match self.pending.lock() {
            Ok(guard) => guard.as_ref().is_some_and(|handle| !handle.is_finished()),
            Err(_) => false,
        }
    }
}

impl Default for NotificationScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionScheduler for NotificationScheduler {
    fn schedule(&self, delay: Duration, category: Category, message: &str) {
        let message = message.to_string();
        let due = Utc::now() + TimeDelta::seconds(delay.as_secs() as i64);
        let handle = tokio::spawn(async move {
            sleep_until_wall(due).await;
            log_info!("Raising completion notification for {}", category.as_str());
            let result = tokio::task::spawn_blocking(move || {
                Notification::new()
                    .summary("PracticeLog")
                    .body(&message)
                    .appname("practice-log")
                    .icon("alarm-clock")
                    .show()
            })
            .await;

            match result {
                Ok(Err(err)) => log::warn!("Failed to show completion notification: {err}"),
                Err(err) => log::warn!("Notification task panicked: {err}"),
                Ok(Ok(_)) => {}
            }
        });

        let mut guard = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Replace-before-set: the old request dies with its task.
        if let Some(old) = guard.replace(handle) {
            old.abort();
        }
        log_info!(
            "Scheduled completion signal for {} in {}s",
            category.as_str(),
            delay.as_secs()
        );
    }

    fn cancel(&self) {
        let mut guard = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = guard.take() {
            handle.abort();
            log_info!("Cancelled pending completion signal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schedule_then_cancel_leaves_nothing_pending() {
        let scheduler = NotificationScheduler::new();
        assert!(!scheduler.has_pending());

        scheduler.schedule(Duration::from_secs(3600), Category::Technique, "done");
        assert!(scheduler.has_pending());

        scheduler.cancel();
        assert!(!scheduler.has_pending());

        // Cancel with nothing outstanding is a no-op.
        scheduler.cancel();
        assert!(!scheduler.has_pending());
    }

    #[tokio::test]
    async fn wall_deadline_already_past_completes_immediately() {
        // A deadline reached while asleep must not wait another slice.
        sleep_until_wall(Utc::now() - TimeDelta::seconds(30)).await;
        sleep_until_wall(Utc::now()).await;
    }

    #[tokio::test]
    async fn schedule_replaces_the_outstanding_request() {
        let scheduler = NotificationScheduler::new();
        scheduler.schedule(Duration::from_secs(3600), Category::Technique, "a");
        scheduler.schedule(Duration::from_secs(7200), Category::Etude, "b");
        assert!(scheduler.has_pending());

        scheduler.cancel();
        assert!(!scheduler.has_pending());
    }
}
