//! Per-run state shared by every component of one analysis invocation.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::brain::Language;
use crate::models::ServiceNotification;

/// Created at run start, dropped at run end.
///
/// Carries the cancellation token, the notifications collected so far and
/// the latch that keeps a failed service from being called again within
/// the same run.
pub struct RunContext {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub language: Language,
    cancel: CancellationToken,
    notifications: Mutex<Vec<ServiceNotification>>,
    ai_disabled: AtomicBool,
}

impl RunContext {
    /// Builds a context whose token is a child of `parent`, so cancelling the
    /// caller's token stops the run but finishing the run leaves it untouched.
    ///
    /// With a `deadline`, the token fires on its own once the deadline passes.
    pub fn new(language: Language, parent: &CancellationToken, deadline: Option<Duration>) -> Self {
        let cancel = parent.child_token();

        if let Some(deadline) = deadline {
            let timer = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = timer.cancelled() => {}
                    _ = tokio::time::sleep(deadline) => {
                        warn!(deadline_ms = deadline.as_millis() as u64, "Run deadline reached");
                        timer.cancel();
                    }
                }
            });
        }

        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            language,
            cancel,
            notifications: Mutex::new(Vec::new()),
            ai_disabled: AtomicBool::new(false),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }

    /// Records a notification. Identical messages are kept once.
    pub fn notify(&self, notification: ServiceNotification) {
        let mut notifications = self
            .notifications
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !notifications.iter().any(|n| n.message == notification.message) {
            notifications.push(notification);
        }
    }

    pub fn notifications(&self) -> Vec<ServiceNotification> {
        self.notifications
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Stops AI attempts for the rest of the run. Returns `true` only for the
    /// call that flipped the latch.
    pub fn disable_ai(&self, reason: &str) -> bool {
        let first = !self.ai_disabled.swap(true, Ordering::SeqCst);
        if first {
            info!(run_id = %self.run_id, reason, "AI analysis disabled for the rest of the run");
        }
        first
    }

    pub fn ai_disabled(&self) -> bool {
        self.ai_disabled.load(Ordering::SeqCst)
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        // Releases the deadline timer; the parent token is not affected.
        self.cancel.cancel();
    }
}
