//! Actor metrics and mailbox monitoring.
//!
//! Mailbox depth thresholds:
//!
//! | Actor Type | Normal | Warning | Critical |
//! |------------|--------|---------|----------|
//! | Controller | < 100  | 100-500 | > 500    |
//! | Session    | < 100  | 100-500 | > 500    |

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Mailbox depth thresholds.
pub const MAILBOX_NORMAL: usize = 100;
pub const MAILBOX_WARNING: usize = 500;

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// `SessionControllerActor` (singleton).
    Controller,
    /// `SessionActor` (one per live session).
    Session,
}

impl ActorType {
    /// String form for log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Controller => "controller",
            ActorType::Session => "session",
        }
    }
}

/// Mailbox monitor tracking queue depth per actor.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    actor_id: String,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    /// Create a monitor for the given actor.
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    /// Record a message entering the mailbox.
    pub fn record_enqueue(&self) {
        let new_depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;

        let mut current_peak = self.peak_depth.load(Ordering::Relaxed);
        while new_depth > current_peak {
            match self.peak_depth.compare_exchange_weak(
                current_peak,
                new_depth,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => current_peak = actual,
            }
        }

        if new_depth > MAILBOX_WARNING {
            warn!(
                target: "fc.actor.metrics",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = new_depth,
                "Mailbox depth critical"
            );
        }
    }

    /// Record a message leaving the mailbox.
    pub fn record_dequeue(&self) {
        self.depth.fetch_sub(1, Ordering::Relaxed);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Current mailbox depth.
    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Peak mailbox depth observed.
    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    /// Total messages processed.
    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }
}

/// Shared counters across the actor hierarchy.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    sessions_created: AtomicU64,
    sessions_removed: AtomicU64,
    rooms_created: AtomicU64,
    rooms_removed: AtomicU64,
    aggregations_run: AtomicU64,
    messages_processed: AtomicU64,
    actor_panics: AtomicU64,
}

impl ActorMetrics {
    /// Create zeroed metrics.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_removed(&self) {
        self.sessions_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn room_created(&self) {
        self.rooms_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn room_removed(&self) {
        self.rooms_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn aggregation_run(&self) {
        self.aggregations_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a panicked actor task.
    pub fn record_panic(&self, actor_type: ActorType) {
        self.actor_panics.fetch_add(1, Ordering::Relaxed);
        warn!(
            target: "fc.actor.metrics",
            actor_type = actor_type.as_str(),
            "Actor task panicked"
        );
    }

    /// Live session count (created minus removed).
    #[must_use]
    pub fn session_count(&self) -> u64 {
        self.sessions_created
            .load(Ordering::Relaxed)
            .saturating_sub(self.sessions_removed.load(Ordering::Relaxed))
    }

    /// Total aggregation runs.
    #[must_use]
    pub fn aggregations(&self) -> u64 {
        self.aggregations_run.load(Ordering::Relaxed)
    }

    /// Total actor panics observed.
    #[must_use]
    pub fn panics(&self) -> u64 {
        self.actor_panics.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_mailbox_depth_tracking() {
        let monitor = MailboxMonitor::new(ActorType::Session, "session-1");

        monitor.record_enqueue();
        monitor.record_enqueue();
        assert_eq!(monitor.current_depth(), 2);
        assert_eq!(monitor.peak_depth(), 2);

        monitor.record_dequeue();
        assert_eq!(monitor.current_depth(), 1);
        assert_eq!(monitor.peak_depth(), 2);
        assert_eq!(monitor.messages_processed(), 1);
    }

    #[test]
    fn test_session_count_never_underflows() {
        let metrics = ActorMetrics::new();
        metrics.session_removed();
        assert_eq!(metrics.session_count(), 0);

        metrics.session_created();
        metrics.session_created();
        metrics.session_removed();
        assert_eq!(metrics.session_count(), 1);
    }

    #[test]
    fn test_actor_type_labels() {
        assert_eq!(ActorType::Controller.as_str(), "controller");
        assert_eq!(ActorType::Session.as_str(), "session");
    }
}
