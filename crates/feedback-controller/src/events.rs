//! Per-session change-notification fan-out.
//!
//! Observers subscribe to a session id and receive typed lifecycle and
//! room-mutation events over a `tokio::sync::broadcast` channel. Delivery
//! is fire-and-forget: a slow or disconnected observer lags or misses
//! events, it never blocks the mutation that produced them.
//!
//! Event payloads carry read models only ([`RoomView`] exposes per-list
//! note counts, never pre-aggregation note contents), so authorship stays
//! anonymous in transit.

use crate::actors::messages::RoomView;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::debug;

/// Default per-session broadcast buffer.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Events published on a session's channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum SessionEvent {
    /// The session was locked for new rooms by its owner.
    #[serde(rename_all = "camelCase")]
    SessionLocked {
        /// Epoch seconds at which the session expires, if it does.
        expiration_timestamp: Option<i64>,
    },

    /// Authored notes were redistributed into received Positive/Negative
    /// lists.
    NotesAggregated,

    /// The session and everything under it was removed.
    SessionEnded,

    /// A participant created a room.
    #[serde(rename_all = "camelCase")]
    RoomCreated { room: RoomView },

    /// A room's visible state changed (readiness, list counts).
    #[serde(rename_all = "camelCase")]
    RoomChanged { room: RoomView },

    /// A room was removed from the session.
    #[serde(rename_all = "camelCase")]
    RoomRemoved { room_id: String },

    /// A room-creation attempt was rejected because the session is full.
    #[serde(rename_all = "camelCase")]
    RoomLimitReached { name: String },
}

/// Registry of per-session broadcast channels.
#[derive(Debug)]
pub struct EventHub {
    channels: Mutex<HashMap<String, broadcast::Sender<SessionEvent>>>,
    capacity: usize,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl EventHub {
    /// Create a hub whose per-session channels buffer `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to a session's events.
    ///
    /// The channel is created on first interest, so observers can join
    /// before the session itself exists (e.g. while holding only an
    /// add-link).
    pub fn subscribe(&self, session_id: &str) -> broadcast::Receiver<SessionEvent> {
        let mut channels = self.lock_channels();
        channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Publish an event to every current subscriber of the session.
    ///
    /// Publishing to a session nobody subscribed to is a no-op.
    pub fn publish(&self, session_id: &str, event: SessionEvent) {
        let sender = {
            let channels = self.lock_channels();
            channels.get(session_id).cloned()
        };

        if let Some(sender) = sender {
            // Zero receivers is not an error; the event is simply dropped.
            let receivers = sender.send(event).unwrap_or(0);
            debug!(
                target: "fc.events",
                session_id = %session_id,
                receivers,
                "Event published"
            );
        }
    }

    /// Drop a session's channel.
    ///
    /// Called after the terminal [`SessionEvent::SessionEnded`] broadcast;
    /// existing receivers drain what is buffered and then observe the
    /// channel as closed.
    pub fn close(&self, session_id: &str) {
        if self.lock_channels().remove(session_id).is_some() {
            debug!(
                target: "fc.events",
                session_id = %session_id,
                "Event channel closed"
            );
        }
    }

    /// Number of sessions with a live channel.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.lock_channels().len()
    }

    fn lock_channels(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<SessionEvent>>> {
        match self.channels.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_published_event() {
        let hub = EventHub::default();
        let mut rx = hub.subscribe("session-1");

        hub.publish("session-1", SessionEvent::NotesAggregated);

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::NotesAggregated));
    }

    #[tokio::test]
    async fn test_all_subscribers_receive_each_event() {
        let hub = EventHub::default();
        let mut rx1 = hub.subscribe("session-1");
        let mut rx2 = hub.subscribe("session-1");

        hub.publish(
            "session-1",
            SessionEvent::RoomRemoved {
                room_id: "room-9".to_string(),
            },
        );

        for rx in [&mut rx1, &mut rx2] {
            let event = rx.recv().await.unwrap();
            assert!(matches!(event, SessionEvent::RoomRemoved { ref room_id } if room_id == "room-9"));
        }
    }

    #[tokio::test]
    async fn test_events_scoped_to_session() {
        let hub = EventHub::default();
        let mut rx_other = hub.subscribe("session-2");

        hub.publish("session-1", SessionEvent::SessionEnded);

        assert!(matches!(
            rx_other.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let hub = EventHub::default();
        // No channel exists yet; must not panic or create state.
        hub.publish("session-1", SessionEvent::SessionEnded);
        assert_eq!(hub.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_close_ends_receivers_after_drain() {
        let hub = EventHub::default();
        let mut rx = hub.subscribe("session-1");

        hub.publish("session-1", SessionEvent::SessionEnded);
        hub.close("session-1");
        assert_eq!(hub.channel_count(), 0);

        // Buffered terminal event still drains, then the channel closes.
        assert!(matches!(
            rx.recv().await,
            Ok(SessionEvent::SessionEnded)
        ));
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = SessionEvent::SessionLocked {
            expiration_timestamp: Some(1_700_000_000),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"sessionLocked\""));
        assert!(json.contains("\"expirationTimestamp\":1700000000"));

        let json = serde_json::to_string(&SessionEvent::SessionEnded).unwrap();
        assert!(json.contains("sessionEnded"));
    }
}
