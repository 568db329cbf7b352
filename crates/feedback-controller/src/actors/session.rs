//! `SessionActor` - per-session actor that owns session state.
//!
//! Each `SessionActor`:
//! - Owns one session's record and its room/list/note subgraph
//! - Enforces the phase/lock guards in the same critical section as the
//!   mutations they protect (the mailbox is the per-session lock)
//! - Publishes room-mutation and lifecycle events on the session's
//!   channel after every externally visible change
//!
//! The phase only ever moves `Collecting -> Aggregated`; ending the
//! session tears the subgraph down and stops the actor, whichever phase
//! it is in.

use crate::actors::aggregate::aggregate_rooms;
use crate::actors::messages::{
    Rate, RoomDetail, RoomView, SessionMessage, SessionPhase, SessionState,
};
use crate::actors::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use crate::actors::rooms::RoomRegistry;
use crate::errors::FcError;
use crate::events::{EventHub, SessionEvent};

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Default channel buffer size for the session mailbox.
const SESSION_CHANNEL_BUFFER: usize = 256;

/// Immutable facts fixed at session creation.
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// Seed-derived session id.
    pub id: String,
    /// Resolved identity of the session owner.
    pub creator_id: String,
    /// Opaque invite token.
    pub add_link: String,
    /// Premium sessions never expire.
    pub premium: bool,
    /// Epoch seconds at which the session expires, `None` for premium.
    pub expiration_timestamp: Option<i64>,
    /// Creation timestamp, epoch seconds.
    pub created_at: i64,
    /// Maximum rooms this session accepts.
    pub max_rooms: usize,
}

/// Handle to a `SessionActor`.
#[derive(Debug, Clone)]
pub struct SessionActorHandle {
    sender: mpsc::Sender<SessionMessage>,
    cancel_token: CancellationToken,
    session_id: String,
}

impl SessionActorHandle {
    /// Get the session ID.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Create a room for a participant.
    pub async fn create_room(
        &self,
        name: String,
        owner_identity: String,
    ) -> Result<RoomView, FcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SessionMessage::CreateRoom {
                name,
                owner_identity,
                respond_to: tx,
            })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Fetch a room with note contents; owner-of-room or session owner only.
    pub async fn get_room(&self, room_id: String, caller: String) -> Result<RoomDetail, FcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SessionMessage::GetRoom {
                room_id,
                caller,
                respond_to: tx,
            })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Fetch the caller's own room.
    pub async fn find_room_by_owner(&self, owner_identity: String) -> Result<RoomDetail, FcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SessionMessage::FindRoomByOwner {
                owner_identity,
                respond_to: tx,
            })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))?
    }

    /// List every room as a count-only view.
    pub async fn list_rooms(&self) -> Result<Vec<RoomView>, FcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SessionMessage::ListRooms { respond_to: tx })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))
    }

    /// Remove a room; session owner only.
    pub async fn remove_room(&self, room_id: String, caller: String) -> Result<(), FcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SessionMessage::RemoveRoom {
                room_id,
                caller,
                respond_to: tx,
            })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Set a room's readiness flag.
    pub async fn set_ready(
        &self,
        room_id: String,
        caller: String,
        ready: bool,
    ) -> Result<(), FcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SessionMessage::SetReady {
                room_id,
                caller,
                ready,
                respond_to: tx,
            })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Add or edit a note the caller writes about a peer room.
    pub async fn submit_note(
        &self,
        caller: String,
        about_room_id: String,
        note_id: Option<String>,
        content: String,
        rate: Rate,
    ) -> Result<(), FcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SessionMessage::SubmitNote {
                caller,
                about_room_id,
                note_id,
                content,
                rate,
                respond_to: tx,
            })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Remove a note from one of the caller's lists.
    pub async fn remove_note(
        &self,
        caller: String,
        list_id: String,
        note_id: String,
    ) -> Result<(), FcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SessionMessage::RemoveNote {
                caller,
                list_id,
                note_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Close the session for new rooms; session owner only.
    pub async fn lock(&self, caller: String) -> Result<(), FcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SessionMessage::Lock {
                caller,
                respond_to: tx,
            })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Redistribute authored notes; session owner only, locked sessions only.
    pub async fn aggregate(&self, caller: String) -> Result<(), FcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SessionMessage::Aggregate {
                caller,
                respond_to: tx,
            })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))?
    }

    /// Get the current session state.
    pub async fn get_state(&self) -> Result<SessionState, FcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SessionMessage::GetState { respond_to: tx })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))
    }

    /// Tear down the subgraph and stop the actor.
    ///
    /// Controller-only; the explicit-end and expired-timer paths both
    /// arrive here through the controller.
    pub(crate) async fn end(&self) -> Result<SessionState, FcError> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SessionMessage::End { respond_to: tx })
            .await
            .map_err(|e| FcError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| FcError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the session actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `SessionActor` implementation.
pub struct SessionActor {
    /// Session id (seed-derived).
    session_id: String,
    /// Resolved owner identity.
    creator_id: String,
    /// Opaque invite token.
    add_link: String,
    /// Lifecycle phase.
    phase: SessionPhase,
    /// Closed-for-new-rooms sub-state of `Collecting`.
    locked: bool,
    /// Premium sessions carry no expiration.
    premium: bool,
    /// Epoch seconds of expiry, if any.
    expiration_timestamp: Option<i64>,
    /// Creation timestamp.
    created_at: i64,
    /// Maximum rooms this session accepts.
    max_rooms: usize,
    /// The room/list/note subgraph.
    rooms: RoomRegistry,
    /// Message receiver.
    receiver: mpsc::Receiver<SessionMessage>,
    /// Cancellation token (child of the controller's token).
    cancel_token: CancellationToken,
    /// Change-notification fan-out.
    hub: Arc<EventHub>,
    /// Shared actor metrics.
    metrics: Arc<ActorMetrics>,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
}

impl SessionActor {
    /// Spawn a new session actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        params: SessionParams,
        cancel_token: CancellationToken,
        hub: Arc<EventHub>,
        metrics: Arc<ActorMetrics>,
    ) -> (SessionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(SESSION_CHANNEL_BUFFER);

        let session_id = params.id.clone();
        let actor = Self {
            session_id: params.id.clone(),
            creator_id: params.creator_id,
            add_link: params.add_link,
            phase: SessionPhase::Collecting,
            locked: false,
            premium: params.premium,
            expiration_timestamp: params.expiration_timestamp,
            created_at: params.created_at,
            max_rooms: params.max_rooms,
            rooms: RoomRegistry::new(params.id),
            receiver,
            cancel_token: cancel_token.clone(),
            hub,
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Session, &session_id),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = SessionActorHandle {
            sender,
            cancel_token,
            session_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "fc.actor.session", fields(session_id = %self.session_id))]
    async fn run(mut self) {
        info!(
            target: "fc.actor.session",
            session_id = %self.session_id,
            premium = self.premium,
            "SessionActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "fc.actor.session",
                        session_id = %self.session_id,
                        "SessionActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            let ended = matches!(message, SessionMessage::End { .. });
                            self.handle_message(message);
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                            if ended {
                                break;
                            }
                        }
                        None => {
                            info!(
                                target: "fc.actor.session",
                                session_id = %self.session_id,
                                "SessionActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "fc.actor.session",
            session_id = %self.session_id,
            rooms = self.rooms.len(),
            messages_processed = self.mailbox.messages_processed(),
            "SessionActor stopped"
        );
    }

    /// Handle a single message.
    ///
    /// Every guard is evaluated here, inside the same step as the
    /// mutation it protects.
    fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::CreateRoom {
                name,
                owner_identity,
                respond_to,
            } => {
                let result = self.handle_create_room(&name, &owner_identity);
                let _ = respond_to.send(result);
            }

            SessionMessage::GetRoom {
                room_id,
                caller,
                respond_to,
            } => {
                let result = self.handle_get_room(&room_id, &caller);
                let _ = respond_to.send(result);
            }

            SessionMessage::FindRoomByOwner {
                owner_identity,
                respond_to,
            } => {
                let result = self
                    .rooms
                    .find_by_owner(&owner_identity)
                    .map(|room| room.to_detail());
                let _ = respond_to.send(result);
            }

            SessionMessage::ListRooms { respond_to } => {
                let _ = respond_to.send(self.rooms.views());
            }

            SessionMessage::RemoveRoom {
                room_id,
                caller,
                respond_to,
            } => {
                let result = self.handle_remove_room(&room_id, &caller);
                let _ = respond_to.send(result);
            }

            SessionMessage::SetReady {
                room_id,
                caller,
                ready,
                respond_to,
            } => {
                let result = self.handle_set_ready(&room_id, &caller, ready);
                let _ = respond_to.send(result);
            }

            SessionMessage::SubmitNote {
                caller,
                about_room_id,
                note_id,
                content,
                rate,
                respond_to,
            } => {
                let result =
                    self.handle_submit_note(&caller, &about_room_id, note_id.as_deref(), &content, rate);
                let _ = respond_to.send(result);
            }

            SessionMessage::RemoveNote {
                caller,
                list_id,
                note_id,
                respond_to,
            } => {
                let result = self.handle_remove_note(&caller, &list_id, &note_id);
                let _ = respond_to.send(result);
            }

            SessionMessage::Lock { caller, respond_to } => {
                let result = self.handle_lock(&caller);
                let _ = respond_to.send(result);
            }

            SessionMessage::Aggregate { caller, respond_to } => {
                let result = self.handle_aggregate(&caller);
                let _ = respond_to.send(result);
            }

            SessionMessage::GetState { respond_to } => {
                let _ = respond_to.send(self.state());
            }

            SessionMessage::End { respond_to } => {
                let state = self.handle_end();
                let _ = respond_to.send(state);
            }
        }
    }

    fn state(&self) -> SessionState {
        SessionState {
            id: self.session_id.clone(),
            creator_id: self.creator_id.clone(),
            add_link: self.add_link.clone(),
            phase: self.phase,
            locked: self.locked,
            premium: self.premium,
            expiration_timestamp: self.expiration_timestamp,
            created_at: self.created_at,
            room_count: self.rooms.len(),
        }
    }

    fn require_collecting(&self, action: &str) -> Result<(), FcError> {
        if self.phase == SessionPhase::Collecting {
            Ok(())
        } else {
            Err(FcError::Locked(action.to_string()))
        }
    }

    fn require_owner(&self, caller: &str, action: &str) -> Result<(), FcError> {
        if caller == self.creator_id {
            Ok(())
        } else {
            Err(FcError::PermissionDenied(format!(
                "only the session owner can {action}"
            )))
        }
    }

    #[instrument(skip_all, fields(session_id = %self.session_id))]
    fn handle_create_room(&mut self, name: &str, owner_identity: &str) -> Result<RoomView, FcError> {
        self.require_collecting("create room")?;
        if self.locked {
            return Err(FcError::Locked("create room".to_string()));
        }

        let view = match self.rooms.create(name, owner_identity, self.max_rooms) {
            Ok(room) => room.to_view(),
            Err(err) => {
                if matches!(err, FcError::CapacityExceeded(_)) {
                    self.hub.publish(
                        &self.session_id,
                        SessionEvent::RoomLimitReached {
                            name: name.to_string(),
                        },
                    );
                }
                return Err(err);
            }
        };

        self.metrics.room_created();
        self.hub.publish(
            &self.session_id,
            SessionEvent::RoomCreated { room: view.clone() },
        );

        info!(
            target: "fc.actor.session",
            room_id = %view.id,
            total_rooms = self.rooms.len(),
            "Room created"
        );

        Ok(view)
    }

    fn handle_get_room(&self, room_id: &str, caller: &str) -> Result<RoomDetail, FcError> {
        let room = self.rooms.get(room_id)?;
        if caller != room.owner_identity && caller != self.creator_id {
            return Err(FcError::PermissionDenied(
                "only the room owner or the session owner can read it".to_string(),
            ));
        }
        Ok(room.to_detail())
    }

    #[instrument(skip_all, fields(session_id = %self.session_id))]
    fn handle_remove_room(&mut self, room_id: &str, caller: &str) -> Result<(), FcError> {
        self.require_owner(caller, "remove a room")?;

        let room = self.rooms.remove(room_id)?;
        self.metrics.room_removed();
        self.hub.publish(
            &self.session_id,
            SessionEvent::RoomRemoved {
                room_id: room.id.clone(),
            },
        );

        info!(
            target: "fc.actor.session",
            room_id = %room.id,
            remaining_rooms = self.rooms.len(),
            "Room removed"
        );

        Ok(())
    }

    fn handle_set_ready(&mut self, room_id: &str, caller: &str, ready: bool) -> Result<(), FcError> {
        self.require_collecting("set ready")?;

        let room = self.rooms.get(room_id)?;
        if caller != room.owner_identity && caller != self.creator_id {
            return Err(FcError::PermissionDenied(
                "only the room owner or the session owner can modify it".to_string(),
            ));
        }

        let view = self.rooms.set_ready(room_id, ready)?.to_view();
        self.hub
            .publish(&self.session_id, SessionEvent::RoomChanged { room: view });

        debug!(
            target: "fc.actor.session",
            session_id = %self.session_id,
            room_id = %room_id,
            ready,
            "Room readiness changed"
        );

        Ok(())
    }

    fn handle_submit_note(
        &mut self,
        caller: &str,
        about_room_id: &str,
        note_id: Option<&str>,
        content: &str,
        rate: Rate,
    ) -> Result<(), FcError> {
        self.require_collecting("submit note")?;

        let view = self
            .rooms
            .submit_note(caller, about_room_id, note_id, content, rate)?
            .to_view();
        self.hub
            .publish(&self.session_id, SessionEvent::RoomChanged { room: view });

        Ok(())
    }

    fn handle_remove_note(
        &mut self,
        caller: &str,
        list_id: &str,
        note_id: &str,
    ) -> Result<(), FcError> {
        self.require_collecting("remove note")?;

        let view = self.rooms.remove_note(caller, list_id, note_id)?.to_view();
        self.hub
            .publish(&self.session_id, SessionEvent::RoomChanged { room: view });

        Ok(())
    }

    #[instrument(skip_all, fields(session_id = %self.session_id))]
    fn handle_lock(&mut self, caller: &str) -> Result<(), FcError> {
        self.require_owner(caller, "lock the session")?;
        self.require_collecting("lock")?;
        if self.locked {
            return Err(FcError::Locked("lock".to_string()));
        }

        self.locked = true;
        self.hub.publish(
            &self.session_id,
            SessionEvent::SessionLocked {
                expiration_timestamp: self.expiration_timestamp,
            },
        );

        info!(
            target: "fc.actor.session",
            rooms = self.rooms.len(),
            "Session locked"
        );

        Ok(())
    }

    #[instrument(skip_all, fields(session_id = %self.session_id))]
    fn handle_aggregate(&mut self, caller: &str) -> Result<(), FcError> {
        self.require_owner(caller, "aggregate notes")?;
        if self.phase == SessionPhase::Aggregated {
            return Err(FcError::AlreadyAggregated);
        }
        if !self.locked {
            return Err(FcError::Locked("aggregate".to_string()));
        }

        let outcome = aggregate_rooms(&mut self.rooms);
        self.phase = SessionPhase::Aggregated;
        self.metrics.aggregation_run();

        info!(
            target: "fc.actor.session",
            rooms = outcome.rooms,
            removed_lists = outcome.removed_lists,
            removed_notes = outcome.removed_notes,
            redistributed_notes = outcome.redistributed_notes,
            dropped_notes = outcome.dropped_notes,
            "Aggregated notes"
        );

        self.hub
            .publish(&self.session_id, SessionEvent::NotesAggregated);

        Ok(())
    }

    /// Tear down the subgraph. The controller broadcasts `SessionEnded`
    /// and reaps the actor entry once this returns.
    fn handle_end(&mut self) -> SessionState {
        let state = self.state();
        let (rooms, lists, notes) = self.rooms.clear();

        info!(
            target: "fc.actor.session",
            session_id = %self.session_id,
            rooms,
            lists,
            notes,
            "Session subgraph removed"
        );

        state
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    const SESSION_ID: &str = "a1b2c3d4e5f60718";
    const OWNER: &str = "owner-identity";

    fn spawn_actor() -> (SessionActorHandle, Arc<EventHub>) {
        let hub = Arc::new(EventHub::default());
        let params = SessionParams {
            id: SESSION_ID.to_string(),
            creator_id: OWNER.to_string(),
            add_link: "f00dfaceb00c1234".to_string(),
            premium: false,
            expiration_timestamp: Some(chrono::Utc::now().timestamp() + 1800),
            created_at: chrono::Utc::now().timestamp(),
            max_rooms: 64,
        };
        let (handle, _task) = SessionActor::spawn(
            params,
            CancellationToken::new(),
            Arc::clone(&hub),
            ActorMetrics::new(),
        );
        (handle, hub)
    }

    #[tokio::test]
    async fn test_create_room_and_state() {
        let (handle, _hub) = spawn_actor();

        let room = handle
            .create_room("Dana".to_string(), "identity-d".to_string())
            .await
            .unwrap();
        assert_eq!(room.session_id, SESSION_ID);
        assert!(!room.ready);
        assert!(!room.own_notes);

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.phase, SessionPhase::Collecting);
        assert_eq!(state.room_count, 1);
        assert!(!state.locked);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_duplicate_identity_conflict_keeps_count() {
        let (handle, _hub) = spawn_actor();

        handle
            .create_room("Dana".to_string(), "identity-d".to_string())
            .await
            .unwrap();
        let result = handle
            .create_room("Dana again".to_string(), "identity-d".to_string())
            .await;
        assert!(matches!(result, Err(FcError::RoomConflict)));

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.room_count, 1);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_create_room_rejected_when_locked() {
        let (handle, _hub) = spawn_actor();

        handle.lock(OWNER.to_string()).await.unwrap();

        let result = handle
            .create_room("Late".to_string(), "identity-late".to_string())
            .await;
        assert!(matches!(result, Err(FcError::Locked(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_lock_requires_owner_and_single_use() {
        let (handle, _hub) = spawn_actor();

        let result = handle.lock("identity-x".to_string()).await;
        assert!(matches!(result, Err(FcError::PermissionDenied(_))));

        handle.lock(OWNER.to_string()).await.unwrap();
        let result = handle.lock(OWNER.to_string()).await;
        assert!(matches!(result, Err(FcError::Locked(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_aggregate_requires_lock() {
        let (handle, _hub) = spawn_actor();

        let result = handle.aggregate(OWNER.to_string()).await;
        assert!(matches!(result, Err(FcError::Locked(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_aggregate_requires_owner() {
        let (handle, _hub) = spawn_actor();
        handle.lock(OWNER.to_string()).await.unwrap();

        let result = handle.aggregate("identity-x".to_string()).await;
        assert!(matches!(result, Err(FcError::PermissionDenied(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_second_aggregate_rejected_and_state_unchanged() {
        let (handle, _hub) = spawn_actor();

        let room_a = handle
            .create_room("A".to_string(), "ia".to_string())
            .await
            .unwrap();
        let _room_b = handle
            .create_room("B".to_string(), "ib".to_string())
            .await
            .unwrap();
        handle
            .submit_note(
                "ib".to_string(),
                room_a.id.clone(),
                None,
                "nice work".to_string(),
                Rate::Positive,
            )
            .await
            .unwrap();

        handle.lock(OWNER.to_string()).await.unwrap();
        handle.aggregate(OWNER.to_string()).await.unwrap();

        let mut before = handle.list_rooms().await.unwrap();
        before.sort_by(|a, b| a.id.cmp(&b.id));
        let before = serde_json::to_string(&before).unwrap();

        let result = handle.aggregate(OWNER.to_string()).await;
        assert!(matches!(result, Err(FcError::AlreadyAggregated)));

        let mut after = handle.list_rooms().await.unwrap();
        after.sort_by(|a, b| a.id.cmp(&b.id));
        let after = serde_json::to_string(&after).unwrap();
        assert_eq!(before, after);

        let state = handle.get_state().await.unwrap();
        assert_eq!(state.phase, SessionPhase::Aggregated);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_note_ops_locked_after_aggregation() {
        let (handle, _hub) = spawn_actor();

        let room_a = handle
            .create_room("A".to_string(), "ia".to_string())
            .await
            .unwrap();
        handle
            .create_room("B".to_string(), "ib".to_string())
            .await
            .unwrap();

        handle.lock(OWNER.to_string()).await.unwrap();
        handle.aggregate(OWNER.to_string()).await.unwrap();

        let result = handle
            .submit_note(
                "ib".to_string(),
                room_a.id.clone(),
                None,
                "too late".to_string(),
                Rate::Positive,
            )
            .await;
        assert!(matches!(result, Err(FcError::Locked(_))));

        let result = handle
            .set_ready(room_a.id.clone(), "ia".to_string(), true)
            .await;
        assert!(matches!(result, Err(FcError::Locked(_))));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_set_ready_authorization() {
        let (handle, _hub) = spawn_actor();

        let room = handle
            .create_room("Dana".to_string(), "identity-d".to_string())
            .await
            .unwrap();

        // A stranger cannot flip readiness.
        let result = handle
            .set_ready(room.id.clone(), "identity-x".to_string(), true)
            .await;
        assert!(matches!(result, Err(FcError::PermissionDenied(_))));

        // The room owner can; so can the session owner.
        handle
            .set_ready(room.id.clone(), "identity-d".to_string(), true)
            .await
            .unwrap();
        handle
            .set_ready(room.id.clone(), OWNER.to_string(), false)
            .await
            .unwrap();

        handle.cancel();
    }

    #[tokio::test]
    async fn test_get_room_authorization() {
        let (handle, _hub) = spawn_actor();

        let room = handle
            .create_room("Dana".to_string(), "identity-d".to_string())
            .await
            .unwrap();

        let result = handle
            .get_room(room.id.clone(), "identity-x".to_string())
            .await;
        assert!(matches!(result, Err(FcError::PermissionDenied(_))));

        let detail = handle
            .get_room(room.id.clone(), "identity-d".to_string())
            .await
            .unwrap();
        assert_eq!(detail.id, room.id);

        handle.cancel();
    }

    #[tokio::test]
    async fn test_room_events_are_published() {
        let (handle, hub) = spawn_actor();
        let mut rx = hub.subscribe(SESSION_ID);

        let room = handle
            .create_room("Dana".to_string(), "identity-d".to_string())
            .await
            .unwrap();
        handle
            .set_ready(room.id.clone(), "identity-d".to_string(), true)
            .await
            .unwrap();
        handle
            .remove_room(room.id.clone(), OWNER.to_string())
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::RoomCreated { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::RoomChanged { room } if room.ready
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::RoomRemoved { room_id } if room_id == room.id
        ));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_lock_and_aggregate_events() {
        let (handle, hub) = spawn_actor();
        let mut rx = hub.subscribe(SESSION_ID);

        handle.lock(OWNER.to_string()).await.unwrap();
        handle.aggregate(OWNER.to_string()).await.unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::SessionLocked {
                expiration_timestamp: Some(_)
            }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::NotesAggregated
        ));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_room_limit_event_on_capacity() {
        let hub = Arc::new(EventHub::default());
        let params = SessionParams {
            id: SESSION_ID.to_string(),
            creator_id: OWNER.to_string(),
            add_link: "f00dfaceb00c1234".to_string(),
            premium: false,
            expiration_timestamp: None,
            created_at: chrono::Utc::now().timestamp(),
            max_rooms: 1,
        };
        let (handle, _task) = SessionActor::spawn(
            params,
            CancellationToken::new(),
            Arc::clone(&hub),
            ActorMetrics::new(),
        );
        let mut rx = hub.subscribe(SESSION_ID);

        handle
            .create_room("First".to_string(), "i1".to_string())
            .await
            .unwrap();
        let result = handle
            .create_room("Second".to_string(), "i2".to_string())
            .await;
        assert!(matches!(result, Err(FcError::CapacityExceeded(_))));

        // RoomCreated for the first, RoomLimitReached for the second.
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::RoomCreated { .. }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            SessionEvent::RoomLimitReached { name } if name == "Second"
        ));

        handle.cancel();
    }

    #[tokio::test]
    async fn test_end_tears_down_and_stops_actor() {
        let (handle, hub) = spawn_actor();
        let mut rx = hub.subscribe(SESSION_ID);

        handle
            .create_room("Dana".to_string(), "identity-d".to_string())
            .await
            .unwrap();

        let state = handle.end().await.unwrap();
        assert_eq!(state.id, SESSION_ID);
        assert_eq!(state.room_count, 1);

        // Actor is gone; further sends fail as internal errors.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let result = handle.get_state().await;
        assert!(matches!(result, Err(FcError::Internal(_))));

        // Teardown itself does not broadcast; the controller owns the
        // terminal SessionEnded event. Only the earlier RoomCreated is
        // buffered.
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::RoomCreated { .. }
        ));
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        handle.cancel();
    }
}
