//! Mailbox messages and read-model DTOs for the actor hierarchy.
//!
//! Read models are what leaves the core: [`RoomView`] exposes per-list
//! note counts only, [`RoomDetail`] exposes full note contents and is
//! returned for a participant's own room, or for any room once the
//! session has aggregated.

use crate::actors::session::SessionActorHandle;
use crate::errors::FcError;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Session lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    /// Participants author feedback about each other's rooms.
    Collecting,
    /// Feedback has been redistributed; rooms hold received notes.
    Aggregated,
}

/// Binary note sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Rate {
    /// Positive feedback (+1).
    Positive,
    /// Negative feedback (-1).
    Negative,
}

impl Rate {
    /// Numeric form of the sentiment.
    #[must_use]
    pub const fn as_i8(self) -> i8 {
        match self {
            Rate::Positive => 1,
            Rate::Negative => -1,
        }
    }
}

/// Per-list summary: counts only, no note contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSummary {
    pub id: String,
    pub name: String,
    pub note_count: usize,
    pub associated_room_id: String,
}

/// Room read model safe to broadcast to every session observer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub id: String,
    pub session_id: String,
    pub name: String,
    pub ready: bool,
    pub own_notes: bool,
    pub lists: Vec<ListSummary>,
}

/// A single note as seen by an authorized reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteDetail {
    pub id: String,
    pub content: String,
    pub rate: Rate,
}

/// A list with full note contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDetail {
    pub id: String,
    pub name: String,
    pub associated_room_id: String,
    pub notes: Vec<NoteDetail>,
}

/// Room read model with note contents, for the room's owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetail {
    pub id: String,
    pub session_id: String,
    pub name: String,
    pub ready: bool,
    pub own_notes: bool,
    pub lists: Vec<ListDetail>,
}

/// Session read model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub id: String,
    pub creator_id: String,
    pub add_link: String,
    pub phase: SessionPhase,
    pub locked: bool,
    pub premium: bool,
    pub expiration_timestamp: Option<i64>,
    pub created_at: i64,
    pub room_count: usize,
}

/// Controller status snapshot.
#[derive(Debug, Clone)]
pub struct ControllerStatus {
    /// Number of live sessions.
    pub session_count: usize,
    /// Number of armed expiration timers.
    pub armed_timers: usize,
    /// Whether the controller is refusing new sessions.
    pub is_draining: bool,
    /// Current controller mailbox depth.
    pub mailbox_depth: usize,
}

/// Messages handled by a `SessionActor`.
#[derive(Debug)]
pub enum SessionMessage {
    CreateRoom {
        name: String,
        owner_identity: String,
        respond_to: oneshot::Sender<Result<RoomView, FcError>>,
    },
    GetRoom {
        room_id: String,
        caller: String,
        respond_to: oneshot::Sender<Result<RoomDetail, FcError>>,
    },
    FindRoomByOwner {
        owner_identity: String,
        respond_to: oneshot::Sender<Result<RoomDetail, FcError>>,
    },
    ListRooms {
        respond_to: oneshot::Sender<Vec<RoomView>>,
    },
    RemoveRoom {
        room_id: String,
        caller: String,
        respond_to: oneshot::Sender<Result<(), FcError>>,
    },
    SetReady {
        room_id: String,
        caller: String,
        ready: bool,
        respond_to: oneshot::Sender<Result<(), FcError>>,
    },
    SubmitNote {
        caller: String,
        about_room_id: String,
        note_id: Option<String>,
        content: String,
        rate: Rate,
        respond_to: oneshot::Sender<Result<(), FcError>>,
    },
    RemoveNote {
        caller: String,
        list_id: String,
        note_id: String,
        respond_to: oneshot::Sender<Result<(), FcError>>,
    },
    Lock {
        caller: String,
        respond_to: oneshot::Sender<Result<(), FcError>>,
    },
    Aggregate {
        caller: String,
        respond_to: oneshot::Sender<Result<(), FcError>>,
    },
    GetState {
        respond_to: oneshot::Sender<SessionState>,
    },
    /// Tear down the room/list/note subgraph and stop the actor.
    ///
    /// Only the controller sends this; both the explicit-end and the
    /// expired-timer paths converge on it.
    End {
        respond_to: oneshot::Sender<SessionState>,
    },
}

/// Messages handled by the `SessionControllerActor`.
#[derive(Debug)]
pub enum ControllerMessage {
    CreateSession {
        seed: String,
        owner_identity: Option<String>,
        premium: bool,
        respond_to: oneshot::Sender<Result<SessionState, FcError>>,
    },
    FindSession {
        session_id: String,
        respond_to: oneshot::Sender<Result<SessionState, FcError>>,
    },
    FindByAddLink {
        add_link: String,
        respond_to: oneshot::Sender<Result<SessionState, FcError>>,
    },
    /// Hand out the session's actor handle for room-level operations.
    GetSession {
        session_id: String,
        respond_to: oneshot::Sender<Result<SessionActorHandle, FcError>>,
    },
    EndSession {
        session_id: String,
        /// `None` on the expired-timer path: the session ends under its
        /// own identity and no owner check applies.
        caller: Option<String>,
        respond_to: oneshot::Sender<Result<SessionState, FcError>>,
    },
    GetStatus {
        respond_to: oneshot::Sender<ControllerStatus>,
    },
    Shutdown {
        respond_to: oneshot::Sender<()>,
    },
}
