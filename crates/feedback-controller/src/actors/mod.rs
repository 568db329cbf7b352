//! Actor model implementation.
//!
//! One `SessionControllerActor` per FC instance supervises one
//! `SessionActor` per live session. Handles communicate over bounded
//! mpsc mailboxes with oneshot response channels; the mailbox is the
//! per-session serialization point.

pub mod aggregate;
pub mod controller;
pub mod messages;
pub mod metrics;
pub mod rooms;
pub mod session;

pub use controller::SessionControllerActorHandle;
pub use messages::{
    ControllerStatus, ListDetail, ListSummary, NoteDetail, Rate, RoomDetail, RoomView,
    SessionPhase, SessionState,
};
pub use metrics::{ActorMetrics, ActorType, MailboxMonitor};
pub use session::SessionActorHandle;
