//! Feedback Controller error types.
//!
//! Error types map to the HTTP status codes the calling layer returns.
//! Internal details are logged server-side but not exposed to clients.

use thiserror::Error;

/// Feedback Controller error type.
///
/// Status mapping:
/// - `SessionNotFound`, `RoomNotFound`, `ListNotFound`, `NoteNotFound`: 404
/// - `SessionConflict`, `RoomConflict`: 409
/// - `Locked`, `AlreadyAggregated`: 423
/// - `PermissionDenied`: 403
/// - `InvalidSeed`: 400
/// - `CapacityExceeded`, `Draining`: 503
/// - `TimerAlreadyArmed`, `Internal`: 500
#[derive(Debug, Error)]
pub enum FcError {
    /// Session not found.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Room not found within the session.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// List not found within the room.
    #[error("List not found: {0}")]
    ListNotFound(String),

    /// Note not found within the list.
    #[error("Note not found: {0}")]
    NoteNotFound(String),

    /// A session derived from this seed already exists.
    #[error("Session already exists")]
    SessionConflict,

    /// The participant already owns a room in this session.
    #[error("Room for this participant already exists")]
    RoomConflict,

    /// Phase guard violation (action attempted in the wrong state).
    #[error("This action is now locked: {0}")]
    Locked(String),

    /// Re-entrant aggregation attempt.
    #[error("Notes have already been aggregated")]
    AlreadyAggregated,

    /// Caller is not authorized for this operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The supplied seed cannot derive an identifier.
    #[error("Invalid seed")]
    InvalidSeed,

    /// Session or controller is at capacity.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Controller is draining (graceful shutdown).
    #[error("Controller is draining")]
    Draining,

    /// An expiration timer is already armed for this session.
    #[error("Expiration timer already armed: {0}")]
    TimerAlreadyArmed(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FcError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            FcError::SessionNotFound(_)
            | FcError::RoomNotFound(_)
            | FcError::ListNotFound(_)
            | FcError::NoteNotFound(_) => 404,
            FcError::SessionConflict | FcError::RoomConflict => 409,
            FcError::Locked(_) | FcError::AlreadyAggregated => 423,
            FcError::PermissionDenied(_) => 403,
            FcError::InvalidSeed => 400,
            FcError::CapacityExceeded(_) | FcError::Draining => 503,
            FcError::TimerAlreadyArmed(_) | FcError::Internal(_) => 500,
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            FcError::TimerAlreadyArmed(_) | FcError::Internal(_) => {
                "An internal error occurred".to_string()
            }
            FcError::SessionNotFound(_) => "Session not found".to_string(),
            FcError::RoomNotFound(_) => "Room not found".to_string(),
            FcError::ListNotFound(_) => "List not found".to_string(),
            FcError::NoteNotFound(_) => "Note not found".to_string(),
            FcError::Locked(_) | FcError::AlreadyAggregated => {
                "This action is now locked".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        // Not found -> 404
        assert_eq!(FcError::SessionNotFound("s1".to_string()).status_code(), 404);
        assert_eq!(FcError::RoomNotFound("r1".to_string()).status_code(), 404);
        assert_eq!(FcError::ListNotFound("l1".to_string()).status_code(), 404);
        assert_eq!(FcError::NoteNotFound("n1".to_string()).status_code(), 404);

        // Conflict -> 409
        assert_eq!(FcError::SessionConflict.status_code(), 409);
        assert_eq!(FcError::RoomConflict.status_code(), 409);

        // Phase guards -> 423
        assert_eq!(FcError::Locked("create room".to_string()).status_code(), 423);
        assert_eq!(FcError::AlreadyAggregated.status_code(), 423);

        // Authorization -> 403
        assert_eq!(
            FcError::PermissionDenied("not the owner".to_string()).status_code(),
            403
        );

        // Bad input -> 400
        assert_eq!(FcError::InvalidSeed.status_code(), 400);

        // Capacity -> 503
        assert_eq!(
            FcError::CapacityExceeded("max 64 rooms".to_string()).status_code(),
            503
        );
        assert_eq!(FcError::Draining.status_code(), 503);

        // Internal -> 500
        assert_eq!(
            FcError::TimerAlreadyArmed("session-1".to_string()).status_code(),
            500
        );
        assert_eq!(FcError::Internal("oops".to_string()).status_code(), 500);
    }

    #[test]
    fn test_client_messages_hide_internal_details() {
        let err = FcError::Internal("mailbox send failed at session-abc".to_string());
        assert!(!err.client_message().contains("session-abc"));
        assert_eq!(err.client_message(), "An internal error occurred");

        let err = FcError::TimerAlreadyArmed("session-abc".to_string());
        assert!(!err.client_message().contains("session-abc"));
    }

    #[test]
    fn test_client_messages_hide_entity_ids() {
        let err = FcError::SessionNotFound("a1b2c3d4e5f6a7b8".to_string());
        assert!(!err.client_message().contains("a1b2c3d4e5f6a7b8"));
        assert_eq!(err.client_message(), "Session not found");

        let err = FcError::Locked("aggregate".to_string());
        assert_eq!(err.client_message(), "This action is now locked");
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            format!("{}", FcError::Locked("set ready".to_string())),
            "This action is now locked: set ready"
        );
        assert_eq!(
            format!("{}", FcError::AlreadyAggregated),
            "Notes have already been aggregated"
        );
    }
}
