//! Unified error handling for presenced.
//!
//! This module provides the error hierarchy shared by the account and room
//! layers, with stable client-facing codes and `error` event generation.

use crate::db::DbError;
use presence_proto::{ErrorCode, Event, ProtocolError};
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// Room Errors (registry and actor operations)
// ============================================================================

/// Room operation errors.
///
/// `Clone` because a single load result is shared by every caller waiting on
/// the same in-flight room load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("no such room: {0}")]
    NoRoom(String),

    #[error("not a participant of the room")]
    NotInRoom,

    #[error("not authorized")]
    NotAuthorized,

    #[error("invite token rejected")]
    InviteInvalid,

    #[error("no identity for {0}")]
    NoIdentity(String),

    #[error("room is closed")]
    Closed,

    #[error("store error: {0}")]
    Store(String),
}

impl RoomError {
    /// Stable client-facing code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NoRoom(_) => ErrorCode::NoRoom,
            Self::NotInRoom => ErrorCode::NotInRoom,
            Self::NotAuthorized => ErrorCode::NotAuthorized,
            Self::InviteInvalid => ErrorCode::InviteInvalid,
            Self::NoIdentity(_) => ErrorCode::NoIdentity,
            Self::Closed => ErrorCode::NoRoom,
            Self::Store(_) => ErrorCode::Store,
        }
    }

    /// Convert to an `error` event for the requesting client.
    pub fn to_event(&self) -> Event {
        let detail = match self {
            Self::NoRoom(id) => Some(Value::String(id.clone())),
            Self::NoIdentity(id) => Some(Value::String(id.clone())),
            _ => None,
        };
        Event::error(self.error_code(), detail)
    }
}

impl From<DbError> for RoomError {
    fn from(err: DbError) -> Self {
        RoomError::Store(err.to_string())
    }
}

/// Result type for room operations.
pub type RoomResult<T> = Result<T, RoomError>;

// ============================================================================
// Handler Errors (account event dispatch)
// ============================================================================

/// Errors that can occur while an account handles a session event.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] ProtocolError),

    #[error(transparent)]
    Room(#[from] RoomError),

    #[error("store error: {0}")]
    Store(#[from] DbError),

    #[error("unknown event type: {0}")]
    UnknownEvent(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::Room(_) => "room",
            Self::Store(_) => "store",
            Self::UnknownEvent(_) => "unknown_event",
            Self::Internal(_) => "internal",
        }
    }

    /// Convert to an `error` event.
    ///
    /// Returns `None` for errors that are logged but not reported to the client
    /// (unknown events are dropped silently, internal failures stay internal).
    pub fn to_event(&self) -> Option<Event> {
        match self {
            Self::Malformed(e) => Some(Event::error(
                ErrorCode::UnknownEvent,
                Some(Value::String(e.to_string())),
            )),
            Self::Room(e) => Some(e.to_event()),
            Self::Store(_) => Some(Event::error(ErrorCode::Store, None)),
            Self::UnknownEvent(_) => None,
            Self::Internal(_) => None,
        }
    }
}

/// Result type for account event handlers.
pub type HandlerResult = Result<(), HandlerError>;
