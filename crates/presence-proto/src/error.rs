//! Error types for the presence protocol.

use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Failures while decoding or encoding protocol frames.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// Frame was not valid JSON or did not match the expected payload shape.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    /// The event carried a different `type` than the caller expected.
    #[error("unexpected event type: expected {expected}, found {found}")]
    UnexpectedType {
        /// Event type the caller asked for.
        expected: &'static str,
        /// Event type actually received.
        found: String,
    },
}

/// Machine-readable error codes carried by `error` events.
///
/// The string forms are part of the client contract and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// No authentication reply arrived before the handshake timer fired.
    AuthTimeout,
    /// Credential bundle was rejected.
    AuthFailed,
    /// The identity oracle did not recognise the auth id.
    InvalidAuthId,
    /// The identity oracle resolved a different login than the one claimed.
    InvalidLogin,
    /// The identity oracle failed in an unexpected way.
    AuthUnknown,
    /// Login request did not carry a login alias.
    NoLogin,
    /// Login alias does not match the authenticated login.
    LoginIdentityMismatch,
    /// Account creation payload is missing login or name.
    AccountCreateMissing,
    /// Account creation failed in the store.
    AccountCreateFailed,
    /// Invite token is invalid, used, or for another room.
    InviteInvalid,
    /// Session resume token did not match a live session.
    NoSession,
    /// Room does not exist.
    NoRoom,
    /// Caller is not a participant of the room.
    NotInRoom,
    /// Caller lacks the authorization for the requested effect.
    NotAuthorized,
    /// Identity could not be resolved.
    NoIdentity,
    /// Store failure surfaced to the client.
    Store,
    /// Event type is not understood in this context.
    UnknownEvent,
}

impl ErrorCode {
    /// Stable wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthTimeout => "ERR_AUTH_TIMEOUT",
            Self::AuthFailed => "ERR_AUTH_FAILED",
            Self::InvalidAuthId => "ERR_INVALID_AUTHID",
            Self::InvalidLogin => "ERR_INVALID_LOGIN",
            Self::AuthUnknown => "ERR_AUTH_UNKNOWN",
            Self::NoLogin => "ERR_NO_LOGIN",
            Self::LoginIdentityMismatch => "ERR_LOGIN_IDENTITY_MISMATCH",
            Self::AccountCreateMissing => "ERR_ACCOUNT_CREATE_MISSING",
            Self::AccountCreateFailed => "ERR_ACCOUNT_CREATE_FAILED",
            Self::InviteInvalid => "ERR_INVITE_INVALID",
            Self::NoSession => "ERR_NO_SESSION",
            Self::NoRoom => "ERR_NO_ROOM",
            Self::NotInRoom => "ERR_NOT_IN_ROOM",
            Self::NotAuthorized => "ERR_NOT_AUTHORIZED",
            Self::NoIdentity => "ERR_NO_IDENTITY",
            Self::Store => "ERR_STORE",
            Self::UnknownEvent => "ERR_UNKNOWN_EVENT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_as_strings() {
        let v = serde_json::to_value(ErrorCode::LoginIdentityMismatch).unwrap();
        assert_eq!(v, "ERR_LOGIN_IDENTITY_MISMATCH");
        assert_eq!(ErrorCode::NoRoom.to_string(), "ERR_NO_ROOM");
    }
}
