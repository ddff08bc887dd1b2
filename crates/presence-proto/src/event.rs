//! The `{type, data}` event envelope.

use crate::error::{ErrorCode, ProtocolError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Canonical event type names.
pub mod kinds {
    #![allow(missing_docs)]

    pub const AUTHENTICATE: &str = "authenticate";
    pub const SESSION: &str = "session";
    pub const ACCOUNT: &str = "account";
    pub const READY: &str = "ready";
    pub const INITIALIZE: &str = "initialize";
    pub const IDENTITY: &str = "identity";
    pub const SETTINGS: &str = "settings";
    pub const ROOM: &str = "room";
    pub const JOIN: &str = "join";
    pub const CREATE: &str = "create";
    pub const CONTACT: &str = "contact";
    pub const CONTACT_ADD: &str = "contact-add";
    pub const CONTACT_REMOVE: &str = "contact-remove";
    pub const CONTACT_EVENT: &str = "contact-event";
    pub const ONLINE: &str = "online";
    pub const OFFLINE: &str = "offline";
    pub const LEAVE: &str = "leave";
    pub const OPEN: &str = "open";
    pub const CLOSE: &str = "close";
    pub const ERROR: &str = "error";
    pub const LOGOUT: &str = "logout";

    // room-scoped
    pub const PERSIST: &str = "persist";
    pub const PERSISTENT: &str = "persistent";
    pub const DISCONNECT: &str = "disconnect";
    pub const AUTHED: &str = "authed";
    pub const CHAT: &str = "chat";
    pub const INVITE: &str = "invite";
    pub const WORKGROUP: &str = "workgroup";
    pub const LIVE: &str = "live";
    pub const LIVE_JOIN: &str = "live-join";
    pub const LIVE_LEAVE: &str = "live-leave";
}

/// One frame on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event discriminator.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload. Absent payloads decode as `null`.
    #[serde(default)]
    pub data: Value,
}

impl Event {
    /// Build an event with a payload.
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Build an event with a `null` payload.
    pub fn bare(kind: impl Into<String>) -> Self {
        Self::new(kind, Value::Null)
    }

    /// Build an `error` event carrying a stable code and optional detail.
    pub fn error(code: ErrorCode, detail: Option<Value>) -> Self {
        Self::new(
            kinds::ERROR,
            json!({
                "error": code,
                "data": detail.unwrap_or(Value::Null),
            }),
        )
    }

    /// Nest `inner` as the payload of a new event of type `kind`.
    pub fn wrap(kind: impl Into<String>, inner: &Event) -> Self {
        Self::new(kind, json!({ "type": inner.kind, "data": inner.data }))
    }

    /// The event discriminator.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Whether this event has the given type.
    pub fn is(&self, kind: &str) -> bool {
        self.kind == kind
    }

    /// Decode the payload into a typed structure.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        Ok(T::deserialize(&self.data)?)
    }

    /// Decode the payload, insisting on a specific event type first.
    pub fn expect_payload<T: DeserializeOwned>(
        &self,
        kind: &'static str,
    ) -> Result<T, ProtocolError> {
        if self.kind != kind {
            return Err(ProtocolError::UnexpectedType {
                expected: kind,
                found: self.kind.clone(),
            });
        }
        self.payload()
    }

    /// Decode the payload as a nested `{type, data}` event.
    pub fn inner(&self) -> Result<Event, ProtocolError> {
        self.payload()
    }

    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Encode as a text frame.
    pub fn to_text(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_data_decodes_as_null() {
        let ev = Event::parse(r#"{"type":"ready"}"#).unwrap();
        assert!(ev.is(kinds::READY));
        assert!(ev.data.is_null());
    }

    #[test]
    fn wrap_nests_the_inner_event() {
        let inner = Event::new("online", json!({ "clientId": "acc-1" }));
        let outer = Event::wrap("room-1", &inner);
        assert_eq!(outer.kind(), "room-1");
        let back = outer.inner().unwrap();
        assert_eq!(back, inner);
    }

    #[test]
    fn expect_payload_rejects_other_types() {
        let ev = Event::new("session", json!("sid"));
        let err = ev.expect_payload::<String>(kinds::AUTHENTICATE).unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedType { .. }));
        let sid: String = ev.expect_payload(kinds::SESSION).unwrap();
        assert_eq!(sid, "sid");
    }

    #[test]
    fn error_event_shape() {
        let ev = Event::error(ErrorCode::InviteInvalid, Some(json!("room-9")));
        assert_eq!(ev.kind(), "error");
        assert_eq!(ev.data["error"], "ERR_INVITE_INVALID");
        assert_eq!(ev.data["data"], "room-9");
    }
}
