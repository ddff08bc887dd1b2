//! Typed payloads carried inside [`Event`](crate::Event) frames.
//!
//! Field names follow the camelCase convention of the browser clients.

use serde::{Deserialize, Serialize};

/// Reply to the `authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum AuthBundle {
    /// Credential validated by the external identity oracle.
    Authid(AuthIdBundle),
    /// Guest access through a room invite token.
    AnonInvite(InviteBundle),
}

/// Credential bundle.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthIdBundle {
    pub tokens: AuthIdTokens,
    pub login: String,
}

/// Tokens part of an [`AuthIdBundle`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthIdTokens {
    #[serde(rename = "authId")]
    pub auth_id: String,
}

/// Guest invite bundle.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InviteBundle {
    pub tokens: InviteTokens,
    #[serde(default)]
    pub identity: Option<GuestIdentity>,
}

/// Invite token and the room it claims to open.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct InviteTokens {
    pub token: String,
    #[serde(rename = "roomId")]
    pub room_id: String,
}

/// Self-declared guest identity.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GuestIdentity {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Requests accepted during the account stage of the handshake.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum AccountRequest {
    Login(Option<LoginIdentity>),
    Create(Option<CreateAccount>),
}

/// Identity presented with a login request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LoginIdentity {
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Account creation payload.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CreateAccount {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// `room` envelope: an event addressed to one room.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoomRequest {
    #[serde(rename = "roomId")]
    pub room_id: String,
    pub event: crate::Event,
}

/// `join` request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JoinRequest {
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// `create` request. Without a name the room is ephemeral.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub name: Option<String>,
}

/// `contact` requests.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ContactRequest {
    /// Open the 1:1 chat with a contact.
    Open(String),
    /// Add an account to the contact list.
    Start(String),
}

/// A workgroup as described by the external membership source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkgroupRef {
    /// External (foreign) id; the deduplication key.
    #[serde(rename = "fId")]
    pub f_id: String,
    /// Internal id exposed to clients.
    #[serde(rename = "clientId")]
    pub client_id: String,
    pub name: String,
}

/// Membership snapshot for one login.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkgroupSnapshot {
    /// Every workgroup the source knows about.
    #[serde(default)]
    pub available: Vec<WorkgroupRef>,
    /// Workgroups this login belongs to.
    #[serde(default)]
    pub member: Vec<WorkgroupRef>,
    /// Names of workgroups streamed to this login.
    #[serde(default)]
    pub stream: Vec<String>,
}

/// Public identity of an account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "clientId")]
    pub client_id: String,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}
