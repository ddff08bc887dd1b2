use crate::error::RoomResult;
use crate::rooms::RoomHandle;
use crate::state::uid::AccountId;
use crate::store::{RelationRecord, RoomRecord};
use presence_proto::Event;
use tokio::sync::{mpsc, oneshot};

/// Static room configuration, from the store or freshly minted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConfig {
    pub id: String,
    pub name: Option<String>,
    pub owner_id: String,
    pub is_private: bool,
    pub persistent: bool,
}

impl RoomConfig {
    /// A room that only lives in memory until promoted.
    pub fn ephemeral(id: String, name: String, owner_id: String) -> Self {
        Self {
            id,
            name: Some(name),
            owner_id,
            is_private: false,
            persistent: false,
        }
    }
}

impl ConnectRequest {
    pub fn new(profile: &MemberProfile, authed: bool, deliver: mpsc::Sender<RoomDelivery>) -> Self {
        Self {
            account_id: profile.account_id.clone(),
            admin: profile.admin,
            authed,
            deliver,
        }
    }
}

impl From<RoomRecord> for RoomConfig {
    fn from(record: RoomRecord) -> Self {
        Self {
            id: record.client_id,
            name: Some(record.name),
            owner_id: record.owner_id,
            is_private: record.is_private,
            persistent: true,
        }
    }
}

/// What a room needs to know about someone it adds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberProfile {
    pub account_id: AccountId,
    pub name: String,
    pub avatar: Option<String>,
    pub admin: bool,
    pub guest: bool,
}

/// Something a room pushes to one bound account.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomDelivery {
    /// A room event, tagged with the id the client knows the room by.
    Event { room_id: String, event: Event },
    /// The account's binding was dropped by the room.
    Released { room_id: String },
}

/// Lifecycle notices from rooms to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomNotice {
    /// Nobody came back before the grace timer fired.
    Empty { room_id: String },
    WorkgroupAssigned { room_id: String, worg_id: String },
}

/// Bind an account's delivery channel to its participant entry.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub account_id: AccountId,
    pub admin: bool,
    /// Direct authorization path; workgroup and guest connects pass `false`.
    pub authed: bool,
    pub deliver: mpsc::Sender<RoomDelivery>,
}

/// A live binding, as seen by the account that holds it.
#[derive(Debug, Clone)]
pub struct RoomBinding {
    pub room_id: String,
    pub client_room_id: String,
    pub name: Option<String>,
    pub persistent: bool,
    pub is_private: bool,
    pub contact: bool,
    pub handle: RoomHandle,
}

/// Point-in-time view of a room, for registry bookkeeping and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomState {
    pub id: String,
    pub name: Option<String>,
    pub owner_id: String,
    pub persistent: bool,
    pub contact: bool,
    /// Sorted.
    pub participants: Vec<AccountId>,
    pub online: Vec<AccountId>,
    pub authorized: Vec<AccountId>,
    /// Sorted ids of participants whose authed flag is set.
    pub authed: Vec<AccountId>,
    pub live: Vec<AccountId>,
    pub workgroups: Vec<String>,
    pub empty_pending: bool,
}

/// Commands processed by a room actor.
#[derive(Debug)]
pub enum RoomCommand {
    AddUser {
        profile: MemberProfile,
        reply_tx: oneshot::Sender<()>,
    },
    Connect {
        request: ConnectRequest,
        reply_tx: oneshot::Sender<RoomResult<RoomBinding>>,
    },
    Disconnect {
        account_id: AccountId,
        /// The binding being dropped. A disconnect naming a channel other
        /// than the current link is stale and ignored.
        deliver: Option<mpsc::Sender<RoomDelivery>>,
        reply_tx: Option<oneshot::Sender<()>>,
    },
    Authorize {
        account_id: AccountId,
        reply_tx: oneshot::Sender<RoomResult<()>>,
    },
    Revoke {
        account_id: AccountId,
        reply_tx: oneshot::Sender<RoomResult<()>>,
    },
    /// A room-scoped event from a participant's client.
    Client { account_id: AccountId, event: Event },
    AuthenticateInvite {
        token: String,
        reply_tx: oneshot::Sender<bool>,
    },
    SetRelation {
        relation: RelationRecord,
        reply_tx: oneshot::Sender<RoomResult<()>>,
    },
    Persist {
        name: String,
        reply_tx: oneshot::Sender<bool>,
    },
    Inspect {
        reply_tx: oneshot::Sender<RoomState>,
    },
    /// Close only if nobody is online. Replies whether the room closed.
    CloseIfIdle {
        reply_tx: oneshot::Sender<bool>,
    },
    Close {
        reply_tx: Option<oneshot::Sender<()>>,
    },
}
