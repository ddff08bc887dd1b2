//! Cloneable front door to a room actor.

use super::actor::{
    ConnectRequest, MemberProfile, RoomBinding, RoomCommand, RoomDelivery, RoomState,
};
use crate::error::{RoomError, RoomResult};
use crate::store::RelationRecord;
use presence_proto::Event;
use tokio::sync::{mpsc, oneshot};

/// Handle to a live room. Every call is a message to the room's task; a
/// closed room answers [`RoomError::Closed`].
#[derive(Debug, Clone)]
pub struct RoomHandle {
    id: String,
    tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub(crate) fn new(id: String, tx: mpsc::Sender<RoomCommand>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether both handles reach the same room instance.
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        self.tx.same_channel(&other.tx)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RoomCommand,
    ) -> RoomResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| RoomError::Closed)?;
        reply_rx.await.map_err(|_| RoomError::Closed)
    }

    pub async fn add_user(&self, profile: MemberProfile) -> RoomResult<()> {
        self.request(|reply_tx| RoomCommand::AddUser { profile, reply_tx })
            .await
    }

    pub async fn connect(&self, request: ConnectRequest) -> RoomResult<RoomBinding> {
        self.request(|reply_tx| RoomCommand::Connect { request, reply_tx })
            .await?
    }

    pub async fn disconnect(&self, account_id: &str) -> RoomResult<()> {
        let account_id = account_id.to_string();
        self.request(|reply_tx| RoomCommand::Disconnect {
            account_id,
            deliver: None,
            reply_tx: Some(reply_tx),
        })
        .await
    }

    /// Disconnect only if `deliver` is still the account's live binding.
    pub async fn disconnect_link(
        &self,
        account_id: &str,
        deliver: &mpsc::Sender<RoomDelivery>,
    ) -> RoomResult<()> {
        let account_id = account_id.to_string();
        let deliver = Some(deliver.clone());
        self.request(|reply_tx| RoomCommand::Disconnect {
            account_id,
            deliver,
            reply_tx: Some(reply_tx),
        })
        .await
    }

    pub async fn authorize_user(&self, account_id: &str) -> RoomResult<()> {
        let account_id = account_id.to_string();
        self.request(|reply_tx| RoomCommand::Authorize {
            account_id,
            reply_tx,
        })
        .await?
    }

    pub async fn revoke(&self, account_id: &str) -> RoomResult<()> {
        let account_id = account_id.to_string();
        self.request(|reply_tx| RoomCommand::Revoke {
            account_id,
            reply_tx,
        })
        .await?
    }

    /// Forward a client event. Does not wait for the room to process it.
    pub async fn client_event(&self, account_id: &str, event: Event) -> RoomResult<()> {
        self.tx
            .send(RoomCommand::Client {
                account_id: account_id.to_string(),
                event,
            })
            .await
            .map_err(|_| RoomError::Closed)
    }

    pub async fn authenticate_invite(&self, token: &str) -> RoomResult<bool> {
        let token = token.to_string();
        self.request(|reply_tx| RoomCommand::AuthenticateInvite { token, reply_tx })
            .await
    }

    pub async fn set_relation(&self, relation: RelationRecord) -> RoomResult<()> {
        self.request(|reply_tx| RoomCommand::SetRelation { relation, reply_tx })
            .await?
    }

    /// Promote to persistent. Returns `false` when nothing changed.
    pub async fn persist(&self, name: &str) -> RoomResult<bool> {
        let name = name.to_string();
        self.request(|reply_tx| RoomCommand::Persist { name, reply_tx })
            .await
    }

    pub async fn state(&self) -> RoomResult<RoomState> {
        self.request(|reply_tx| RoomCommand::Inspect { reply_tx })
            .await
    }

    pub async fn close_if_idle(&self) -> RoomResult<bool> {
        self.request(|reply_tx| RoomCommand::CloseIfIdle { reply_tx })
            .await
    }

    pub async fn close(&self) -> RoomResult<()> {
        self.request(|reply_tx| RoomCommand::Close {
            reply_tx: Some(reply_tx),
        })
        .await
    }
}
