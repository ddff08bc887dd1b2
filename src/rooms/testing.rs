//! Shared fixture for room and registry tests.

use super::actor::{MemberProfile, RoomContext, RoomDelivery, RoomNotice};
use super::registry::{AccountNotice, RoomOptions, RoomRegistry};
use crate::identity::{IdentityCache, InitialsAvatar};
use crate::state::uid::{self, new_id};
use crate::store::{AccountStore, MemoryStore};
use crate::workgroups::WorkgroupIndex;
use presence_proto::{Event, Identity, WorkgroupRef, WorkgroupSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub(crate) const GUEST_AVATAR: &str = "/img/guest.svg";

pub(crate) struct Fixture {
    pub store: Arc<MemoryStore>,
    pub identities: Arc<IdentityCache>,
    pub workgroups: Arc<WorkgroupIndex>,
}

impl Fixture {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let identities = Arc::new(IdentityCache::new(store.clone(), Arc::new(InitialsAvatar)));
        Self {
            store,
            identities,
            workgroups: Arc::new(WorkgroupIndex::new()),
        }
    }

    pub fn options(empty_timeout: Duration) -> RoomOptions {
        RoomOptions {
            empty_timeout,
            guest_avatar: GUEST_AVATAR.to_string(),
            log_tail: 20,
        }
    }

    pub fn context(&self) -> (RoomContext, mpsc::UnboundedReceiver<RoomNotice>) {
        self.context_with_timeout(Duration::from_secs(20))
    }

    pub fn context_with_timeout(
        &self,
        empty_timeout: Duration,
    ) -> (RoomContext, mpsc::UnboundedReceiver<RoomNotice>) {
        let (notices, rx) = mpsc::unbounded_channel();
        let options = Self::options(empty_timeout);
        let ctx = RoomContext {
            store: self.store.clone(),
            identities: self.identities.clone(),
            workgroups: self.workgroups.clone(),
            notices,
            empty_timeout: options.empty_timeout,
            guest_avatar: options.guest_avatar,
            log_tail: options.log_tail,
        };
        (ctx, rx)
    }

    pub fn registry(&self) -> (Arc<RoomRegistry>, mpsc::UnboundedReceiver<AccountNotice>) {
        self.registry_with_timeout(Duration::from_secs(20))
    }

    pub fn registry_with_timeout(
        &self,
        empty_timeout: Duration,
    ) -> (Arc<RoomRegistry>, mpsc::UnboundedReceiver<AccountNotice>) {
        let (accounts, rx) = mpsc::unbounded_channel();
        let registry = RoomRegistry::new(
            self.store.clone(),
            self.identities.clone(),
            self.workgroups.clone(),
            Self::options(empty_timeout),
            accounts,
        );
        (registry, rx)
    }

    /// Registered account, as a room sees it.
    pub async fn account(&self, login: &str, name: &str) -> MemberProfile {
        let record = self
            .store
            .create_account(login, None, name)
            .await
            .expect("create account");
        MemberProfile {
            account_id: record.client_id,
            name: record.name,
            avatar: None,
            admin: false,
            guest: false,
        }
    }

    /// Guest known only to the identity cache.
    pub fn guest(&self, name: &str) -> MemberProfile {
        let account_id = new_id(uid::GUEST);
        self.identities.set_guest(Identity {
            client_id: account_id.clone(),
            name: name.to_string(),
            avatar: None,
            email: None,
        });
        MemberProfile {
            account_id,
            name: name.to_string(),
            avatar: None,
            admin: false,
            guest: true,
        }
    }

    /// Make `account_id` a member of workgroup `friend_wg_<f_id>`.
    pub fn join_workgroup(&self, account_id: &str, f_id: &str, name: &str) -> String {
        let worg = WorkgroupRef {
            f_id: f_id.to_string(),
            client_id: format!("friend_wg_{f_id}"),
            name: name.to_string(),
        };
        let mut member = self.workgroups.get_user_workgroup_list(account_id);
        member.push(worg.clone());
        let snapshot = WorkgroupSnapshot {
            available: vec![worg.clone()],
            member,
            stream: Vec::new(),
        };
        self.workgroups.add_user(account_id, &snapshot);
        worg.client_id
    }
}

pub(crate) fn delivery() -> (mpsc::Sender<RoomDelivery>, mpsc::Receiver<RoomDelivery>) {
    mpsc::channel(64)
}

/// Everything delivered so far, without waiting.
pub(crate) fn drain(rx: &mut mpsc::Receiver<RoomDelivery>) -> Vec<RoomDelivery> {
    let mut out = Vec::new();
    while let Ok(delivery) = rx.try_recv() {
        out.push(delivery);
    }
    out
}

/// Delivered events of one kind, without waiting.
pub(crate) fn events_of(rx: &mut mpsc::Receiver<RoomDelivery>, kind: &str) -> Vec<Event> {
    drain(rx)
        .into_iter()
        .filter_map(|d| match d {
            RoomDelivery::Event { event, .. } if event.is(kind) => Some(event),
            _ => None,
        })
        .collect()
}
