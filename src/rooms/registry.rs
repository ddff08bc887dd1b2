//! Room registry: the single authority for live room instances.
//!
//! Loads are single-flight per room id, and contact room resolution is
//! single-flight per unordered account pair, so a burst of concurrent
//! requesters always converges on one instance (and one relation).
//!
//! ```text
//!   get_room(id) ──► rooms (live) ──hit──► handle
//!                      │ miss
//!                      ▼
//!                    loads (in flight) ──hit──► await shared load
//!                      │ miss
//!                      ▼
//!                    store.get_room ─► RoomActor::open ─► rooms.insert
//! ```
//!
//! Rooms report back through a notice channel: `Empty` evicts an idle room,
//! `WorkgroupAssigned` asks every member account to join.

use super::actor::{
    ConnectRequest, MemberProfile, RoomActor, RoomBinding, RoomConfig, RoomContext, RoomDelivery,
    RoomNotice,
};
use super::policy::{ContactPolicy, RoomKind};
use super::RoomHandle;
use crate::config::Config;
use crate::error::{RoomError, RoomResult};
use crate::identity::IdentityCache;
use crate::state::dashmap_ext::DashMapExt;
use crate::state::uid::{self, AccountId, new_id};
use crate::store::{RelationRecord, Store};
use crate::workgroups::WorkgroupIndex;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use presence_proto::payload::{InviteTokens, JoinRequest};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

type RoomLoad = Shared<BoxFuture<'static, RoomResult<Option<RoomHandle>>>>;
type ContactLoad = Shared<BoxFuture<'static, RoomResult<RoomHandle>>>;

const CONTACT_ROOM_NAME: &str = "contact";
const ANON_ROOM_PREFIX: &str = "[ temp ] created by: ";

/// Per-room tunables.
#[derive(Debug, Clone)]
pub struct RoomOptions {
    pub empty_timeout: Duration,
    pub guest_avatar: String,
    pub log_tail: usize,
}

impl RoomOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            empty_timeout: config.timeouts.room_empty(),
            guest_avatar: config.rooms.guest_avatar.clone(),
            log_tail: config.rooms.log_tail,
        }
    }
}

impl Default for RoomOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Requests the registry makes of accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountNotice {
    /// A workgroup the account belongs to was assigned to a room.
    WorkgroupJoin {
        account_id: AccountId,
        room_id: String,
    },
    /// `contact_id` opened a contact chat with the account.
    ContactJoin {
        account_id: AccountId,
        contact_id: AccountId,
    },
}

pub struct RoomRegistry {
    rooms: DashMap<String, RoomHandle>,
    loads: DashMap<String, RoomLoad>,
    contact_loads: DashMap<String, ContactLoad>,
    // relation id -> relation, for contact room detection
    relations: DashMap<String, RelationRecord>,
    ctx: RoomContext,
    accounts: mpsc::UnboundedSender<AccountNotice>,
}

impl RoomRegistry {
    /// Create the registry and spawn its notice consumer.
    pub fn new(
        store: Arc<dyn Store>,
        identities: Arc<IdentityCache>,
        workgroups: Arc<WorkgroupIndex>,
        options: RoomOptions,
        accounts: mpsc::UnboundedSender<AccountNotice>,
    ) -> Arc<Self> {
        let (notices, notice_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Self {
            rooms: DashMap::new(),
            loads: DashMap::new(),
            contact_loads: DashMap::new(),
            relations: DashMap::new(),
            ctx: RoomContext {
                store,
                identities,
                workgroups,
                notices,
                empty_timeout: options.empty_timeout,
                guest_avatar: options.guest_avatar,
                log_tail: options.log_tail,
            },
            accounts,
        });
        tokio::spawn(run_notices(Arc::downgrade(&registry), notice_rx));
        registry
    }

    /// Live room, if cached and still running.
    fn live(&self, room_id: &str) -> Option<RoomHandle> {
        let room = self.rooms.get_cloned(room_id)?;
        if room.is_closed() {
            self.rooms.remove_if(room_id, |_, cached| cached.same_room(&room));
            return None;
        }
        Some(room)
    }

    pub fn is_active(&self, room_id: &str) -> bool {
        self.live(room_id).is_some()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Cached relation by id.
    pub fn relation(&self, relation_id: &str) -> Option<RelationRecord> {
        self.relations.get_cloned(relation_id)
    }

    // ========================================================================
    // Room lookup
    // ========================================================================

    /// Live room, loading it from the store if needed. Concurrent callers
    /// for the same id share one load. A room unknown to the store is
    /// `Ok(None)`.
    pub async fn get_room(self: &Arc<Self>, room_id: &str) -> RoomResult<Option<RoomHandle>> {
        if let Some(room) = self.live(room_id) {
            return Ok(Some(room));
        }

        let load = match self.loads.entry(room_id.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                // a load may have finished between the cache check and here
                if let Some(room) = self.live(room_id) {
                    return Ok(Some(room));
                }
                let registry = Arc::clone(self);
                let id = room_id.to_string();
                let load = async move {
                    let result = registry.load_room(&id).await;
                    registry.loads.remove(&id);
                    result
                }
                .boxed()
                .shared();
                entry.insert(load.clone());
                load
            }
        };
        load.await
    }

    async fn load_room(&self, room_id: &str) -> RoomResult<Option<RoomHandle>> {
        let Some(record) = self.ctx.store.get_room(room_id).await? else {
            debug!(room_id = %room_id, "Room not in store");
            return Ok(None);
        };
        self.set_room(RoomConfig::from(record)).await.map(Some)
    }

    /// Open a room for `config` and cache it. Rooms owned by a relation
    /// become contact rooms.
    pub async fn set_room(&self, config: RoomConfig) -> RoomResult<RoomHandle> {
        let kind = self.room_kind(&config.owner_id).await?;
        let room_id = config.id.clone();
        let room = RoomActor::open(config, kind, self.ctx.clone()).await?;
        self.rooms.insert(room_id, room.clone());
        Ok(room)
    }

    async fn room_kind(&self, owner_id: &str) -> RoomResult<RoomKind> {
        if let Some(relation) = self.relations.get_cloned(owner_id) {
            return Ok(RoomKind::Contact(ContactPolicy::from_relation(&relation)));
        }
        if !uid::has_prefix(owner_id, uid::RELATION) {
            return Ok(RoomKind::Group);
        }
        match self.ctx.store.get_relation_by_id(owner_id).await? {
            Some(relation) => {
                let policy = ContactPolicy::from_relation(&relation);
                self.relations.insert(relation.client_id.clone(), relation);
                Ok(RoomKind::Contact(policy))
            }
            None => Ok(RoomKind::Group),
        }
    }

    /// Close and forget a room. The next lookup reloads it from the store.
    pub async fn remove_room(&self, room_id: &str) {
        if let Some((_, room)) = self.rooms.remove(room_id) {
            let _ = room.close().await;
            info!(room_id = %room_id, "Room removed");
        }
    }

    /// Evict a room that reported itself empty, unless someone came back.
    /// The room closes while still cached; `live` skips closed handles.
    async fn evict_idle(&self, room_id: &str) {
        let Some(room) = self.rooms.get_cloned(room_id) else {
            return;
        };
        match room.close_if_idle().await {
            Ok(true) => {
                self.rooms
                    .remove_if(room_id, |_, cached| cached.same_room(&room));
                info!(room_id = %room_id, "Idle room evicted");
            }
            Ok(false) => debug!(room_id = %room_id, "Room reconnected before eviction"),
            Err(e) => {
                self.rooms
                    .remove_if(room_id, |_, cached| cached.same_room(&room));
                debug!(room_id = %room_id, error = %e, "Room already closed");
            }
        }
    }

    // ========================================================================
    // Contact rooms
    // ========================================================================

    /// Resolve or create the relation between two accounts and its room.
    /// Both argument orders converge on the same relation and room.
    pub async fn get_contact_room(
        self: &Arc<Self>,
        account_id: &str,
        contact_id: &str,
    ) -> RoomResult<RoomHandle> {
        let key = pair_key(account_id, contact_id);
        let load = match self.contact_loads.entry(key.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let registry = Arc::clone(self);
                let (a, b) = (account_id.to_string(), contact_id.to_string());
                let load = async move {
                    let result = registry.resolve_contact_room(&a, &b).await;
                    registry.contact_loads.remove(&key);
                    result
                }
                .boxed()
                .shared();
                entry.insert(load.clone());
                load
            }
        };
        load.await
    }

    async fn resolve_contact_room(
        self: &Arc<Self>,
        account_id: &str,
        contact_id: &str,
    ) -> RoomResult<RoomHandle> {
        if self.ctx.identities.get(contact_id).await.is_none() {
            return Err(RoomError::NoIdentity(contact_id.to_string()));
        }

        let relation = match self.ctx.store.get_relation(account_id, contact_id).await? {
            Some(relation) => relation,
            None => {
                let relation = self
                    .ctx
                    .store
                    .create_relation(account_id, contact_id)
                    .await
                    .inspect_err(|e| {
                        warn!(account_id = %account_id, contact_id = %contact_id, error = %e, "Failed to create relation");
                    })?;
                info!(relation_id = %relation.client_id, "Relation created");
                relation
            }
        };
        self.relations
            .insert(relation.client_id.clone(), relation.clone());

        if let Some(room_id) = &relation.room_id {
            if let Some(room) = self.get_room(room_id).await? {
                return Ok(room);
            }
            warn!(relation_id = %relation.client_id, room_id = %room_id, "Relation room missing, creating a new one");
        }
        self.create_contact_room(relation).await
    }

    async fn create_contact_room(
        self: &Arc<Self>,
        mut relation: RelationRecord,
    ) -> RoomResult<RoomHandle> {
        let room_id = new_id(uid::CONTACT_ROOM);
        self.ctx
            .store
            .set_room(&room_id, CONTACT_ROOM_NAME, &relation.client_id, true)
            .await?;
        self.ctx
            .store
            .assign_relation_room(&relation.client_id, &room_id)
            .await?;
        relation.room_id = Some(room_id.clone());
        self.relations
            .insert(relation.client_id.clone(), relation.clone());

        let room = self
            .get_room(&room_id)
            .await?
            .ok_or_else(|| RoomError::NoRoom(room_id.clone()))?;
        room.set_relation(relation).await?;
        info!(room_id = %room_id, "Contact room created");
        Ok(room)
    }

    /// Open the contact chat for `member`, creating what is missing. With
    /// `notify` the contact's account is asked to join as well.
    pub async fn open_contact(
        self: &Arc<Self>,
        member: &MemberProfile,
        contact_id: &str,
        deliver: mpsc::Sender<RoomDelivery>,
        notify: bool,
    ) -> RoomResult<RoomBinding> {
        let room = self.get_contact_room(&member.account_id, contact_id).await?;
        let binding = room
            .connect(ConnectRequest::new(member, true, deliver))
            .await?;
        if notify {
            let _ = self.accounts.send(AccountNotice::ContactJoin {
                account_id: contact_id.to_string(),
                contact_id: member.account_id.clone(),
            });
        }
        Ok(binding)
    }

    /// Join an existing contact room. Never creates a relation or room.
    pub async fn connect_contact(
        self: &Arc<Self>,
        member: &MemberProfile,
        contact_id: &str,
        deliver: mpsc::Sender<RoomDelivery>,
    ) -> RoomResult<Option<RoomBinding>> {
        let Some(relation) = self
            .ctx
            .store
            .get_relation(&member.account_id, contact_id)
            .await?
        else {
            return Ok(None);
        };
        self.relations
            .insert(relation.client_id.clone(), relation.clone());
        let Some(room_id) = relation.room_id else {
            return Ok(None);
        };
        let Some(room) = self.get_room(&room_id).await? else {
            return Ok(None);
        };
        room.connect(ConnectRequest::new(member, true, deliver))
            .await
            .map(Some)
    }

    // ========================================================================
    // Group rooms
    // ========================================================================

    /// Ephemeral room owned by `member`, who joins it at once.
    pub async fn create_anon_room(
        self: &Arc<Self>,
        member: &MemberProfile,
        deliver: mpsc::Sender<RoomDelivery>,
    ) -> RoomResult<RoomBinding> {
        let name = format!("{ANON_ROOM_PREFIX}{}", member.name);
        let config = RoomConfig::ephemeral(new_id(uid::ROOM), name, member.account_id.clone());
        let room = self.set_room(config).await?;
        room.add_user(member.clone()).await?;
        let binding = room
            .connect(ConnectRequest::new(member, true, deliver))
            .await?;
        info!(room_id = %binding.room_id, owner = %member.account_id, "Anonymous room created");
        Ok(binding)
    }

    /// Persistent room owned and joined by `member`.
    pub async fn create_named_room(
        self: &Arc<Self>,
        member: &MemberProfile,
        name: &str,
        deliver: mpsc::Sender<RoomDelivery>,
    ) -> RoomResult<RoomBinding> {
        let room_id = new_id(uid::ROOM);
        self.ctx
            .store
            .set_room(&room_id, name, &member.account_id, false)
            .await?;
        self.ctx
            .store
            .authorize(&room_id, &[member.account_id.clone()])
            .await?;
        let room = self
            .get_room(&room_id)
            .await?
            .ok_or_else(|| RoomError::NoRoom(room_id.clone()))?;
        let binding = room
            .connect(ConnectRequest::new(member, true, deliver))
            .await?;
        info!(room_id = %room_id, name = %name, owner = %member.account_id, "Room created");
        Ok(binding)
    }

    /// Join with an invite token, or with an existing authorization.
    pub async fn join_room(
        self: &Arc<Self>,
        member: &MemberProfile,
        request: &JoinRequest,
        deliver: mpsc::Sender<RoomDelivery>,
    ) -> RoomResult<RoomBinding> {
        let room = self
            .get_room(&request.room_id)
            .await?
            .ok_or_else(|| RoomError::NoRoom(request.room_id.clone()))?;

        let Some(token) = &request.token else {
            return room
                .connect(ConnectRequest::new(member, true, deliver))
                .await
                .map_err(|e| match e {
                    RoomError::NotInRoom => RoomError::NotAuthorized,
                    other => other,
                });
        };

        if !room.authenticate_invite(token).await? {
            return Err(RoomError::InviteInvalid);
        }
        if let Err(e) = room.authorize_user(&member.account_id).await {
            warn!(room_id = %request.room_id, account_id = %member.account_id, error = %e, "Joining without a stored grant");
        }
        room.add_user(member.clone()).await?;
        room.connect(ConnectRequest::new(member, true, deliver))
            .await
    }

    /// Bind an authorized participant.
    pub async fn connect(
        self: &Arc<Self>,
        member: &MemberProfile,
        room_id: &str,
        deliver: mpsc::Sender<RoomDelivery>,
    ) -> RoomResult<RoomBinding> {
        let room = self
            .get_room(room_id)
            .await?
            .ok_or_else(|| RoomError::NoRoom(room_id.to_string()))?;
        room.connect(ConnectRequest::new(member, true, deliver))
            .await
    }

    /// Join through workgroup membership instead of an individual grant.
    pub async fn connect_workgroup(
        self: &Arc<Self>,
        member: &MemberProfile,
        room_id: &str,
        deliver: mpsc::Sender<RoomDelivery>,
    ) -> RoomResult<RoomBinding> {
        let room = self
            .get_room(room_id)
            .await?
            .ok_or_else(|| RoomError::NoRoom(room_id.to_string()))?;
        room.add_user(member.clone()).await?;
        room.connect(ConnectRequest::new(member, false, deliver))
            .await
    }

    // ========================================================================
    // Guests
    // ========================================================================

    /// Validate a guest's invite. A live room checks its own tokens; a cold
    /// room is checked against the invite store. Anything unexpected fails
    /// closed.
    pub async fn authorize_guest_invite(&self, tokens: &InviteTokens) -> RoomResult<()> {
        if let Some(room) = self.live(&tokens.room_id) {
            return match room.authenticate_invite(&tokens.token).await {
                Ok(true) => Ok(()),
                Ok(false) | Err(_) => Err(RoomError::InviteInvalid),
            };
        }

        match self
            .ctx
            .store
            .check_invite(&tokens.token, &tokens.room_id)
            .await
        {
            Ok(Some(invite)) if invite.is_valid => {
                if invite.single_use {
                    if let Err(e) = self.ctx.store.invalidate_invite(&tokens.token).await {
                        warn!(room_id = %tokens.room_id, error = %e, "Failed to consume single-use invite");
                    }
                }
                Ok(())
            }
            Ok(_) => Err(RoomError::InviteInvalid),
            Err(e) => {
                warn!(room_id = %tokens.room_id, error = %e, "Invite lookup failed");
                Err(RoomError::InviteInvalid)
            }
        }
    }

    /// Add a guest to the room it was invited to and bind it.
    pub async fn guest_join_room(
        self: &Arc<Self>,
        member: &MemberProfile,
        room_id: &str,
        deliver: mpsc::Sender<RoomDelivery>,
    ) -> RoomResult<RoomBinding> {
        let room = self
            .get_room(room_id)
            .await?
            .ok_or_else(|| RoomError::NoRoom(room_id.to_string()))?;
        room.add_user(member.clone()).await?;
        room.connect(ConnectRequest::new(member, false, deliver))
            .await
    }

    // ========================================================================
    // Notices
    // ========================================================================

    async fn handle_notice(&self, notice: RoomNotice) {
        match notice {
            RoomNotice::Empty { room_id } => self.evict_idle(&room_id).await,
            RoomNotice::WorkgroupAssigned { room_id, worg_id } => {
                let members = self.ctx.workgroups.get_user_list(&worg_id);
                debug!(room_id = %room_id, worg_id = %worg_id, members = members.len(), "Inviting workgroup members");
                for account_id in members {
                    let _ = self.accounts.send(AccountNotice::WorkgroupJoin {
                        account_id,
                        room_id: room_id.clone(),
                    });
                }
            }
        }
    }
}

async fn run_notices(registry: Weak<RoomRegistry>, mut rx: mpsc::UnboundedReceiver<RoomNotice>) {
    while let Some(notice) = rx.recv().await {
        let Some(registry) = registry.upgrade() else {
            break;
        };
        registry.handle_notice(notice).await;
    }
}

/// Order-independent key for an account pair.
fn pair_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}|{b}")
    } else {
        format!("{b}|{a}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::testing::{Fixture, delivery};
    use crate::store::{AccountStore, FailPoint, InviteStore, RoomStore};
    use futures_util::future::join_all;
    use std::time::Duration;

    #[test]
    fn pair_keys_ignore_order() {
        assert_eq!(pair_key("acc-b", "acc-a"), pair_key("acc-a", "acc-b"));
        assert_ne!(pair_key("acc-a", "acc-b"), pair_key("acc-a", "acc-c"));
    }

    #[tokio::test]
    async fn concurrent_loads_share_one_instance() {
        let fx = Fixture::new();
        let (registry, _accounts) = fx.registry();
        fx.store
            .set_room("room-1", "ops", "acc-owner", false)
            .await
            .unwrap();

        let rooms = join_all((0..8).map(|_| registry.get_room("room-1"))).await;
        let rooms: Vec<RoomHandle> = rooms.into_iter().map(|r| r.unwrap().unwrap()).collect();
        assert!(rooms.iter().all(|r| r.same_room(&rooms[0])));
        assert_eq!(registry.room_count(), 1);
        assert!(registry.is_active("room-1"));
    }

    #[tokio::test]
    async fn unknown_rooms_resolve_to_none() {
        let fx = Fixture::new();
        let (registry, _accounts) = fx.registry();
        assert!(registry.get_room("room-missing").await.unwrap().is_none());
        assert_eq!(registry.room_count(), 0);
    }

    #[tokio::test]
    async fn removed_rooms_reload_fresh() {
        let fx = Fixture::new();
        let (registry, _accounts) = fx.registry();
        fx.store
            .set_room("room-1", "ops", "acc-owner", false)
            .await
            .unwrap();

        let first = registry.get_room("room-1").await.unwrap().unwrap();
        registry.remove_room("room-1").await;
        assert!(!registry.is_active("room-1"));
        let second = registry.get_room("room-1").await.unwrap().unwrap();
        assert!(!first.same_room(&second));
    }

    #[tokio::test]
    async fn contact_room_is_symmetric() {
        let fx = Fixture::new();
        let (registry, _accounts) = fx.registry();
        let ann = fx.account("ann", "Ann").await;
        let bob = fx.account("bob", "Bob").await;

        let (ab, ba) = tokio::join!(
            registry.get_contact_room(&ann.account_id, &bob.account_id),
            registry.get_contact_room(&bob.account_id, &ann.account_id),
        );
        let (ab, ba) = (ab.unwrap(), ba.unwrap());
        assert!(ab.same_room(&ba));
        assert_eq!(fx.store.relation_count(), 1);

        let state = ab.state().await.unwrap();
        assert!(state.contact);
        assert!(state.persistent);
        let mut pair = vec![ann.account_id.clone(), bob.account_id.clone()];
        pair.sort();
        assert_eq!(state.participants, pair);

        // a later call reuses both relation and room
        let again = registry
            .get_contact_room(&ann.account_id, &bob.account_id)
            .await
            .unwrap();
        assert!(again.same_room(&ab));
        assert_eq!(fx.store.relation_count(), 1);
    }

    #[tokio::test]
    async fn contact_room_needs_identity() {
        let fx = Fixture::new();
        let (registry, _accounts) = fx.registry();
        let ann = fx.account("ann", "Ann").await;
        let err = registry
            .get_contact_room(&ann.account_id, "acc-ghost")
            .await
            .unwrap_err();
        assert_eq!(err, RoomError::NoIdentity("acc-ghost".into()));
        assert_eq!(fx.store.relation_count(), 0);
    }

    #[tokio::test]
    async fn failed_relation_never_opens_a_room() {
        let fx = Fixture::new();
        let (registry, _accounts) = fx.registry();
        let ann = fx.account("ann", "Ann").await;
        let bob = fx.account("bob", "Bob").await;
        fx.store.set_failing(FailPoint::CreateRelation, true);

        let err = registry
            .get_contact_room(&ann.account_id, &bob.account_id)
            .await
            .unwrap_err();
        assert!(matches!(err, RoomError::Store(_)));
        assert_eq!(registry.room_count(), 0);
    }

    #[tokio::test]
    async fn cold_contact_room_reloads_as_contact() {
        let fx = Fixture::new();
        let (registry, _accounts) = fx.registry();
        let ann = fx.account("ann", "Ann").await;
        let bob = fx.account("bob", "Bob").await;
        let room = registry
            .get_contact_room(&ann.account_id, &bob.account_id)
            .await
            .unwrap();
        let room_id = room.id().to_string();
        registry.remove_room(&room_id).await;

        // a fresh registry knows nothing about the relation
        let (fresh, _accounts) = fx.registry();
        let room = fresh.get_room(&room_id).await.unwrap().unwrap();
        let state = room.state().await.unwrap();
        assert!(state.contact);
        assert_eq!(state.authorized.len(), 2);
    }

    #[tokio::test]
    async fn open_contact_notifies_counterpart() {
        let fx = Fixture::new();
        let (registry, mut accounts) = fx.registry();
        let ann = fx.account("ann", "Ann").await;
        let bob = fx.account("bob", "Bob").await;
        let (tx, _rx) = delivery();

        let binding = registry
            .open_contact(&ann, &bob.account_id, tx, true)
            .await
            .unwrap();
        assert!(binding.contact);
        assert_eq!(binding.client_room_id, bob.account_id);
        assert_eq!(binding.name.as_deref(), Some("Bob"));
        assert_eq!(
            accounts.recv().await.unwrap(),
            AccountNotice::ContactJoin {
                account_id: bob.account_id.clone(),
                contact_id: ann.account_id.clone(),
            }
        );

        let (tx, _rx) = delivery();
        let joined = registry
            .connect_contact(&bob, &ann.account_id, tx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(joined.room_id, binding.room_id);
        assert_eq!(joined.client_room_id, ann.account_id);
    }

    #[tokio::test]
    async fn anon_rooms_are_ephemeral() {
        let fx = Fixture::new();
        let (registry, _accounts) = fx.registry();
        let ann = fx.account("ann", "Ann").await;
        let (tx, _rx) = delivery();

        let binding = registry.create_anon_room(&ann, tx).await.unwrap();
        assert!(!binding.persistent);
        assert_eq!(binding.name.as_deref(), Some("[ temp ] created by: Ann"));
        assert!(fx.store.get_room(&binding.room_id).await.unwrap().is_none());

        let state = binding.handle.state().await.unwrap();
        assert_eq!(state.online, vec![ann.account_id.clone()]);
        assert_eq!(state.authed, vec![ann.account_id]);
    }

    #[tokio::test]
    async fn named_rooms_are_persistent() {
        let fx = Fixture::new();
        let (registry, _accounts) = fx.registry();
        let ann = fx.account("ann", "Ann").await;
        let (tx, _rx) = delivery();

        let binding = registry.create_named_room(&ann, "ops", tx).await.unwrap();
        assert!(binding.persistent);
        assert_eq!(
            fx.store.authorized_ids(&binding.room_id),
            vec![ann.account_id.clone()]
        );
    }

    #[tokio::test]
    async fn join_requires_token_or_grant() {
        let fx = Fixture::new();
        let (registry, _accounts) = fx.registry();
        let ann = fx.account("ann", "Ann").await;
        let bob = fx.account("bob", "Bob").await;
        let (tx, _rx) = delivery();
        let owned = registry.create_named_room(&ann, "ops", tx).await.unwrap();

        let (tx, _rx) = delivery();
        let request = JoinRequest {
            room_id: owned.room_id.clone(),
            token: None,
        };
        let err = registry.join_room(&bob, &request, tx).await.unwrap_err();
        assert_eq!(err, RoomError::NotAuthorized);

        fx.store
            .create_invite("inv-1", &owned.room_id, true, &ann.account_id)
            .await
            .unwrap();
        let (tx, _rx) = delivery();
        let request = JoinRequest {
            room_id: owned.room_id.clone(),
            token: Some("inv-1".into()),
        };
        registry.join_room(&bob, &request, tx).await.unwrap();
        assert!(fx.store.authorized_ids(&owned.room_id).contains(&bob.account_id));

        // single use
        let carl = fx.account("carl", "Carl").await;
        let (tx, _rx) = delivery();
        let err = registry.join_room(&carl, &request, tx).await.unwrap_err();
        assert_eq!(err, RoomError::InviteInvalid);
    }

    #[tokio::test]
    async fn guest_invites_cold_and_live() {
        let fx = Fixture::new();
        let (registry, _accounts) = fx.registry();
        fx.store
            .set_room("room-1", "ops", "acc-owner", false)
            .await
            .unwrap();
        fx.store
            .create_invite("inv-once", "room-1", true, "acc-owner")
            .await
            .unwrap();
        fx.store
            .create_invite("inv-many", "room-1", false, "acc-owner")
            .await
            .unwrap();

        let tokens = |token: &str| InviteTokens {
            token: token.into(),
            room_id: "room-1".into(),
        };

        // cold path
        registry.authorize_guest_invite(&tokens("inv-once")).await.unwrap();
        assert_eq!(
            registry.authorize_guest_invite(&tokens("inv-once")).await,
            Err(RoomError::InviteInvalid)
        );

        // live path
        registry.get_room("room-1").await.unwrap().unwrap();
        registry.authorize_guest_invite(&tokens("inv-many")).await.unwrap();
        registry.authorize_guest_invite(&tokens("inv-many")).await.unwrap();
        assert_eq!(
            registry.authorize_guest_invite(&tokens("inv-bogus")).await,
            Err(RoomError::InviteInvalid)
        );
    }

    #[tokio::test]
    async fn workgroup_assignment_invites_members() {
        let fx = Fixture::new();
        let (registry, mut accounts) = fx.registry();
        let ann = fx.account("ann", "Ann").await;
        let bob = fx.account("bob", "Bob").await;
        fx.join_workgroup(&bob.account_id, "7", "ops");
        let (tx, _rx) = delivery();
        let owned = registry.create_named_room(&ann, "standup", tx).await.unwrap();

        owned
            .handle
            .client_event(
                &ann.account_id,
                presence_proto::Event::new(
                    presence_proto::kinds::WORKGROUP,
                    serde_json::json!({ "type": "assign", "data": "friend_wg_7" }),
                ),
            )
            .await
            .unwrap();

        assert_eq!(
            accounts.recv().await.unwrap(),
            AccountNotice::WorkgroupJoin {
                account_id: bob.account_id.clone(),
                room_id: owned.room_id.clone(),
            }
        );
        let (tx, _rx) = delivery();
        let joined = registry
            .connect_workgroup(&bob, &owned.room_id, tx)
            .await
            .unwrap();
        let state = joined.handle.state().await.unwrap();
        assert!(state.online.contains(&bob.account_id));
        assert!(!state.authed.contains(&bob.account_id));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_rooms_are_evicted() {
        let fx = Fixture::new();
        let (registry, _accounts) = fx.registry_with_timeout(Duration::from_secs(20));
        let ann = fx.account("ann", "Ann").await;
        let (tx, _rx) = delivery();
        let binding = registry.create_named_room(&ann, "ops", tx).await.unwrap();
        binding.handle.disconnect(&ann.account_id).await.unwrap();
        assert!(registry.is_active(&binding.room_id));

        tokio::time::sleep(Duration::from_secs(21)).await;
        // let the notice consumer run
        for _ in 0..50 {
            if !registry.is_active(&binding.room_id) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!registry.is_active(&binding.room_id));
        assert!(binding.handle.state().await.is_err());
    }

    #[tokio::test]
    async fn eviction_spares_a_room_with_someone_online() {
        let fx = Fixture::new();
        let (registry, _accounts) = fx.registry();
        let ann = fx.account("ann", "Ann").await;
        let (tx, _rx) = delivery();
        let binding = registry.create_named_room(&ann, "ops", tx).await.unwrap();

        registry.evict_idle(&binding.room_id).await;
        let cached = registry.get_room(&binding.room_id).await.unwrap().unwrap();
        assert!(cached.same_room(&binding.handle));
        assert!(binding.handle.state().await.is_ok());
    }

    #[tokio::test]
    async fn eviction_racing_a_lookup_leaves_one_live_room() {
        let fx = Fixture::new();
        let (registry, _accounts) = fx.registry();
        let ann = fx.account("ann", "Ann").await;
        let (tx, _rx) = delivery();
        let binding = registry.create_named_room(&ann, "ops", tx).await.unwrap();
        binding.handle.disconnect(&ann.account_id).await.unwrap();

        let room_id = binding.room_id.clone();
        let (_, looked_up) = tokio::join!(registry.evict_idle(&room_id), registry.get_room(&room_id));
        assert!(looked_up.unwrap().is_some());
        // the closed actor drops its receiver on its next turn
        tokio::time::sleep(Duration::from_millis(20)).await;

        let cached = registry.get_room(&room_id).await.unwrap().unwrap();
        assert!(cached.state().await.is_ok());
        assert_eq!(registry.room_count(), 1);
        if binding.handle.state().await.is_ok() {
            assert!(binding.handle.same_room(&cached));
        }
    }

    #[tokio::test]
    async fn account_fixture_uses_store() {
        let fx = Fixture::new();
        let ann = fx.account("ann", "Ann").await;
        let stored = fx.store.get_account(&ann.account_id).await.unwrap();
        assert_eq!(stored.unwrap().name, "Ann");
    }
}
