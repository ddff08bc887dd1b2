//! Session event dispatch.
//!
//! Every inbound event is routed by its `type`. Handlers return a
//! [`HandlerResult`]; failures are logged and, where the client should know,
//! answered with an `error` event on the connection that sent the request.

use super::{AccountActor, room_envelope};
use crate::error::{HandlerError, HandlerResult, RoomError};
use crate::state::session::SessionEvent;
use presence_proto::payload::{
    ContactRequest, CreateRequest, JoinRequest, LoginIdentity, RoomRequest,
};
use presence_proto::{Event, kinds};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

impl AccountActor {
    pub(super) async fn handle_session_event(&mut self, item: SessionEvent) {
        let SessionEvent { conn_id, event } = item;
        let result = match event.kind() {
            kinds::JOIN => self.handle_join(&event).await,
            kinds::CREATE => self.handle_create(&event).await,
            kinds::ROOM => self.handle_room(&event).await,
            kinds::CONTACT => self.handle_contact(&event).await,
            kinds::SETTINGS => self.handle_settings(&conn_id),
            kinds::IDENTITY => self.handle_identity(&event).await,
            kinds::INITIALIZE => self.handle_initialize(&conn_id),
            kinds::LOGOUT => {
                info!("Logout requested");
                self.closing = true;
                Ok(())
            }
            other => Err(HandlerError::UnknownEvent(other.to_string())),
        };

        if let Err(e) = result {
            debug!(kind = %event.kind(), label = e.label(), error = %e, "Session event failed");
            if let Some(reply) = e.to_event() {
                self.session.send_to(reply, &conn_id);
            }
        }
    }

    async fn handle_join(&mut self, event: &Event) -> HandlerResult {
        let request: JoinRequest = event.payload()?;
        let member = self.profile.member();
        let binding = self
            .ctx
            .rooms
            .join_room(&member, &request, self.deliver_tx.clone())
            .await?;
        self.joined(binding);
        Ok(())
    }

    async fn handle_create(&mut self, event: &Event) -> HandlerResult {
        let request: CreateRequest = if event.data.is_null() {
            CreateRequest::default()
        } else {
            event.payload()?
        };
        let member = self.profile.member();
        let deliver = self.deliver_tx.clone();
        let name = request
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());

        let binding = match name {
            Some(name) => {
                self.ctx
                    .rooms
                    .create_named_room(&member, name, deliver)
                    .await?
            }
            None => self.ctx.rooms.create_anon_room(&member, deliver).await?,
        };
        self.joined(binding);
        Ok(())
    }

    /// Forward a room-scoped event. Events for a contact whose chat is not
    /// open yet open it first.
    async fn handle_room(&mut self, event: &Event) -> HandlerResult {
        let request: RoomRequest = event.payload()?;
        if !self.rooms.contains_key(&request.room_id) && self.contacts.contains(&request.room_id)
        {
            self.open_contact_chat(&request.room_id, true).await?;
        }
        let binding = self
            .rooms
            .get(&request.room_id)
            .ok_or_else(|| RoomError::NoRoom(request.room_id.clone()))?;
        binding
            .handle
            .client_event(&self.profile.account_id, request.event)
            .await?;
        Ok(())
    }

    async fn handle_contact(&mut self, event: &Event) -> HandlerResult {
        match event.payload::<ContactRequest>()? {
            ContactRequest::Open(contact_id) => self.open_contact_chat(&contact_id, true).await,
            ContactRequest::Start(contact_id) => {
                if self.contacts.contains(&contact_id) {
                    return Ok(());
                }
                let identity = self
                    .ctx
                    .identities
                    .get(&contact_id)
                    .await
                    .ok_or_else(|| RoomError::NoIdentity(contact_id.clone()))?;
                self.add_contact(identity);
                Ok(())
            }
        }
    }

    /// Open the 1:1 chat with `contact_id`, creating the relation and room
    /// when the pair never talked. With `notify` the contact's account is
    /// asked to join too.
    pub(super) async fn open_contact_chat(
        &mut self,
        contact_id: &str,
        notify: bool,
    ) -> HandlerResult {
        if contact_id == self.profile.account_id {
            return Err(RoomError::NoIdentity(contact_id.to_string()).into());
        }
        if self.rooms.contains_key(contact_id) {
            self.send_open(contact_id);
            return Ok(());
        }

        let member = self.profile.member();
        let binding = self
            .ctx
            .rooms
            .open_contact(&member, contact_id, self.deliver_tx.clone(), notify)
            .await?;
        if !self.contacts.has_relation(contact_id) {
            self.contacts.set_relation(contact_id, None);
        }
        if !self.contacts.contains(contact_id) {
            if let Some(identity) = self.ctx.identities.get(contact_id).await {
                self.add_contact(identity);
            }
        }
        self.joined(binding);
        self.send_open(contact_id);
        Ok(())
    }

    fn send_open(&self, contact_id: &str) {
        let open = Event::new(kinds::OPEN, Value::Bool(true));
        self.session.send(&room_envelope(contact_id, &open));
    }

    fn handle_settings(&self, conn_id: &str) -> HandlerResult {
        let settings = json!({
            "name": self.profile.name,
            "avatar": self.profile.avatar,
        });
        self.session
            .send_to(Event::new(kinds::SETTINGS, settings), conn_id);
        Ok(())
    }

    /// Rename the account and tell every bound room.
    async fn handle_identity(&mut self, event: &Event) -> HandlerResult {
        let update: LoginIdentity = event.payload()?;
        let Some(name) = update
            .name
            .or(update.alias)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
        else {
            debug!("Identity update without a name");
            return Ok(());
        };

        let account_id = self.profile.account_id.clone();
        if !self.profile.guest {
            if let Err(e) = self.ctx.store.update_account_name(&account_id, &name).await {
                warn!(error = %e, "Failed to store account name");
            }
        }
        self.ctx.identities.update_name(&account_id, &name);
        self.profile.name = name;
        if update.avatar.is_some() {
            self.profile.avatar = update.avatar;
        }

        let identity = Event::new(kinds::IDENTITY, json!(self.profile.identity()));
        for binding in self.rooms.values() {
            if let Err(e) = binding
                .handle
                .client_event(&account_id, identity.clone())
                .await
            {
                debug!(room_id = %binding.room_id, error = %e, "Identity not delivered");
            }
        }
        Ok(())
    }

    /// Account bootstrap payload, for the requesting connection only.
    fn handle_initialize(&self, conn_id: &str) -> HandlerResult {
        let rooms: Vec<Value> = self
            .rooms
            .values()
            .filter(|b| !b.is_private)
            .map(|b| {
                json!({
                    "clientId": b.client_room_id,
                    "persistent": b.persistent,
                    "name": b.name,
                })
            })
            .collect();
        let contacts: Map<String, Value> = self
            .contacts
            .iter()
            .map(|c| (c.client_id.clone(), json!(c)))
            .collect();

        let state = json!({
            "account": {
                "clientId": self.profile.account_id,
                "login": self.profile.login,
                "name": self.profile.name,
                "auth": { "isAdmin": self.profile.admin },
            },
            "rooms": rooms,
            "contacts": contacts,
        });
        self.session
            .send_to(Event::new(kinds::INITIALIZE, state), conn_id);
        Ok(())
    }
}
