//! Room settings changes.

use super::super::RoomActor;
use crate::error::RoomError;
use crate::rooms::settings::ROOM_NAME;
use presence_proto::{ErrorCode, Event, kinds};
use serde_json::{Value, json};
use tracing::{debug, warn};

impl RoomActor {
    /// `null` asks for the current map; `{setting, value}` changes one key.
    pub(crate) async fn handle_settings(&mut self, account_id: &str, data: &Value) {
        if data.is_null() {
            self.send_to(
                account_id,
                Event::new(kinds::SETTINGS, self.settings.to_value()),
            );
            return;
        }
        if self.kind.is_contact() {
            debug!(room_id = %self.id, "Contact rooms have no settings");
            return;
        }
        if !self.is_privileged(account_id) {
            self.send_to(account_id, RoomError::NotAuthorized.to_event());
            return;
        }

        let Some(key) = data.get("setting").and_then(Value::as_str) else {
            return;
        };
        let value = data.get("value").cloned().unwrap_or(Value::Null);
        let value = match self.settings.set(key, value) {
            Ok(value) => value,
            Err(e) => {
                self.send_to(
                    account_id,
                    Event::error(ErrorCode::UnknownEvent, Some(json!(e.to_string()))),
                );
                return;
            }
        };

        if key == ROOM_NAME {
            self.name = value.as_str().map(str::to_string);
        }
        if self.persistent {
            let stored = match (key, value.as_str()) {
                (ROOM_NAME, Some(name)) => self.ctx.store.rename_room(&self.id, name).await,
                _ => self.ctx.store.set_setting(&self.id, key, &value).await,
            };
            if let Err(e) = stored {
                warn!(room_id = %self.id, setting = %key, error = %e, "Failed to store room setting");
            }
        }

        self.broadcast(
            &Event::new(kinds::SETTINGS, json!({ "setting": key, "value": value })),
            None,
        );
    }
}
