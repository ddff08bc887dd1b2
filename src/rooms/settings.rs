//! Room settings.
//!
//! Settings are a flat key/value map. Only known keys are accepted, each with
//! a fixed JSON type; stored maps are filtered through the same validation on
//! load so a bad row never reaches clients.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

pub const ROOM_NAME: &str = "roomName";
pub const IS_STREAM: &str = "isStream";
pub const IS_CLASSROOM: &str = "isClassroom";
pub const TOPIC: &str = "topic";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingError {
    #[error("unknown setting: {0}")]
    Unknown(String),
    #[error("invalid value for {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomSettings {
    values: Map<String, Value>,
}

impl RoomSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a stored map, dropping anything that does not validate.
    pub fn from_map(map: Map<String, Value>) -> Self {
        let mut settings = Self::new();
        for (key, value) in map {
            if let Err(e) = settings.set(&key, value) {
                warn!(key = %key, error = %e, "Dropping stored room setting");
            }
        }
        settings
    }

    /// Validate and store. Returns the normalized value.
    pub fn set(&mut self, key: &str, value: Value) -> Result<Value, SettingError> {
        let value = validate(key, value)?;
        self.values.insert(key.to_string(), value.clone());
        Ok(value)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }
}

fn validate(key: &str, value: Value) -> Result<Value, SettingError> {
    match key {
        ROOM_NAME => match value {
            Value::String(s) if !s.trim().is_empty() => Ok(Value::String(s.trim().to_string())),
            _ => Err(SettingError::Invalid(ROOM_NAME)),
        },
        TOPIC => match value {
            Value::String(_) | Value::Null => Ok(value),
            _ => Err(SettingError::Invalid(TOPIC)),
        },
        IS_STREAM => value
            .as_bool()
            .map(Value::Bool)
            .ok_or(SettingError::Invalid(IS_STREAM)),
        IS_CLASSROOM => value
            .as_bool()
            .map(Value::Bool)
            .ok_or(SettingError::Invalid(IS_CLASSROOM)),
        other => Err(SettingError::Unknown(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_keys_validate() {
        let mut s = RoomSettings::new();
        assert_eq!(s.set(ROOM_NAME, json!("  Ops  ")).unwrap(), json!("Ops"));
        assert_eq!(s.set(IS_STREAM, json!(true)).unwrap(), json!(true));
        assert_eq!(
            s.set(ROOM_NAME, json!("")),
            Err(SettingError::Invalid(ROOM_NAME))
        );
        assert_eq!(
            s.set(IS_CLASSROOM, json!("yes")),
            Err(SettingError::Invalid(IS_CLASSROOM))
        );
        assert_eq!(
            s.set("colour", json!("red")),
            Err(SettingError::Unknown("colour".into()))
        );
        assert_eq!(s.to_value(), json!({ "roomName": "Ops", "isStream": true }));
    }

    #[test]
    fn stored_maps_are_filtered() {
        let map = json!({ "topic": "standup", "bogus": 1, "isStream": "no" });
        let Value::Object(map) = map else { unreachable!() };
        let s = RoomSettings::from_map(map);
        assert_eq!(s.to_value(), json!({ "topic": "standup" }));
    }
}
