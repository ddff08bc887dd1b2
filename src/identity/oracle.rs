//! Credential validation against the external user directory.
//!
//! The directory speaks form-encoded POSTs and answers with JSON, sometimes
//! prefixed by an `ok<!--separate-->` marker. Three lookups make up one
//! authentication: the user record, the workgroup catalog and the stream
//! workgroup settings. Only the first two are fatal when they fail.

use crate::config::{IdentityConfig, StaticUser};
use async_trait::async_trait;
use presence_proto::payload::AuthIdBundle;
use presence_proto::{ErrorCode, WorkgroupRef, WorkgroupSnapshot};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Outcome of a successful credential validation.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthProfile {
    pub login: String,
    pub name: String,
    pub is_admin: bool,
    pub workgroups: WorkgroupSnapshot,
}

/// Identity oracle failures.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("auth id not recognised")]
    InvalidAuthId,
    #[error("auth id belongs to another login")]
    InvalidLogin,
    #[error("directory request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unreadable directory response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl IdentityError {
    /// Stable client-facing code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidAuthId => ErrorCode::InvalidAuthId,
            Self::InvalidLogin => ErrorCode::InvalidLogin,
            Self::Http(_) | Self::Decode(_) => ErrorCode::AuthUnknown,
        }
    }
}

/// Validates credential bundles.
#[async_trait]
pub trait AuthOracle: Send + Sync {
    async fn authenticate(&self, bundle: &AuthIdBundle) -> Result<AuthProfile, IdentityError>;
}

/// Build the oracle selected by configuration.
pub fn from_config(config: &IdentityConfig) -> Result<Box<dyn AuthOracle>, IdentityError> {
    match &config.url {
        Some(url) => Ok(Box::new(HttpAuthOracle::new(
            url,
            Duration::from_secs(config.timeout_secs),
        )?)),
        None => Ok(Box::new(StaticAuthOracle::new(config.users.clone()))),
    }
}

// ============================================================================
// Static oracle
// ============================================================================

/// Accepts only configured auth ids.
#[derive(Debug, Default)]
pub struct StaticAuthOracle {
    users: HashMap<String, StaticUser>,
}

impl StaticAuthOracle {
    pub fn new(users: Vec<StaticUser>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.auth_id.clone(), u)).collect(),
        }
    }
}

#[async_trait]
impl AuthOracle for StaticAuthOracle {
    async fn authenticate(&self, bundle: &AuthIdBundle) -> Result<AuthProfile, IdentityError> {
        let user = self
            .users
            .get(&bundle.tokens.auth_id)
            .ok_or(IdentityError::InvalidAuthId)?;
        if user.login != bundle.login {
            return Err(IdentityError::InvalidLogin);
        }
        Ok(AuthProfile {
            login: user.login.clone(),
            name: user.name.clone(),
            is_admin: user.admin,
            workgroups: user.workgroups.clone(),
        })
    }
}

// ============================================================================
// HTTP oracle
// ============================================================================

const MODULE_PATH: &str = "/system.library/module/";
const RESPONSE_MARKER: &str = "ok<!--separate-->";

#[derive(Debug, Deserialize)]
struct DirectoryUser {
    #[serde(rename = "Name")]
    name: Option<String>,
    #[serde(rename = "FullName")]
    full_name: Option<String>,
    #[serde(rename = "Level")]
    level: Option<String>,
    #[serde(rename = "Workgroup")]
    workgroup: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectoryWorkgroup {
    #[serde(rename = "ID")]
    id: Value,
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct DirectorySetting {
    #[serde(rename = "Data")]
    data: String,
}

/// Oracle backed by the remote user directory.
pub struct HttpAuthOracle {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpAuthOracle {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), MODULE_PATH),
        })
    }

    async fn post(&self, form: &[(&str, &str)]) -> Result<Value, IdentityError> {
        let text = self
            .client
            .post(&self.endpoint)
            .form(form)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(serde_json::from_str(&strip_marker(&text))?)
    }

    async fn user(&self, auth_id: &str) -> Result<DirectoryUser, IdentityError> {
        let value = self
            .post(&[
                ("module", "system"),
                ("command", "userinfoget"),
                ("authid", auth_id),
            ])
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn workgroups(&self, auth_id: &str) -> Result<Vec<WorkgroupRef>, IdentityError> {
        let value = self
            .post(&[
                ("module", "system"),
                ("command", "workgroups"),
                ("authid", auth_id),
            ])
            .await?;
        let groups: Vec<DirectoryWorkgroup> = serde_json::from_value(value)?;
        Ok(groups.into_iter().map(normalize_workgroup).collect())
    }

    async fn stream_workgroups(&self, auth_id: &str) -> Result<Vec<String>, IdentityError> {
        let args = r#"{"type":"friendchat","key":"systemsettings"}"#;
        let value = self
            .post(&[
                ("module", "system"),
                ("command", "getsystemsetting"),
                ("authid", auth_id),
                ("args", args),
            ])
            .await?;
        let settings: Vec<DirectorySetting> = serde_json::from_value(value)?;
        Ok(stream_names(&settings))
    }
}

#[async_trait]
impl AuthOracle for HttpAuthOracle {
    async fn authenticate(&self, bundle: &AuthIdBundle) -> Result<AuthProfile, IdentityError> {
        let auth_id = bundle.tokens.auth_id.as_str();
        let user = self.user(auth_id).await?;
        let Some(login) = user.name.clone() else {
            return Err(IdentityError::InvalidAuthId);
        };
        if login != bundle.login {
            return Err(IdentityError::InvalidLogin);
        }

        let available = self.workgroups(auth_id).await?;
        let stream = match self.stream_workgroups(auth_id).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(login = %login, error = %e, "Stream workgroup lookup failed");
                Vec::new()
            }
        };

        let names = member_names(user.workgroup.as_deref());
        let member = available
            .iter()
            .filter(|wg| names.iter().any(|n| *n == wg.name))
            .cloned()
            .collect();

        debug!(login = %login, "Directory user resolved");
        Ok(AuthProfile {
            name: user.full_name.unwrap_or_else(|| login.clone()),
            is_admin: user.level.as_deref() == Some("Admin"),
            login,
            workgroups: WorkgroupSnapshot {
                available,
                member,
                stream,
            },
        })
    }
}

fn strip_marker(text: &str) -> String {
    text.replace(RESPONSE_MARKER, "")
}

fn normalize_workgroup(wg: DirectoryWorkgroup) -> WorkgroupRef {
    let f_id = match wg.id {
        Value::String(s) => s,
        other => other.to_string(),
    };
    WorkgroupRef {
        client_id: format!("friend_wg_{f_id}"),
        f_id,
        name: wg.name,
    }
}

/// The directory lists a user's workgroups as one `", "`-joined string.
fn member_names(raw: Option<&str>) -> Vec<&str> {
    match raw {
        Some(s) if !s.is_empty() => s.split(", ").collect(),
        _ => Vec::new(),
    }
}

fn stream_names(settings: &[DirectorySetting]) -> Vec<String> {
    settings
        .iter()
        .filter_map(|item| match serde_json::from_str::<Value>(&item.data) {
            Ok(setting) => setting
                .get("classroom_teachers")
                .or_else(|| setting.get("stream_source"))
                .and_then(Value::as_str)
                .map(str::to_string),
            Err(e) => {
                warn!(error = %e, "Unreadable system setting");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_proto::payload::AuthIdTokens;
    use serde_json::json;

    fn bundle(auth_id: &str, login: &str) -> AuthIdBundle {
        AuthIdBundle {
            tokens: AuthIdTokens {
                auth_id: auth_id.into(),
            },
            login: login.into(),
        }
    }

    fn static_oracle() -> StaticAuthOracle {
        StaticAuthOracle::new(vec![StaticUser {
            auth_id: "tok-ann".into(),
            login: "ann".into(),
            name: "Ann".into(),
            admin: true,
            workgroups: WorkgroupSnapshot::default(),
        }])
    }

    #[tokio::test]
    async fn static_oracle_accepts_known_user() {
        let profile = static_oracle()
            .authenticate(&bundle("tok-ann", "ann"))
            .await
            .unwrap();
        assert_eq!(profile.login, "ann");
        assert!(profile.is_admin);
    }

    #[tokio::test]
    async fn static_oracle_rejects() {
        let oracle = static_oracle();
        let err = oracle.authenticate(&bundle("nope", "ann")).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidAuthId);
        let err = oracle.authenticate(&bundle("tok-ann", "bob")).await.unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::InvalidLogin);
    }

    #[test]
    fn directory_workgroups_normalize() {
        let wg: DirectoryWorkgroup = serde_json::from_value(json!({ "ID": 7, "Name": "ops" })).unwrap();
        let wg = normalize_workgroup(wg);
        assert_eq!(wg.f_id, "7");
        assert_eq!(wg.client_id, "friend_wg_7");
    }

    #[test]
    fn member_names_split() {
        assert_eq!(member_names(Some("ops, dev")), vec!["ops", "dev"]);
        assert!(member_names(Some("")).is_empty());
        assert!(member_names(None).is_empty());
    }

    #[test]
    fn stream_settings() {
        let settings = vec![
            DirectorySetting { data: r#"{"stream_source":"lectures"}"#.into() },
            DirectorySetting { data: "not json".into() },
            DirectorySetting { data: r#"{"other":1}"#.into() },
        ];
        assert_eq!(stream_names(&settings), vec!["lectures"]);
    }

    #[test]
    fn marker_is_stripped() {
        assert_eq!(strip_marker("ok<!--separate-->{\"a\":1}"), "{\"a\":1}");
    }
}
