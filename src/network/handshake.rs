//! Authentication handshake.
//!
//! Every new connection is challenged with `authenticate` and has the auth
//! timeout to answer with one of:
//!
//! - `session` + id: resume a live session (a miss answers `session:false`
//!   and closes; it never creates a session);
//! - `authenticate` + `authid` bundle: validate against the identity oracle,
//!   then run the account stage (`account` login / create);
//! - `authenticate` + `anon-invite` bundle: validate the invite and log in
//!   a guest bound to the invited room.
//!
//! The timer stops at the first valid reply. Events of other types are
//! ignored while waiting. Any failure answers with an `error` event (plus
//! `authenticate:false` for rejected credentials) and closes the connection.

use crate::db::DbError;
use crate::error::RoomError;
use crate::identity::{AuthProfile, IdentityError};
use crate::network::Connection;
use crate::state::uid::{self, new_id};
use crate::state::{AccountProfile, Hub};
use crate::store::AccountRecord;
use presence_proto::payload::{
    AccountRequest, AuthBundle, CreateAccount, InviteBundle, LoginIdentity,
};
use presence_proto::{ErrorCode, Event, ProtocolError, WorkgroupSnapshot, kinds};
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

const GUEST_NAME: &str = "Guest";

/// Handshake failures.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no authentication reply in time")]
    Timeout,

    #[error("client left during the handshake")]
    Disconnected,

    #[error("malformed handshake payload: {0}")]
    Malformed(#[from] ProtocolError),

    #[error("credentials rejected: {0}")]
    Identity(#[from] IdentityError),

    #[error("no live session {0}")]
    NoSession(String),

    #[error("invite rejected: {0}")]
    Invite(RoomError),

    #[error("login request without a login")]
    NoLogin,

    #[error("login {requested} does not match authenticated {authenticated}")]
    LoginMismatch {
        authenticated: String,
        requested: String,
    },

    #[error("account creation data missing")]
    CreateMissing,

    #[error("account creation failed: {0}")]
    CreateFailed(DbError),

    #[error("store error: {0}")]
    Store(#[from] DbError),
}

impl GatewayError {
    /// Stable client-facing code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Timeout => ErrorCode::AuthTimeout,
            Self::Disconnected | Self::Malformed(_) => ErrorCode::AuthFailed,
            Self::Identity(e) => e.error_code(),
            Self::NoSession(_) => ErrorCode::NoSession,
            Self::Invite(_) => ErrorCode::InviteInvalid,
            Self::NoLogin => ErrorCode::NoLogin,
            Self::LoginMismatch { .. } => ErrorCode::LoginIdentityMismatch,
            Self::CreateMissing => ErrorCode::AccountCreateMissing,
            Self::CreateFailed(_) => ErrorCode::AccountCreateFailed,
            Self::Store(_) => ErrorCode::Store,
        }
    }

    /// Events sent to the client before the connection is closed.
    pub fn to_events(&self) -> Vec<Event> {
        match self {
            Self::NoSession(_) => vec![Event::new(kinds::SESSION, Value::Bool(false))],
            Self::Identity(_) | Self::Invite(_) => vec![
                Event::new(kinds::AUTHENTICATE, Value::Bool(false)),
                Event::error(self.error_code(), None),
            ],
            Self::LoginMismatch { requested, .. } => {
                vec![Event::error(self.error_code(), Some(json!(requested)))]
            }
            _ => vec![Event::error(self.error_code(), None)],
        }
    }
}

/// How a connection got past the handshake.
#[derive(Debug)]
pub enum Admitted {
    Resumed { session_id: String },
    Account { account_id: String },
    Guest { account_id: String },
}

/// Drive one connection through the handshake and hand it to the hub.
/// Rejected connections are answered and closed.
pub async fn admit(hub: &Arc<Hub>, mut conn: Connection) -> Result<Admitted, GatewayError> {
    conn.send(Event::bare(kinds::AUTHENTICATE));
    let deadline = Instant::now() + hub.auth_timeout();

    match authenticate(hub, &mut conn, deadline).await {
        Ok(Stage::Resume(session_id)) => {
            let Some(session) = hub.sessions().get(&session_id) else {
                return reject(conn, GatewayError::NoSession(session_id));
            };
            if hub.resume(&session, conn) {
                Ok(Admitted::Resumed { session_id })
            } else {
                // closed between lookup and attach; attach already closed conn
                Err(GatewayError::NoSession(session_id))
            }
        }
        Ok(Stage::Account(profile, workgroups)) => {
            let account_id = profile.account_id.clone();
            hub.login(profile, &workgroups, conn);
            Ok(Admitted::Account { account_id })
        }
        Ok(Stage::Guest(profile)) => {
            let account_id = profile.account_id.clone();
            hub.login_guest(profile, conn);
            Ok(Admitted::Guest { account_id })
        }
        Err(e) => reject(conn, e),
    }
}

fn reject(conn: Connection, error: GatewayError) -> Result<Admitted, GatewayError> {
    for event in error.to_events() {
        conn.send(event);
    }
    conn.close();
    Err(error)
}

enum Stage {
    Resume(String),
    Account(AccountProfile, WorkgroupSnapshot),
    Guest(AccountProfile),
}

async fn next_event(conn: &mut Connection, deadline: Instant) -> Result<Event, GatewayError> {
    match time::timeout_at(deadline, conn.recv()).await {
        Ok(Some(event)) => Ok(event),
        Ok(None) => Err(GatewayError::Disconnected),
        Err(_) => Err(GatewayError::Timeout),
    }
}

async fn authenticate(
    hub: &Arc<Hub>,
    conn: &mut Connection,
    deadline: Instant,
) -> Result<Stage, GatewayError> {
    let bundle = loop {
        let event = next_event(conn, deadline).await?;
        match event.kind() {
            kinds::SESSION => {
                let session_id = event.payload::<String>()?;
                debug!(session_id = %session_id, "Session resume requested");
                return Ok(Stage::Resume(session_id));
            }
            kinds::AUTHENTICATE => break event.payload::<AuthBundle>()?,
            other => debug!(kind = %other, "Ignoring event before authentication"),
        }
    };

    match bundle {
        AuthBundle::Authid(bundle) => {
            let profile = hub.oracle().authenticate(&bundle).await?;
            conn.send(Event::new(kinds::AUTHENTICATE, Value::Bool(true)));
            info!(login = %profile.login, "Credentials accepted");
            account_stage(hub, conn, profile).await
        }
        AuthBundle::AnonInvite(bundle) => guest(hub, conn, bundle).await,
    }
}

async fn guest(
    hub: &Arc<Hub>,
    conn: &mut Connection,
    bundle: InviteBundle,
) -> Result<Stage, GatewayError> {
    hub.rooms()
        .authorize_guest_invite(&bundle.tokens)
        .await
        .map_err(GatewayError::Invite)?;
    conn.send(Event::new(kinds::AUTHENTICATE, Value::Bool(true)));

    let identity = bundle.identity.unwrap_or_default();
    let name = identity
        .name
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| GUEST_NAME.to_string());
    let account_id = new_id(uid::GUEST);
    info!(account_id = %account_id, room_id = %bundle.tokens.room_id, "Guest admitted");

    Ok(Stage::Guest(AccountProfile {
        login: account_id.clone(),
        account_id,
        name,
        avatar: identity.avatar,
        admin: false,
        guest: true,
        guest_room: Some(bundle.tokens.room_id),
    }))
}

/// Resolve the authenticated login to an account, creating one on request.
async fn account_stage(
    hub: &Arc<Hub>,
    conn: &mut Connection,
    auth: AuthProfile,
) -> Result<Stage, GatewayError> {
    conn.send(Event::new(kinds::ACCOUNT, Value::Null));
    // a fresh window for the account stage
    let deadline = Instant::now() + hub.auth_timeout();

    loop {
        let event = next_event(conn, deadline).await?;
        if !event.is(kinds::ACCOUNT) {
            debug!(kind = %event.kind(), "Ignoring event during account stage");
            continue;
        }
        match event.payload::<AccountRequest>()? {
            AccountRequest::Login(identity) => {
                let identity = identity.unwrap_or_default();
                let alias = identity.alias.clone().ok_or(GatewayError::NoLogin)?;
                if alias != auth.login {
                    return Err(GatewayError::LoginMismatch {
                        authenticated: auth.login.clone(),
                        requested: alias,
                    });
                }
                match hub.store().get_account_by_login(&alias).await? {
                    Some(record) => {
                        let profile = login_profile(hub, record, identity, auth.is_admin).await;
                        info!(account_id = %profile.account_id, login = %profile.login, "Account login");
                        return Ok(Stage::Account(profile, auth.workgroups));
                    }
                    None => {
                        conn.send(account_prompt("create", Value::Null));
                    }
                }
            }
            AccountRequest::Create(request) => {
                let created = create_account(hub, request.unwrap_or_default()).await?;
                conn.send(account_prompt(created.0, created.1));
            }
        }
    }
}

/// `account` reply of the given sub-type.
fn account_prompt(kind: &str, data: Value) -> Event {
    Event::new(kinds::ACCOUNT, json!({ "type": kind, "data": data }))
}

/// Returns the prompt to send: `login` when the account already exists,
/// `create` with the new record otherwise.
async fn create_account(
    hub: &Arc<Hub>,
    request: CreateAccount,
) -> Result<(&'static str, Value), GatewayError> {
    let login = request.login.filter(|l| !l.is_empty());
    let name = request.name.filter(|n| !n.is_empty());
    let (Some(login), Some(name)) = (login, name) else {
        return Err(GatewayError::CreateMissing);
    };

    if hub.store().get_account_by_login(&login).await?.is_some() {
        debug!(login = %login, "Account exists, prompting login");
        return Ok(("login", Value::Null));
    }
    let record = hub
        .store()
        .create_account(&login, request.pass.as_deref(), &name)
        .await
        .map_err(GatewayError::CreateFailed)?;
    info!(account_id = %record.client_id, login = %login, "Account created");
    Ok(("create", json!(record)))
}

async fn login_profile(
    hub: &Arc<Hub>,
    record: AccountRecord,
    identity: LoginIdentity,
    admin: bool,
) -> AccountProfile {
    let name = identity
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| record.name.clone());
    let avatar = match identity.avatar.or(record.avatar) {
        Some(avatar) => Some(avatar),
        None => hub
            .identities()
            .get(&record.client_id)
            .await
            .and_then(|i| i.avatar),
    };
    if name != record.name {
        if let Err(e) = hub
            .store()
            .update_account_name(&record.client_id, &name)
            .await
        {
            warn!(account_id = %record.client_id, error = %e, "Failed to store account name");
        }
        hub.identities().update_name(&record.client_id, &name);
    }
    AccountProfile {
        account_id: record.client_id,
        login: record.login,
        name,
        avatar,
        admin,
        guest: false,
        guest_room: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(GatewayError::Timeout.error_code(), ErrorCode::AuthTimeout);
        assert_eq!(
            GatewayError::Identity(IdentityError::InvalidLogin).error_code(),
            ErrorCode::InvalidLogin
        );
        assert_eq!(
            GatewayError::Invite(RoomError::InviteInvalid).error_code(),
            ErrorCode::InviteInvalid
        );
        assert_eq!(GatewayError::CreateMissing.error_code(), ErrorCode::AccountCreateMissing);
    }

    #[test]
    fn session_miss_answers_false() {
        let events = GatewayError::NoSession("session-x".into()).to_events();
        assert_eq!(events, vec![Event::new(kinds::SESSION, Value::Bool(false))]);
    }

    #[test]
    fn rejected_credentials_answer_authenticate_false() {
        let events = GatewayError::Identity(IdentityError::InvalidAuthId).to_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Event::new(kinds::AUTHENTICATE, Value::Bool(false)));
        assert_eq!(events[1].data["error"], ErrorCode::InvalidAuthId.as_str());
    }
}
