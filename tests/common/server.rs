//! Test server.
//!
//! Runs a [`Hub`] over a [`MemoryStore`] with a static identity oracle. Clients
//! connect through in-memory channels, or through a real gateway bound to an
//! ephemeral port.

use super::client::TestClient;
use presence_proto::{WorkgroupRef, WorkgroupSnapshot};
use presenced::config::{Config, StaticUser};
use presenced::identity::StaticAuthOracle;
use presenced::network::{Connection, Gateway, handshake};
use presenced::state::Hub;
use presenced::state::uid::{self, new_id};
use presenced::store::MemoryStore;
use std::net::SocketAddr;
use std::sync::Arc;

/// A user the oracle accepts; the auth id is `auth-<login>`.
pub fn user(login: &str, name: &str) -> StaticUser {
    StaticUser {
        auth_id: format!("auth-{login}"),
        login: login.to_string(),
        name: name.to_string(),
        admin: false,
        workgroups: WorkgroupSnapshot::default(),
    }
}

/// Same as [`user`], member of the given workgroup.
pub fn worker(login: &str, name: &str, f_id: &str, worg: &str) -> StaticUser {
    let worg = WorkgroupRef {
        f_id: f_id.to_string(),
        client_id: format!("friend_wg_{f_id}"),
        name: worg.to_string(),
    };
    StaticUser {
        workgroups: WorkgroupSnapshot {
            available: vec![worg.clone()],
            member: vec![worg],
            stream: Vec::new(),
        },
        ..user(login, name)
    }
}

pub struct TestServer {
    pub hub: Arc<Hub>,
    pub store: Arc<MemoryStore>,
}

impl TestServer {
    pub fn start(users: Vec<StaticUser>) -> Self {
        Self::with_config(users, Config::default())
    }

    pub fn with_config(users: Vec<StaticUser>, config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let hub = Hub::new(
            store.clone(),
            Box::new(StaticAuthOracle::new(users)),
            &config,
        );
        Self { hub, store }
    }

    /// Open a channel connection and run it through the handshake.
    pub fn connect(&self) -> TestClient {
        let (conn, end) = Connection::channel(new_id(uid::CONNECTION));
        let hub = Arc::clone(&self.hub);
        tokio::spawn(async move {
            let _ = handshake::admit(&hub, conn).await;
        });
        TestClient::new(end)
    }

    /// Bind a real gateway on an ephemeral port and run it.
    pub async fn spawn_gateway(&self) -> anyhow::Result<SocketAddr> {
        let mut config = Config::default().listen;
        config.address = "127.0.0.1:0".parse()?;
        let gateway = Gateway::bind(&config, Arc::clone(&self.hub)).await?;
        let addr = gateway.local_addr()?;
        tokio::spawn(gateway.run());
        Ok(addr)
    }
}
