//! Test client.
//!
//! Wraps the client side of a channel connection and asserts on the events
//! the server sends.

use presence_proto::{Event, kinds};
use presenced::network::{ClientEnd, Outbound};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::timeout;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestClient {
    end: ClientEnd,
}

impl TestClient {
    pub fn new(end: ClientEnd) -> Self {
        Self { end }
    }

    pub async fn send(&self, kind: &str, data: Value) {
        assert!(
            self.end.send(Event::new(kind, data)).await,
            "server stopped listening"
        );
    }

    /// Send without asserting; `false` once the server has let go.
    pub async fn try_send(&self, kind: &str, data: Value) -> bool {
        self.end.send(Event::new(kind, data)).await
    }

    /// Receive a single event. Errors on close or timeout.
    pub async fn recv(&mut self) -> anyhow::Result<Event> {
        self.recv_timeout(RECV_TIMEOUT).await
    }

    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<Event> {
        match timeout(dur, self.end.next()).await? {
            Some(Outbound::Event(event)) => Ok(event),
            Some(Outbound::Close) | None => anyhow::bail!("connection closed"),
        }
    }

    /// Skip events until one of `kind` arrives.
    pub async fn expect(&mut self, kind: &str) -> anyhow::Result<Event> {
        loop {
            let event = self.recv().await?;
            if event.is(kind) {
                return Ok(event);
            }
        }
    }

    /// Skip `room` envelopes until one carries an inner event of `kind`.
    pub async fn expect_room_event(&mut self, kind: &str) -> anyhow::Result<Event> {
        loop {
            let event = self.expect(kinds::ROOM).await?;
            if event.data["event"]["type"] == kind {
                return Ok(event);
            }
        }
    }

    /// Wait for the server to close the connection, ignoring pending events.
    pub async fn expect_closed(&mut self) -> anyhow::Result<()> {
        loop {
            match timeout(RECV_TIMEOUT, self.end.next()).await? {
                Some(Outbound::Event(_)) => continue,
                Some(Outbound::Close) | None => return Ok(()),
            }
        }
    }

    /// Answer the challenge with a credential bundle.
    pub async fn authenticate(&mut self, login: &str) -> anyhow::Result<Event> {
        self.expect(kinds::AUTHENTICATE).await?;
        self.send(
            kinds::AUTHENTICATE,
            json!({
                "type": "authid",
                "data": { "tokens": { "authId": format!("auth-{login}") }, "login": login },
            }),
        )
        .await;
        self.recv().await
    }

    /// Full login, creating the account on first use. Returns the session id.
    pub async fn login(&mut self, login: &str, name: &str) -> anyhow::Result<String> {
        let accepted = self.authenticate(login).await?;
        anyhow::ensure!(accepted.data == json!(true), "rejected: {accepted:?}");
        self.expect(kinds::ACCOUNT).await?;

        self.send(kinds::ACCOUNT, json!({ "type": "login", "data": { "alias": login } }))
            .await;
        let reply = self.recv().await?;
        if reply.is(kinds::ACCOUNT) && reply.data["type"] == "create" {
            self.send(
                kinds::ACCOUNT,
                json!({ "type": "create", "data": { "login": login, "name": name } }),
            )
            .await;
            let created = self.expect(kinds::ACCOUNT).await?;
            anyhow::ensure!(created.data["type"] == "create", "not created: {created:?}");
            self.send(kinds::ACCOUNT, json!({ "type": "login", "data": { "alias": login } }))
                .await;
            let session = self.expect(kinds::SESSION).await?;
            self.expect(kinds::READY).await?;
            return session_id(&session);
        }

        anyhow::ensure!(reply.is(kinds::SESSION), "expected session, got {reply:?}");
        self.expect(kinds::READY).await?;
        session_id(&reply)
    }
}

fn session_id(event: &Event) -> anyhow::Result<String> {
    event.data
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("session event without id: {event:?}"))
}
