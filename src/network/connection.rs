//! Transport-independent connection.
//!
//! A [`Connection`] is the server's half of a pair of bounded channels; the
//! transport adapter (or a test) holds the other half, the [`ClientEnd`]. The
//! adapter turns frames into inbound [`Event`]s and writes outbound ones back,
//! so the gateway and sessions never see a socket.
//!
//! ```text
//!   socket ──► ClientEnd.tx ──► Connection.inbound ──► gateway / session
//!   socket ◄── ClientEnd.rx ◄── Connection.outbound ◄── gateway / session
//! ```

use crate::state::uid::ConnId;
use presence_proto::Event;
use tokio::sync::mpsc;

const CHANNEL_CAPACITY: usize = 256;

/// What the server asks the transport to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Event(Event),
    /// Flush and close the transport.
    Close,
}

/// Cloneable handle used to write to one connection.
#[derive(Debug, Clone)]
pub struct ConnectionSender {
    id: ConnId,
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionSender {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Queue an event without waiting. Returns `false` when the transport is
    /// gone or saturated.
    pub fn send(&self, event: Event) -> bool {
        self.tx.try_send(Outbound::Event(event)).is_ok()
    }

    /// Ask the transport to close.
    pub fn close(&self) {
        let _ = self.tx.try_send(Outbound::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Server side of a client connection.
#[derive(Debug)]
pub struct Connection {
    sender: ConnectionSender,
    inbound: mpsc::Receiver<Event>,
}

impl Connection {
    /// Create a connected pair.
    pub fn channel(id: ConnId) -> (Connection, ClientEnd) {
        let (in_tx, in_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (out_tx, out_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let conn = Connection {
            sender: ConnectionSender {
                id: id.clone(),
                tx: out_tx,
            },
            inbound: in_rx,
        };
        let end = ClientEnd {
            id,
            tx: in_tx,
            rx: out_rx,
        };
        (conn, end)
    }

    pub fn id(&self) -> &str {
        self.sender.id()
    }

    /// Queue an outbound event. See [`ConnectionSender::send`].
    pub fn send(&self, event: Event) -> bool {
        self.sender.send(event)
    }

    /// Next inbound event, `None` once the client side is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        self.inbound.recv().await
    }

    /// Close the transport and drop every handler; later inbound events are
    /// never read.
    pub fn close(self) {
        self.sender.close();
    }

    /// Split into the write handle and the inbound stream.
    pub fn into_parts(self) -> (ConnectionSender, mpsc::Receiver<Event>) {
        (self.sender, self.inbound)
    }
}

/// Client side of a [`Connection`], driven by a transport adapter or a test.
#[derive(Debug)]
pub struct ClientEnd {
    pub id: ConnId,
    pub tx: mpsc::Sender<Event>,
    pub rx: mpsc::Receiver<Outbound>,
}

impl ClientEnd {
    /// Deliver an inbound event. Returns `false` once the server side stopped
    /// listening.
    pub async fn send(&self, event: Event) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// Next outbound instruction.
    pub async fn next(&mut self) -> Option<Outbound> {
        self.rx.recv().await
    }

    /// Next outbound event; `None` on close or when the server dropped the
    /// connection.
    pub async fn recv(&mut self) -> Option<Event> {
        match self.rx.recv().await {
            Some(Outbound::Event(event)) => Some(event),
            Some(Outbound::Close) | None => None,
        }
    }
}
