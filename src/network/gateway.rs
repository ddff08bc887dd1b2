//! Gateway - WebSocket listener that accepts incoming clients.
//!
//! Each accepted socket is upgraded (subject to the origin allow-list),
//! wrapped in a [`Connection`] and run through the authentication
//! handshake. From then on the hub owns it.

use crate::config::ListenConfig;
use crate::network::{Connection, handshake, websocket};
use crate::state::Hub;
use crate::state::uid::{self, new_id};
use crate::telemetry;
use presence_proto::websocket::OriginPolicy;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{Instrument, debug, error, info, instrument, warn};

/// The Gateway accepts WebSocket clients and hands them to the hub.
pub struct Gateway {
    listener: TcpListener,
    origins: OriginPolicy,
    hub: Arc<Hub>,
}

impl Gateway {
    /// Bind the gateway to the configured address.
    pub async fn bind(config: &ListenConfig, hub: Arc<Hub>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.address).await?;
        info!(address = %listener.local_addr()?, "WebSocket listener bound");
        Ok(Self {
            listener,
            origins: OriginPolicy::new(config.allow_origins.clone()),
            hub,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the gateway, accepting connections forever.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(%addr, "WebSocket connection attempt");
                    let hub = Arc::clone(&self.hub);
                    let origins = self.origins.clone();
                    tokio::spawn(serve(stream, addr, origins, hub));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept WebSocket connection");
                }
            }
        }
    }
}

async fn serve(stream: TcpStream, addr: SocketAddr, origins: OriginPolicy, hub: Arc<Hub>) {
    let check_origin = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let origin = req
            .headers()
            .get("Origin")
            .and_then(|o| o.to_str().ok());
        if origins.allows(origin) {
            return Ok(response);
        }
        warn!(%addr, origin = ?origin, "WebSocket origin rejected");
        let mut rejection = ErrorResponse::new(Some("Origin not allowed".to_string()));
        *rejection.status_mut() = StatusCode::FORBIDDEN;
        Err(rejection)
    };

    let ws_stream = match accept_hdr_async(stream, check_origin).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            warn!(%addr, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    let conn_id = new_id(uid::CONNECTION);
    let span = telemetry::connection_span(&conn_id, &addr.to_string());
    let (conn, end) = Connection::channel(conn_id);
    tokio::spawn(websocket::pump(ws_stream, end).instrument(span.clone()));

    async move {
        info!("WebSocket connection accepted");
        match handshake::admit(&hub, conn).await {
            Ok(admitted) => debug!(?admitted, "Handshake complete"),
            Err(e) => info!(error = %e, code = e.error_code().as_str(), "Handshake rejected"),
        }
    }
    .instrument(span)
    .await;
}
