//! Integration test common infrastructure.
//!
//! Provides an in-process hub over the memory store, clients driving the
//! handshake through channel connections, and assertions on event flows.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;
