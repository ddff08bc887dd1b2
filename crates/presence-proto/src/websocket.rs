//! WebSocket upgrade policy.
//!
//! Browser clients always send an `Origin` header; non-browser clients
//! usually do not. The policy below is consulted during the HTTP upgrade.

/// Origin allow-list applied during the WebSocket handshake.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    /// Build a policy from configured origins. An empty list allows everything.
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    /// Check an optional `Origin` header value.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        match origin {
            Some(origin) => self.allowed.iter().any(|a| a == "*" || a == origin),
            None => false,
        }
    }
}
