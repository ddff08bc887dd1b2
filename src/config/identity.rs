//! Identity oracle configuration.
//!
//! With `url` set, credential bundles are validated by POSTing the auth id to
//! the remote directory. Without it, only the statically configured users can
//! authenticate, which is what development setups and the test-suite use.

use super::defaults::default_identity_timeout;
use presence_proto::WorkgroupSnapshot;
use serde::Deserialize;

/// Identity oracle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Remote directory endpoint.
    pub url: Option<String>,
    /// Request timeout in seconds for the remote directory.
    #[serde(default = "default_identity_timeout")]
    pub timeout_secs: u64,
    /// Statically known users, keyed by auth id.
    #[serde(default, rename = "user")]
    pub users: Vec<StaticUser>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_identity_timeout(),
            users: Vec::new(),
        }
    }
}

/// A user the static oracle accepts.
#[derive(Debug, Clone, Deserialize)]
pub struct StaticUser {
    pub auth_id: String,
    pub login: String,
    pub name: String,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub workgroups: WorkgroupSnapshot,
}
