//! Participants currently in the room's live (audio/video) session.

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LivePeers {
    peers: Vec<String>,
}

impl LivePeers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the peer was not already live.
    pub fn add(&mut self, account_id: &str) -> bool {
        if self.contains(account_id) {
            return false;
        }
        self.peers.push(account_id.to_string());
        true
    }

    /// Returns `true` if the peer was live.
    pub fn remove(&mut self, account_id: &str) -> bool {
        let before = self.peers.len();
        self.peers.retain(|id| id != account_id);
        self.peers.len() != before
    }

    pub fn contains(&self, account_id: &str) -> bool {
        self.peers.iter().any(|id| id == account_id)
    }

    pub fn ids(&self) -> &[String] {
        &self.peers
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_report_changes() {
        let mut live = LivePeers::new();
        assert!(live.add("acc-1"));
        assert!(!live.add("acc-1"));
        assert!(live.add("acc-2"));
        assert_eq!(live.ids(), ["acc-1", "acc-2"]);
        assert!(live.remove("acc-1"));
        assert!(!live.remove("acc-1"));
        assert_eq!(live.ids(), ["acc-2"]);
    }
}
