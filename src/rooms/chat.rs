//! In-memory chat tail.
//!
//! Every room keeps its most recent messages for snapshots and log requests.
//! Persistent rooms also append each message to the message store; that write
//! is done by the actor, this type only holds the tail.

use crate::state::uid::{self, new_id};
use crate::store::MessageRecord;
use chrono::Utc;
use std::collections::VecDeque;

/// Bounded message tail keyed by the room's log key.
#[derive(Debug)]
pub struct ChatLog {
    key: String,
    cap: usize,
    tail: VecDeque<MessageRecord>,
}

impl ChatLog {
    pub fn new(key: impl Into<String>, cap: usize) -> Self {
        Self {
            key: key.into(),
            cap: cap.max(1),
            tail: VecDeque::new(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Seed from stored history, oldest first.
    pub fn load(&mut self, messages: Vec<MessageRecord>) {
        for message in messages {
            self.push(message);
        }
    }

    pub fn push(&mut self, message: MessageRecord) {
        if self.tail.len() == self.cap {
            self.tail.pop_front();
        }
        self.tail.push_back(message);
    }

    pub fn last(&self) -> Option<&MessageRecord> {
        self.tail.back()
    }

    pub fn contains(&self, msg_id: &str) -> bool {
        self.tail.iter().any(|m| m.msg_id == msg_id)
    }

    /// Oldest first.
    pub fn tail(&self) -> Vec<MessageRecord> {
        self.tail.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tail.is_empty()
    }
}

/// Stamp a new message.
pub fn compose(from_id: &str, name: &str, message: &str) -> MessageRecord {
    MessageRecord {
        msg_id: new_id(uid::MESSAGE),
        from_id: from_id.to_string(),
        name: name.to_string(),
        message: message.to_string(),
        time: Utc::now().timestamp_millis(),
    }
}
