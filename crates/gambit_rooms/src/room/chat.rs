//! Bounded per-room chat log.

use std::collections::VecDeque;

use crate::events::{ChatEntry, ChatRole};
use crate::identity::{RoomId, WalletAddress};

pub const MAX_MESSAGE_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct ChatLog {
    entries: VecDeque<ChatEntry>,
    capacity: usize,
}

impl ChatLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Appends an entry, dropping the oldest once the log is full.
    pub fn push(
        &mut self,
        room_id: &RoomId,
        sender: Option<WalletAddress>,
        role: ChatRole,
        message: String,
        timestamp: u64,
    ) -> ChatEntry {
        let entry = ChatEntry {
            id: uuid::Uuid::new_v4().to_string(),
            room_id: room_id.clone(),
            sender,
            role,
            message,
            timestamp,
        };
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());
        entry
    }

    pub fn system(&mut self, room_id: &RoomId, message: impl Into<String>, timestamp: u64) {
        self.push(room_id, None, ChatRole::System, message.into(), timestamp);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> Vec<ChatEntry> {
        self.entries.iter().cloned().collect()
    }
}
