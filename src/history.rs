//! Per-room message history
//!
//! Owned by the room actor; read on join, appended on broadcast.

use std::collections::VecDeque;

use crate::message::ChatMessage;

/// Bounded, append-only message history
///
/// Keeps at most `limit` messages, dropping the oldest first.
#[derive(Debug)]
pub struct History {
    entries: VecDeque<ChatMessage>,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit.min(1024)),
            limit,
        }
    }

    /// Append a message, evicting the oldest entries beyond the limit
    pub fn push(&mut self, message: ChatMessage) {
        if self.limit == 0 {
            return;
        }
        while self.entries.len() >= self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
    }

    /// Copy of the history, oldest first
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
