use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::Message;
use crate::store_key;

#[derive(Debug, Default)]
struct ChatLog {
    entries: Vec<Message>,
    ids: HashSet<String>,
}

/// Result of a time-windowed read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageWindow {
    /// Oldest first.
    pub messages: Vec<Message>,
    /// How many messages fell inside the window before the count limit.
    pub total: usize,
}

/// Append-only message log per chat, deduplicated by message id.
#[derive(Debug, Default)]
pub struct MessageStore {
    logs: HashMap<String, ChatLog>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the chat already holds a message with this id.
    pub fn append(&mut self, message: Message) -> bool {
        let log = self.logs.entry(store_key(&message.chat_jid)).or_default();
        if !log.ids.insert(message.id.clone()) {
            return false;
        }
        log.entries.push(message);
        true
    }

    /// Full log for a chat, ascending by timestamp. Ties keep arrival order.
    pub fn all(&self, chat_jid: &str) -> Vec<Message> {
        let mut messages = self
            .logs
            .get(&store_key(chat_jid))
            .map(|log| log.entries.clone())
            .unwrap_or_default();
        messages.sort_by_key(|m| m.timestamp);
        messages
    }

    /// Messages at or after `since`, keeping only the newest `max_count`.
    pub fn window(&self, chat_jid: &str, since: i64, max_count: usize) -> MessageWindow {
        let mut matched: Vec<Message> = self
            .all(chat_jid)
            .into_iter()
            .filter(|m| m.timestamp >= since)
            .collect();
        let total = matched.len();
        let skip = total.saturating_sub(max_count);
        matched.drain(..skip);

        MessageWindow {
            messages: matched,
            total,
        }
    }

    pub fn get(&self, chat_jid: &str, message_id: &str) -> Option<&Message> {
        self.logs
            .get(&store_key(chat_jid))?
            .entries
            .iter()
            .find(|m| m.id == message_id)
    }

    pub fn contains(&self, chat_jid: &str, message_id: &str) -> bool {
        self.logs
            .get(&store_key(chat_jid))
            .is_some_and(|log| log.ids.contains(message_id))
    }

    pub fn count(&self, chat_jid: &str) -> usize {
        self.logs
            .get(&store_key(chat_jid))
            .map_or(0, |log| log.entries.len())
    }

    pub fn total(&self) -> usize {
        self.logs.values().map(|log| log.entries.len()).sum()
    }

    pub fn clear(&mut self) {
        self.logs.clear();
    }
}
