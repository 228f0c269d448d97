use std::collections::HashMap;

use zap_core::ChatData;

use crate::messages::MessageStore;
use crate::models::{Chat, LastMessage, Message};
use crate::store_key;

/// Maximum number of chats in a list projection.
pub const CHAT_LIST_LIMIT: usize = 50;

/// Per-chat metadata for one account.
#[derive(Debug, Default)]
pub struct ChatStore {
    chats: HashMap<String, Chat>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, jid: &str) -> Option<&Chat> {
        self.chats.get(&store_key(jid))
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }

    pub fn clear(&mut self) {
        self.chats.clear();
    }

    /// Insert or replace whole chat records.
    pub fn upsert_batch(&mut self, chats: &[ChatData]) {
        for data in chats {
            let key = store_key(&data.jid);
            if key.is_empty() {
                continue;
            }
            let chat = Chat::from_data(key.clone(), data);
            self.chats.insert(key, chat);
        }
    }

    /// Insert unknown chats and shallow-merge known ones.
    pub fn merge_batch(&mut self, chats: &[ChatData]) {
        for data in chats {
            let key = store_key(&data.jid);
            if key.is_empty() {
                continue;
            }
            self.chats
                .entry(key.clone())
                .and_modify(|chat| chat.apply(data))
                .or_insert_with(|| Chat::from_data(key, data));
        }
    }

    /// Shallow-merge partial updates. Unknown chats are ignored; returns how
    /// many updates were applied.
    pub fn apply_update(&mut self, updates: &[ChatData]) -> usize {
        let mut applied = 0;
        for update in updates {
            if let Some(chat) = self.chats.get_mut(&store_key(&update.jid)) {
                chat.apply(update);
                applied += 1;
            }
        }
        applied
    }

    /// Make `message` the chat's latest activity. Only inbound messages
    /// count as unread.
    pub fn record_activity(&mut self, message: &Message) {
        let key = store_key(&message.chat_jid);
        if key.is_empty() {
            return;
        }
        let chat = self
            .chats
            .entry(key.clone())
            .or_insert_with(|| Chat::new(key));
        chat.last_message = Some(LastMessage::from(message));
        chat.timestamp = Some(message.timestamp);
        if message.is_inbound() {
            chat.unread_count = chat.unread_count.saturating_add(1);
        }
    }

    /// Returns `false` when the chat is unknown.
    pub fn mark_read(&mut self, jid: &str) -> bool {
        match self.chats.get_mut(&store_key(jid)) {
            Some(chat) => {
                chat.unread_count = 0;
                true
            }
            None => false,
        }
    }

    /// Register a conversation without activity, e.g. a freshly started chat.
    pub fn ensure(&mut self, jid: &str) {
        let key = store_key(jid);
        if !key.is_empty() {
            self.chats
                .entry(key.clone())
                .or_insert_with(|| Chat::new(key));
        }
    }

    /// Chats with activity, newest first, capped at [`CHAT_LIST_LIMIT`].
    pub fn list_projection(&self, messages: &MessageStore) -> Vec<Chat> {
        let mut active: Vec<&Chat> = self
            .chats
            .values()
            .filter(|chat| chat.timestamp.is_some() || messages.count(&chat.jid) > 0)
            .collect();

        active.sort_by(|a, b| {
            b.timestamp
                .unwrap_or(0)
                .cmp(&a.timestamp.unwrap_or(0))
                .then_with(|| a.jid.cmp(&b.jid))
        });

        active
            .into_iter()
            .take(CHAT_LIST_LIMIT)
            .cloned()
            .collect()
    }
}
