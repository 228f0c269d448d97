use std::collections::HashMap;

use crate::store_key;

/// Avatar URLs per JID, kept for the life of the process.
///
/// An empty answer is remembered too, so a JID is only ever looked up once.
#[derive(Debug, Default)]
pub struct ProfilePictureCache {
    entries: HashMap<String, Option<String>>,
}

impl ProfilePictureCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when never looked up, `Some(None)` when known to have no avatar.
    pub fn cached(&self, jid: &str) -> Option<Option<&str>> {
        self.entries.get(&store_key(jid)).map(Option::as_deref)
    }

    /// Store a lookup answer. The first answer for a JID wins.
    pub fn remember(&mut self, jid: &str, url: Option<String>) -> Option<&str> {
        self.entries
            .entry(store_key(jid))
            .or_insert(url)
            .as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
