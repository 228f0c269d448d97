mod avatars;
mod chats;
mod contacts;
mod error;
mod lookup;
mod messages;
mod models;
mod records;

pub use avatars::ProfilePictureCache;
pub use chats::{CHAT_LIST_LIMIT, ChatStore};
pub use contacts::{ContactDirectory, ContactRecord, fallback_label, identity_keys};
pub use error::StoreError;
pub use lookup::DirectoryLookup;
pub use messages::{MessageStore, MessageWindow};
pub use models::*;
pub use records::{RecordFile, default_data_dir};

/// Stores key chats by canonical JID so device-suffixed ids land together.
pub(crate) fn store_key(jid: &str) -> String {
    let canonical = zap_core::jid::normalize(jid);
    if canonical.is_empty() {
        jid.trim().to_string()
    } else {
        canonical
    }
}
