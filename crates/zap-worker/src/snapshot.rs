//! UI-ready projections of account state.

use serde::{Deserialize, Serialize};

use zap_core::jid;
use zap_store::{Chat, ContentKind, DirectoryLookup, LastMessage, Message, fallback_label};

use crate::registry::{AccountEntry, ConnectionState, SharedSession};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountView {
    pub id: String,
    pub name: String,
    pub phone_number: Option<String>,
    pub state: ConnectionState,
    pub qr: Option<String>,
}

impl From<&AccountEntry> for AccountView {
    fn from(entry: &AccountEntry) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.name.clone(),
            phone_number: entry.phone_number.clone(),
            state: entry.state,
            qr: entry.qr.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatView {
    pub jid: String,
    pub name: String,
    pub avatar: Option<String>,
    pub is_group: bool,
    pub last_message: Option<LastMessage>,
    pub timestamp: Option<i64>,
    pub unread_count: u32,
}

/// Media bytes fetched on demand, base64 encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaPayload {
    pub data: String,
    pub mimetype: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    pub id: String,
    pub chat_jid: String,
    pub from_me: bool,
    pub sender_name: Option<String>,
    pub kind: ContentKind,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub mimetype: Option<String>,
    pub filename: Option<String>,
    pub timestamp: i64,
    pub media: Option<MediaPayload>,
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            chat_jid: message.chat_jid.clone(),
            from_me: !message.is_inbound(),
            sender_name: message.sender_name.clone(),
            kind: message.kind,
            text: message.text.clone(),
            caption: message.caption.clone(),
            mimetype: message.mimetype.clone(),
            filename: message.filename.clone(),
            timestamp: message.timestamp,
            media: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryView {
    pub chat_jid: String,
    pub days: u32,
    /// Messages inside the window before the count limit was applied.
    pub total: usize,
    pub messages: Vec<MessageView>,
}

/// Builds views that need names and avatars, which may require live lookups.
///
/// The session lock is only taken around store reads and writes, never across
/// a gateway round trip, so a slow lookup cannot stall the account's other
/// work.
pub struct SnapshotFormatter<'a> {
    lookup: &'a dyn DirectoryLookup,
}

impl<'a> SnapshotFormatter<'a> {
    pub fn new(lookup: &'a dyn DirectoryLookup) -> Self {
        Self { lookup }
    }

    /// Display name for `id`: the offline chain, then a live group subject
    /// (cached on success), then a synthesized label. Never fails.
    pub async fn resolve_name(&self, session: &SharedSession, id: &str) -> String {
        if let Some(name) = session.lock().await.contacts.lookup(id) {
            return name;
        }

        let canonical = jid::normalize(id);
        if jid::is_group(&canonical) {
            if let Some(subject) = self.lookup.group_subject(&canonical).await {
                let mut session = session.lock().await;
                if let Some(name) = session.contacts.remember_group_subject(id, &subject) {
                    return name;
                }
            }
        }
        fallback_label(id)
    }

    /// Avatar URL for `jid`, looked up at most once per session.
    pub async fn avatar(&self, session: &SharedSession, jid: &str) -> Option<String> {
        if let Some(cached) = session.lock().await.avatars.cached(jid) {
            return cached.map(str::to_string);
        }
        let url = self.lookup.profile_picture_url(jid).await;
        session
            .lock()
            .await
            .avatars
            .remember(jid, url)
            .map(str::to_string)
    }

    pub async fn chat_view(&self, session: &SharedSession, chat: Chat) -> ChatView {
        let name = self.resolve_name(session, &chat.jid).await;
        let avatar = self.avatar(session, &chat.jid).await;
        ChatView {
            is_group: jid::is_group(&chat.jid),
            jid: chat.jid,
            name,
            avatar,
            last_message: chat.last_message,
            timestamp: chat.timestamp,
            unread_count: chat.unread_count,
        }
    }

    /// The chat list projection with names and avatars attached.
    pub async fn chat_list(&self, session: &SharedSession) -> Vec<ChatView> {
        let projection = {
            let session = session.lock().await;
            session.chats.list_projection(&session.messages)
        };
        let mut views = Vec::with_capacity(projection.len());
        for chat in projection {
            views.push(self.chat_view(session, chat).await);
        }
        views
    }

    /// View of one chat by id, whether or not it has activity yet.
    pub async fn chat_by_jid(&self, session: &SharedSession, chat_jid: &str) -> ChatView {
        let chat = session
            .lock()
            .await
            .chats
            .get(chat_jid)
            .cloned()
            .unwrap_or_else(|| Chat::new(jid::normalize(chat_jid)));
        self.chat_view(session, chat).await
    }
}

pub fn message_views(messages: &[Message]) -> Vec<MessageView> {
    messages.iter().map(MessageView::from).collect()
}
