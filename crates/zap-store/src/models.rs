use serde::{Deserialize, Serialize};
use zap_core::{ChatData, MessageBody, MessageData};

/// The durable part of an account, rewritten on every registry change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: String,
    pub name: String,
    pub phone_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Unsupported,
}

impl ContentKind {
    pub fn has_media(self) -> bool {
        !matches!(self, ContentKind::Text | ContentKind::Unsupported)
    }

    fn placeholder(self) -> &'static str {
        match self {
            ContentKind::Text => "",
            ContentKind::Image => "📷 Photo",
            ContentKind::Video => "🎥 Video",
            ContentKind::Audio => "🎤 Audio",
            ContentKind::Document => "📄 Document",
            ContentKind::Sticker => "Sticker",
            ContentKind::Unsupported => "Unsupported message",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_jid: String,
    pub sender_jid: Option<String>,
    /// Sender name as known when the message was received.
    pub sender_name: Option<String>,
    pub direction: Direction,
    pub kind: ContentKind,
    pub text: Option<String>,
    pub caption: Option<String>,
    pub mimetype: Option<String>,
    pub filename: Option<String>,
    pub timestamp: i64,
}

impl Message {
    pub fn from_data(data: &MessageData, sender_name: Option<String>) -> Self {
        let direction = if data.is_from_me {
            Direction::Outbound
        } else {
            Direction::Inbound
        };

        let mut message = Self {
            id: data.message_id.clone(),
            chat_jid: data.chat_jid.clone(),
            sender_jid: data.sender_jid.clone(),
            sender_name,
            direction,
            kind: ContentKind::Unsupported,
            text: None,
            caption: None,
            mimetype: None,
            filename: None,
            timestamp: data.timestamp,
        };

        match &data.body {
            MessageBody::Text { text } => {
                message.kind = ContentKind::Text;
                message.text = Some(text.clone());
            }
            MessageBody::Image { caption, mimetype } => {
                message.kind = ContentKind::Image;
                message.caption = caption.clone();
                message.mimetype = mimetype.clone();
            }
            MessageBody::Video { caption, mimetype } => {
                message.kind = ContentKind::Video;
                message.caption = caption.clone();
                message.mimetype = mimetype.clone();
            }
            MessageBody::Audio { mimetype, .. } => {
                message.kind = ContentKind::Audio;
                message.mimetype = mimetype.clone();
            }
            MessageBody::Document {
                filename,
                caption,
                mimetype,
            } => {
                message.kind = ContentKind::Document;
                message.filename = filename.clone();
                message.caption = caption.clone();
                message.mimetype = mimetype.clone();
            }
            MessageBody::Sticker { mimetype } => {
                message.kind = ContentKind::Sticker;
                message.mimetype = mimetype.clone();
            }
            MessageBody::Unsupported { .. } => {}
        }

        message
    }

    pub fn is_inbound(&self) -> bool {
        self.direction == Direction::Inbound
    }

    /// One-line summary used for chat list previews.
    pub fn preview(&self) -> String {
        [&self.text, &self.caption, &self.filename]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .find(|s| !s.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.kind.placeholder().to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub id: String,
    pub preview: String,
    pub from_me: bool,
    pub timestamp: i64,
}

impl From<&Message> for LastMessage {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            preview: message.preview(),
            from_me: !message.is_inbound(),
            timestamp: message.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub jid: String,
    pub last_message: Option<LastMessage>,
    /// Epoch seconds of the latest recorded activity.
    pub timestamp: Option<i64>,
    pub unread_count: u32,
}

impl Chat {
    pub fn new(jid: impl Into<String>) -> Self {
        Self {
            jid: jid.into(),
            last_message: None,
            timestamp: None,
            unread_count: 0,
        }
    }

    pub fn from_data(jid: impl Into<String>, data: &ChatData) -> Self {
        Self {
            jid: jid.into(),
            last_message: None,
            timestamp: data.conversation_timestamp,
            unread_count: data.unread_count.unwrap_or(0),
        }
    }

    /// Shallow merge: only fields present in the update overwrite.
    pub fn apply(&mut self, update: &ChatData) {
        if let Some(timestamp) = update.conversation_timestamp {
            self.timestamp = Some(timestamp);
        }
        if let Some(unread) = update.unread_count {
            self.unread_count = unread;
        }
    }
}
