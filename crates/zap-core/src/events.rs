use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum IpcCommand {
    StartSession { account_id: String, auth_dir: String },
    StopSession { account_id: String },
    Logout { account_id: String },
    GroupMetadata { account_id: String, group_id: String },
    ProfilePicture { account_id: String, jid: String },
    CheckNumber { account_id: String, phone: String },
    SendMessage { account_id: String, to: String, message: OutboundMessage },
    DownloadMedia { account_id: String, chat_id: String, message_id: String },
    Shutdown,
}

impl IpcCommand {
    pub fn name(&self) -> &'static str {
        match self {
            IpcCommand::StartSession { .. } => "StartSession",
            IpcCommand::StopSession { .. } => "StopSession",
            IpcCommand::Logout { .. } => "Logout",
            IpcCommand::GroupMetadata { .. } => "GroupMetadata",
            IpcCommand::ProfilePicture { .. } => "ProfilePicture",
            IpcCommand::CheckNumber { .. } => "CheckNumber",
            IpcCommand::SendMessage { .. } => "SendMessage",
            IpcCommand::DownloadMedia { .. } => "DownloadMedia",
            IpcCommand::Shutdown => "Shutdown",
        }
    }

    pub fn account_id(&self) -> Option<&str> {
        match self {
            IpcCommand::StartSession { account_id, .. }
            | IpcCommand::StopSession { account_id }
            | IpcCommand::Logout { account_id }
            | IpcCommand::GroupMetadata { account_id, .. }
            | IpcCommand::ProfilePicture { account_id, .. }
            | IpcCommand::CheckNumber { account_id, .. }
            | IpcCommand::SendMessage { account_id, .. }
            | IpcCommand::DownloadMedia { account_id, .. } => Some(account_id),
            IpcCommand::Shutdown => None,
        }
    }
}

/// Media travels base64-encoded inside the JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundMessage {
    Text {
        text: String,
    },
    Image {
        data: String,
        mimetype: String,
        caption: Option<String>,
    },
    Audio {
        data: String,
        mimetype: String,
        ptt: bool,
    },
    Document {
        data: String,
        mimetype: String,
        filename: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum IpcEvent {
    /// The gateway process finished booting.
    Ready,
    Account { account_id: String, event: AccountEvent },
    Error { account_id: Option<String>, error: String },
    CommandResult {
        command_id: String,
        success: bool,
        data: Option<serde_json::Value>,
        error: Option<String>,
    },
}

/// Everything the gateway reports about a single account session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum AccountEvent {
    Connection(ConnectionUpdate),
    ContactsUpsert(Vec<ContactData>),
    ContactsUpdate(Vec<ContactData>),
    MessagesUpsert {
        messages: Vec<MessageData>,
        delivery: Delivery,
    },
    ChatsUpsert(Vec<ChatData>),
    ChatsUpdate(Vec<ChatData>),
    HistorySync(HistoryBatch),
}

impl AccountEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AccountEvent::Connection(_) => "Connection",
            AccountEvent::ContactsUpsert(_) => "ContactsUpsert",
            AccountEvent::ContactsUpdate(_) => "ContactsUpdate",
            AccountEvent::MessagesUpsert { .. } => "MessagesUpsert",
            AccountEvent::ChatsUpsert(_) => "ChatsUpsert",
            AccountEvent::ChatsUpdate(_) => "ChatsUpdate",
            AccountEvent::HistorySync(_) => "HistorySync",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Open,
    Close,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionUpdate {
    pub status: Option<ConnectionStatus>,
    /// Pairing payload to render as a QR code.
    pub qr: Option<String>,
    pub reason_code: Option<u16>,
    /// Our own JID once the session is open.
    pub me: Option<String>,
}

/// Whether a message batch arrived live or is a replay of stored history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    Notify,
    Append,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactData {
    pub jid: String,
    pub lid: Option<String>,
    pub phone_number: Option<String>,
    pub name: Option<String>,
    pub notify: Option<String>,
    pub verified_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatData {
    pub jid: String,
    pub name: Option<String>,
    pub conversation_timestamp: Option<i64>,
    pub unread_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageData {
    pub message_id: String,
    pub chat_jid: String,
    pub sender_jid: Option<String>,
    pub push_name: Option<String>,
    pub timestamp: i64,
    pub is_from_me: bool,
    pub body: MessageBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Text {
        text: String,
    },
    Image {
        caption: Option<String>,
        mimetype: Option<String>,
    },
    Video {
        caption: Option<String>,
        mimetype: Option<String>,
    },
    Audio {
        mimetype: Option<String>,
        #[serde(default)]
        ptt: bool,
    },
    Document {
        filename: Option<String>,
        caption: Option<String>,
        mimetype: Option<String>,
    },
    Sticker {
        mimetype: Option<String>,
    },
    Unsupported {
        message_type: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryBatch {
    #[serde(default)]
    pub chats: Vec<ChatData>,
    #[serde(default)]
    pub contacts: Vec<ContactData>,
    #[serde(default)]
    pub messages: Vec<MessageData>,
}

/// Decoded `data` of a successful `CheckNumber` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumberCheck {
    pub exists: bool,
    pub jid: Option<String>,
}

/// Decoded `data` of a successful `SendMessage` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentReceipt {
    pub message_id: String,
    pub timestamp: i64,
}

/// Decoded `data` of a successful `DownloadMedia` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaData {
    pub data: String,
    pub mimetype: String,
}
