use tokio::sync::mpsc;

/// Requests accepted from observers.
#[derive(Debug, Clone)]
pub enum Command {
    ListAccounts,
    CreateAccount {
        name: String,
    },
    ConnectAccount {
        account_id: String,
    },
    GetAccountState {
        account_id: String,
    },
    RenameAccount {
        account_id: String,
        name: String,
    },
    DeleteAccount {
        account_id: String,
    },
    /// Ends the session and wipes its data but keeps the account.
    LogoutAccount {
        account_id: String,
    },
    StartChat {
        account_id: String,
        phone: String,
    },
    SendMessage {
        account_id: String,
        chat_jid: String,
        content: OutgoingContent,
    },
    GetMessages {
        account_id: String,
        chat_jid: String,
        include_media: bool,
    },
    GetHistory {
        account_id: String,
        chat_jid: String,
        days: u32,
        max_count: usize,
    },
    MarkRead {
        account_id: String,
        chat_jid: String,
    },
    Shutdown,
}

impl Command {
    pub fn account_id(&self) -> Option<&str> {
        match self {
            Command::ListAccounts | Command::CreateAccount { .. } | Command::Shutdown => None,
            Command::ConnectAccount { account_id }
            | Command::GetAccountState { account_id }
            | Command::RenameAccount { account_id, .. }
            | Command::DeleteAccount { account_id }
            | Command::LogoutAccount { account_id }
            | Command::StartChat { account_id, .. }
            | Command::SendMessage { account_id, .. }
            | Command::GetMessages { account_id, .. }
            | Command::GetHistory { account_id, .. }
            | Command::MarkRead { account_id, .. } => Some(account_id),
        }
    }
}

/// Message content as supplied by an observer, raw bytes for media.
#[derive(Debug, Clone)]
pub enum OutgoingContent {
    Text {
        text: String,
    },
    Image {
        data: Vec<u8>,
        mimetype: String,
        caption: Option<String>,
    },
    /// Re-encoded as a voice note before sending.
    Audio {
        data: Vec<u8>,
        mimetype: String,
    },
    Document {
        data: Vec<u8>,
        mimetype: String,
        filename: String,
    },
}

impl OutgoingContent {
    pub fn kind(&self) -> &'static str {
        match self {
            OutgoingContent::Text { .. } => "text",
            OutgoingContent::Image { .. } => "image",
            OutgoingContent::Audio { .. } => "audio",
            OutgoingContent::Document { .. } => "document",
        }
    }
}

pub type CommandSender = mpsc::Sender<Command>;
pub type CommandReceiver = mpsc::Receiver<Command>;

pub fn create_command_channel() -> (CommandSender, CommandReceiver) {
    mpsc::channel(256)
}
