use serde::Serialize;

use crate::registry::ConnectionState;
use crate::snapshot::{AccountView, ChatView, HistoryView, MessageView};

/// Notifications published to observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerEvent {
    GatewayReady,
    Accounts {
        accounts: Vec<AccountView>,
    },
    AccountStatus {
        account_id: String,
        state: ConnectionState,
        qr: Option<String>,
        phone_number: Option<String>,
    },
    AccountState {
        account: AccountView,
        chats: Vec<ChatView>,
    },
    ChatList {
        account_id: String,
        chats: Vec<ChatView>,
    },
    NewMessage {
        account_id: String,
        chat: ChatView,
        message: MessageView,
    },
    MessageSent {
        account_id: String,
        message: MessageView,
    },
    Messages {
        account_id: String,
        chat_jid: String,
        messages: Vec<MessageView>,
    },
    History {
        account_id: String,
        history: HistoryView,
    },
    ChatStarted {
        account_id: String,
        chat: ChatView,
    },
    Error {
        account_id: Option<String>,
        error: String,
    },
}

impl WorkerEvent {
    pub fn account_id(&self) -> Option<&str> {
        match self {
            WorkerEvent::GatewayReady | WorkerEvent::Accounts { .. } => None,
            WorkerEvent::AccountState { account, .. } => Some(&account.id),
            WorkerEvent::AccountStatus { account_id, .. }
            | WorkerEvent::ChatList { account_id, .. }
            | WorkerEvent::NewMessage { account_id, .. }
            | WorkerEvent::MessageSent { account_id, .. }
            | WorkerEvent::Messages { account_id, .. }
            | WorkerEvent::History { account_id, .. }
            | WorkerEvent::ChatStarted { account_id, .. } => Some(account_id),
            WorkerEvent::Error { account_id, .. } => account_id.as_deref(),
        }
    }
}
