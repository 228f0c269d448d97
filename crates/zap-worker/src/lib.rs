mod broadcast;
mod commands;
mod config;
mod error;
mod events;
mod gateway;
mod lifecycle;
mod reconciler;
mod registry;
mod snapshot;
mod worker;

pub use broadcast::Broadcaster;
pub use commands::{Command, CommandReceiver, CommandSender, OutgoingContent, create_command_channel};
pub use config::WorkerConfig;
pub use error::{Result, WorkerError};
pub use events::WorkerEvent;
pub use gateway::{AccountLookup, Gateway, IpcGateway};
pub use registry::{AccountSession, ConnectionState};
pub use snapshot::{AccountView, ChatView, HistoryView, MediaPayload, MessageView};
pub use worker::ZapWorker;

pub use zap_core::{MediaData, OutboundMessage, SentReceipt};
pub use zap_ipc::VOICE_NOTE_MIMETYPE;
pub use zap_store::{ContentKind, LastMessage};
