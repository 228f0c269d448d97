use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Storage error: {0}")]
    Store(#[from] zap_store::StoreError),

    #[error("IPC error: {0}")]
    Ipc(#[from] zap_ipc::IpcError),

    /// Shown to observers without the encoder's details.
    #[error("Audio conversion failed")]
    Transcode(#[from] zap_ipc::TranscodeError),

    #[error("Unexpected gateway payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account {0} is not connected")]
    NotConnected(String),

    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("Invalid chat id: {0:?}")]
    InvalidChat(String),

    #[error("Account name must not be empty")]
    InvalidName,

    #[error("{0} is not on WhatsApp")]
    UnknownNumber(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, WorkerError>;
