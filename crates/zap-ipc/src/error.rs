use thiserror::Error;

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Gateway not running")]
    ProcessNotRunning,

    #[error("Failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("Bun install failed: {0}")]
    BunInstallFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Gateway rejected {command}: {reason}")]
    RequestFailed {
        command: &'static str,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, IpcError>;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to start encoder: {0}")]
    Spawn(String),

    #[error("Encoder exited with {status}: {stderr}")]
    Encoder { status: String, stderr: String },

    #[error("Encoder produced no output")]
    EmptyOutput,
}
