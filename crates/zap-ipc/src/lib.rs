mod error;
mod gateway;
mod transcode;

pub use error::{IpcError, Result, TranscodeError};
pub use gateway::{DEFAULT_REQUEST_TIMEOUT, GatewayManager};
pub use transcode::{AudioTranscoder, VOICE_NOTE_MIMETYPE, encoder_args};
