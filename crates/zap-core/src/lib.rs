mod events;
pub mod jid;
mod protocol;

pub use events::*;
pub use protocol::*;
