use serde::{Deserialize, Serialize};

use crate::events::{IpcCommand, IpcEvent};

/// One line of the gateway's stdio protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcMessage {
    pub id: String,
    #[serde(flatten)]
    pub content: IpcMessageContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IpcMessageContent {
    Command(IpcCommand),
    Event(IpcEvent),
}

impl IpcMessage {
    pub fn new_command(command: IpcCommand) -> Self {
        Self {
            id: generate_id(),
            content: IpcMessageContent::Command(command),
        }
    }

    pub fn new_event(event: IpcEvent) -> Self {
        Self {
            id: generate_id(),
            content: IpcMessageContent::Event(event),
        }
    }

    pub fn to_line(&self) -> serde_json::Result<String> {
        Ok(serde_json::to_string(self)? + "\n")
    }

    pub fn from_line(line: &str) -> Option<Self> {
        serde_json::from_str(line.trim()).ok()
    }

    pub fn into_event(self) -> Option<IpcEvent> {
        match self.content {
            IpcMessageContent::Event(event) => Some(event),
            IpcMessageContent::Command(_) => None,
        }
    }
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
