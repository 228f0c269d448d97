use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use zap_core::{IpcCommand, MediaData, NumberCheck, OutboundMessage, SentReceipt};
use zap_ipc::GatewayManager;
use zap_store::DirectoryLookup;

use crate::error::{Result, WorkerError};

/// The session calls the worker makes against the messaging gateway.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn start_session(&self, account_id: &str, auth_dir: &Path) -> Result<()>;
    async fn stop_session(&self, account_id: &str) -> Result<()>;
    async fn logout(&self, account_id: &str) -> Result<()>;
    async fn group_subject(&self, account_id: &str, group_jid: &str) -> Result<Option<String>>;
    async fn profile_picture_url(&self, account_id: &str, jid: &str) -> Result<Option<String>>;
    /// The canonical JID registered for `phone`, if any.
    async fn check_number(&self, account_id: &str, phone: &str) -> Result<Option<String>>;
    async fn send(
        &self,
        account_id: &str,
        to: &str,
        message: OutboundMessage,
    ) -> Result<SentReceipt>;
    async fn download_media(
        &self,
        account_id: &str,
        chat_jid: &str,
        message_id: &str,
    ) -> Result<Option<MediaData>>;
    async fn shutdown(&self) -> Result<()>;
}

/// [`Gateway`] backed by the bun subprocess.
pub struct IpcGateway {
    manager: Arc<GatewayManager>,
}

impl IpcGateway {
    pub fn new(manager: Arc<GatewayManager>) -> Self {
        Self { manager }
    }

    async fn call<T: DeserializeOwned>(&self, command: IpcCommand) -> Result<Option<T>> {
        match self.manager.request(command).await? {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(data) => Ok(Some(serde_json::from_value(data)?)),
        }
    }
}

#[derive(Deserialize)]
struct GroupSubject {
    subject: Option<String>,
}

#[derive(Deserialize)]
struct PictureUrl {
    url: Option<String>,
}

#[async_trait]
impl Gateway for IpcGateway {
    async fn start_session(&self, account_id: &str, auth_dir: &Path) -> Result<()> {
        self.manager
            .request(IpcCommand::StartSession {
                account_id: account_id.to_string(),
                auth_dir: auth_dir.to_string_lossy().into_owned(),
            })
            .await?;
        Ok(())
    }

    async fn stop_session(&self, account_id: &str) -> Result<()> {
        self.manager
            .request(IpcCommand::StopSession {
                account_id: account_id.to_string(),
            })
            .await?;
        Ok(())
    }

    async fn logout(&self, account_id: &str) -> Result<()> {
        self.manager
            .request(IpcCommand::Logout {
                account_id: account_id.to_string(),
            })
            .await?;
        Ok(())
    }

    async fn group_subject(&self, account_id: &str, group_jid: &str) -> Result<Option<String>> {
        let group: Option<GroupSubject> = self
            .call(IpcCommand::GroupMetadata {
                account_id: account_id.to_string(),
                group_id: group_jid.to_string(),
            })
            .await?;
        Ok(group.and_then(|g| g.subject))
    }

    async fn profile_picture_url(&self, account_id: &str, jid: &str) -> Result<Option<String>> {
        let picture: Option<PictureUrl> = self
            .call(IpcCommand::ProfilePicture {
                account_id: account_id.to_string(),
                jid: jid.to_string(),
            })
            .await?;
        Ok(picture.and_then(|p| p.url))
    }

    async fn check_number(&self, account_id: &str, phone: &str) -> Result<Option<String>> {
        let check: Option<NumberCheck> = self
            .call(IpcCommand::CheckNumber {
                account_id: account_id.to_string(),
                phone: phone.to_string(),
            })
            .await?;
        Ok(check.filter(|c| c.exists).and_then(|c| c.jid))
    }

    async fn send(
        &self,
        account_id: &str,
        to: &str,
        message: OutboundMessage,
    ) -> Result<SentReceipt> {
        self.call(IpcCommand::SendMessage {
            account_id: account_id.to_string(),
            to: to.to_string(),
            message,
        })
        .await?
        .ok_or_else(|| WorkerError::Gateway("send returned no receipt".to_string()))
    }

    async fn download_media(
        &self,
        account_id: &str,
        chat_jid: &str,
        message_id: &str,
    ) -> Result<Option<MediaData>> {
        self.call(IpcCommand::DownloadMedia {
            account_id: account_id.to_string(),
            chat_id: chat_jid.to_string(),
            message_id: message_id.to_string(),
        })
        .await
    }

    async fn shutdown(&self) -> Result<()> {
        self.manager.stop().await?;
        Ok(())
    }
}

/// Live directory lookups scoped to one account. Failures are logged and
/// read as "unknown".
#[derive(Clone)]
pub struct AccountLookup {
    gateway: Arc<dyn Gateway>,
    account_id: String,
}

impl AccountLookup {
    pub fn new(gateway: Arc<dyn Gateway>, account_id: impl Into<String>) -> Self {
        Self {
            gateway,
            account_id: account_id.into(),
        }
    }
}

#[async_trait]
impl DirectoryLookup for AccountLookup {
    async fn group_subject(&self, group_jid: &str) -> Option<String> {
        match self.gateway.group_subject(&self.account_id, group_jid).await {
            Ok(subject) => subject,
            Err(e) => {
                warn!(account_id = %self.account_id, jid = %group_jid, "Group metadata lookup failed: {}", e);
                None
            }
        }
    }

    async fn profile_picture_url(&self, jid: &str) -> Option<String> {
        match self.gateway.profile_picture_url(&self.account_id, jid).await {
            Ok(url) => url,
            Err(e) => {
                warn!(account_id = %self.account_id, jid = %jid, "Profile picture lookup failed: {}", e);
                None
            }
        }
    }
}
