use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use zap_core::AccountEvent;
use zap_store::{
    AccountRecord, ChatStore, ContactDirectory, MessageStore, ProfilePictureCache, RecordFile,
};

use crate::error::{Result, WorkerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Created,
    AwaitingScan,
    Connected,
    Disconnected,
}

/// The stores one account owns exclusively.
#[derive(Debug, Default)]
pub struct AccountSession {
    pub contacts: ContactDirectory,
    pub chats: ChatStore,
    pub messages: MessageStore,
    pub avatars: ProfilePictureCache,
}

impl AccountSession {
    pub fn clear(&mut self) {
        self.contacts.clear();
        self.chats.clear();
        self.messages.clear();
        self.avatars.clear();
    }
}

pub type SharedSession = Arc<Mutex<AccountSession>>;

pub struct AccountEntry {
    pub id: String,
    pub name: String,
    pub phone_number: Option<String>,
    pub state: ConnectionState,
    /// Last pairing payload while awaiting a scan.
    pub qr: Option<String>,
    session: SharedSession,
    inbox: Option<mpsc::UnboundedSender<AccountEvent>>,
    actor: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl AccountEntry {
    pub fn new(record: AccountRecord, state: ConnectionState) -> Self {
        Self {
            id: record.id,
            name: record.name,
            phone_number: record.phone_number,
            state,
            qr: None,
            session: SharedSession::default(),
            inbox: None,
            actor: None,
            reconnect: None,
        }
    }

    pub fn session(&self) -> SharedSession {
        self.session.clone()
    }

    pub fn inbox(&self) -> Option<mpsc::UnboundedSender<AccountEvent>> {
        self.inbox.clone()
    }

    /// Wire up the task that processes this account's gateway events.
    pub fn attach_actor(
        &mut self,
        inbox: mpsc::UnboundedSender<AccountEvent>,
        actor: JoinHandle<()>,
    ) {
        if let Some(previous) = self.actor.replace(actor) {
            previous.abort();
        }
        self.inbox = Some(inbox);
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn set_reconnect(&mut self, task: JoinHandle<()>) {
        if let Some(previous) = self.reconnect.replace(task) {
            previous.abort();
        }
    }

    pub fn cancel_reconnect(&mut self) {
        if let Some(task) = self.reconnect.take() {
            task.abort();
            debug!(account_id = %self.id, "Reconnect cancelled");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn record(&self) -> AccountRecord {
        AccountRecord {
            id: self.id.clone(),
            name: self.name.clone(),
            phone_number: self.phone_number.clone(),
        }
    }
}

impl Drop for AccountEntry {
    fn drop(&mut self) {
        if let Some(actor) = self.actor.take() {
            actor.abort();
        }
        if let Some(task) = self.reconnect.take() {
            task.abort();
        }
    }
}

/// Every known account, in creation order, plus where they are persisted.
pub struct AccountRegistry {
    accounts: Vec<AccountEntry>,
    records: RecordFile,
    auth_root: PathBuf,
}

impl AccountRegistry {
    pub fn new(records: RecordFile, auth_root: PathBuf) -> Self {
        Self {
            accounts: Vec::new(),
            records,
            auth_root,
        }
    }

    /// Restore accounts from the record file. Accounts with credentials on
    /// disk start out disconnected, the rest as freshly created.
    pub async fn load(records: RecordFile, auth_root: PathBuf) -> Result<Self> {
        let mut registry = Self::new(records, auth_root);
        for record in registry.records.load().await? {
            let state = if registry.has_credentials(&record.id) {
                ConnectionState::Disconnected
            } else {
                ConnectionState::Created
            };
            registry.accounts.push(AccountEntry::new(record, state));
        }
        info!(count = registry.accounts.len(), "📒 Account registry loaded");
        Ok(registry)
    }

    pub fn auth_dir(&self, account_id: &str) -> PathBuf {
        self.auth_root.join(account_id)
    }

    pub fn auth_root(&self) -> &Path {
        &self.auth_root
    }

    pub fn has_credentials(&self, account_id: &str) -> bool {
        self.auth_dir(account_id).is_dir()
    }

    pub fn insert(&mut self, entry: AccountEntry) -> &mut AccountEntry {
        let index = self.accounts.len();
        self.accounts.push(entry);
        &mut self.accounts[index]
    }

    pub fn contains(&self, account_id: &str) -> bool {
        self.accounts.iter().any(|a| a.id == account_id)
    }

    pub fn get(&self, account_id: &str) -> Result<&AccountEntry> {
        self.accounts
            .iter()
            .find(|a| a.id == account_id)
            .ok_or_else(|| WorkerError::AccountNotFound(account_id.to_string()))
    }

    pub fn get_mut(&mut self, account_id: &str) -> Result<&mut AccountEntry> {
        self.accounts
            .iter_mut()
            .find(|a| a.id == account_id)
            .ok_or_else(|| WorkerError::AccountNotFound(account_id.to_string()))
    }

    /// Looks up a connected account, failing with `NotConnected` otherwise.
    pub fn connected(&self, account_id: &str) -> Result<&AccountEntry> {
        let entry = self.get(account_id)?;
        if entry.is_connected() {
            Ok(entry)
        } else {
            Err(WorkerError::NotConnected(account_id.to_string()))
        }
    }

    /// Detach an account. Its tasks stop when the entry is dropped.
    pub fn remove(&mut self, account_id: &str) -> Result<AccountEntry> {
        let index = self
            .accounts
            .iter()
            .position(|a| a.id == account_id)
            .ok_or_else(|| WorkerError::AccountNotFound(account_id.to_string()))?;
        Ok(self.accounts.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccountEntry> {
        self.accounts.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut AccountEntry> {
        self.accounts.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Rewrite the record file from the current accounts.
    pub async fn persist(&self) -> Result<()> {
        let records: Vec<AccountRecord> = self.accounts.iter().map(AccountEntry::record).collect();
        self.records.save(&records).await?;
        Ok(())
    }
}

/// Delete an account's credential directory. A missing directory is fine.
pub async fn purge_credentials(auth_dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(auth_dir).await {
        Ok(()) => {
            info!(dir = %auth_dir.display(), "🔑 Credentials removed");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(zap_store::StoreError::from(e).into()),
    }
}
