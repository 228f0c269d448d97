use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use zap_core::jid::normalize;
use zap_core::{IpcEvent, OutboundMessage};
use zap_ipc::{AudioTranscoder, GatewayManager, VOICE_NOTE_MIMETYPE};
use zap_store::{AccountRecord, ContentKind, Direction, Message, RecordFile};

use crate::broadcast::Broadcaster;
use crate::commands::{Command, CommandReceiver, OutgoingContent};
use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::events::WorkerEvent;
use crate::gateway::{AccountLookup, Gateway, IpcGateway};
use crate::lifecycle;
use crate::reconciler::spawn_reconciler;
use crate::registry::{AccountEntry, AccountRegistry, ConnectionState, SharedSession};
use crate::snapshot::{
    AccountView, ChatView, HistoryView, MediaPayload, MessageView, SnapshotFormatter, message_views,
};

const SECONDS_PER_DAY: i64 = 86_400;

pub(crate) struct Shared {
    pub config: WorkerConfig,
    pub registry: Mutex<AccountRegistry>,
    pub gateway: Arc<dyn Gateway>,
    pub broadcaster: Broadcaster,
    pub transcoder: AudioTranscoder,
}

impl Shared {
    pub async fn account_views(&self) -> Vec<AccountView> {
        self.registry
            .lock()
            .await
            .iter()
            .map(AccountView::from)
            .collect()
    }

    pub async fn publish_accounts(&self) {
        let accounts = self.account_views().await;
        self.broadcaster.publish(WorkerEvent::Accounts { accounts });
    }

    pub fn lookup(&self, account_id: &str) -> AccountLookup {
        AccountLookup::new(self.gateway.clone(), account_id)
    }
}

/// Runs every account: routes gateway events to per-account reconcilers and
/// serves observer commands.
#[derive(Clone)]
pub struct ZapWorker {
    shared: Arc<Shared>,
}

impl ZapWorker {
    /// Start the gateway process and a worker driven by its events.
    pub async fn launch(config: WorkerConfig) -> Result<Self> {
        let gateway_dir = config
            .gateway_dir
            .clone()
            .ok_or_else(|| WorkerError::Config("gateway directory is not set".to_string()))?;

        let manager = Arc::new(
            GatewayManager::new(gateway_dir).with_request_timeout(config.request_timeout),
        );
        manager.start().await?;
        let events = manager
            .take_event_receiver()
            .ok_or(WorkerError::ChannelClosed)?;

        let worker = Self::new(config, Arc::new(IpcGateway::new(manager))).await?;
        worker.attach(events);
        Ok(worker)
    }

    /// Build a worker over any gateway, restoring the saved accounts.
    pub async fn new(config: WorkerConfig, gateway: Arc<dyn Gateway>) -> Result<Self> {
        let registry =
            AccountRegistry::load(RecordFile::new(config.records_path()), config.auth_root())
                .await?;
        let transcoder = AudioTranscoder::new(&config.ffmpeg);

        let shared = Arc::new(Shared {
            config,
            registry: Mutex::new(registry),
            gateway,
            broadcaster: Broadcaster::default(),
            transcoder,
        });

        {
            let mut registry = shared.registry.lock().await;
            for entry in registry.iter_mut() {
                spawn_reconciler(&shared, entry);
            }
        }

        Ok(Self { shared })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.shared.broadcaster.subscribe()
    }

    /// Pump gateway events into the worker until the channel closes.
    pub fn attach(&self, mut events: mpsc::UnboundedReceiver<IpcEvent>) -> JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                worker.dispatch(event).await;
            }
            warn!("Gateway event stream ended");
        })
    }

    pub async fn dispatch(&self, event: IpcEvent) {
        match event {
            IpcEvent::Ready => {
                info!("🚀 Gateway ready");
                self.shared.broadcaster.publish(WorkerEvent::GatewayReady);
                if self.shared.config.auto_connect {
                    self.reconnect_saved().await;
                }
            }

            IpcEvent::Account { account_id, event } => {
                let inbox = {
                    let registry = self.shared.registry.lock().await;
                    registry.get(&account_id).ok().and_then(AccountEntry::inbox)
                };
                match inbox {
                    Some(inbox) => {
                        if inbox.send(event).is_err() {
                            warn!(account_id = %account_id, "Account inbox closed, event dropped");
                        }
                    }
                    None => debug!(
                        account_id = %account_id,
                        event = event.name(),
                        "Event for unknown account dropped"
                    ),
                }
            }

            IpcEvent::Error { account_id, error } => {
                warn!(account_id = ?account_id, "Gateway error: {}", error);
                self.shared
                    .broadcaster
                    .publish(WorkerEvent::Error { account_id, error });
            }

            IpcEvent::CommandResult { command_id, .. } => {
                debug!(command_id = %command_id, "Unclaimed command result");
            }
        }
    }

    /// Start sessions for accounts that already have credentials on disk.
    pub async fn reconnect_saved(&self) -> usize {
        let pending: Vec<(String, std::path::PathBuf)> = {
            let registry = self.shared.registry.lock().await;
            registry
                .iter()
                .filter(|entry| !entry.is_connected() && registry.has_credentials(&entry.id))
                .map(|entry| (entry.id.clone(), registry.auth_dir(&entry.id)))
                .collect()
        };

        let mut started = 0;
        for (account_id, auth_dir) in pending {
            match self.shared.gateway.start_session(&account_id, &auth_dir).await {
                Ok(()) => started += 1,
                Err(e) => {
                    warn!(account_id = %account_id, "Failed to restore session: {}", e);
                    if let Err(e) = lifecycle::schedule_reconnect(&self.shared, &account_id).await {
                        warn!(account_id = %account_id, "Failed to schedule reconnect: {}", e);
                    }
                }
            }
        }
        info!(count = started, "🔁 Saved sessions restored");
        started
    }

    pub async fn list_accounts(&self) -> Vec<AccountView> {
        self.shared.account_views().await
    }

    pub async fn create_account(&self, name: &str) -> Result<AccountView> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WorkerError::InvalidName);
        }

        let record = AccountRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            phone_number: None,
        };

        let view = {
            let mut registry = self.shared.registry.lock().await;
            let entry = registry.insert(AccountEntry::new(record, ConnectionState::Created));
            spawn_reconciler(&self.shared, entry);
            let view = AccountView::from(&*entry);
            registry.persist().await?;
            view
        };

        info!(account_id = %view.id, name = %view.name, "➕ Account created");
        self.shared.publish_accounts().await;
        Ok(view)
    }

    /// Ask the gateway to open the account's session. Progress arrives as
    /// status notifications.
    pub async fn connect_account(&self, account_id: &str) -> Result<()> {
        let auth_dir = {
            let registry = self.shared.registry.lock().await;
            if registry.get(account_id)?.is_connected() {
                debug!(account_id = %account_id, "Already connected");
                return Ok(());
            }
            registry.auth_dir(account_id)
        };

        self.shared.gateway.start_session(account_id, &auth_dir).await?;
        info!(account_id = %account_id, "Session requested");
        Ok(())
    }

    pub async fn account_state(&self, account_id: &str) -> Result<(AccountView, Vec<ChatView>)> {
        let (view, session) = {
            let registry = self.shared.registry.lock().await;
            let entry = registry.get(account_id)?;
            (AccountView::from(entry), entry.session())
        };

        let lookup = self.shared.lookup(account_id);
        let chats = SnapshotFormatter::new(&lookup).chat_list(&session).await;
        Ok((view, chats))
    }

    pub async fn rename_account(&self, account_id: &str, name: &str) -> Result<AccountView> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WorkerError::InvalidName);
        }

        let view = {
            let mut registry = self.shared.registry.lock().await;
            let entry = registry.get_mut(account_id)?;
            entry.name = name.to_string();
            let view = AccountView::from(&*entry);
            registry.persist().await?;
            view
        };

        self.shared.publish_accounts().await;
        Ok(view)
    }

    /// Remove the account with its stores and credentials. In-flight work
    /// for it is cancelled.
    pub async fn delete_account(&self, account_id: &str) -> Result<()> {
        let (entry, auth_dir) = {
            let mut registry = self.shared.registry.lock().await;
            let entry = registry.remove(account_id)?;
            let auth_dir = registry.auth_dir(account_id);
            registry.persist().await?;
            (entry, auth_dir)
        };

        let session = entry.session();
        drop(entry);
        session.lock().await.clear();

        if let Err(e) = self.shared.gateway.stop_session(account_id).await {
            debug!(account_id = %account_id, "Stopping deleted session failed: {}", e);
        }
        crate::registry::purge_credentials(&auth_dir).await?;

        info!(account_id = %account_id, "🗑️ Account deleted");
        self.shared.publish_accounts().await;
        Ok(())
    }

    /// Log the session out and wipe its data, keeping the account.
    pub async fn logout_account(&self, account_id: &str) -> Result<()> {
        self.shared.registry.lock().await.get(account_id)?;

        if let Err(e) = self.shared.gateway.logout(account_id).await {
            warn!(account_id = %account_id, "Gateway logout failed: {}", e);
        }
        lifecycle::terminal_logout(&self.shared, account_id).await
    }

    /// Resolve a phone number to a conversation, creating an empty chat.
    pub async fn start_chat(&self, account_id: &str, phone: &str) -> Result<ChatView> {
        let session = self.connected_session(account_id).await?;

        let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Err(WorkerError::InvalidPhone(phone.to_string()));
        }

        let jid = self
            .shared
            .gateway
            .check_number(account_id, &digits)
            .await?
            .map(|jid| normalize(&jid))
            .filter(|jid| !jid.is_empty())
            .ok_or_else(|| WorkerError::UnknownNumber(phone.to_string()))?;
        self.ensure_registered(account_id).await?;

        session.lock().await.chats.ensure(&jid);
        let lookup = self.shared.lookup(account_id);
        let chat = SnapshotFormatter::new(&lookup)
            .chat_by_jid(&session, &jid)
            .await;
        info!(account_id = %account_id, chat = %jid, "Chat started");
        Ok(chat)
    }

    pub async fn send_message(
        &self,
        account_id: &str,
        chat_jid: &str,
        content: OutgoingContent,
    ) -> Result<MessageView> {
        let session = self.connected_session(account_id).await?;
        let to = normalize(chat_jid);
        if to.is_empty() {
            return Err(WorkerError::InvalidChat(chat_jid.to_string()));
        }

        let kind = content.kind();
        let (outbound, mut message) = self.prepare(content).await.inspect_err(|e| {
            if let WorkerError::Transcode(source) = e {
                warn!(account_id = %account_id, "Voice note conversion failed: {}", source);
            }
        })?;

        let receipt = self.shared.gateway.send(account_id, &to, outbound).await?;
        self.ensure_registered(account_id).await?;

        message.id = receipt.message_id;
        message.timestamp = receipt.timestamp;
        message.chat_jid = to;
        let view = MessageView::from(&message);

        {
            let mut session = session.lock().await;
            session.chats.record_activity(&message);
            session.messages.append(message);
        }
        let lookup = self.shared.lookup(account_id);
        let chats = SnapshotFormatter::new(&lookup).chat_list(&session).await;

        info!(account_id = %account_id, kind, chat = %view.chat_jid, "📤 Message sent");
        self.shared.broadcaster.publish(WorkerEvent::MessageSent {
            account_id: account_id.to_string(),
            message: view.clone(),
        });
        self.shared.broadcaster.publish(WorkerEvent::ChatList {
            account_id: account_id.to_string(),
            chats,
        });
        Ok(view)
    }

    /// Full log of a chat, oldest first. Media is fetched only when asked.
    pub async fn messages(
        &self,
        account_id: &str,
        chat_jid: &str,
        include_media: bool,
    ) -> Result<Vec<MessageView>> {
        let session = self.session(account_id).await?;
        let messages = session.lock().await.messages.all(chat_jid);
        let mut views = message_views(&messages);
        if include_media {
            self.hydrate(account_id, &mut views).await;
        }
        Ok(views)
    }

    /// Messages from the last `days` days, at most `max_count` of them.
    pub async fn history(
        &self,
        account_id: &str,
        chat_jid: &str,
        days: u32,
        max_count: usize,
    ) -> Result<HistoryView> {
        let session = self.session(account_id).await?;
        let since = chrono::Utc::now().timestamp() - i64::from(days) * SECONDS_PER_DAY;
        let window = session
            .lock()
            .await
            .messages
            .window(chat_jid, since, max_count);

        let canonical = normalize(chat_jid);
        Ok(HistoryView {
            chat_jid: if canonical.is_empty() {
                chat_jid.to_string()
            } else {
                canonical
            },
            days,
            total: window.total,
            messages: message_views(&window.messages),
        })
    }

    pub async fn mark_read(&self, account_id: &str, chat_jid: &str) -> Result<()> {
        let session = self.session(account_id).await?;
        if !session.lock().await.chats.mark_read(chat_jid) {
            debug!(account_id = %account_id, chat = %chat_jid, "Mark read on unknown chat");
            return Ok(());
        }

        let lookup = self.shared.lookup(account_id);
        let chats = SnapshotFormatter::new(&lookup).chat_list(&session).await;

        self.shared.broadcaster.publish(WorkerEvent::ChatList {
            account_id: account_id.to_string(),
            chats,
        });
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down worker");
        self.shared.gateway.shutdown().await
    }

    /// Run one observer command, publishing its result or failure.
    pub async fn execute(&self, command: Command) {
        let account_id = command.account_id().map(str::to_string);
        let broadcaster = &self.shared.broadcaster;

        let result = match command {
            Command::ListAccounts => {
                let accounts = self.list_accounts().await;
                broadcaster.publish(WorkerEvent::Accounts { accounts });
                Ok(())
            }
            Command::CreateAccount { name } => self.create_account(&name).await.map(drop),
            Command::ConnectAccount { account_id } => self.connect_account(&account_id).await,
            Command::GetAccountState { account_id } => {
                self.account_state(&account_id)
                    .await
                    .map(|(account, chats)| {
                        broadcaster.publish(WorkerEvent::AccountState { account, chats })
                    })
            }
            Command::RenameAccount { account_id, name } => {
                self.rename_account(&account_id, &name).await.map(drop)
            }
            Command::DeleteAccount { account_id } => self.delete_account(&account_id).await,
            Command::LogoutAccount { account_id } => self.logout_account(&account_id).await,
            Command::StartChat { account_id, phone } => self
                .start_chat(&account_id, &phone)
                .await
                .map(|chat| broadcaster.publish(WorkerEvent::ChatStarted { account_id, chat })),
            Command::SendMessage {
                account_id,
                chat_jid,
                content,
            } => self
                .send_message(&account_id, &chat_jid, content)
                .await
                .map(drop),
            Command::GetMessages {
                account_id,
                chat_jid,
                include_media,
            } => self
                .messages(&account_id, &chat_jid, include_media)
                .await
                .map(|messages| {
                    broadcaster.publish(WorkerEvent::Messages {
                        account_id,
                        chat_jid,
                        messages,
                    })
                }),
            Command::GetHistory {
                account_id,
                chat_jid,
                days,
                max_count,
            } => self
                .history(&account_id, &chat_jid, days, max_count)
                .await
                .map(|history| broadcaster.publish(WorkerEvent::History { account_id, history })),
            Command::MarkRead {
                account_id,
                chat_jid,
            } => self.mark_read(&account_id, &chat_jid).await,
            Command::Shutdown => self.shutdown().await,
        };

        if let Err(e) = result {
            warn!(account_id = ?account_id, "Command failed: {}", e);
            broadcaster.publish(WorkerEvent::Error {
                account_id,
                error: e.to_string(),
            });
        }
    }

    /// Serve commands from `commands`, each on its own task, until the
    /// channel closes or a shutdown is requested.
    pub fn spawn_command_loop(&self, mut commands: CommandReceiver) -> JoinHandle<()> {
        let worker = self.clone();
        tokio::spawn(async move {
            while let Some(command) = commands.recv().await {
                if matches!(command, Command::Shutdown) {
                    worker.execute(command).await;
                    break;
                }
                let worker = worker.clone();
                tokio::spawn(async move { worker.execute(command).await });
            }
            debug!("Command loop finished");
        })
    }

    async fn session(&self, account_id: &str) -> Result<SharedSession> {
        Ok(self.shared.registry.lock().await.get(account_id)?.session())
    }

    async fn connected_session(&self, account_id: &str) -> Result<SharedSession> {
        Ok(self
            .shared
            .registry
            .lock()
            .await
            .connected(account_id)?
            .session())
    }

    /// Results of gateway calls for an account deleted meanwhile are dropped.
    async fn ensure_registered(&self, account_id: &str) -> Result<()> {
        if self.shared.registry.lock().await.contains(account_id) {
            Ok(())
        } else {
            Err(WorkerError::AccountNotFound(account_id.to_string()))
        }
    }

    async fn prepare(&self, content: OutgoingContent) -> Result<(OutboundMessage, Message)> {
        let mut message = Message {
            id: String::new(),
            chat_jid: String::new(),
            sender_jid: None,
            sender_name: None,
            direction: Direction::Outbound,
            kind: ContentKind::Text,
            text: None,
            caption: None,
            mimetype: None,
            filename: None,
            timestamp: 0,
        };

        let outbound = match content {
            OutgoingContent::Text { text } => {
                message.text = Some(text.clone());
                OutboundMessage::Text { text }
            }
            OutgoingContent::Image {
                data,
                mimetype,
                caption,
            } => {
                message.kind = ContentKind::Image;
                message.mimetype = Some(mimetype.clone());
                message.caption.clone_from(&caption);
                OutboundMessage::Image {
                    data: BASE64.encode(data),
                    mimetype,
                    caption,
                }
            }
            OutgoingContent::Audio { data, mimetype } => {
                let voice_note = self.shared.transcoder.to_voice_note(&data, &mimetype).await?;
                message.kind = ContentKind::Audio;
                message.mimetype = Some(VOICE_NOTE_MIMETYPE.to_string());
                OutboundMessage::Audio {
                    data: BASE64.encode(voice_note),
                    mimetype: VOICE_NOTE_MIMETYPE.to_string(),
                    ptt: true,
                }
            }
            OutgoingContent::Document {
                data,
                mimetype,
                filename,
            } => {
                message.kind = ContentKind::Document;
                message.mimetype = Some(mimetype.clone());
                message.filename = Some(filename.clone());
                OutboundMessage::Document {
                    data: BASE64.encode(data),
                    mimetype,
                    filename,
                }
            }
        };

        Ok((outbound, message))
    }

    async fn hydrate(&self, account_id: &str, views: &mut [MessageView]) {
        for view in views.iter_mut().filter(|view| view.kind.has_media()) {
            match self
                .shared
                .gateway
                .download_media(account_id, &view.chat_jid, &view.id)
                .await
            {
                Ok(Some(media)) => {
                    view.media = Some(MediaPayload {
                        data: media.data,
                        mimetype: media.mimetype,
                    });
                }
                Ok(None) => debug!(message_id = %view.id, "No media available"),
                Err(e) => warn!(message_id = %view.id, "Media download failed: {}", e),
            }
        }
    }
}
