use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use zap_core::jid::normalize;
use zap_core::{AccountEvent, ChatData, ContactData, Delivery, HistoryBatch, MessageData};
use zap_store::{ContactRecord, Message};

use crate::events::WorkerEvent;
use crate::gateway::AccountLookup;
use crate::lifecycle;
use crate::registry::{AccountEntry, AccountSession, SharedSession};
use crate::snapshot::{MessageView, SnapshotFormatter};
use crate::worker::Shared;

/// Start the task that applies one account's gateway events in order.
///
/// The inbox is unbounded so one slow account never holds up the dispatcher
/// feeding every other account.
pub(crate) fn spawn_reconciler(shared: &Arc<Shared>, entry: &mut AccountEntry) {
    let (inbox, rx) = mpsc::unbounded_channel();
    let reconciler = EventReconciler::new(shared.clone(), entry.id.clone(), entry.session());
    let actor = tokio::spawn(reconciler.run(rx));
    entry.attach_actor(inbox, actor);
}

pub(crate) struct EventReconciler {
    shared: Arc<Shared>,
    account_id: String,
    session: SharedSession,
    lookup: AccountLookup,
}

impl EventReconciler {
    fn new(shared: Arc<Shared>, account_id: String, session: SharedSession) -> Self {
        let lookup = AccountLookup::new(shared.gateway.clone(), account_id.clone());
        Self {
            shared,
            account_id,
            session,
            lookup,
        }
    }

    async fn run(self, mut inbox: mpsc::UnboundedReceiver<AccountEvent>) {
        while let Some(event) = inbox.recv().await {
            self.handle(event).await;
        }
        debug!(account_id = %self.account_id, "Account inbox closed");
    }

    async fn handle(&self, event: AccountEvent) {
        debug!(account_id = %self.account_id, event = event.name(), "Reconciling gateway event");

        match event {
            AccountEvent::Connection(update) => {
                lifecycle::on_connection(&self.shared, &self.account_id, update).await;
            }

            AccountEvent::ContactsUpsert(contacts) | AccountEvent::ContactsUpdate(contacts) => {
                apply_contacts(&mut *self.session.lock().await, &contacts);
                info!(account_id = %self.account_id, count = contacts.len(), "📇 Contacts merged");
                self.publish_chat_list().await;
            }

            AccountEvent::MessagesUpsert { messages, delivery } => {
                let live = apply_messages(&mut *self.session.lock().await, &messages, delivery);
                info!(
                    account_id = %self.account_id,
                    count = messages.len(),
                    live = live.len(),
                    "💬 Messages received"
                );

                let formatter = SnapshotFormatter::new(&self.lookup);
                for message in live {
                    let chat = formatter.chat_by_jid(&self.session, &message.chat_jid).await;
                    self.shared.broadcaster.publish(WorkerEvent::NewMessage {
                        account_id: self.account_id.clone(),
                        chat,
                        message: MessageView::from(&message),
                    });
                }
                self.publish_chat_list().await;
            }

            AccountEvent::ChatsUpsert(chats) => {
                {
                    let mut session = self.session.lock().await;
                    session.chats.upsert_batch(&chats);
                    apply_chat_names(&mut session, &chats);
                }
                debug!(account_id = %self.account_id, count = chats.len(), "Chats upserted");
                self.publish_chat_list().await;
            }

            AccountEvent::ChatsUpdate(updates) => {
                let applied = {
                    let mut session = self.session.lock().await;
                    let applied = session.chats.apply_update(&updates);
                    apply_chat_names(&mut session, &updates);
                    applied
                };
                debug!(
                    account_id = %self.account_id,
                    applied,
                    dropped = updates.len() - applied,
                    "Chat updates applied"
                );
                self.publish_chat_list().await;
            }

            AccountEvent::HistorySync(batch) => {
                let appended = apply_history(&mut *self.session.lock().await, &batch);
                info!(
                    account_id = %self.account_id,
                    chats = batch.chats.len(),
                    contacts = batch.contacts.len(),
                    messages = appended,
                    "📚 History synced"
                );
                self.publish_chat_list().await;
            }
        }
    }

    async fn publish_chat_list(&self) {
        let chats = SnapshotFormatter::new(&self.lookup)
            .chat_list(&self.session)
            .await;
        self.shared.broadcaster.publish(WorkerEvent::ChatList {
            account_id: self.account_id.clone(),
            chats,
        });
    }
}

/// Merge a contact batch. Notify names also feed the push-name table.
pub(crate) fn apply_contacts(session: &mut AccountSession, contacts: &[ContactData]) {
    for contact in contacts {
        session.contacts.merge_contact(contact);
        if let Some(notify) = contact.notify.as_deref() {
            session.contacts.set_push_name(&contact.jid, notify);
        }
    }
}

/// Chat names name the conversation only until the directory knows better.
pub(crate) fn apply_chat_names(session: &mut AccountSession, chats: &[ChatData]) {
    for chat in chats {
        if let Some(name) = chat.name.as_deref() {
            if !session.contacts.has_entry(&chat.jid) {
                session.contacts.merge(&[chat.jid.as_str()], &ContactRecord::named(name));
            }
        }
    }
}

/// Store a message batch. Returns the newly stored live inbound messages,
/// which are the ones observers get notified about.
pub(crate) fn apply_messages(
    session: &mut AccountSession,
    messages: &[MessageData],
    delivery: Delivery,
) -> Vec<Message> {
    let mut live_inbound = Vec::new();
    for data in messages {
        if !data.is_from_me {
            if let Some(name) = data.push_name.as_deref() {
                session.contacts.set_push_name(sender_of(data), name);
            }
        }

        let message = to_message(session, data);
        if !session.messages.append(message.clone()) {
            continue;
        }

        match delivery {
            Delivery::Notify => {
                session.chats.record_activity(&message);
                if message.is_inbound() {
                    live_inbound.push(message);
                }
            }
            Delivery::Append => session.chats.ensure(&message.chat_jid),
        }
    }
    live_inbound
}

/// Apply a bulk history replay: chat metadata and names first, then the
/// messages. Returns how many messages were new.
pub(crate) fn apply_history(session: &mut AccountSession, batch: &HistoryBatch) -> usize {
    session.chats.merge_batch(&batch.chats);
    apply_chat_names(session, &batch.chats);
    apply_contacts(session, &batch.contacts);

    let mut appended = 0;
    for data in &batch.messages {
        if !data.is_from_me {
            let sender = sender_of(data);
            if let Some(name) = data.push_name.as_deref() {
                if !session.contacts.has_entry(sender) {
                    session.contacts.set_push_name(sender, name);
                }
            }
        }

        let message = to_message(session, data);
        let chat_jid = message.chat_jid.clone();
        if session.messages.append(message) {
            session.chats.ensure(&chat_jid);
            appended += 1;
        }
    }
    appended
}

fn sender_of(data: &MessageData) -> &str {
    data.sender_jid.as_deref().unwrap_or(&data.chat_jid)
}

fn to_message(session: &AccountSession, data: &MessageData) -> Message {
    let sender_name = if data.is_from_me {
        None
    } else {
        data.push_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| session.contacts.lookup(sender_of(data)))
    };

    let mut message = Message::from_data(data, sender_name);
    let canonical = normalize(&data.chat_jid);
    if !canonical.is_empty() {
        message.chat_jid = canonical;
    }
    message
}
