use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::time::timeout;

use zap_core::{
    AccountEvent, ChatData, ConnectionStatus, ConnectionUpdate, ContactData, Delivery,
    HistoryBatch, IpcEvent, MessageBody, MessageData,
};
use zap_worker::{
    Command, ConnectionState, Gateway, MediaData, OutboundMessage, OutgoingContent, SentReceipt,
    VOICE_NOTE_MIMETYPE, WorkerConfig, WorkerError, WorkerEvent, ZapWorker, create_command_channel,
};

const ANA: &str = "5511999@s.whatsapp.net";

#[derive(Default)]
struct MockGateway {
    calls: Mutex<Vec<String>>,
    sent: Mutex<Vec<(String, OutboundMessage)>>,
    numbers: HashMap<String, String>,
    media: Option<MediaData>,
    /// Avatar lookups for this JID never answer in time.
    slow_avatar: Option<String>,
    /// When set, sends and number checks wait for a permit.
    gate: Option<Semaphore>,
    entered: AtomicUsize,
}

impl MockGateway {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    fn sent(&self) -> Vec<(String, OutboundMessage)> {
        self.sent.lock().unwrap().clone()
    }

    async fn pass_gate(&self) {
        if let Some(gate) = &self.gate {
            self.entered.fetch_add(1, Ordering::SeqCst);
            gate.acquire().await.unwrap().forget();
        }
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn start_session(&self, account_id: &str, _auth_dir: &Path) -> zap_worker::Result<()> {
        self.record(format!("start:{account_id}"));
        Ok(())
    }

    async fn stop_session(&self, account_id: &str) -> zap_worker::Result<()> {
        self.record(format!("stop:{account_id}"));
        Ok(())
    }

    async fn logout(&self, account_id: &str) -> zap_worker::Result<()> {
        self.record(format!("logout:{account_id}"));
        Ok(())
    }

    async fn group_subject(&self, _account_id: &str, _group_jid: &str) -> zap_worker::Result<Option<String>> {
        Ok(None)
    }

    async fn profile_picture_url(&self, _account_id: &str, jid: &str) -> zap_worker::Result<Option<String>> {
        if self.slow_avatar.as_deref() == Some(jid) {
            tokio::time::sleep(Duration::from_secs(30)).await;
            return Ok(None);
        }
        Err(WorkerError::Gateway("not available".into()))
    }

    async fn check_number(&self, _account_id: &str, phone: &str) -> zap_worker::Result<Option<String>> {
        self.pass_gate().await;
        Ok(self.numbers.get(phone).cloned())
    }

    async fn send(
        &self,
        _account_id: &str,
        to: &str,
        message: OutboundMessage,
    ) -> zap_worker::Result<SentReceipt> {
        self.pass_gate().await;
        let mut sent = self.sent.lock().unwrap();
        sent.push((to.to_string(), message));
        Ok(SentReceipt {
            message_id: format!("out-{}", sent.len()),
            timestamp: chrono::Utc::now().timestamp(),
        })
    }

    async fn download_media(
        &self,
        _account_id: &str,
        _chat_jid: &str,
        _message_id: &str,
    ) -> zap_worker::Result<Option<MediaData>> {
        Ok(self.media.clone())
    }

    async fn shutdown(&self) -> zap_worker::Result<()> {
        self.record("shutdown".into());
        Ok(())
    }
}

fn config_in(dir: &Path) -> WorkerConfig {
    let mut config = WorkerConfig::new(dir);
    config.reconnect_delay = Duration::from_millis(20);
    config
}

async fn next_event<F>(rx: &mut broadcast::Receiver<WorkerEvent>, mut matches: F) -> WorkerEvent
where
    F: FnMut(&WorkerEvent) -> bool,
{
    timeout(Duration::from_secs(2), async {
        loop {
            let event = rx.recv().await.unwrap();
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for worker event")
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}

fn on(account_id: &str, event: AccountEvent) -> IpcEvent {
    IpcEvent::Account {
        account_id: account_id.to_string(),
        event,
    }
}

fn connection(status: Option<ConnectionStatus>, qr: Option<&str>, reason_code: Option<u16>) -> AccountEvent {
    AccountEvent::Connection(ConnectionUpdate {
        status,
        qr: qr.map(Into::into),
        reason_code,
        me: Some("5511000:7@s.whatsapp.net".into()),
    })
}

fn text(id: &str, chat: &str, timestamp: i64) -> MessageData {
    MessageData {
        message_id: id.into(),
        chat_jid: chat.into(),
        sender_jid: None,
        push_name: None,
        timestamp,
        is_from_me: false,
        body: MessageBody::Text {
            text: format!("text {id}"),
        },
    }
}

fn is_status(event: &WorkerEvent, wanted: ConnectionState) -> bool {
    matches!(event, WorkerEvent::AccountStatus { state, .. } if *state == wanted)
}

async fn connected_account(worker: &ZapWorker, rx: &mut broadcast::Receiver<WorkerEvent>) -> String {
    let account = worker.create_account("Loja").await.unwrap();
    worker
        .dispatch(on(&account.id, connection(Some(ConnectionStatus::Open), None, None)))
        .await;
    next_event(rx, |e| is_status(e, ConnectionState::Connected)).await;
    account.id
}

#[tokio::test]
async fn accounts_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let worker = ZapWorker::new(config_in(dir.path()), Arc::new(MockGateway::default()))
        .await
        .unwrap();
    let mut rx = worker.subscribe();

    let account = worker.create_account("  Vendas ").await.unwrap();
    assert_eq!(account.name, "Vendas");
    assert_eq!(account.state, ConnectionState::Created);
    next_event(&mut rx, |e| matches!(e, WorkerEvent::Accounts { accounts } if accounts.len() == 1)).await;

    let restarted = ZapWorker::new(config_in(dir.path()), Arc::new(MockGateway::default()))
        .await
        .unwrap();
    let accounts = restarted.list_accounts().await;
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].id, account.id);
    assert_eq!(accounts[0].name, "Vendas");

    assert!(matches!(
        worker.create_account("   ").await,
        Err(WorkerError::InvalidName)
    ));
}

#[tokio::test]
async fn pairing_then_open_persists_phone_number() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::default());
    let worker = ZapWorker::new(config_in(dir.path()), gateway.clone()).await.unwrap();
    let mut rx = worker.subscribe();

    let account = worker.create_account("Suporte").await.unwrap();
    worker.connect_account(&account.id).await.unwrap();
    assert_eq!(gateway.count(&format!("start:{}", account.id)), 1);

    worker
        .dispatch(on(&account.id, connection(None, Some("2@pairing-ref"), None)))
        .await;
    let pairing = next_event(&mut rx, |e| is_status(e, ConnectionState::AwaitingScan)).await;
    assert!(matches!(pairing, WorkerEvent::AccountStatus { qr: Some(qr), .. } if qr == "2@pairing-ref"));

    worker
        .dispatch(on(&account.id, connection(Some(ConnectionStatus::Open), None, None)))
        .await;
    let open = next_event(&mut rx, |e| is_status(e, ConnectionState::Connected)).await;
    assert!(matches!(
        open,
        WorkerEvent::AccountStatus { qr: None, phone_number: Some(phone), .. } if phone == "5511000"
    ));

    let raw = std::fs::read_to_string(dir.path().join("accounts.json")).unwrap();
    assert!(raw.contains("5511000"));
}

#[tokio::test]
async fn terminal_close_purges_account_data() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::default());
    let worker = ZapWorker::new(config_in(dir.path()), gateway.clone()).await.unwrap();
    let mut rx = worker.subscribe();
    let id = connected_account(&worker, &mut rx).await;

    let auth_dir = dir.path().join("auth").join(&id);
    std::fs::create_dir_all(&auth_dir).unwrap();
    std::fs::write(auth_dir.join("creds.json"), b"{}").unwrap();

    worker
        .dispatch(on(
            &id,
            AccountEvent::MessagesUpsert {
                messages: vec![text("m1", ANA, 10)],
                delivery: Delivery::Notify,
            },
        ))
        .await;
    worker
        .dispatch(on(&id, connection(Some(ConnectionStatus::Close), None, Some(401))))
        .await;

    let status = next_event(&mut rx, |e| is_status(e, ConnectionState::Disconnected)).await;
    assert!(matches!(status, WorkerEvent::AccountStatus { phone_number: None, .. }));
    assert!(!auth_dir.exists());
    assert!(worker.messages(&id, ANA, false).await.unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(gateway.count(&format!("start:{id}")), 0);
    let raw = std::fs::read_to_string(dir.path().join("accounts.json")).unwrap();
    assert!(!raw.contains("5511000"));
}

#[tokio::test]
async fn recoverable_close_keeps_retrying_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::default());
    let worker = ZapWorker::new(config_in(dir.path()), gateway.clone()).await.unwrap();
    let mut rx = worker.subscribe();
    let id = connected_account(&worker, &mut rx).await;

    worker
        .dispatch(on(&id, connection(Some(ConnectionStatus::Close), None, Some(428))))
        .await;
    next_event(&mut rx, |e| is_status(e, ConnectionState::Disconnected)).await;

    let start = format!("start:{id}");
    wait_until(|| gateway.count(&start) == 1).await;
    assert_eq!(worker.list_accounts().await[0].phone_number.as_deref(), Some("5511000"));
}

#[tokio::test]
async fn delete_cancels_pending_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::default());
    let mut config = config_in(dir.path());
    config.reconnect_delay = Duration::from_millis(150);
    let worker = ZapWorker::new(config, gateway.clone()).await.unwrap();
    let mut rx = worker.subscribe();
    let id = connected_account(&worker, &mut rx).await;

    worker
        .dispatch(on(&id, connection(Some(ConnectionStatus::Close), None, Some(500))))
        .await;
    next_event(&mut rx, |e| is_status(e, ConnectionState::Disconnected)).await;
    worker.delete_account(&id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(gateway.count(&format!("start:{id}")), 0);
    assert!(worker.list_accounts().await.is_empty());
    assert!(matches!(
        worker.messages(&id, ANA, false).await,
        Err(WorkerError::AccountNotFound(_))
    ));
}

#[tokio::test]
async fn live_messages_notify_with_resolved_names() {
    let dir = tempfile::tempdir().unwrap();
    let worker = ZapWorker::new(config_in(dir.path()), Arc::new(MockGateway::default()))
        .await
        .unwrap();
    let mut rx = worker.subscribe();
    let id = connected_account(&worker, &mut rx).await;

    worker
        .dispatch(on(
            &id,
            AccountEvent::ContactsUpsert(vec![ContactData {
                jid: "5511999@x".into(),
                notify: Some("Ana".into()),
                ..Default::default()
            }]),
        ))
        .await;

    let batch = AccountEvent::MessagesUpsert {
        messages: vec![text("m1", ANA, 10)],
        delivery: Delivery::Notify,
    };
    worker.dispatch(on(&id, batch.clone())).await;
    let notification = next_event(&mut rx, |e| matches!(e, WorkerEvent::NewMessage { .. })).await;
    match notification {
        WorkerEvent::NewMessage { chat, message, .. } => {
            assert_eq!(chat.name, "Ana");
            assert_eq!(chat.unread_count, 1);
            assert!(chat.avatar.is_none());
            assert_eq!(message.id, "m1");
            assert!(!message.from_me);
        }
        other => panic!("unexpected {other:?}"),
    }

    worker.dispatch(on(&id, batch)).await;
    for _ in 0..2 {
        let list = next_event(&mut rx, |e| matches!(e, WorkerEvent::ChatList { .. })).await;
        assert!(matches!(
            list,
            WorkerEvent::ChatList { chats, .. } if chats.len() == 1 && chats[0].unread_count == 1
        ));
    }
    assert_eq!(worker.messages(&id, ANA, false).await.unwrap().len(), 1);
}

#[tokio::test]
async fn history_sync_broadcasts_once_per_batch() {
    let dir = tempfile::tempdir().unwrap();
    let worker = ZapWorker::new(config_in(dir.path()), Arc::new(MockGateway::default()))
        .await
        .unwrap();
    let mut rx = worker.subscribe();
    let id = connected_account(&worker, &mut rx).await;

    let messages = (0..30)
        .map(|i| text(&format!("h{i}"), &format!("55110{:02}@s.whatsapp.net", i % 5), 100 + i))
        .collect();
    worker
        .dispatch(on(
            &id,
            AccountEvent::HistorySync(HistoryBatch {
                chats: vec![ChatData {
                    jid: ANA.into(),
                    name: Some("Ana Souza".into()),
                    conversation_timestamp: Some(90),
                    ..Default::default()
                }],
                contacts: vec![],
                messages,
            }),
        ))
        .await;
    worker
        .dispatch(on(
            &id,
            AccountEvent::ChatsUpsert(vec![ChatData {
                jid: "marker@s.whatsapp.net".into(),
                conversation_timestamp: Some(1),
                ..Default::default()
            }]),
        ))
        .await;

    let mut lists = Vec::new();
    loop {
        match next_event(&mut rx, |e| matches!(e, WorkerEvent::ChatList { .. })).await {
            WorkerEvent::ChatList { chats, .. } => {
                let done = chats.iter().any(|c| c.jid == "marker@s.whatsapp.net");
                lists.push(chats);
                if done {
                    break;
                }
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    assert_eq!(lists.len(), 2);
    assert_eq!(lists[0].len(), 6);
    let ana = lists[0].iter().find(|c| c.jid == ANA).unwrap();
    assert_eq!(ana.name, "Ana Souza");
}

#[tokio::test]
async fn history_window_counts_messages_inside_the_window() {
    let dir = tempfile::tempdir().unwrap();
    let worker = ZapWorker::new(config_in(dir.path()), Arc::new(MockGateway::default()))
        .await
        .unwrap();
    let mut rx = worker.subscribe();
    let id = connected_account(&worker, &mut rx).await;

    let now = chrono::Utc::now().timestamp();
    worker
        .dispatch(on(
            &id,
            AccountEvent::MessagesUpsert {
                messages: vec![text("new", ANA, now), text("old", ANA, now - 2 * 86_400)],
                delivery: Delivery::Append,
            },
        ))
        .await;
    next_event(&mut rx, |e| matches!(e, WorkerEvent::ChatList { .. })).await;

    let history = worker.history(&id, ANA, 1, 50).await.unwrap();
    assert_eq!(history.total, 1);
    assert_eq!(history.messages.len(), 1);
    assert_eq!(history.messages[0].id, "new");
    assert_eq!(worker.messages(&id, ANA, false).await.unwrap()[0].id, "old");
}

#[tokio::test]
async fn commands_for_unknown_accounts_publish_errors() {
    let dir = tempfile::tempdir().unwrap();
    let worker = ZapWorker::new(config_in(dir.path()), Arc::new(MockGateway::default()))
        .await
        .unwrap();
    let mut rx = worker.subscribe();

    worker
        .execute(Command::ConnectAccount {
            account_id: "ghost".into(),
        })
        .await;
    let error = next_event(&mut rx, |e| matches!(e, WorkerEvent::Error { .. })).await;
    assert_eq!(error.account_id(), Some("ghost"));
}

#[tokio::test]
async fn sending_requires_a_connected_account() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::default());
    let worker = ZapWorker::new(config_in(dir.path()), gateway.clone()).await.unwrap();
    let account = worker.create_account("Nova").await.unwrap();

    let result = worker
        .send_message(&account.id, ANA, OutgoingContent::Text { text: "oi".into() })
        .await;
    assert!(matches!(result, Err(WorkerError::NotConnected(_))));
    assert!(gateway.sent().is_empty());
}

#[tokio::test]
async fn sent_text_becomes_chat_activity() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::default());
    let worker = ZapWorker::new(config_in(dir.path()), gateway.clone()).await.unwrap();
    let mut rx = worker.subscribe();
    let id = connected_account(&worker, &mut rx).await;

    let view = worker
        .send_message(&id, "5511999", OutgoingContent::Text { text: "olá".into() })
        .await
        .unwrap();
    assert!(view.from_me);
    assert_eq!(view.chat_jid, ANA);

    let sent = gateway.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, ANA);
    assert!(matches!(&sent[0].1, OutboundMessage::Text { text } if text == "olá"));

    next_event(&mut rx, |e| matches!(e, WorkerEvent::MessageSent { .. })).await;
    let list = next_event(&mut rx, |e| matches!(e, WorkerEvent::ChatList { .. })).await;
    match list {
        WorkerEvent::ChatList { chats, .. } => {
            assert_eq!(chats.len(), 1);
            assert_eq!(chats[0].unread_count, 0);
            assert!(chats[0].last_message.as_ref().unwrap().from_me);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn audio_is_sent_as_a_voice_note() {
    use base64::Engine;
    use std::os::unix::fs::PermissionsExt;

    let bin = tempfile::tempdir().unwrap();
    let encoder = bin.path().join("fake-ffmpeg");
    std::fs::write(&encoder, "#!/bin/sh\nfor last; do :; done\nprintf 'OggS' > \"$last\"\n").unwrap();
    std::fs::set_permissions(&encoder, std::fs::Permissions::from_mode(0o755)).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::default());
    let mut config = config_in(dir.path());
    config.ffmpeg = encoder;
    let worker = ZapWorker::new(config, gateway.clone()).await.unwrap();
    let mut rx = worker.subscribe();
    let id = connected_account(&worker, &mut rx).await;

    let view = worker
        .send_message(
            &id,
            ANA,
            OutgoingContent::Audio {
                data: b"\x1a\x45\xdf\xa3".to_vec(),
                mimetype: "audio/webm".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(view.mimetype.as_deref(), Some(VOICE_NOTE_MIMETYPE));

    match &gateway.sent()[0].1 {
        OutboundMessage::Audio {
            data,
            mimetype,
            ptt,
        } => {
            assert!(*ptt);
            assert_eq!(mimetype, VOICE_NOTE_MIMETYPE);
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(data)
                .unwrap();
            assert_eq!(decoded, b"OggS");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[cfg(unix)]
#[tokio::test]
async fn failed_conversion_aborts_the_send() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::default());
    let mut config = config_in(dir.path());
    config.ffmpeg = "false".into();
    let worker = ZapWorker::new(config, gateway.clone()).await.unwrap();
    let mut rx = worker.subscribe();
    let id = connected_account(&worker, &mut rx).await;

    worker
        .execute(Command::SendMessage {
            account_id: id.clone(),
            chat_jid: ANA.into(),
            content: OutgoingContent::Audio {
                data: b"not audio".to_vec(),
                mimetype: "mp3".into(),
            },
        })
        .await;

    let error = next_event(&mut rx, |e| matches!(e, WorkerEvent::Error { .. })).await;
    assert!(matches!(error, WorkerEvent::Error { error, .. } if error == "Audio conversion failed"));
    assert!(gateway.sent().is_empty());
    assert!(worker.messages(&id, ANA, false).await.unwrap().is_empty());
}

#[tokio::test]
async fn start_chat_resolves_numbers_through_the_gateway() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway {
        numbers: HashMap::from([(
            "5511987654321".to_string(),
            "5511987654321@s.whatsapp.net".to_string(),
        )]),
        ..Default::default()
    });
    let worker = ZapWorker::new(config_in(dir.path()), gateway).await.unwrap();
    let mut rx = worker.subscribe();
    let id = connected_account(&worker, &mut rx).await;

    let chat = worker.start_chat(&id, "+55 (11) 98765-4321").await.unwrap();
    assert_eq!(chat.jid, "5511987654321@s.whatsapp.net");
    assert_eq!(chat.name, "(11) 98765-4321");

    assert!(matches!(
        worker.start_chat(&id, "5511000000000").await,
        Err(WorkerError::UnknownNumber(_))
    ));
    assert!(matches!(
        worker.start_chat(&id, "abc").await,
        Err(WorkerError::InvalidPhone(_))
    ));
}

#[tokio::test]
async fn media_is_hydrated_only_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway {
        media: Some(MediaData {
            data: "aGVsbG8=".into(),
            mimetype: "image/jpeg".into(),
        }),
        ..Default::default()
    });
    let worker = ZapWorker::new(config_in(dir.path()), gateway).await.unwrap();
    let mut rx = worker.subscribe();
    let id = connected_account(&worker, &mut rx).await;

    let mut photo = text("p1", ANA, 10);
    photo.body = MessageBody::Image {
        caption: Some("praia".into()),
        mimetype: Some("image/jpeg".into()),
    };
    worker
        .dispatch(on(
            &id,
            AccountEvent::MessagesUpsert {
                messages: vec![photo, text("t1", ANA, 11)],
                delivery: Delivery::Notify,
            },
        ))
        .await;
    next_event(&mut rx, |e| matches!(e, WorkerEvent::ChatList { .. })).await;

    let plain = worker.messages(&id, ANA, false).await.unwrap();
    assert!(plain.iter().all(|m| m.media.is_none()));

    let hydrated = worker.messages(&id, ANA, true).await.unwrap();
    assert_eq!(hydrated[0].media.as_ref().unwrap().data, "aGVsbG8=");
    assert!(hydrated[1].media.is_none());
}

#[tokio::test]
async fn saved_sessions_start_when_gateway_is_ready() {
    let dir = tempfile::tempdir().unwrap();
    let first = ZapWorker::new(config_in(dir.path()), Arc::new(MockGateway::default()))
        .await
        .unwrap();
    let paired = first.create_account("Pareada").await.unwrap();
    let fresh = first.create_account("Nova").await.unwrap();
    std::fs::create_dir_all(dir.path().join("auth").join(&paired.id)).unwrap();

    let gateway = Arc::new(MockGateway::default());
    let worker = ZapWorker::new(config_in(dir.path()), gateway.clone()).await.unwrap();
    let accounts = worker.list_accounts().await;
    assert_eq!(accounts[0].state, ConnectionState::Disconnected);
    assert_eq!(accounts[1].state, ConnectionState::Created);

    worker.dispatch(IpcEvent::Ready).await;
    assert_eq!(gateway.count(&format!("start:{}", paired.id)), 1);
    assert_eq!(gateway.count(&format!("start:{}", fresh.id)), 0);
}

#[tokio::test]
async fn mark_read_clears_unread_count() {
    let dir = tempfile::tempdir().unwrap();
    let worker = ZapWorker::new(config_in(dir.path()), Arc::new(MockGateway::default()))
        .await
        .unwrap();
    let mut rx = worker.subscribe();
    let id = connected_account(&worker, &mut rx).await;

    worker
        .dispatch(on(
            &id,
            AccountEvent::MessagesUpsert {
                messages: vec![text("m1", ANA, 10), text("m2", ANA, 11)],
                delivery: Delivery::Notify,
            },
        ))
        .await;
    next_event(&mut rx, |e| matches!(e, WorkerEvent::ChatList { .. })).await;

    worker.mark_read(&id, ANA).await.unwrap();
    let list = next_event(&mut rx, |e| matches!(e, WorkerEvent::ChatList { .. })).await;
    assert!(matches!(list, WorkerEvent::ChatList { chats, .. } if chats[0].unread_count == 0));

    let (account, chats) = worker.account_state(&id).await.unwrap();
    assert_eq!(account.state, ConnectionState::Connected);
    assert_eq!(chats[0].unread_count, 0);
}

#[tokio::test]
async fn slow_account_does_not_hold_up_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway {
        slow_avatar: Some(ANA.into()),
        ..Default::default()
    });
    let worker = ZapWorker::new(config_in(dir.path()), gateway).await.unwrap();
    let mut rx = worker.subscribe();
    let busy = connected_account(&worker, &mut rx).await;
    let idle = worker.create_account("Outra").await.unwrap();

    let (events, event_rx) = mpsc::unbounded_channel();
    worker.attach(event_rx);
    events
        .send(on(
            &busy,
            AccountEvent::MessagesUpsert {
                messages: vec![text("m1", ANA, 10)],
                delivery: Delivery::Notify,
            },
        ))
        .unwrap();
    for i in 0..1100 {
        events
            .send(on(
                &busy,
                AccountEvent::ContactsUpdate(vec![ContactData {
                    jid: format!("55110{i:04}@s.whatsapp.net"),
                    notify: Some(format!("Contato {i}")),
                    ..Default::default()
                }]),
            ))
            .unwrap();
    }
    events
        .send(on(&idle.id, connection(None, Some("2@idle-ref"), None)))
        .unwrap();

    let status = next_event(&mut rx, |e| {
        e.account_id() == Some(idle.id.as_str()) && is_status(e, ConnectionState::AwaitingScan)
    })
    .await;
    assert!(matches!(status, WorkerEvent::AccountStatus { qr: Some(qr), .. } if qr == "2@idle-ref"));

    // The busy account is parked on its avatar lookup; its store stays readable.
    timeout(Duration::from_secs(2), async {
        while worker.messages(&busy, ANA, false).await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session stayed locked during a lookup");
}

#[tokio::test]
async fn results_for_a_deleted_account_are_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway {
        numbers: HashMap::from([(
            "5511987654321".to_string(),
            "5511987654321@s.whatsapp.net".to_string(),
        )]),
        gate: Some(Semaphore::new(0)),
        ..Default::default()
    });
    let worker = ZapWorker::new(config_in(dir.path()), gateway.clone()).await.unwrap();
    let mut rx = worker.subscribe();
    let id = connected_account(&worker, &mut rx).await;

    let sending = tokio::spawn({
        let (worker, id) = (worker.clone(), id.clone());
        async move {
            worker
                .send_message(&id, ANA, OutgoingContent::Text { text: "oi".into() })
                .await
        }
    });
    let starting = tokio::spawn({
        let (worker, id) = (worker.clone(), id.clone());
        async move {
            worker
                .execute(Command::StartChat {
                    account_id: id,
                    phone: "5511987654321".into(),
                })
                .await
        }
    });
    wait_until(|| gateway.entered.load(Ordering::SeqCst) == 2).await;

    worker.delete_account(&id).await.unwrap();
    while rx.try_recv().is_ok() {}
    if let Some(gate) = &gateway.gate {
        gate.add_permits(2);
    }

    assert!(matches!(
        sending.await.unwrap(),
        Err(WorkerError::AccountNotFound(_))
    ));
    starting.await.unwrap();
    assert_eq!(gateway.sent().len(), 1);

    let mut errors = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            WorkerEvent::Error { account_id, .. } => {
                assert_eq!(account_id.as_deref(), Some(id.as_str()));
                errors += 1;
            }
            other => panic!("deleted account produced {other:?}"),
        }
    }
    assert_eq!(errors, 1);
    assert!(worker.list_accounts().await.is_empty());
    assert!(matches!(
        worker.messages(&id, ANA, false).await,
        Err(WorkerError::AccountNotFound(_))
    ));
    let raw = std::fs::read_to_string(dir.path().join("accounts.json")).unwrap();
    assert!(!raw.contains(&id));
}

#[tokio::test]
async fn command_loop_serves_until_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(MockGateway::default());
    let worker = ZapWorker::new(config_in(dir.path()), gateway.clone()).await.unwrap();
    let mut rx = worker.subscribe();
    let (commands, command_rx) = create_command_channel();
    let serving = worker.spawn_command_loop(command_rx);

    commands
        .send(Command::CreateAccount {
            name: "Loja".into(),
        })
        .await
        .unwrap();
    next_event(&mut rx, |e| matches!(e, WorkerEvent::Accounts { accounts } if accounts.len() == 1)).await;

    commands.send(Command::ListAccounts).await.unwrap();
    let listed = next_event(&mut rx, |e| matches!(e, WorkerEvent::Accounts { .. })).await;
    assert!(matches!(listed, WorkerEvent::Accounts { accounts } if accounts[0].name == "Loja"));

    commands.send(Command::Shutdown).await.unwrap();
    timeout(Duration::from_secs(2), serving)
        .await
        .expect("command loop kept running after shutdown")
        .unwrap();
    assert_eq!(gateway.count("shutdown"), 1);
    assert!(commands.send(Command::ListAccounts).await.is_err());
}
