use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use zap_core::jid::phone_of;
use zap_core::{ConnectionStatus, ConnectionUpdate};

use crate::error::Result;
use crate::events::WorkerEvent;
use crate::registry::{AccountEntry, ConnectionState, purge_credentials};
use crate::worker::Shared;

fn status_event(entry: &AccountEntry) -> WorkerEvent {
    WorkerEvent::AccountStatus {
        account_id: entry.id.clone(),
        state: entry.state,
        qr: entry.qr.clone(),
        phone_number: entry.phone_number.clone(),
    }
}

/// Apply a gateway connection update to the account's state.
pub(crate) async fn on_connection(shared: &Arc<Shared>, account_id: &str, update: ConnectionUpdate) {
    if let Err(e) = apply_connection(shared, account_id, update).await {
        warn!(account_id = %account_id, "Failed to apply connection update: {}", e);
        shared.broadcaster.publish(WorkerEvent::Error {
            account_id: Some(account_id.to_string()),
            error: e.to_string(),
        });
    }
}

async fn apply_connection(shared: &Arc<Shared>, account_id: &str, update: ConnectionUpdate) -> Result<()> {
    if let Some(qr) = update.qr.filter(|qr| !qr.is_empty()) {
        let status = {
            let mut registry = shared.registry.lock().await;
            let entry = registry.get_mut(account_id)?;
            entry.state = ConnectionState::AwaitingScan;
            entry.qr = Some(qr);
            status_event(entry)
        };
        info!(account_id = %account_id, "📱 Pairing code ready");
        shared.broadcaster.publish(status);
    }

    match update.status {
        Some(ConnectionStatus::Open) => {
            let status = {
                let mut registry = shared.registry.lock().await;
                let entry = registry.get_mut(account_id)?;
                entry.state = ConnectionState::Connected;
                entry.qr = None;
                if let Some(phone) = update.me.as_deref().map(phone_of).filter(|p| !p.is_empty()) {
                    entry.phone_number = Some(phone);
                }
                let status = status_event(entry);
                registry.persist().await?;
                status
            };
            info!(account_id = %account_id, "✅ Account connected");
            shared.broadcaster.publish(status);
            shared.publish_accounts().await;
        }
        Some(ConnectionStatus::Close) if shared.config.is_terminal(update.reason_code) => {
            info!(
                account_id = %account_id,
                reason = ?update.reason_code,
                "🚪 Session logged out"
            );
            terminal_logout(shared, account_id).await?;
        }
        Some(ConnectionStatus::Close) => {
            let status = {
                let mut registry = shared.registry.lock().await;
                let entry = registry.get_mut(account_id)?;
                entry.state = ConnectionState::Disconnected;
                entry.qr = None;
                status_event(entry)
            };
            info!(
                account_id = %account_id,
                reason = ?update.reason_code,
                "🔌 Connection closed"
            );
            shared.broadcaster.publish(status);
            schedule_reconnect(shared, account_id).await?;
        }
        Some(ConnectionStatus::Connecting) | None => {
            debug!(account_id = %account_id, "Connection update without state change");
        }
    }

    Ok(())
}

/// Wipe credentials and stores of an account that stays registered.
pub(crate) async fn terminal_logout(shared: &Arc<Shared>, account_id: &str) -> Result<()> {
    let (auth_dir, session) = {
        let mut registry = shared.registry.lock().await;
        let auth_dir = registry.auth_dir(account_id);
        let entry = registry.get_mut(account_id)?;
        entry.cancel_reconnect();
        (auth_dir, entry.session())
    };

    purge_credentials(&auth_dir).await?;
    session.lock().await.clear();

    let status = {
        let mut registry = shared.registry.lock().await;
        let entry = registry.get_mut(account_id)?;
        entry.state = ConnectionState::Disconnected;
        entry.qr = None;
        entry.phone_number = None;
        let status = status_event(entry);
        registry.persist().await?;
        status
    };

    shared.broadcaster.publish(status);
    shared.broadcaster.publish(WorkerEvent::ChatList {
        account_id: account_id.to_string(),
        chats: Vec::new(),
    });
    shared.publish_accounts().await;
    Ok(())
}

/// Retry the session after a fixed delay until the gateway accepts it.
/// At most one retry loop runs per account.
pub(crate) async fn schedule_reconnect(shared: &Arc<Shared>, account_id: &str) -> Result<()> {
    let mut registry = shared.registry.lock().await;
    let entry = registry.get_mut(account_id)?;
    if entry.reconnect_pending() {
        debug!(account_id = %account_id, "Reconnect already pending");
        return Ok(());
    }

    let delay = shared.config.reconnect_delay;
    let task = tokio::spawn(reconnect_loop(shared.clone(), account_id.to_string(), delay));
    entry.set_reconnect(task);
    info!(
        account_id = %account_id,
        delay_ms = delay.as_millis() as u64,
        "🔄 Reconnect scheduled"
    );
    Ok(())
}

async fn reconnect_loop(shared: Arc<Shared>, account_id: String, delay: Duration) {
    let mut attempt: u32 = 0;
    loop {
        tokio::time::sleep(delay).await;
        attempt += 1;

        let auth_dir = {
            let registry = shared.registry.lock().await;
            if !registry.contains(&account_id) {
                return;
            }
            registry.auth_dir(&account_id)
        };

        match shared.gateway.start_session(&account_id, &auth_dir).await {
            Ok(()) => {
                debug!(account_id = %account_id, attempt, "Reconnect attempt accepted");
                return;
            }
            Err(e) => {
                warn!(account_id = %account_id, attempt, "Reconnect attempt failed: {}", e);
            }
        }
    }
}
