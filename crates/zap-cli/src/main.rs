use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use color_eyre::eyre::{Context, Result, eyre};
use owo_colors::OwoColorize;
use zap_worker::{
    ChatView, Command, CommandSender, MessageView, OutgoingContent, WorkerConfig, WorkerEvent,
    ZapWorker, create_command_channel,
};

const GATEWAY_DIR: &str = "gateway";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .from_env_lossy()
                .add_directive("zap_cli=info".parse()?)
                .add_directive("zap_worker=info".parse()?)
                .add_directive("zap_ipc=info".parse()?)
                .add_directive("zap_store=info".parse()?),
        )
        .init();

    print_banner();

    let mut config = WorkerConfig::from_env().wrap_err("Invalid configuration")?;
    if config.gateway_dir.is_none() {
        config.gateway_dir = Some(find_gateway_dir()?);
    }
    if let Some(dir) = &config.gateway_dir {
        println!("📁 Gateway directory: {}", dir.display());
    }
    println!("💾 Data directory: {}", config.data_dir.display());

    let worker = ZapWorker::launch(config)
        .await
        .wrap_err("Failed to start worker")?;
    let mut event_rx = worker.subscribe();
    let (command_tx, command_rx) = create_command_channel();
    let command_loop = worker.spawn_command_loop(command_rx);

    tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => handle_event(event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    println!("\n⚠️  Missed {} updates", missed);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::time::sleep(tokio::time::Duration::from_secs(1)).await;

    loop {
        print_menu();
        let choice = read_line("Choice: ")?;

        let result = match choice.as_str() {
            "1" => create_account(&command_tx).await,
            "2" => submit(&command_tx, Command::ListAccounts).await,
            "3" => connect_account(&command_tx).await,
            "4" => show_account(&command_tx).await,
            "5" => rename_account(&command_tx).await,
            "6" => delete_account(&command_tx).await,
            "7" => logout_account(&command_tx).await,
            "8" => start_chat(&command_tx).await,
            "9" => send_text(&command_tx).await,
            "10" => send_file(&command_tx).await,
            "11" => list_messages(&command_tx).await,
            "12" => show_history(&command_tx).await,
            "13" => mark_read(&command_tx).await,
            "0" => {
                println!("👋 Shutting down...");
                submit(&command_tx, Command::Shutdown).await?;
                command_loop.await?;
                break;
            }
            _ => {
                println!("❌ Invalid choice");
                Ok(())
            }
        };

        if let Err(e) = result {
            println!("❌ {:#}", e);
        }
    }

    Ok(())
}

fn print_banner() {
    let banner = r#"
  _____   _    ____  
 |__  /  / \  |  _ \ 
   / /  / _ \ | |_) |
  / /_ / ___ \|  __/ 
 /____/_/   \_\_|    
"#;
    println!("{}", banner.bright_green());
}

fn print_menu() {
    println!();
    println!("╔════════════════════════════════════╗");
    println!("║         ZAP CLI - WhatsApp         ║");
    println!("╠════════════════════════════════════╣");
    println!("║  1. Create Account                 ║");
    println!("║  2. List Accounts                  ║");
    println!("║  3. Connect Account                ║");
    println!("║  4. Account State & Chats          ║");
    println!("║  5. Rename Account                 ║");
    println!("║  6. Delete Account                 ║");
    println!("║  7. Logout Account                 ║");
    println!("║  8. Start Chat                     ║");
    println!("║  9. Send Text                      ║");
    println!("║ 10. Send File                      ║");
    println!("║ 11. List Messages                  ║");
    println!("║ 12. History                        ║");
    println!("║ 13. Mark Chat Read                 ║");
    println!("║  0. Exit                           ║");
    println!("╚════════════════════════════════════╝");
}

fn handle_event(event: WorkerEvent) {
    match event {
        WorkerEvent::GatewayReady => {
            println!("\n🚀 Gateway is ready!");
        }
        WorkerEvent::Accounts { accounts } => {
            if accounts.is_empty() {
                println!("\n📭 No accounts found");
            } else {
                println!("\n📋 Accounts:");
                for account in accounts {
                    println!(
                        "  {} - {} [{:?}] {}",
                        account.id,
                        account.name,
                        account.state,
                        account.phone_number.unwrap_or_default()
                    );
                }
            }
        }
        WorkerEvent::AccountStatus {
            account_id,
            state,
            qr,
            phone_number,
        } => {
            println!(
                "\n🔔 {} is now {:?} {}",
                account_id,
                state,
                phone_number.unwrap_or_default()
            );
            if let Some(qr) = qr {
                println!("📱 Scan this QR code with WhatsApp:");
                print_qr_code(&qr);
            }
        }
        WorkerEvent::AccountState { account, chats } => {
            println!(
                "\n📒 {} [{:?}] {}",
                account.name,
                account.state,
                account.phone_number.unwrap_or_default()
            );
            print_chats(&chats);
        }
        WorkerEvent::ChatList { account_id, chats } => {
            tracing::debug!(account_id = %account_id, count = chats.len(), "Chat list updated");
        }
        WorkerEvent::NewMessage {
            account_id: _,
            chat,
            message,
        } => {
            println!("\n📨 {} {}", chat.name.bold(), describe(&message));
        }
        WorkerEvent::MessageSent { message, .. } => {
            println!("\n📤 Sent to {}: {}", message.chat_jid, describe(&message));
        }
        WorkerEvent::Messages {
            chat_jid, messages, ..
        } => {
            println!("\n💬 {} message(s) in {}", messages.len(), chat_jid);
            print_messages(&messages);
        }
        WorkerEvent::History { history, .. } => {
            println!(
                "\n📜 {} of {} message(s) in the last {} day(s)",
                history.messages.len(),
                history.total,
                history.days
            );
            print_messages(&history.messages);
        }
        WorkerEvent::ChatStarted { chat, .. } => {
            println!("\n🆕 Chat ready: {} ({})", chat.name, chat.jid);
        }
        WorkerEvent::Error { account_id, error } => {
            println!(
                "\n❌ Error ({}): {}",
                account_id.unwrap_or_default(),
                error
            );
        }
    }
}

fn print_qr_code(qr: &str) {
    if let Err(e) = qr2term::print_qr(qr) {
        eprintln!("Failed to print QR code: {}", e);
        println!("Raw QR data: {}", qr);
    }
}

fn describe(message: &MessageView) -> String {
    let body = message
        .text
        .as_deref()
        .or(message.caption.as_deref())
        .or(message.filename.as_deref())
        .unwrap_or("");
    format!("[{:?}] {}", message.kind, body)
}

fn format_time(timestamp: i64) -> String {
    Local
        .timestamp_opt(timestamp, 0)
        .single()
        .map(|t| t.format("%d/%m %H:%M").to_string())
        .unwrap_or_default()
}

fn print_chats(chats: &[ChatView]) {
    if chats.is_empty() {
        println!("📭 No chats");
        return;
    }
    for (i, chat) in chats.iter().enumerate().take(20) {
        let unread = if chat.unread_count > 0 {
            format!(" ({} unread)", chat.unread_count)
        } else {
            String::new()
        };
        let preview = chat
            .last_message
            .as_ref()
            .map(|m| m.preview.as_str())
            .unwrap_or("");
        println!(
            "  {}. {}{} {} - {}",
            i + 1,
            chat.name,
            unread.yellow(),
            chat.jid.dimmed(),
            preview
        );
    }
    if chats.len() > 20 {
        println!("  ... and {} more", chats.len() - 20);
    }
}

fn print_messages(messages: &[MessageView]) {
    for message in messages {
        let direction = if message.from_me { "→" } else { "←" };
        let media = if message.media.is_some() { " 📎" } else { "" };
        println!(
            "  {} {} {}: {}{}",
            format_time(message.timestamp),
            direction,
            message.sender_name.as_deref().unwrap_or(""),
            describe(message),
            media
        );
    }
}

/// Queue a command for the worker. Results and failures come back as events.
async fn submit(commands: &CommandSender, command: Command) -> Result<()> {
    commands
        .send(command)
        .await
        .map_err(|_| eyre!("Worker is no longer accepting commands"))
}

async fn create_account(commands: &CommandSender) -> Result<()> {
    let name = read_line("Account name: ")?;
    submit(commands, Command::CreateAccount { name }).await
}

async fn connect_account(commands: &CommandSender) -> Result<()> {
    let account_id = read_line("Account ID to connect: ")?;
    println!("🔄 Connecting {}... watch for the QR code", account_id);
    submit(commands, Command::ConnectAccount { account_id }).await
}

async fn show_account(commands: &CommandSender) -> Result<()> {
    let account_id = read_line("Account ID: ")?;
    submit(commands, Command::GetAccountState { account_id }).await
}

async fn rename_account(commands: &CommandSender) -> Result<()> {
    let account_id = read_line("Account ID: ")?;
    let name = read_line("New name: ")?;
    submit(commands, Command::RenameAccount { account_id, name }).await
}

async fn delete_account(commands: &CommandSender) -> Result<()> {
    let account_id = read_line("Account ID to delete: ")?;
    let confirm = read_line("Type 'yes' to confirm: ")?;
    if confirm != "yes" {
        println!("Cancelled");
        return Ok(());
    }
    submit(commands, Command::DeleteAccount { account_id }).await
}

async fn logout_account(commands: &CommandSender) -> Result<()> {
    let account_id = read_line("Account ID to logout: ")?;
    submit(commands, Command::LogoutAccount { account_id }).await
}

async fn start_chat(commands: &CommandSender) -> Result<()> {
    let account_id = read_line("Account ID: ")?;
    let phone = read_line("Phone number: ")?;
    submit(commands, Command::StartChat { account_id, phone }).await
}

async fn send_text(commands: &CommandSender) -> Result<()> {
    let account_id = read_line("Account ID: ")?;
    let chat_jid = read_line("To (JID or phone): ")?;
    let text = read_line("Message: ")?;
    submit(
        commands,
        Command::SendMessage {
            account_id,
            chat_jid,
            content: OutgoingContent::Text { text },
        },
    )
    .await
}

async fn send_file(commands: &CommandSender) -> Result<()> {
    let account_id = read_line("Account ID: ")?;
    let chat_jid = read_line("To (JID or phone): ")?;
    let path = PathBuf::from(read_line("File path: ")?);
    let data = tokio::fs::read(&path)
        .await
        .wrap_err_with(|| format!("Failed to read {}", path.display()))?;

    let content = outgoing_for(&path, data)?;
    submit(
        commands,
        Command::SendMessage {
            account_id,
            chat_jid,
            content,
        },
    )
    .await
}

fn outgoing_for(path: &Path, data: Vec<u8>) -> Result<OutgoingContent> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| eyre!("Invalid file name"))?
        .to_string();

    let content = match extension.as_str() {
        "jpg" | "jpeg" | "png" | "webp" => OutgoingContent::Image {
            data,
            mimetype: format!("image/{}", if extension == "jpg" { "jpeg" } else { extension.as_str() }),
            caption: None,
        },
        "ogg" | "opus" | "mp3" | "m4a" | "wav" | "webm" | "aac" => OutgoingContent::Audio {
            data,
            mimetype: extension.clone(),
        },
        "pdf" => OutgoingContent::Document {
            data,
            mimetype: "application/pdf".to_string(),
            filename,
        },
        _ => OutgoingContent::Document {
            data,
            mimetype: "application/octet-stream".to_string(),
            filename,
        },
    };
    Ok(content)
}

async fn list_messages(commands: &CommandSender) -> Result<()> {
    let account_id = read_line("Account ID: ")?;
    let chat_jid = read_line("Chat JID: ")?;
    let include_media = read_line("Download media? (y/N): ")?.eq_ignore_ascii_case("y");
    submit(
        commands,
        Command::GetMessages {
            account_id,
            chat_jid,
            include_media,
        },
    )
    .await
}

async fn show_history(commands: &CommandSender) -> Result<()> {
    let account_id = read_line("Account ID: ")?;
    let chat_jid = read_line("Chat JID: ")?;
    let days: u32 = read_line("Days [1]: ")?.parse().unwrap_or(1);
    let max_count: usize = read_line("Max messages [50]: ")?.parse().unwrap_or(50);
    submit(
        commands,
        Command::GetHistory {
            account_id,
            chat_jid,
            days,
            max_count,
        },
    )
    .await
}

async fn mark_read(commands: &CommandSender) -> Result<()> {
    let account_id = read_line("Account ID: ")?;
    let chat_jid = read_line("Chat JID: ")?;
    submit(
        commands,
        Command::MarkRead {
            account_id,
            chat_jid,
        },
    )
    .await
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn find_gateway_dir() -> Result<PathBuf> {
    let exe_path = std::env::current_exe()?;

    let mut current = exe_path.parent();
    while let Some(dir) = current {
        let gateway = dir.join(GATEWAY_DIR);
        if gateway.join("package.json").exists() {
            return Ok(gateway);
        }
        current = dir.parent();
    }

    let cwd = std::env::current_dir()?;
    let gateway = cwd.join(GATEWAY_DIR);
    if gateway.join("package.json").exists() {
        return Ok(gateway);
    }

    Err(eyre!(
        "Could not find the gateway directory. Set ZAP_GATEWAY_DIR or run from the project root."
    ))
}
