use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{debug, info, warn};

use zap_core::{IpcCommand, IpcEvent, IpcMessage};

use crate::error::{IpcError, Result};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug)]
struct Outcome {
    success: bool,
    data: Option<Value>,
    error: Option<String>,
}

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Outcome>>>>;

/// The running `bun` child and the queue feeding its stdin.
struct GatewayProcess {
    child: Child,
    stdin_tx: mpsc::Sender<String>,
}

/// Owns the gateway subprocess and correlates its replies with our commands.
pub struct GatewayManager {
    gateway_dir: PathBuf,
    request_timeout: Duration,
    process: Mutex<Option<GatewayProcess>>,
    pending: Pending,
    event_tx: mpsc::UnboundedSender<IpcEvent>,
    event_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<IpcEvent>>>,
}

impl GatewayManager {
    pub fn new(gateway_dir: PathBuf) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            gateway_dir,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            process: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
            event_rx: std::sync::Mutex::new(Some(event_rx)),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Gateway events other than command results. Can be taken once.
    ///
    /// The queue is unbounded: a slow consumer must never stop the stdout
    /// pump from resolving command results.
    pub fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<IpcEvent>> {
        self.event_rx.lock().ok()?.take()
    }

    pub async fn ensure_dependencies(&self) -> Result<()> {
        let package_json = self.gateway_dir.join("package.json");
        let node_modules = self.gateway_dir.join("node_modules");

        if !package_json.exists() {
            return Err(IpcError::BunInstallFailed(format!(
                "package.json not found in {}",
                self.gateway_dir.display()
            )));
        }

        if !node_modules.exists() {
            info!("Installing gateway dependencies with bun");
            self.run_bun_install().await?;
        }

        Ok(())
    }

    async fn run_bun_install(&self) -> Result<()> {
        let output = Command::new("bun")
            .arg("install")
            .current_dir(&self.gateway_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| IpcError::BunInstallFailed(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IpcError::BunInstallFailed(stderr.to_string()));
        }

        info!("bun install completed successfully");
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        let mut process = self.process.lock().await;
        if process.is_some() {
            return Ok(());
        }

        self.ensure_dependencies().await?;

        info!(dir = %self.gateway_dir.display(), "Starting gateway process");

        let mut child = Command::new("bun")
            .args(["run", "index.ts"])
            .current_dir(&self.gateway_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| IpcError::SpawnFailed(format!("bun: {e}")))?;

        let stdout = child.stdout.take().ok_or(IpcError::ProcessNotRunning)?;
        let stderr = child.stderr.take().ok_or(IpcError::ProcessNotRunning)?;
        let mut stdin = child.stdin.take().ok_or(IpcError::ProcessNotRunning)?;

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(100);
        tokio::spawn(async move {
            while let Some(line) = stdin_rx.recv().await {
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        let pending = self.pending.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if !route_line(&line, &pending, &event_tx).await {
                    break;
                }
            }
            // Nobody will answer what is still outstanding.
            pending.lock().await.clear();
            debug!("Gateway stdout closed");
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!("gateway stderr: {}", line);
            }
        });

        *process = Some(GatewayProcess { child, stdin_tx });
        info!("Gateway process started successfully");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        if self.process.lock().await.is_none() {
            return Ok(());
        }

        info!("Stopping gateway process");
        let _ = self.send_command(IpcCommand::Shutdown).await;
        tokio::time::sleep(Duration::from_millis(500)).await;

        if let Some(mut process) = self.process.lock().await.take() {
            if let Err(e) = process.child.kill().await {
                debug!("Gateway already exited: {}", e);
            }
        }
        info!("Gateway process stopped");
        Ok(())
    }

    /// Fire a command without waiting for its result.
    pub async fn send_command(&self, command: IpcCommand) -> Result<()> {
        let message = IpcMessage::new_command(command);
        self.write(&message).await
    }

    /// Send a command and wait for the matching `CommandResult`.
    pub async fn request(&self, command: IpcCommand) -> Result<Option<Value>> {
        let name = command.name();
        let message = IpcMessage::new_command(command);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(message.id.clone(), tx);

        if let Err(e) = self.write(&message).await {
            self.pending.lock().await.remove(&message.id);
            return Err(e);
        }

        let outcome = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => return Err(IpcError::ChannelClosed),
            Err(_) => {
                self.pending.lock().await.remove(&message.id);
                warn!(command = name, "Gateway request timed out");
                return Err(IpcError::Timeout(name));
            }
        };

        if outcome.success {
            Ok(outcome.data)
        } else {
            Err(IpcError::RequestFailed {
                command: name,
                reason: outcome
                    .error
                    .unwrap_or_else(|| "no reason given".to_string()),
            })
        }
    }

    async fn write(&self, message: &IpcMessage) -> Result<()> {
        let process = self.process.lock().await;
        let process = process.as_ref().ok_or(IpcError::ProcessNotRunning)?;

        if let zap_core::IpcMessageContent::Command(command) = &message.content {
            match command.account_id() {
                Some(account_id) => debug!(
                    command = command.name(),
                    account_id = %account_id,
                    "Sending IPC command"
                ),
                None => debug!(command = command.name(), "Sending IPC command"),
            }
        }

        let mut line = message.to_line()?;
        if !line.ends_with('\n') {
            line.push('\n');
        }
        process
            .stdin_tx
            .send(line)
            .await
            .map_err(|_| IpcError::ChannelClosed)
    }
}

/// Deliver one stdout line. Returns `false` once the event consumer is gone.
async fn route_line(
    line: &str,
    pending: &Pending,
    event_tx: &mpsc::UnboundedSender<IpcEvent>,
) -> bool {
    let Some(event) = IpcMessage::from_line(line).and_then(IpcMessage::into_event) else {
        debug!("Ignoring non-protocol gateway output: {}", line);
        return true;
    };

    match event {
        IpcEvent::CommandResult {
            command_id,
            success,
            data,
            error,
        } => {
            match pending.lock().await.remove(&command_id) {
                Some(waiter) => {
                    let _ = waiter.send(Outcome {
                        success,
                        data,
                        error,
                    });
                }
                None => debug!(command_id = %command_id, "Result for unknown or expired request"),
            }
            true
        }
        event => event_tx.send(event).is_ok(),
    }
}
