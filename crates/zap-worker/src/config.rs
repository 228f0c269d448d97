use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, WorkerError};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Disconnect reasons that mean the session was logged out for good.
pub const DEFAULT_TERMINAL_REASONS: &[u16] = &[401];

const RECORDS_FILE: &str = "accounts.json";
const AUTH_DIR: &str = "auth";

/// Runtime settings, usually read from `ZAP_*` environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub data_dir: PathBuf,
    /// Directory holding the gateway's `package.json` and `index.ts`.
    pub gateway_dir: Option<PathBuf>,
    pub ffmpeg: PathBuf,
    pub reconnect_delay: Duration,
    pub terminal_reasons: Vec<u16>,
    pub request_timeout: Duration,
    /// Reconnect accounts with stored credentials on startup.
    pub auto_connect: bool,
}

impl WorkerConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            gateway_dir: None,
            ffmpeg: PathBuf::from("ffmpeg"),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            terminal_reasons: DEFAULT_TERMINAL_REASONS.to_vec(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            auto_connect: true,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset or blank variables
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let data_dir = match var("ZAP_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => zap_store::default_data_dir()?,
        };

        let mut config = Self::new(data_dir);
        config.gateway_dir = var("ZAP_GATEWAY_DIR").map(PathBuf::from);

        if let Some(ffmpeg) = var("ZAP_FFMPEG") {
            config.ffmpeg = PathBuf::from(ffmpeg);
        }
        if let Some(secs) = var("ZAP_RECONNECT_DELAY_SECS") {
            config.reconnect_delay = Duration::from_secs(parse("ZAP_RECONNECT_DELAY_SECS", &secs)?);
        }
        if let Some(secs) = var("ZAP_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = parse("ZAP_REQUEST_TIMEOUT_SECS", &secs)?;
            if secs == 0 {
                return Err(WorkerError::Config(
                    "ZAP_REQUEST_TIMEOUT_SECS must be greater than zero".to_string(),
                ));
            }
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(reasons) = var("ZAP_TERMINAL_REASONS") {
            config.terminal_reasons = reasons
                .split(',')
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(|code| parse("ZAP_TERMINAL_REASONS", code))
                .collect::<Result<_>>()?;
        }
        if let Some(flag) = var("ZAP_AUTO_CONNECT") {
            config.auto_connect = match flag.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(WorkerError::Config(format!(
                        "ZAP_AUTO_CONNECT: expected a boolean, got {other:?}"
                    )));
                }
            };
        }

        Ok(config)
    }

    pub fn records_path(&self) -> PathBuf {
        self.data_dir.join(RECORDS_FILE)
    }

    pub fn auth_root(&self) -> PathBuf {
        self.data_dir.join(AUTH_DIR)
    }

    /// A close without a reason code is always recoverable.
    pub fn is_terminal(&self, reason_code: Option<u16>) -> bool {
        reason_code.is_some_and(|code| self.terminal_reasons.contains(&code))
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| WorkerError::Config(format!("{key}: invalid value {value:?}")))
}
