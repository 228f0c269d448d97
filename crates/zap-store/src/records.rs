use directories::ProjectDirs;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};
use crate::models::AccountRecord;

/// The platform data directory for zap.
pub fn default_data_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("dev", "zap", "zap").ok_or(StoreError::NoDataDir)?;
    Ok(dirs.data_dir().to_path_buf())
}

/// JSON file holding every known account, rewritten wholesale on each save.
#[derive(Debug, Clone)]
pub struct RecordFile {
    path: PathBuf,
}

impl RecordFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file reads as an empty registry.
    pub async fn load(&self) -> Result<Vec<AccountRecord>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let records = serde_json::from_slice(&raw)?;
        Ok(records)
    }

    pub async fn save(&self, records: &[AccountRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let raw = serde_json::to_vec_pretty(records)?;
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, raw).await?;
        tokio::fs::rename(&staging, &self.path).await?;

        tracing::debug!(path = %self.path.display(), count = records.len(), "Account records saved");
        Ok(())
    }
}
