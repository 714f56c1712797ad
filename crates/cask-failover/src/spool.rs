use std::path::{Path, PathBuf};

use crate::bag::FailoverBag;
use crate::error::FailoverError;

const BAG_EXT: &str = "bag.json";

/// Directory of bags, one file per session.
///
/// ```text
/// {base_dir}/
///   {session_id}.bag.json
/// ```
///
/// Stands in for the replication transport when moving passivated sessions
/// between nodes that share a filesystem.
pub struct BagSpool {
    base_dir: PathBuf,
}

impl BagSpool {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Default spool location: ~/.cask/spool/
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cask")
            .join("spool")
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub async fn init(&self) -> Result<(), FailoverError> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        Ok(())
    }

    pub fn bag_path(&self, session_id: &str) -> Result<PathBuf, FailoverError> {
        if session_id.is_empty()
            || session_id.starts_with('.')
            || session_id.contains(['/', '\\'])
        {
            return Err(FailoverError::InvalidSessionId(session_id.to_string()));
        }
        Ok(self.base_dir.join(format!("{session_id}.{BAG_EXT}")))
    }

    /// Write `bag`, replacing any spooled bag for the same session.
    pub async fn store(&self, bag: &FailoverBag) -> Result<PathBuf, FailoverError> {
        let path = self.bag_path(&bag.session_id)?;
        tokio::fs::write(&path, bag.to_json()?).await?;
        tracing::info!(session = %bag.session_id, path = %path.display(), "Bag spooled");
        Ok(path)
    }

    pub async fn load(&self, session_id: &str) -> Result<FailoverBag, FailoverError> {
        let path = self.bag_path(session_id)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => FailoverBag::from_json(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FailoverError::BagNotFound(session_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read a bag file from anywhere on disk.
    pub async fn read_file(path: &Path) -> Result<FailoverBag, FailoverError> {
        let content = tokio::fs::read_to_string(path).await?;
        FailoverBag::from_json(&content)
    }

    /// Session ids with a spooled bag, sorted.
    pub async fn list(&self) -> Result<Vec<String>, FailoverError> {
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.base_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(id) = name.strip_suffix(&format!(".{BAG_EXT}")) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Returns `false` when nothing was spooled for the session.
    pub async fn remove(&self, session_id: &str) -> Result<bool, FailoverError> {
        let path = self.bag_path(session_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(session = session_id, "Spooled bag removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
