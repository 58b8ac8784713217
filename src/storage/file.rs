use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::PlayerStore;
use crate::constants::PLAYER_DATA_DIR;
use crate::error::StoreError;
use crate::types::{PlayerRecord, StorageDocument};

/// One pretty-printed JSON file per player at `{root}/player_data/{id}.json`.
///
/// Writes replace the whole file; there is no revision check.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            dir: root.as_ref().join(PLAYER_DATA_DIR),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }
}

/// Deterministic file body for a record.
pub fn render(record: &PlayerRecord) -> Result<String, StoreError> {
    let mut json = serde_json::to_string_pretty(record)?;
    json.push('\n');
    Ok(json)
}

#[async_trait]
impl PlayerStore for FileStore {
    fn kind(&self) -> &'static str {
        "file"
    }

    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(fs::try_exists(self.path_for(id)).await?)
    }

    async fn get(&self, id: &str) -> Result<Option<StorageDocument>, StoreError> {
        match fs::read_to_string(self.path_for(id)).await {
            Ok(content) => {
                let record: PlayerRecord = serde_json::from_str(&content)?;
                Ok(Some(StorageDocument::new(record)))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Files carry no revision, so existing content is never decoded.
    async fn revision(&self, _id: &str) -> Result<Option<String>, StoreError> {
        Ok(None)
    }

    async fn put(&self, doc: &StorageDocument) -> Result<Option<String>, StoreError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&doc.id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, render(&doc.record)?).await?;
        fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), "wrote player file");
        Ok(None)
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
