use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::constants::{letter_index_file, CONSOLIDATED_INDEX_FILE};
use crate::error::StoreError;
use crate::types::{IndexEntry, LetterIndex};

/// Contents of the consolidated index file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedIndex {
    pub scraped_at: DateTime<Utc>,
    pub total_players: usize,
    pub players: Vec<IndexEntry>,
}

/// Per-letter and consolidated index files under the storage directory.
///
/// The index is always cached on disk, whichever player store is in use.
#[derive(Debug, Clone)]
pub struct IndexCache {
    root: PathBuf,
}

impl IndexCache {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn letter_path(&self, letter: char) -> PathBuf {
        self.root.join(letter_index_file(letter))
    }

    pub fn consolidated_path(&self) -> PathBuf {
        self.root.join(CONSOLIDATED_INDEX_FILE)
    }

    pub async fn load_letter(&self, letter: char) -> Result<Option<LetterIndex>, StoreError> {
        read_json(&self.letter_path(letter)).await
    }

    pub async fn save_letter(&self, index: &LetterIndex) -> Result<(), StoreError> {
        let path = self.letter_path(index.letter);
        write_json(&path, index).await?;
        debug!(letter = %index.letter, entries = index.entries.len(), "cached letter index");
        Ok(())
    }

    pub async fn load_consolidated(&self) -> Result<Option<Vec<IndexEntry>>, StoreError> {
        let index: Option<ConsolidatedIndex> = read_json(&self.consolidated_path()).await?;
        Ok(index.map(|i| i.players))
    }

    pub async fn save_consolidated(&self, entries: &[IndexEntry]) -> Result<(), StoreError> {
        let path = self.consolidated_path();
        let index = ConsolidatedIndex {
            scraped_at: Utc::now(),
            total_players: entries.len(),
            players: entries.to_vec(),
        };
        write_json(&path, &index).await?;
        info!(path = %path.display(), entries = entries.len(), "wrote consolidated index");
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    fs::write(path, json).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(slug: &str) -> IndexEntry {
        IndexEntry {
            name: slug.replace('-', " "),
            profile_url: format!("https://example.test/cfb/players/{slug}.html"),
        }
    }

    #[tokio::test]
    async fn letter_round_trip_uses_uppercase_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path());
        assert!(cache.load_letter('a').await.unwrap().is_none());

        let index = LetterIndex {
            letter: 'A',
            entries: vec![entry("aaron-able-1"), entry("abe-cole-1")],
        };
        cache.save_letter(&index).await.unwrap();

        assert!(dir.path().join("player_index_A.json").exists());
        assert_eq!(cache.load_letter('a').await.unwrap(), Some(index));
    }

    #[tokio::test]
    async fn consolidated_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path().join("nested"));
        let entries = vec![entry("zed-one-1")];
        cache.save_consolidated(&entries).await.unwrap();
        assert_eq!(cache.load_consolidated().await.unwrap(), Some(entries));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(cache.consolidated_path()).unwrap())
                .unwrap();
        assert_eq!(raw["total_players"], 1);
    }

    #[tokio::test]
    async fn corrupt_cache_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = IndexCache::new(dir.path());
        std::fs::write(cache.consolidated_path(), "not json").unwrap();
        assert!(matches!(
            cache.load_consolidated().await,
            Err(StoreError::Json(_))
        ));
    }
}
