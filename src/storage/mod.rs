//! Player persistence.
//!
//! Every backend implements [`PlayerStore`]. Writes go through
//! [`save_player`], which reads the current revision before writing so
//! revisioned backends can reject stale updates.

pub mod couchdb;
pub mod file;
pub mod in_memory;
pub mod index_cache;

pub use couchdb::CouchDbStore;
pub use file::FileStore;
pub use in_memory::InMemoryStore;
pub use index_cache::IndexCache;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{ScraperConfig, StorageMode};
use crate::error::{Result, StoreError};
use crate::infra::HttpClientPort;
use crate::metrics::PlayerMetrics;
use crate::types::{PlayerRecord, StorageDocument};

#[async_trait]
pub trait PlayerStore: Send + Sync {
    /// Short backend name for logs
    fn kind(&self) -> &'static str;

    async fn exists(&self, id: &str) -> std::result::Result<bool, StoreError>;

    async fn get(&self, id: &str) -> std::result::Result<Option<StorageDocument>, StoreError>;

    /// Write the whole document. Revisioned backends return the new revision
    /// and fail with [`StoreError::Conflict`] when `doc.rev` is stale.
    async fn put(&self, doc: &StorageDocument) -> std::result::Result<Option<String>, StoreError>;

    async fn list_ids(&self) -> std::result::Result<Vec<String>, StoreError>;

    /// Current revision token of a stored document, if any.
    ///
    /// Only the token is needed for a write, so backends may answer this
    /// without decoding the whole document.
    async fn revision(&self, id: &str) -> std::result::Result<Option<String>, StoreError> {
        Ok(self.get(id).await?.and_then(|doc| doc.rev))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub rev: Option<String>,
    /// Whether the first write hit a conflict and was retried
    pub conflict_retried: bool,
}

/// Get-then-put with the current revision, retrying once on conflict.
///
/// A second conflict is returned to the caller.
pub async fn save_player(
    store: &dyn PlayerStore,
    record: PlayerRecord,
) -> std::result::Result<SaveOutcome, StoreError> {
    let current = store.revision(&record.id).await?;
    let doc = StorageDocument::new(record).with_rev(current);

    match store.put(&doc).await {
        Ok(rev) => {
            debug!(id = %doc.id, rev = ?rev, backend = store.kind(), "stored player");
            Ok(SaveOutcome {
                rev,
                conflict_retried: false,
            })
        }
        Err(StoreError::Conflict { id }) => {
            PlayerMetrics::record_conflict();
            warn!(%id, "revision conflict, re-reading and retrying once");
            let latest = store.revision(&id).await?;
            let rev = store.put(&doc.with_rev(latest)).await?;
            Ok(SaveOutcome {
                rev,
                conflict_retried: true,
            })
        }
        Err(e) => Err(e),
    }
}

/// Build the backend selected by `config.storage_mode`.
///
/// For CouchDB the database is created when missing.
pub async fn open_store(
    config: &ScraperConfig,
    http: Arc<dyn HttpClientPort>,
) -> Result<Arc<dyn PlayerStore>> {
    let store: Arc<dyn PlayerStore> = match config.storage_mode {
        StorageMode::File => Arc::new(FileStore::new(&config.storage_dir)),
        StorageMode::Memory => Arc::new(InMemoryStore::new()),
        StorageMode::CouchDb => {
            let couch = CouchDbStore::new(http, &config.couchdb);
            couch.ensure_database().await?;
            Arc::new(couch)
        }
    };
    Ok(store)
}
