use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use super::PlayerStore;
use crate::error::StoreError;
use crate::types::StorageDocument;

/// In-process store for dry runs and tests. Revisions follow the CouchDB
/// rules: an update must carry the current `_rev`.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    docs: Arc<Mutex<HashMap<String, (u64, StorageDocument)>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.docs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.docs.lock().await.is_empty()
    }

    fn rev_token(n: u64) -> String {
        format!("{n}-mem")
    }
}

#[async_trait]
impl PlayerStore for InMemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.docs.lock().await.contains_key(id))
    }

    async fn get(&self, id: &str) -> Result<Option<StorageDocument>, StoreError> {
        Ok(self.docs.lock().await.get(id).map(|(_, doc)| doc.clone()))
    }

    async fn put(&self, doc: &StorageDocument) -> Result<Option<String>, StoreError> {
        let mut docs = self.docs.lock().await;
        let current = docs.get(&doc.id).map(|(n, _)| *n);
        if doc.rev != current.map(Self::rev_token) {
            return Err(StoreError::Conflict { id: doc.id.clone() });
        }
        let next = current.unwrap_or(0) + 1;
        let rev = Self::rev_token(next);
        let stored = doc.clone().with_rev(Some(rev.clone()));
        docs.insert(doc.id.clone(), (next, stored));
        debug!(id = %doc.id, %rev, "kept player in memory");
        Ok(Some(rev))
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.docs.lock().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
