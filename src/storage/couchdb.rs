use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use super::PlayerStore;
use crate::config::CouchDbConfig;
use crate::error::StoreError;
use crate::infra::{HttpClientPort, HttpRequest, HttpResponse};
use crate::types::StorageDocument;

/// Players as documents in a CouchDB database, keyed by slug.
pub struct CouchDbStore {
    http: Arc<dyn HttpClientPort>,
    base_url: String,
    database: String,
    auth: Option<(String, Option<String>)>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    rev: Option<String>,
}

/// Any document body, read only for its revision
#[derive(Debug, Deserialize)]
struct RevisionOnly {
    #[serde(rename = "_rev")]
    rev: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AllDocs {
    rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
struct AllDocsRow {
    id: String,
}

impl CouchDbStore {
    pub fn new(http: Arc<dyn HttpClientPort>, config: &CouchDbConfig) -> Self {
        Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            auth: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
        }
    }

    fn db_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    fn doc_url(&self, id: &str) -> String {
        format!("{}/{}", self.db_url(), id)
    }

    async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse, StoreError> {
        if let Some((user, pass)) = &self.auth {
            request = request.with_basic_auth(user.clone(), pass.clone());
        }
        Ok(self.http.execute(request).await?)
    }

    fn unexpected(resp: HttpResponse) -> StoreError {
        StoreError::UnexpectedStatus {
            status: resp.status,
            body: resp.body,
        }
    }

    /// Create the database if it does not exist yet.
    pub async fn ensure_database(&self) -> Result<(), StoreError> {
        let head = self.send(HttpRequest::head(self.db_url())).await?;
        match head.status {
            200 => {
                debug!(database = %self.database, "database exists");
                Ok(())
            }
            404 => {
                let created = self
                    .send(HttpRequest::put(self.db_url(), String::new()))
                    .await?;
                match created.status {
                    // 412: someone else created it in between
                    201 | 202 | 412 => {
                        info!(database = %self.database, "created CouchDB database");
                        Ok(())
                    }
                    _ => Err(Self::unexpected(created)),
                }
            }
            _ => Err(Self::unexpected(head)),
        }
    }
}

#[async_trait]
impl PlayerStore for CouchDbStore {
    fn kind(&self) -> &'static str {
        "couchdb"
    }

    async fn exists(&self, id: &str) -> Result<bool, StoreError> {
        let resp = self.send(HttpRequest::head(self.doc_url(id))).await?;
        match resp.status {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(Self::unexpected(resp)),
        }
    }

    async fn revision(&self, id: &str) -> Result<Option<String>, StoreError> {
        let resp = self.send(HttpRequest::get(self.doc_url(id))).await?;
        match resp.status {
            200 => Ok(serde_json::from_str::<RevisionOnly>(&resp.body)?.rev),
            404 => Ok(None),
            _ => Err(Self::unexpected(resp)),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<StorageDocument>, StoreError> {
        let resp = self.send(HttpRequest::get(self.doc_url(id))).await?;
        match resp.status {
            200 => Ok(Some(serde_json::from_str(&resp.body)?)),
            404 => Ok(None),
            _ => Err(Self::unexpected(resp)),
        }
    }

    async fn put(&self, doc: &StorageDocument) -> Result<Option<String>, StoreError> {
        let body = serde_json::to_string(doc)?;
        let resp = self
            .send(HttpRequest::put(self.doc_url(&doc.id), body))
            .await?;
        match resp.status {
            200 | 201 | 202 => {
                let parsed: PutResponse = serde_json::from_str(&resp.body)?;
                Ok(parsed.rev)
            }
            409 => Err(StoreError::Conflict { id: doc.id.clone() }),
            _ => Err(Self::unexpected(resp)),
        }
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let resp = self
            .send(HttpRequest::get(format!("{}/_all_docs", self.db_url())))
            .await?;
        if resp.status != 200 {
            return Err(Self::unexpected(resp));
        }
        let all: AllDocs = serde_json::from_str(&resp.body)?;
        Ok(all
            .rows
            .into_iter()
            .map(|row| row.id)
            .filter(|id| !id.starts_with('_'))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeCouch;
    use serde_json::json;

    fn config() -> CouchDbConfig {
        CouchDbConfig {
            url: "http://couch.test/".into(),
            username: Some("admin".into()),
            password: Some("secret".into()),
            database: "players".into(),
        }
    }

    #[tokio::test]
    async fn creates_missing_database_once() {
        let fake = Arc::new(FakeCouch::new("http://couch.test"));
        let store = CouchDbStore::new(fake.clone(), &config());
        store.ensure_database().await.unwrap();
        assert!(fake.database_exists());
        // second call sees 200 and does nothing
        store.ensure_database().await.unwrap();
    }

    #[tokio::test]
    async fn absent_document_does_not_exist() {
        let fake = Arc::new(FakeCouch::new("http://couch.test").with_database());
        let store = CouchDbStore::new(fake, &config());
        assert!(!store.exists("nobody-1").await.unwrap());
        assert!(store.get("nobody-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_ids_skips_design_documents() {
        let fake = Arc::new(
            FakeCouch::new("http://couch.test")
                .with_database()
                .with_doc("_design/views", json!({}))
                .with_doc("b-player-1", json!({}))
                .with_doc("a-player-1", json!({})),
        );
        let store = CouchDbStore::new(fake, &config());
        assert_eq!(
            store.list_ids().await.unwrap(),
            vec!["a-player-1".to_string(), "b-player-1".to_string()]
        );
    }

    #[tokio::test]
    async fn documents_in_another_schema_exist_and_can_be_replaced() {
        let fake = Arc::new(
            FakeCouch::new("http://couch.test")
                .with_database()
                .with_doc(
                    "tom-brady-1",
                    json!({
                        "player_id": "tom-brady-1",
                        "player_info": {"name": "Tom Brady"},
                        "season_stats": []
                    }),
                ),
        );
        let store = CouchDbStore::new(fake.clone(), &config());
        assert!(store.exists("tom-brady-1").await.unwrap());
        assert_eq!(
            store.revision("tom-brady-1").await.unwrap().as_deref(),
            Some("1-fake")
        );

        let record: crate::types::PlayerRecord = serde_json::from_value(json!({
            "id": "tom-brady-1",
            "name": "Tom Brady",
            "source_url": "https://example.test/cfb/players/tom-brady-1.html",
            "school": "Michigan",
            "position": "QB",
            "height": null,
            "weight": null,
            "stats": [],
            "scraped_at": "2024-09-01T12:00:00Z"
        }))
        .unwrap();
        let outcome = crate::storage::save_player(&store, record).await.unwrap();
        assert_eq!(outcome.rev.as_deref(), Some("2-fake"));
        assert!(!outcome.conflict_retried);
        assert_eq!(fake.doc_count(), 1);
        let stored = store.get("tom-brady-1").await.unwrap().unwrap();
        assert_eq!(stored.record.school.as_deref(), Some("Michigan"));
    }

    #[tokio::test]
    async fn stale_revision_is_a_conflict() {
        let fake = Arc::new(
            FakeCouch::new("http://couch.test")
                .with_database()
                .with_doc("jane-doe-1", json!({"name": "Jane Doe"})),
        );
        let store = CouchDbStore::new(fake, &config());
        let record: crate::types::PlayerRecord = serde_json::from_value(json!({
            "id": "jane-doe-1",
            "name": "Jane Doe",
            "source_url": "https://example.test/cfb/players/jane-doe-1.html",
            "school": null,
            "position": null,
            "height": null,
            "weight": null,
            "stats": [],
            "scraped_at": "2024-09-01T12:00:00Z"
        }))
        .unwrap();
        // no _rev on an existing document
        let err = store
            .put(&StorageDocument::new(record))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { id } if id == "jane-doe-1"));
    }
}
