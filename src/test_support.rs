//! HTTP doubles shared by unit tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::NetworkError;
use crate::infra::{HttpClientPort, HttpMethod, HttpRequest, HttpResponse};

type Scripted = Result<HttpResponse, NetworkError>;

/// Replays queued responses per URL. The last queued response repeats;
/// unknown URLs answer 404. Every call is recorded.
#[derive(Default)]
pub struct ScriptedHttp {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, url: &str, response: Scripted) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }

    pub fn page(self, url: &str, html: &str) -> Self {
        self.on(url, Ok(HttpResponse::new(200, html)))
    }

    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpClientPort for ScriptedHttp {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        self.calls.lock().unwrap().push(request.url.clone());
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(&request.url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap(),
            None => Ok(HttpResponse::new(404, "not found")),
        }
    }
}

/// Minimal CouchDB emulation: one database, numbered revisions, 409 on a
/// stale or missing `_rev`.
pub struct FakeCouch {
    base: String,
    state: Mutex<CouchState>,
}

#[derive(Default)]
struct CouchState {
    db_exists: bool,
    docs: HashMap<String, (u64, Value)>,
    puts: usize,
    /// Bump the stored revision right before the next PUT lands
    interfere_next_put: bool,
}

impl FakeCouch {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            state: Mutex::new(CouchState::default()),
        }
    }

    pub fn with_database(self) -> Self {
        self.state.lock().unwrap().db_exists = true;
        self
    }

    pub fn with_doc(self, id: &str, body: Value) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let mut body = body;
            body["_id"] = json!(id);
            body["_rev"] = json!("1-fake");
            state.docs.insert(id.to_string(), (1, body));
        }
        self
    }

    pub fn interfere_next_put(&self) {
        self.state.lock().unwrap().interfere_next_put = true;
    }

    pub fn doc_count(&self) -> usize {
        self.state.lock().unwrap().docs.len()
    }

    pub fn put_count(&self) -> usize {
        self.state.lock().unwrap().puts
    }

    pub fn revision(&self, id: &str) -> Option<u64> {
        self.state.lock().unwrap().docs.get(id).map(|(n, _)| *n)
    }

    pub fn database_exists(&self) -> bool {
        self.state.lock().unwrap().db_exists
    }

    fn respond(status: u16, body: Value) -> HttpResponse {
        HttpResponse::new(status, body.to_string())
    }
}

#[async_trait]
impl HttpClientPort for FakeCouch {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        let path = request
            .url
            .strip_prefix(&self.base)
            .unwrap_or(&request.url)
            .trim_start_matches('/');
        let path = path.split('?').next().unwrap_or(path);
        let mut segments = path.splitn(2, '/');
        let db = segments.next().unwrap_or_default();
        let doc = segments.next();
        let mut state = self.state.lock().unwrap();

        let not_found = || Self::respond(404, json!({"error": "not_found"}));

        let resp = match (request.method, doc) {
            (HttpMethod::Head, None) | (HttpMethod::Get, None) => {
                if state.db_exists {
                    Self::respond(200, json!({"db_name": db}))
                } else {
                    not_found()
                }
            }
            (HttpMethod::Put, None) => {
                if state.db_exists {
                    Self::respond(412, json!({"error": "file_exists"}))
                } else {
                    state.db_exists = true;
                    Self::respond(201, json!({"ok": true}))
                }
            }
            _ if !state.db_exists => not_found(),
            (HttpMethod::Get, Some("_all_docs")) => {
                let mut ids: Vec<&String> = state.docs.keys().collect();
                ids.sort();
                let rows: Vec<Value> = ids.iter().map(|id| json!({"id": id, "key": id})).collect();
                Self::respond(200, json!({"total_rows": rows.len(), "rows": rows}))
            }
            (HttpMethod::Get, Some(id)) | (HttpMethod::Head, Some(id)) => {
                match state.docs.get(id) {
                    Some((_, body)) => Self::respond(200, body.clone()),
                    None => not_found(),
                }
            }
            (HttpMethod::Put, Some(id)) => {
                state.puts += 1;
                if state.interfere_next_put {
                    state.interfere_next_put = false;
                    if let Some((n, body)) = state.docs.get_mut(id) {
                        *n += 1;
                        body["_rev"] = json!(format!("{n}-fake"));
                    }
                }
                let mut body: Value = serde_json::from_str(request.body.as_deref().unwrap_or("{}"))
                    .unwrap_or(Value::Null);
                let sent_rev = body.get("_rev").and_then(Value::as_str).map(str::to_string);
                let current = state.docs.get(id).map(|(n, _)| *n);
                let expected = current.map(|n| format!("{n}-fake"));
                if sent_rev != expected {
                    Self::respond(409, json!({"error": "conflict"}))
                } else {
                    let next = current.unwrap_or(0) + 1;
                    let rev = format!("{next}-fake");
                    body["_rev"] = json!(rev);
                    state.docs.insert(id.to_string(), (next, body));
                    Self::respond(201, json!({"ok": true, "id": id, "rev": rev}))
                }
            }
        };
        Ok(resp)
    }
}
