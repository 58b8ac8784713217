use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER, USER_AGENT};
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::{BROWSER_HEADERS, DEFAULT_TIMEOUT_SECS, USER_AGENTS};
use crate::error::NetworkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Head,
    Put,
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub timeout: Option<Duration>,
    /// (username, password)
    pub basic_auth: Option<(String, Option<String>)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Head, url)
    }

    pub fn put(url: impl Into<String>, body: String) -> Self {
        let mut req = Self::new(HttpMethod::Put, url);
        req.body = Some(body);
        req.headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        req
    }

    fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
            basic_auth: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_basic_auth(mut self, username: String, password: Option<String>) -> Self {
        self.basic_auth = Some((username, password));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
    /// Seconds from a numeric `Retry-After` header
    pub retry_after: Option<u64>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound HTTP seam. Non-2xx statuses are returned as responses, not errors;
/// only transport failures map to [`NetworkError`].
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError>;
}

/// reqwest-backed client that presents itself like a desktop browser.
pub struct ReqwestHttp {
    client: reqwest::Client,
    rotate_user_agent: bool,
}

impl ReqwestHttp {
    pub fn new() -> Result<Self, NetworkError> {
        let mut headers = HeaderMap::new();
        for (name, value) in BROWSER_HEADERS {
            headers.insert(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .gzip(true)
            .deflate(true)
            .build()
            .map_err(|e| NetworkError::Transport {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            rotate_user_agent: true,
        })
    }

    /// Keep reqwest's own User-Agent; used for API backends like CouchDB.
    pub fn without_user_agent_rotation(mut self) -> Self {
        self.rotate_user_agent = false;
        self
    }

    fn pick_user_agent() -> &'static str {
        USER_AGENTS
            .choose(&mut rand::thread_rng())
            .copied()
            .unwrap_or(USER_AGENTS[0])
    }
}

fn map_reqwest_error(url: &str, err: reqwest::Error) -> NetworkError {
    if err.is_timeout() {
        NetworkError::Timeout {
            url: url.to_string(),
        }
    } else {
        NetworkError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, NetworkError> {
        let url = request.url.as_str();
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Head => self.client.head(url),
            HttpMethod::Put => self.client.put(url),
        };
        if self.rotate_user_agent {
            builder = builder.header(USER_AGENT, Self::pick_user_agent());
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some((user, pass)) = request.basic_auth {
            builder = builder.basic_auth(user, pass);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;
        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let body = resp.text().await.map_err(|e| map_reqwest_error(url, e))?;

        if status >= 400 {
            warn!(url, status, "non-success response");
        } else {
            debug!(url, status, bytes = body.len(), "response received");
        }
        Ok(HttpResponse {
            status,
            body,
            retry_after,
        })
    }
}
