use thiserror::Error;

use crate::types::PlayerRecord;

/// Failures talking to the scraped site or to a document database.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NetworkError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("transport error for {url}: {message}")]
    Transport { url: String, message: String },

    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("giving up on {url} after {attempts} attempts: {last}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last: Box<NetworkError>,
    },
}

impl NetworkError {
    /// Timeouts, connection failures, 5xx and 429 are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            NetworkError::Timeout { .. } | NetworkError::Transport { .. } => true,
            NetworkError::Status { status, .. } => *status == 429 || *status >= 500,
            NetworkError::RetriesExhausted { .. } => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            NetworkError::Status { status, .. } => *status == 404,
            NetworkError::RetriesExhausted { last, .. } => last.is_not_found(),
            _ => false,
        }
    }
}

/// Problems extracting a player from a profile page.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("no player name found on {url}")]
    MissingBio { url: String },

    /// The page had a usable bio but no recognised stat tables. The record is
    /// still returned so the caller can persist it with empty stats.
    #[error("no stat tables found for player {}", record.id)]
    MissingStats { record: Box<PlayerRecord> },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("revision conflict writing document {id}")]
    Conflict { id: String },

    #[error("storage request failed: {0}")]
    Transport(#[from] NetworkError),

    #[error("storage responded with HTTP {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),
}

pub type Result<T> = std::result::Result<T, ScraperError>;
