use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::constants::*;
use crate::error::{Result, ScraperError};
use crate::fetcher::RetryPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    #[default]
    File,
    CouchDb,
    /// Keep documents in process only; nothing is persisted
    Memory,
}

impl FromStr for StorageMode {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(StorageMode::File),
            "couchdb" | "couch" => Ok(StorageMode::CouchDb),
            "memory" | "dry-run" => Ok(StorageMode::Memory),
            other => Err(ScraperError::Config(format!(
                "unknown storage mode '{other}' (expected file, couchdb or memory)"
            ))),
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageMode::File => "file",
            StorageMode::CouchDb => "couchdb",
            StorageMode::Memory => "memory",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouchDbConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: String,
}

impl Default for CouchDbConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_COUCHDB_URL.to_string(),
            username: None,
            password: None,
            database: DEFAULT_COUCHDB_DATABASE.to_string(),
        }
    }
}

/// Everything a run needs, passed explicitly to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub base_url: String,
    pub storage_mode: StorageMode,
    pub storage_dir: PathBuf,
    /// Empty means every letter A-Z
    pub letters: Vec<char>,
    pub max_players_per_letter: Option<usize>,
    pub max_players: Option<usize>,
    /// Re-scrape players that are already stored
    pub force_refresh: bool,
    /// Ignore cached letter indexes
    pub refresh_index: bool,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub request_timeout_secs: u64,
    pub request_delay_ms: u64,
    pub concurrency: usize,
    pub couchdb: CouchDbConfig,
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            storage_mode: StorageMode::default(),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            letters: Vec::new(),
            max_players_per_letter: None,
            max_players: None,
            force_refresh: false,
            refresh_index: false,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_BACKOFF_MS,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            concurrency: DEFAULT_CONCURRENCY,
            couchdb: CouchDbConfig::default(),
            metrics_addr: None,
        }
    }
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ScraperError::Config(format!("invalid value for {key}: '{value}'")))
}

/// `"a, B,c"` -> `['A', 'B', 'C']`
pub fn parse_letters(raw: &str) -> Result<Vec<char>> {
    let mut letters = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let mut chars = part.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_alphabetic() => letters.push(c.to_ascii_uppercase()),
            _ => {
                return Err(ScraperError::Config(format!(
                    "invalid letter '{part}': expected a single letter A-Z"
                )))
            }
        }
    }
    Ok(letters)
}

impl ScraperConfig {
    /// Defaults, overlaid by `path` when given, then by the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_toml_file(p)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(toml::from_str(&content)?)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay settings from a key lookup. Unset and empty keys are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CFB_BASE_URL") {
            self.base_url = v.trim().to_string();
        }
        if let Some(v) = get("STORAGE_MODE") {
            self.storage_mode = v.parse()?;
        }
        if let Some(v) = get("CFB_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(v);
        }
        if let Some(v) = get("CFB_LETTERS") {
            self.letters = parse_letters(&v)?;
        }
        if let Some(v) = get("CFB_MAX_PLAYERS") {
            self.max_players = Some(parse_env("CFB_MAX_PLAYERS", &v)?);
        }
        if let Some(v) = get("CFB_MAX_PER_LETTER") {
            self.max_players_per_letter = Some(parse_env("CFB_MAX_PER_LETTER", &v)?);
        }
        if let Some(v) = get("CFB_MAX_RETRIES") {
            self.max_retries = parse_env("CFB_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("CFB_BACKOFF_MS") {
            self.initial_backoff_ms = parse_env("CFB_BACKOFF_MS", &v)?;
        }
        if let Some(v) = get("CFB_TIMEOUT_SECS") {
            self.request_timeout_secs = parse_env("CFB_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("CFB_REQUEST_DELAY_MS") {
            self.request_delay_ms = parse_env("CFB_REQUEST_DELAY_MS", &v)?;
        }
        if let Some(v) = get("CFB_CONCURRENCY") {
            self.concurrency = parse_env("CFB_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("COUCHDB_URL") {
            self.couchdb.url = v.trim().to_string();
        }
        if let Some(v) = get("COUCHDB_USERNAME") {
            self.couchdb.username = Some(v);
        }
        if let Some(v) = get("COUCHDB_PASSWORD") {
            self.couchdb.password = Some(v);
        }
        if let Some(v) = get("COUCHDB_DATABASE") {
            self.couchdb.database = v.trim().to_string();
        }
        if let Some(v) = get("CFB_METRICS_ADDR") {
            self.metrics_addr = Some(parse_env("CFB_METRICS_ADDR", &v)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(ScraperError::Config("base_url must not be empty".into()));
        }
        if let Some(bad) = self.letters.iter().find(|c| !c.is_ascii_alphabetic()) {
            return Err(ScraperError::Config(format!(
                "invalid letter '{bad}': expected A-Z"
            )));
        }
        if self.max_retries == 0 {
            return Err(ScraperError::Config(
                "max_retries must allow at least one attempt".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ScraperError::Config("concurrency must be at least 1".into()));
        }
        if self.storage_mode == StorageMode::CouchDb
            && (self.couchdb.url.trim().is_empty() || self.couchdb.database.trim().is_empty())
        {
            return Err(ScraperError::Config(
                "couchdb storage needs both a url and a database name".into(),
            ));
        }
        Ok(())
    }

    /// Letters to scrape, uppercased and de-duplicated in the order given.
    pub fn target_letters(&self) -> Vec<char> {
        if self.letters.is_empty() {
            return ALPHABET.to_vec();
        }
        let mut out: Vec<char> = Vec::with_capacity(self.letters.len());
        for c in self.letters.iter().map(char::to_ascii_uppercase) {
            if !out.contains(&c) {
                out.push(c);
            }
        }
        out
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: self.initial_backoff(),
            timeout: self.request_timeout(),
        }
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.storage_dir.join(LOGS_DIR)
    }
}
