use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ScraperConfig;
use crate::constants::{MAX_INDEX_PAGES, SUMMARY_REPORT_FILE};
use crate::error::{ParseError, Result, ScraperError};
use crate::fetcher::Fetcher;
use crate::infra::{HttpClientPort, RateLimiter, ReqwestHttp};
use crate::metrics::{PlayerMetrics, RunMetrics};
use crate::parser::{extract_index, extract_player, index_page_url};
use crate::storage::index_cache::write_json;
use crate::storage::{open_store, save_player, IndexCache, PlayerStore};
use crate::types::{IndexEntry, LetterIndex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Index, then every selected player
    Full,
    IndexOnly,
    /// Players from the consolidated index already on disk
    PlayersOnly,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunMode::Full => "full",
            RunMode::IndexOnly => "index_only",
            RunMode::PlayersOnly => "players_only",
        })
    }
}

/// Result of one run, also written to `scraping_summary.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: RunMode,
    pub letters: Vec<char>,
    pub index_entries: usize,
    pub targets: usize,
    pub stored: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Players stored without stats
    pub warnings: usize,
    pub conflicts_retried: usize,
    pub failures: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
}

impl RunSummary {
    pub fn new(mode: RunMode, letters: Vec<char>) -> Self {
        Self {
            mode,
            letters,
            index_entries: 0,
            targets: 0,
            stored: 0,
            skipped: 0,
            failed: 0,
            warnings: 0,
            conflicts_retried: 0,
            failures: Vec::new(),
            started_at: Utc::now(),
            duration_secs: 0.0,
        }
    }

    fn record(&mut self, outcome: PlayerOutcome) {
        match outcome {
            PlayerOutcome::Stored {
                warning,
                conflict_retried,
            } => {
                self.stored += 1;
                self.warnings += usize::from(warning);
                self.conflicts_retried += usize::from(conflict_retried);
            }
            PlayerOutcome::Skipped => self.skipped += 1,
            PlayerOutcome::Failed { id, reason } => {
                self.failed += 1;
                self.failures.push(format!("{id}: {reason}"));
            }
        }
    }

    pub fn processed(&self) -> usize {
        self.stored + self.skipped + self.failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerOutcome {
    Stored { warning: bool, conflict_retried: bool },
    Skipped,
    Failed { id: String, reason: String },
}

/// Apply the per-letter cap to each group, drop repeated players, then apply
/// the overall cap. Order is preserved.
pub fn filter_targets<'a, I>(groups: I, per_letter: Option<usize>, max_total: Option<usize>) -> Vec<IndexEntry>
where
    I: IntoIterator<Item = &'a [IndexEntry]>,
{
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for group in groups {
        let mut taken = 0;
        for entry in group {
            if per_letter.is_some_and(|cap| taken >= cap) {
                break;
            }
            if !seen.insert(entry.player_id()) {
                continue;
            }
            targets.push(entry.clone());
            taken += 1;
        }
    }
    if let Some(max) = max_total {
        targets.truncate(max);
    }
    targets
}

/// Fetch, extract and store one player. Cheap to clone into worker tasks.
#[derive(Clone)]
struct PlayerWorker {
    fetcher: Fetcher,
    store: Arc<dyn PlayerStore>,
    force_refresh: bool,
}

impl PlayerWorker {
    #[instrument(skip(self, entry), fields(player = %entry.name))]
    async fn process(&self, entry: IndexEntry) -> PlayerOutcome {
        let id = entry.player_id();
        let failed = |reason: String| PlayerOutcome::Failed {
            id: id.clone(),
            reason,
        };

        // Checked before fetching so stored players cost no request.
        if !self.force_refresh {
            match self.store.exists(&id).await {
                Ok(true) => {
                    debug!(%id, "already stored, skipping");
                    PlayerMetrics::record_skipped();
                    return PlayerOutcome::Skipped;
                }
                Ok(false) => {}
                Err(e) => {
                    PlayerMetrics::record_failed("store");
                    warn!(%id, error = %e, "existence check failed");
                    return failed(format!("existence check failed: {e}"));
                }
            }
        }

        let html = match self.fetcher.fetch(&entry.profile_url).await {
            Ok(html) => html,
            Err(e) => {
                PlayerMetrics::record_failed("fetch");
                warn!(%id, error = %e, "could not fetch player page");
                return failed(e.to_string());
            }
        };

        let (mut record, warning) = match extract_player(&html, &entry.profile_url) {
            Ok(record) => (record, false),
            Err(ParseError::MissingStats { record }) => {
                PlayerMetrics::record_parse_warning();
                warn!(%id, "no stat tables found, storing bio only");
                (*record, true)
            }
            Err(e) => {
                PlayerMetrics::record_failed("parse");
                warn!(%id, error = %e, "could not parse player page");
                return failed(e.to_string());
            }
        };
        // Keep the id the skip check used, even if the page spells the name differently.
        record.id = id.clone();
        let stat_rows = record.stats.len();

        match save_player(self.store.as_ref(), record).await {
            Ok(outcome) => {
                PlayerMetrics::record_stored(stat_rows);
                info!(%id, stat_rows, "stored player");
                PlayerOutcome::Stored {
                    warning,
                    conflict_retried: outcome.conflict_retried,
                }
            }
            Err(e) => {
                PlayerMetrics::record_failed("store");
                error!(%id, error = %e, "could not store player");
                failed(e.to_string())
            }
        }
    }
}

/// Drives a run: load the index, pick targets, then fetch and store players.
pub struct Orchestrator {
    config: Arc<ScraperConfig>,
    fetcher: Fetcher,
    store: Arc<dyn PlayerStore>,
    index_cache: IndexCache,
}

impl Orchestrator {
    pub fn new(config: ScraperConfig, fetcher: Fetcher, store: Arc<dyn PlayerStore>) -> Self {
        let index_cache = IndexCache::new(&config.storage_dir);
        Self {
            config: Arc::new(config),
            fetcher,
            store,
            index_cache,
        }
    }

    /// Wire the reqwest clients and the configured store.
    pub async fn from_config(config: ScraperConfig) -> Result<Self> {
        let site: Arc<dyn HttpClientPort> = Arc::new(ReqwestHttp::new()?);
        let api: Arc<dyn HttpClientPort> = Arc::new(ReqwestHttp::new()?.without_user_agent_rotation());
        let fetcher = Fetcher::new(
            site,
            RateLimiter::new(config.request_delay()),
            config.retry_policy(),
        );
        let store = open_store(&config, api).await?;
        Ok(Self::new(config, fetcher, store))
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn PlayerStore> {
        &self.store
    }

    pub fn summary_path(&self) -> PathBuf {
        self.config.storage_dir.join(SUMMARY_REPORT_FILE)
    }

    /// Run to completion. `Err` is the fatal outcome: the index could not be
    /// loaded. Per-player problems are counted in the summary instead.
    #[instrument(skip(self), fields(storage = self.store.kind()))]
    pub async fn run(&self, mode: RunMode) -> Result<RunSummary> {
        let started = Instant::now();
        let letters = self.config.target_letters();
        let mut summary = RunSummary::new(mode, letters.clone());
        info!(%mode, letters = letters.len(), "starting run");

        match mode {
            RunMode::IndexOnly => {
                let groups = self.load_index(&letters).await?;
                summary.index_entries = groups.iter().map(|g| g.entries.len()).sum();
            }
            RunMode::Full => {
                let groups = self.load_index(&letters).await?;
                summary.index_entries = groups.iter().map(|g| g.entries.len()).sum();
                let targets = filter_targets(
                    groups.iter().map(|g| g.entries.as_slice()),
                    self.config.max_players_per_letter,
                    self.config.max_players,
                );
                self.scrape_players(targets, &mut summary).await;
            }
            RunMode::PlayersOnly => {
                let entries = self.index_cache.load_consolidated().await?.ok_or_else(|| {
                    ScraperError::IndexUnavailable(format!(
                        "no consolidated index at {}; run the index step first",
                        self.index_cache.consolidated_path().display()
                    ))
                })?;
                if !self.config.letters.is_empty() || self.config.max_players_per_letter.is_some() {
                    warn!("letter filters do not apply to the consolidated index; using max_players only");
                }
                summary.index_entries = entries.len();
                let targets =
                    filter_targets(std::iter::once(entries.as_slice()), None, self.config.max_players);
                self.scrape_players(targets, &mut summary).await;
            }
        }

        summary.duration_secs = started.elapsed().as_secs_f64();
        RunMetrics::record_run(summary.duration_secs, summary.targets);
        info!(
            targets = summary.targets,
            stored = summary.stored,
            skipped = summary.skipped,
            failed = summary.failed,
            warnings = summary.warnings,
            duration_secs = summary.duration_secs,
            "run finished"
        );

        if mode != RunMode::IndexOnly {
            let path = self.summary_path();
            if let Err(e) = write_json(&path, &summary).await {
                error!(path = %path.display(), error = %e, "could not write summary report");
            }
        }
        Ok(summary)
    }

    /// Per-letter indexes, from cache or the site, and the consolidated index.
    #[instrument(skip(self, letters))]
    pub async fn load_index(&self, letters: &[char]) -> Result<Vec<LetterIndex>> {
        let mut groups = Vec::with_capacity(letters.len());
        for &letter in letters {
            let cached = if self.config.refresh_index {
                None
            } else {
                match self.index_cache.load_letter(letter).await {
                    Ok(cached) => cached,
                    Err(e) => {
                        warn!(%letter, error = %e, "ignoring unreadable index cache");
                        None
                    }
                }
            };

            let index = match cached {
                Some(index) if !index.entries.is_empty() => {
                    info!(%letter, entries = index.entries.len(), "using cached index");
                    index
                }
                _ => {
                    let index = self.fetch_letter(letter).await?;
                    // An empty letter may be a block page; fetch it again next run.
                    if index.entries.is_empty() {
                        debug!(%letter, "not caching empty letter index");
                    } else if let Err(e) = self.index_cache.save_letter(&index).await {
                        warn!(%letter, error = %e, "could not cache letter index");
                    }
                    index
                }
            };

            if index.entries.is_empty() {
                warn!(%letter, "letter yielded no players; the index may be incomplete");
            }
            RunMetrics::record_index_entries(letter, index.entries.len());
            groups.push(index);
        }

        let mut seen = HashSet::new();
        let consolidated: Vec<IndexEntry> = groups
            .iter()
            .flat_map(|g| g.entries.iter())
            .filter(|e| seen.insert(e.profile_url.clone()))
            .cloned()
            .collect();
        self.index_cache.save_consolidated(&consolidated).await?;
        Ok(groups)
    }

    /// Walk a letter's index pages until one is empty, repeats, or is missing.
    async fn fetch_letter(&self, letter: char) -> Result<LetterIndex> {
        let base = self.config.base_url.as_str();
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for page in 1..=MAX_INDEX_PAGES {
            let url = index_page_url(base, letter, page);
            let html = match self.fetcher.fetch(&url).await {
                Ok(html) => html,
                Err(e) if page > 1 && e.is_not_found() => {
                    debug!(%letter, page, "no further index pages");
                    break;
                }
                Err(e) => {
                    error!(%letter, page, error = %e, "index fetch failed");
                    return Err(ScraperError::IndexUnavailable(format!(
                        "letter {letter} page {page}: {e}"
                    )));
                }
            };

            let found = extract_index(&html, base);
            let before = entries.len();
            entries.extend(
                found
                    .into_iter()
                    .filter(|e| seen.insert(e.profile_url.clone())),
            );
            let added = entries.len() - before;
            debug!(%letter, page, added, "index page parsed");
            if added == 0 {
                break;
            }
            if page == MAX_INDEX_PAGES {
                warn!(%letter, "stopped at the index page limit");
            }
        }

        info!(%letter, entries = entries.len(), "fetched letter index");
        Ok(LetterIndex { letter, entries })
    }

    async fn scrape_players(&self, targets: Vec<IndexEntry>, summary: &mut RunSummary) {
        summary.targets = targets.len();
        let total = targets.len();
        info!(total, concurrency = self.config.concurrency, "scraping players");

        let worker = PlayerWorker {
            fetcher: self.fetcher.clone(),
            store: self.store.clone(),
            force_refresh: self.config.force_refresh,
        };

        if self.config.concurrency <= 1 {
            for (i, entry) in targets.into_iter().enumerate() {
                summary.record(worker.process(entry).await);
                if (i + 1) % 25 == 0 {
                    info!(done = i + 1, total, "progress");
                }
            }
            return;
        }

        let permits = Arc::new(Semaphore::new(self.config.concurrency));
        let mut tasks = JoinSet::new();
        for entry in targets {
            let permit = match permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, "worker pool closed");
                    break;
                }
            };
            let worker = worker.clone();
            tasks.spawn(async move {
                let _permit = permit;
                worker.process(entry).await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    error!(error = %e, "player task failed");
                    summary.failed += 1;
                    summary.failures.push(format!("worker task: {e}"));
                }
            }
            if summary.processed() % 25 == 0 {
                info!(done = summary.processed(), total, "progress");
            }
        }
    }
}
