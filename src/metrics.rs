//! Counters and histograms for the scraper.
//!
//! The `metrics` macros are no-ops until a recorder is installed, so library
//! code records unconditionally and only the binary decides whether to export.

use std::net::SocketAddr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

/// Install the Prometheus exporter on `addr`. Idempotent; `None` leaves
/// metrics unrecorded.
pub fn init_metrics(addr: Option<SocketAddr>) {
    let Some(addr) = addr else {
        return;
    };
    INIT.call_once(|| {
        let builder =
            metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
        match builder.install() {
            Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
            Err(e) => warn!("Prometheus exporter install failed: {}", e),
        }
    });
}

/// Outbound request metrics
pub struct FetchMetrics;

impl FetchMetrics {
    pub fn record_attempt() {
        ::metrics::counter!("cfb_fetch_attempts_total").increment(1);
    }

    pub fn record_retry(reason: &'static str) {
        ::metrics::counter!("cfb_fetch_retries_total", "reason" => reason).increment(1);
    }

    pub fn record_failure() {
        ::metrics::counter!("cfb_fetch_failures_total").increment(1);
    }

    pub fn record_duration(duration_secs: f64) {
        ::metrics::histogram!("cfb_fetch_duration_seconds").record(duration_secs);
    }
}

/// Per-player outcome metrics
pub struct PlayerMetrics;

impl PlayerMetrics {
    pub fn record_stored(stat_rows: usize) {
        ::metrics::counter!("cfb_players_stored_total").increment(1);
        ::metrics::histogram!("cfb_player_stat_rows").record(stat_rows as f64);
    }

    pub fn record_skipped() {
        ::metrics::counter!("cfb_players_skipped_total").increment(1);
    }

    pub fn record_failed(stage: &'static str) {
        ::metrics::counter!("cfb_players_failed_total", "stage" => stage).increment(1);
    }

    pub fn record_parse_warning() {
        ::metrics::counter!("cfb_parse_warnings_total").increment(1);
    }

    pub fn record_conflict() {
        ::metrics::counter!("cfb_store_conflicts_total").increment(1);
    }
}

pub struct RunMetrics;

impl RunMetrics {
    pub fn record_index_entries(letter: char, entries: usize) {
        ::metrics::counter!("cfb_index_entries_total", "letter" => letter.to_string())
            .increment(entries as u64);
    }

    pub fn record_run(duration_secs: f64, targets: usize) {
        ::metrics::histogram!("cfb_run_duration_seconds").record(duration_secs);
        ::metrics::histogram!("cfb_run_targets").record(targets as f64);
    }
}
