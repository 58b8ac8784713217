use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::constants::PLAYERS_PATH;
use crate::parser::table::clean_text;
use crate::types::IndexEntry;

/// Containers that hold the player list on an index page, most specific first.
static INDEX_CONTAINERS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["div#div_players", "table#players", "div#players"]
        .iter()
        .map(|s| Selector::parse(s).expect("static selector"))
        .collect()
});
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("static selector"));

/// URL of page `page` (1-based) of the index for `letter`.
pub fn index_page_url(base_url: &str, letter: char, page: u32) -> String {
    let suffix = if page <= 1 {
        String::new()
    } else {
        format!("-{page}")
    };
    format!(
        "{}{}{}-index{}.html",
        base_url.trim_end_matches('/'),
        PLAYERS_PATH,
        letter.to_ascii_lowercase(),
        suffix
    )
}

fn is_player_href(href: &str) -> bool {
    let path = href.split(['?', '#']).next().unwrap_or(href);
    path.contains(PLAYERS_PATH)
        && path.ends_with(".html")
        && !path.contains("index")
        && path
            .split_once(PLAYERS_PATH)
            .map(|(_, stem)| !stem.is_empty() && !stem.contains('/'))
            .unwrap_or(false)
}

fn absolutize(base: Option<&Url>, href: &str) -> String {
    match base.and_then(|b| b.join(href).ok()) {
        Some(url) => url.to_string(),
        None => href.to_string(),
    }
}

/// Extract player links from one index page in document order.
///
/// Only anchors inside the players container are considered. A page without
/// that container yields an empty list; callers treat that as "possibly
/// incomplete" rather than as a failure.
pub fn extract_index(html: &str, base_url: &str) -> Vec<IndexEntry> {
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let Some(container) = INDEX_CONTAINERS
        .iter()
        .find_map(|sel| document.select(sel).next())
    else {
        warn!("index page has no players container");
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for link in container.select(&ANCHOR) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if !is_player_href(href) {
            continue;
        }
        let name = clean_text(link);
        if name.chars().count() < 2 {
            continue;
        }
        let profile_url = absolutize(base.as_ref(), href);
        if !seen.insert(profile_url.clone()) {
            continue;
        }
        entries.push(IndexEntry { name, profile_url });
    }

    debug!(count = entries.len(), "extracted index entries");
    entries
}
