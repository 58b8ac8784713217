use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::PLAYERS_PATH;

/// One player link discovered on an index page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub profile_url: String,
}

impl IndexEntry {
    /// Stable storage identifier for this player.
    pub fn player_id(&self) -> String {
        player_slug(&self.profile_url, &self.name)
    }
}

/// All entries found across the pages of one letter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterIndex {
    pub letter: char,
    pub entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatCategory {
    Passing,
    RushingReceiving,
    DefenseFumbles,
    PuntingKicking,
    Scoring,
}

impl StatCategory {
    pub const ALL: [StatCategory; 5] = [
        StatCategory::Passing,
        StatCategory::RushingReceiving,
        StatCategory::DefenseFumbles,
        StatCategory::PuntingKicking,
        StatCategory::Scoring,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatCategory::Passing => "passing",
            StatCategory::RushingReceiving => "rushing_receiving",
            StatCategory::DefenseFumbles => "defense_fumbles",
            StatCategory::PuntingKicking => "punting_kicking",
            StatCategory::Scoring => "scoring",
        }
    }

    /// Identify a stats table from its caption or heading text.
    ///
    /// The site words these headings a few ways ("Rushing & Receiving Table",
    /// "Receiving and Rushing", "Kicking & Punting"), so matching is done on
    /// lowercased keywords rather than exact strings.
    pub fn from_heading(heading: &str) -> Option<Self> {
        let h = heading.to_lowercase();
        let skip = [
            "game log", "gamelog", "splits", "finder", "career high", "advanced", "analytics",
            "efficiency",
        ];
        if skip.iter().any(|s| h.contains(s)) {
            return None;
        }
        if h.contains("passing") {
            Some(StatCategory::Passing)
        } else if h.contains("rushing") || h.contains("receiving") {
            Some(StatCategory::RushingReceiving)
        } else if h.contains("defense") || h.contains("fumbles") {
            Some(StatCategory::DefenseFumbles)
        } else if h.contains("punting") || h.contains("kicking") {
            Some(StatCategory::PuntingKicking)
        } else if h.contains("scoring") {
            Some(StatCategory::Scoring)
        } else {
            None
        }
    }
}

impl fmt::Display for StatCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized table cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatValue {
    Int(i64),
    Decimal(f64),
    Text(String),
}

impl StatValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            StatValue::Int(v) => Some(*v),
            _ => None,
        }
    }
}

/// One season row of one stat category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatRow {
    pub season: String,
    pub category: StatCategory,
    pub team: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, StatValue>,
}

impl StatRow {
    pub fn get(&self, field: &str) -> Option<&StatValue> {
        self.fields.get(field)
    }

    pub fn int(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(StatValue::as_int)
    }
}

/// A table kept whole: every column, cells coerced but not renamed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatTable {
    pub title: String,
    pub rows: Vec<BTreeMap<String, StatValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: String,
    pub name: String,
    pub source_url: String,
    pub school: Option<String>,
    pub position: Option<String>,
    pub height: Option<String>,
    pub weight: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub born: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_school: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hometown: Option<String>,
    pub stats: Vec<StatRow>,
    /// Career totals, one row per category, season `"Career"`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub career: Vec<StatRow>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub game_logs: Vec<StatTable>,
    /// Advanced and efficiency tables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advanced: Vec<StatTable>,
    pub scraped_at: DateTime<Utc>,
}

/// Persisted form of a [`PlayerRecord`].
///
/// Serializes as the record itself plus the CouchDB `_id` and, once the
/// document exists, the `_rev` token that must accompany an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub record: PlayerRecord,
}

impl StorageDocument {
    pub fn new(record: PlayerRecord) -> Self {
        Self {
            id: record.id.clone(),
            rev: None,
            record,
        }
    }

    pub fn with_rev(mut self, rev: Option<String>) -> Self {
        self.rev = rev;
        self
    }
}

/// Derive the storage slug for a player.
///
/// Profile URLs already carry a disambiguated slug (`/cfb/players/john-smith-3.html`),
/// so that is preferred. Without one the name is slugified and given the `-1`
/// suffix the site uses for the first player of a name.
pub fn player_slug(profile_url: &str, name: &str) -> String {
    if let Some(id) = player_id_from_url(profile_url) {
        return id;
    }
    format!("{}-1", slugify(name))
}

/// `/cfb/players/john-smith-1.html` -> `john-smith-1`
pub fn player_id_from_url(url: &str) -> Option<String> {
    let (_, tail) = url.split_once(PLAYERS_PATH)?;
    let tail = tail.split(['?', '#']).next().unwrap_or(tail);
    let stem = tail.strip_suffix(".html")?;
    if stem.is_empty() || stem.contains('/') || stem.contains("index") {
        return None;
    }
    let slug = slugify(stem);
    (!slug.is_empty()).then_some(slug)
}

/// Lowercase, ASCII alphanumerics separated by single dashes.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else if c == '\'' || c == '.' {
            // "O'Brien" and "A.J." read better without a dash
        } else {
            pending_dash = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_prefers_url_identifier() {
        assert_eq!(
            player_slug(
                "https://www.sports-reference.com/cfb/players/cj-stroud-1.html",
                "C.J. Stroud"
            ),
            "cj-stroud-1"
        );
        assert_eq!(
            player_slug("/cfb/players/john-smith-12.html", "John Smith"),
            "john-smith-12"
        );
    }

    #[test]
    fn slug_falls_back_to_name() {
        assert_eq!(player_slug("", "Ja'Marr  Chase"), "jamarr-chase-1");
        assert_eq!(player_slug("/cfb/players/a-index.html", "A.J. Green"), "aj-green-1");
    }

    #[test]
    fn slugify_is_filesystem_safe() {
        let slug = slugify("  Weird/Name:With*Chars?  ");
        assert_eq!(slug, "weird-name-with-chars");
        assert!(slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn categories_from_headings() {
        assert_eq!(StatCategory::from_heading("Passing Table"), Some(StatCategory::Passing));
        assert_eq!(
            StatCategory::from_heading("Rushing & Receiving Table"),
            Some(StatCategory::RushingReceiving)
        );
        assert_eq!(
            StatCategory::from_heading("Defense & Fumbles"),
            Some(StatCategory::DefenseFumbles)
        );
        assert_eq!(
            StatCategory::from_heading("Kicking & Punting Table"),
            Some(StatCategory::PuntingKicking)
        );
        assert_eq!(StatCategory::from_heading("Scoring Table"), Some(StatCategory::Scoring));
        assert_eq!(StatCategory::from_heading("2022 Passing Game Log"), None);
        assert_eq!(StatCategory::from_heading("Leaderboards"), None);
        assert_eq!(StatCategory::from_heading("Advanced Passing"), None);
    }

    #[test]
    fn storage_document_carries_couch_fields() {
        let record = PlayerRecord {
            id: "jane-doe-1".into(),
            name: "Jane Doe".into(),
            source_url: "https://example.test/cfb/players/jane-doe-1.html".into(),
            school: Some("Rice".into()),
            position: None,
            height: None,
            weight: None,
            born: None,
            high_school: None,
            hometown: None,
            stats: vec![],
            career: vec![],
            game_logs: vec![],
            advanced: vec![],
            scraped_at: Utc::now(),
        };
        let doc = StorageDocument::new(record.clone()).with_rev(Some("2-abc".into()));
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["_id"], "jane-doe-1");
        assert_eq!(value["_rev"], "2-abc");
        assert_eq!(value["name"], "Jane Doe");

        let back: StorageDocument = serde_json::from_value(value).unwrap();
        assert_eq!(back.record, record);
        assert_eq!(back.rev.as_deref(), Some("2-abc"));
    }
}
