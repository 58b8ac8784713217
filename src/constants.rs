/// Site and storage constants shared across the scraper

// Site layout
pub const DEFAULT_BASE_URL: &str = "https://www.sports-reference.com";
pub const PLAYERS_PATH: &str = "/cfb/players/";
pub const SCHOOLS_PATH: &str = "/cfb/schools/";

pub const ALPHABET: [char; 26] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
    'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

/// Hard stop for index pagination in case a site change makes every page look non-empty.
pub const MAX_INDEX_PAGES: u32 = 100;

// Storage layout
pub const DEFAULT_STORAGE_DIR: &str = "storage";
pub const PLAYER_DATA_DIR: &str = "player_data";
pub const LOGS_DIR: &str = "logs";
pub const CONSOLIDATED_INDEX_FILE: &str = "all_players_index.json";
pub const SUMMARY_REPORT_FILE: &str = "scraping_summary.json";

pub fn letter_index_file(letter: char) -> String {
    format!("player_index_{}.json", letter.to_ascii_uppercase())
}

// Request defaults
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_MS: u64 = 5_000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 3_000;
pub const DEFAULT_CONCURRENCY: usize = 1;
pub const MAX_RETRY_AFTER_SECS: u64 = 300;

// CouchDB defaults
pub const DEFAULT_COUCHDB_URL: &str = "http://localhost:5984";
pub const DEFAULT_COUCHDB_DATABASE: &str = "ncaaf_players";

pub const USER_AGENTS: [&str; 4] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/108.0.0.0 Safari/537.36",
];

/// Header names are lowercase so they can be used as static `HeaderName`s.
pub const BROWSER_HEADERS: [(&str, &str); 4] = [
    (
        "accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
    ),
    ("accept-language", "en-US,en;q=0.5"),
    ("referer", "https://www.sports-reference.com/"),
    ("dnt", "1"),
];
