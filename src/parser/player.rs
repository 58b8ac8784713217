use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

use crate::constants::SCHOOLS_PATH;
use crate::error::ParseError;
use crate::normalize::{coerce_row, normalize, RawRow};
use crate::parser::table::{clean_text, stats_tables, RawTable};
use crate::types::{player_slug, PlayerRecord, StatCategory, StatRow, StatTable};

static NAME_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    ["h1[itemprop=\"name\"]", "#meta h1", "h1"]
        .iter()
        .map(|s| Selector::parse(s).expect("static selector"))
        .collect()
});
static META_PARAGRAPHS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#meta p").expect("static selector"));
static META_LINKS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("#meta a[href]").expect("static selector"));
static HEIGHT_WEIGHT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d-\d{1,2})(?:\s*,\s*(\d{2,3})\s*lb)?").expect("static regex")
});
static SEASON: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})\b").expect("static regex"));

const SEASON_KEYS: [&str; 3] = ["year_id", "year", "season"];
const TEAM_KEYS: [&str; 3] = ["school_name", "school", "team"];
const ADVANCED_WORDS: [&str; 3] = ["advanced", "analytics", "efficiency"];

/// Season label on career total rows
pub const CAREER_SEASON: &str = "Career";

#[derive(Debug, Default)]
struct Bio {
    name: String,
    school: Option<String>,
    position: Option<String>,
    height: Option<String>,
    weight: Option<String>,
    born: Option<String>,
    high_school: Option<String>,
    hometown: Option<String>,
}

fn non_empty(value: &str) -> Option<String> {
    let v = value.trim();
    (!v.is_empty()).then(|| v.to_string())
}

fn extract_bio(document: &Html) -> Option<Bio> {
    let name = NAME_SELECTORS
        .iter()
        .filter_map(|sel| document.select(sel).next())
        .map(clean_text)
        .find(|n| !n.is_empty())?;

    let mut bio = Bio {
        name,
        ..Bio::default()
    };

    for p in document.select(&META_PARAGRAPHS) {
        let text = clean_text(p);
        if let Some((label, value)) = text.split_once(':') {
            let slot = match label.trim().to_lowercase().as_str() {
                "position" => &mut bio.position,
                "school" | "schools" | "college" => &mut bio.school,
                "height" => &mut bio.height,
                "weight" => &mut bio.weight,
                "born" => &mut bio.born,
                "high school" => &mut bio.high_school,
                "hometown" => &mut bio.hometown,
                _ => continue,
            };
            if slot.is_none() {
                *slot = non_empty(value);
            }
        } else if let Some(caps) = HEIGHT_WEIGHT.captures(&text) {
            if bio.height.is_none() {
                bio.height = caps.get(1).map(|m| m.as_str().to_string());
            }
            if bio.weight.is_none() {
                bio.weight = caps.get(2).map(|m| format!("{}lb", m.as_str()));
            }
        }
    }

    if bio.school.is_none() {
        bio.school = document
            .select(&META_LINKS)
            .find(|a| {
                a.value()
                    .attr("href")
                    .is_some_and(|href| href.contains(SCHOOLS_PATH))
            })
            .map(clean_text)
            .filter(|s| !s.is_empty());
    }

    Some(bio)
}

fn lookup<'r>(row: &'r RawRow, keys: &[&str]) -> Option<&'r str> {
    row.iter()
        .find(|(k, _)| keys.contains(&k.to_lowercase().as_str()))
        .map(|(_, v)| v.as_str())
}

fn table_category(table: &RawTable) -> Option<StatCategory> {
    StatCategory::from_heading(&table.heading)
        .or_else(|| table.id.as_deref().and_then(StatCategory::from_heading))
}

enum TableKind {
    Season(StatCategory),
    Career(StatCategory),
    GameLog,
    Advanced,
}

fn classify(table: &RawTable) -> Option<TableKind> {
    let heading = table.heading.to_lowercase();
    let id = table.id.as_deref().unwrap_or_default();
    if heading.contains("game log") || id.contains("gamelog") {
        return Some(TableKind::GameLog);
    }
    if ADVANCED_WORDS.iter().any(|w| heading.contains(w)) {
        return Some(TableKind::Advanced);
    }
    if heading.contains("career high") {
        return None;
    }
    let category = table_category(table)?;
    if heading.contains("career") {
        Some(TableKind::Career(category))
    } else {
        Some(TableKind::Season(category))
    }
}

fn whole_table(table: &RawTable) -> StatTable {
    StatTable {
        title: table.heading.clone(),
        rows: table
            .rows
            .iter()
            .map(coerce_row)
            .filter(|row| !row.is_empty())
            .collect(),
    }
}

fn career_rows<'a>(rows: impl Iterator<Item = &'a RawRow>, category: StatCategory) -> Vec<StatRow> {
    rows.map(|row| {
        let team = lookup(row, &TEAM_KEYS).unwrap_or_default();
        normalize(row, category, CAREER_SEASON, team)
    })
    .filter(|row| !row.fields.is_empty())
    .collect()
}

fn season_rows(table: &RawTable, category: StatCategory) -> Vec<StatRow> {
    table
        .rows
        .iter()
        .filter_map(|row| {
            let season = lookup(row, &SEASON_KEYS)
                .and_then(|cell| SEASON.captures(cell))
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())?;
            let team = lookup(row, &TEAM_KEYS).unwrap_or_default();
            Some(normalize(row, category, &season, team))
        })
        .collect()
}

/// Extract a player's bio and season stats from a profile page.
pub fn extract_player(html: &str, source_url: &str) -> Result<PlayerRecord, ParseError> {
    extract_player_at(html, source_url, Utc::now())
}

/// [`extract_player`] with an explicit scrape timestamp.
#[instrument(skip(html))]
pub fn extract_player_at(
    html: &str,
    source_url: &str,
    scraped_at: DateTime<Utc>,
) -> Result<PlayerRecord, ParseError> {
    let document = Html::parse_document(html);

    let bio = extract_bio(&document).ok_or_else(|| ParseError::MissingBio {
        url: source_url.to_string(),
    })?;

    let mut stats = Vec::new();
    let mut career = Vec::new();
    let mut game_logs = Vec::new();
    let mut advanced = Vec::new();
    let mut matched_tables = 0usize;
    for table in stats_tables(&document) {
        match classify(&table) {
            Some(TableKind::Season(category)) => {
                matched_tables += 1;
                let rows = season_rows(&table, category);
                debug!(%category, rows = rows.len(), "parsed stats table");
                stats.extend(rows);
                career.extend(career_rows(table.footer.iter(), category));
            }
            Some(TableKind::Career(category)) => {
                career.extend(career_rows(table.rows.iter().chain(&table.footer), category));
            }
            Some(TableKind::GameLog) => game_logs.push(whole_table(&table)),
            Some(TableKind::Advanced) => advanced.push(whole_table(&table)),
            None => debug!(heading = %table.heading, "ignoring unrecognised table"),
        }
    }
    // Stable: rows of one season keep the page's category order.
    stats.sort_by(|a, b| a.season.cmp(&b.season));

    let school = bio.school.or_else(|| {
        stats
            .iter()
            .rev()
            .map(|row| row.team.clone())
            .find(|team| !team.is_empty())
    });

    let record = PlayerRecord {
        id: player_slug(source_url, &bio.name),
        name: bio.name,
        source_url: source_url.to_string(),
        school,
        position: bio.position,
        height: bio.height,
        weight: bio.weight,
        born: bio.born,
        high_school: bio.high_school,
        hometown: bio.hometown,
        stats,
        career,
        game_logs: game_logs.into_iter().filter(|t| !t.rows.is_empty()).collect(),
        advanced: advanced.into_iter().filter(|t| !t.rows.is_empty()).collect(),
        scraped_at,
    };

    if matched_tables == 0 {
        return Err(ParseError::MissingStats {
            record: Box::new(record),
        });
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatValue;

    const URL: &str = "https://www.sports-reference.com/cfb/players/cj-stroud-1.html";

    fn page(body: &str) -> String {
        format!("<html><head><title>t</title></head><body>{body}</body></html>")
    }

    const META: &str = r#"
        <div id="meta"><div>
          <h1><span>C.J. Stroud</span></h1>
          <p><strong>Position</strong>: QB</p>
          <p><span>6-3</span>, <span>218lb</span> (190cm, 98kg)</p>
          <p><strong>School</strong>: <a href="/cfb/schools/ohio-state/">Ohio State</a></p>
          <p><strong>High School</strong>: Rancho Cucamonga (CA)</p>
        </div></div>"#;

    const PASSING: &str = r#"
        <table class="stats_table" id="passing">
          <caption>Passing Table</caption>
          <thead><tr>
            <th data-stat="year_id">Year</th><th data-stat="school_name">School</th>
            <th data-stat="pass_cmp">Cmp</th><th data-stat="pass_att">Att</th>
            <th data-stat="pass_yds">Yds</th><th data-stat="pass_td">TD</th><th data-stat="pass_int">Int</th>
          </tr></thead>
          <tbody>
            <tr><th data-stat="year_id">2022*</th><td data-stat="school_name">Ohio State</td>
              <td data-stat="pass_cmp">258</td><td data-stat="pass_att">389</td>
              <td data-stat="pass_yds">3,688</td><td data-stat="pass_td">41</td><td data-stat="pass_int">6</td></tr>
            <tr><th data-stat="year_id">2021</th><td data-stat="school_name">Ohio State</td>
              <td data-stat="pass_cmp">317</td><td data-stat="pass_att">443</td>
              <td data-stat="pass_yds">4,435</td><td data-stat="pass_td">44</td><td data-stat="pass_int">6</td></tr>
          </tbody>
          <tfoot><tr><th data-stat="year_id">Career</th><td data-stat="school_name">Ohio State</td>
              <td data-stat="pass_cmp">575</td><td></td><td></td><td></td><td></td></tr></tfoot>
        </table>"#;

    const RUSHING: &str = r#"
        <div id="all_rushing"><!--
        <table class="stats_table" id="rushing">
          <caption>Rushing &amp; Receiving Table</caption>
          <thead><tr>
            <th data-stat="year_id">Year</th><th data-stat="school_name">School</th>
            <th data-stat="rush_att">Att</th><th data-stat="rush_yds">Yds</th>
          </tr></thead>
          <tbody>
            <tr><th data-stat="year_id">2021</th><td data-stat="school_name">Ohio State</td>
              <td data-stat="rush_att">35</td><td data-stat="rush_yds">-20</td></tr>
          </tbody>
        </table>
        --></div>"#;

    #[test]
    fn extracts_bio_fields() {
        let html = page(&format!("{META}{PASSING}"));
        let record = extract_player(&html, URL).unwrap();
        assert_eq!(record.id, "cj-stroud-1");
        assert_eq!(record.name, "C.J. Stroud");
        assert_eq!(record.position.as_deref(), Some("QB"));
        assert_eq!(record.height.as_deref(), Some("6-3"));
        assert_eq!(record.weight.as_deref(), Some("218lb"));
        assert_eq!(record.school.as_deref(), Some("Ohio State"));
        assert_eq!(record.high_school.as_deref(), Some("Rancho Cucamonga (CA)"));
        assert_eq!(record.source_url, URL);
    }

    #[test]
    fn stats_are_season_ascending_with_page_category_order() {
        let html = page(&format!("{META}{PASSING}{RUSHING}"));
        let record = extract_player(&html, URL).unwrap();

        let order: Vec<(String, StatCategory)> = record
            .stats
            .iter()
            .map(|r| (r.season.clone(), r.category))
            .collect();
        assert_eq!(
            order,
            vec![
                ("2021".to_string(), StatCategory::Passing),
                ("2021".to_string(), StatCategory::RushingReceiving),
                ("2022".to_string(), StatCategory::Passing),
            ]
        );
        assert!(record.stats.iter().all(|r| !r.season.is_empty()));

        let season_2022 = &record.stats[2];
        assert_eq!(season_2022.team, "Ohio State");
        assert_eq!(season_2022.int("yds"), Some(3688));
        assert_eq!(season_2022.int("td"), Some(41));
        assert_eq!(record.stats[1].int("rush_yds"), Some(-20));
    }

    #[test]
    fn missing_name_is_missing_bio() {
        let html = page(PASSING);
        match extract_player(&html, URL) {
            Err(ParseError::MissingBio { url }) => assert_eq!(url, URL),
            other => panic!("expected MissingBio, got {other:?}"),
        }
    }

    #[test]
    fn no_stat_tables_still_returns_record() {
        let html = page(META);
        match extract_player(&html, URL) {
            Err(ParseError::MissingStats { record }) => {
                assert_eq!(record.name, "C.J. Stroud");
                assert!(record.stats.is_empty());
            }
            other => panic!("expected MissingStats, got {other:?}"),
        }
    }

    #[test]
    fn game_logs_are_kept_but_are_not_season_stats() {
        let html = page(&format!(
            r#"{META}<table class="stats_table" id="gamelog"><caption>2022 Game Log</caption>
               <thead><tr><th>Date</th><th>Opp</th><th>Yds</th></tr></thead>
               <tbody><tr><td>2022-09-03</td><td>Notre Dame</td><td>223</td></tr></tbody></table>"#
        ));
        match extract_player(&html, URL) {
            Err(ParseError::MissingStats { record }) => {
                assert!(record.stats.is_empty());
                assert_eq!(record.game_logs.len(), 1);
                let log = &record.game_logs[0];
                assert_eq!(log.title, "2022 Game Log");
                assert_eq!(log.rows[0]["Opp"], StatValue::Text("Notre Dame".into()));
                assert_eq!(log.rows[0]["Yds"], StatValue::Int(223));
            }
            other => panic!("expected MissingStats, got {other:?}"),
        }
    }

    #[test]
    fn career_totals_come_from_the_table_footer() {
        let html = page(&format!("{META}{PASSING}"));
        let record = extract_player(&html, URL).unwrap();
        assert_eq!(record.stats.len(), 2);
        assert_eq!(record.career.len(), 1);
        let total = &record.career[0];
        assert_eq!(total.season, CAREER_SEASON);
        assert_eq!(total.category, StatCategory::Passing);
        assert_eq!(total.team, "Ohio State");
        assert_eq!(total.int("cmp"), Some(575));
    }

    #[test]
    fn advanced_tables_are_kept_whole() {
        let html = page(&format!(
            r#"{META}{PASSING}
               <table class="stats_table" id="adv_passing"><caption>Advanced Passing</caption>
               <thead><tr><th data-stat="year_id">Year</th><th data-stat="epa">EPA</th></tr></thead>
               <tbody><tr><th data-stat="year_id">2022</th><td data-stat="epa">0.31</td></tr></tbody></table>"#
        ));
        let record = extract_player(&html, URL).unwrap();
        assert_eq!(record.advanced.len(), 1);
        assert_eq!(record.advanced[0].title, "Advanced Passing");
        assert_eq!(record.advanced[0].rows[0]["epa"], StatValue::Decimal(0.31));
        // not mistaken for season passing rows
        assert_eq!(record.stats.len(), 2);
    }

    #[test]
    fn school_falls_back_to_latest_team() {
        let html = page(&format!(
            r#"<div id="meta"><h1>Sam Walker</h1></div>
               <table class="stats_table"><caption>Scoring</caption>
               <thead><tr><th data-stat="year_id">Year</th><th data-stat="school_name">School</th><th data-stat="points">Pts</th></tr></thead>
               <tbody>
                 <tr><th data-stat="year_id">2010</th><td data-stat="school_name">Army</td><td data-stat="points">6</td></tr>
                 <tr><th data-stat="year_id">2011</th><td data-stat="school_name">Navy</td><td data-stat="points">12</td></tr>
               </tbody></table>"#
        ));
        let record = extract_player(&html, "/cfb/players/sam-walker-4.html").unwrap();
        assert_eq!(record.school.as_deref(), Some("Navy"));
        assert_eq!(record.id, "sam-walker-4");
    }
}
