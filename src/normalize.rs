//! Maps raw stats table rows onto flat, typed [`StatRow`]s.
//!
//! Each category has a fixed schema of output field names. A raw column is
//! accepted when its key matches one of the field's aliases: the site's
//! `data-stat` attribute, the bare header text, or the header text prefixed
//! with its over-header group. Columns outside the schema are dropped.

use std::collections::BTreeMap;
use tracing::trace;

use crate::types::{StatCategory, StatRow, StatValue};

/// Column key -> cell text for one table row
pub type RawRow = BTreeMap<String, String>;

type Schema = &'static [(&'static str, &'static [&'static str])];

const COMMON: Schema = &[
    ("games", &["g", "games"]),
    ("class", &["class"]),
    ("pos", &["pos"]),
    ("conf", &["conf_abbr", "conf"]),
];

const PASSING: Schema = &[
    ("cmp", &["pass_cmp", "cmp", "passing cmp"]),
    ("att", &["pass_att", "att", "passing att"]),
    ("pct", &["pass_cmp_pct", "pct", "passing pct"]),
    ("yds", &["pass_yds", "yds", "passing yds"]),
    ("ypa", &["pass_yds_per_att", "y/a", "passing y/a"]),
    ("adj_ypa", &["adj_pass_yds_per_att", "ay/a", "passing ay/a"]),
    ("td", &["pass_td", "td", "passing td"]),
    ("int", &["pass_int", "int", "passing int"]),
    ("rating", &["pass_rating", "rate", "passing rate"]),
];

const RUSHING_RECEIVING: Schema = &[
    ("rush_att", &["rush_att", "rushing att"]),
    ("rush_yds", &["rush_yds", "rushing yds"]),
    ("rush_avg", &["rush_yds_per_att", "rushing avg"]),
    ("rush_td", &["rush_td", "rushing td"]),
    ("rec", &["rec", "receiving rec"]),
    ("rec_yds", &["rec_yds", "receiving yds"]),
    ("rec_avg", &["rec_yds_per_rec", "receiving avg"]),
    ("rec_td", &["rec_td", "receiving td"]),
    ("scrim_plays", &["scrim_att", "scrimmage plays"]),
    ("scrim_yds", &["scrim_yds", "scrimmage yds"]),
    ("scrim_avg", &["scrim_yds_per_att", "scrimmage avg"]),
    ("scrim_td", &["scrim_td", "scrimmage td"]),
];

const DEFENSE_FUMBLES: Schema = &[
    ("tackles_solo", &["tackles_solo", "tackles solo", "solo"]),
    ("tackles_assists", &["tackles_assists", "tackles ast", "ast"]),
    ("tackles_total", &["tackles_total", "tackles tot", "tot"]),
    ("tackles_loss", &["tackles_loss", "tackles loss", "loss"]),
    ("sacks", &["sacks", "tackles sk", "sk"]),
    ("def_int", &["def_int", "def int int"]),
    ("def_int_yds", &["def_int_yds", "def int yds"]),
    ("def_int_avg", &["def_int_yds_per_int", "def int avg"]),
    ("def_int_td", &["def_int_td", "def int td"]),
    ("pass_defended", &["pass_defended", "def int pd", "pd"]),
    ("fumbles_rec", &["fumbles_rec", "fumbles fr", "fr"]),
    ("fumbles_rec_yds", &["fumbles_rec_yds", "fumbles yds"]),
    ("fumbles_rec_td", &["fumbles_rec_td", "fumbles td"]),
    ("fumbles_forced", &["fumbles_forced", "fumbles ff", "ff"]),
];

const PUNTING_KICKING: Schema = &[
    ("xpm", &["xpm", "kicking xpm"]),
    ("xpa", &["xpa", "kicking xpa"]),
    ("xp_pct", &["xp_pct", "xp%", "kicking xp%"]),
    ("fgm", &["fgm", "kicking fgm"]),
    ("fga", &["fga", "kicking fga"]),
    ("fg_pct", &["fg_pct", "fg%", "kicking fg%"]),
    ("kick_points", &["kick_points", "kicking pts"]),
    ("punts", &["punt", "punts", "punting punts"]),
    ("punt_yds", &["punt_yds", "punting yds"]),
    ("punt_avg", &["punt_yds_per_punt", "punting avg"]),
];

const SCORING: Schema = &[
    ("td_rush", &["rush_td", "touchdowns rush"]),
    ("td_rec", &["rec_td", "touchdowns rec"]),
    ("td_int", &["int_td", "touchdowns int"]),
    ("td_fr", &["fumbles_rec_td", "touchdowns fr"]),
    ("td_pr", &["punt_ret_td", "touchdowns pr"]),
    ("td_kr", &["kick_ret_td", "touchdowns kr"]),
    ("td_other", &["other_td", "touchdowns oth"]),
    ("td_total", &["all_td", "touchdowns tot"]),
    ("xpm", &["xpm", "kicking xpm"]),
    ("fgm", &["fgm", "kicking fgm"]),
    ("two_pt", &["two_pt_md", "2pm"]),
    ("safety", &["safety_md", "sfty"]),
    ("points", &["points", "pts"]),
];

fn schema(category: StatCategory) -> Schema {
    match category {
        StatCategory::Passing => PASSING,
        StatCategory::RushingReceiving => RUSHING_RECEIVING,
        StatCategory::DefenseFumbles => DEFENSE_FUMBLES,
        StatCategory::PuntingKicking => PUNTING_KICKING,
        StatCategory::Scoring => SCORING,
    }
}

/// Output field name for a raw column key, if the category knows it.
pub fn field_for(category: StatCategory, column: &str) -> Option<&'static str> {
    let key = column.trim().to_lowercase();
    schema(category)
        .iter()
        .chain(COMMON.iter())
        .find(|(_, aliases)| aliases.iter().any(|a| *a == key))
        .map(|(field, _)| *field)
}

/// Integer when the cell is a whole number (thousands separators allowed),
/// decimal for other numbers, text otherwise. Blank and dash cells yield `None`.
pub fn coerce(cell: &str) -> Option<StatValue> {
    let cell = cell.trim();
    if cell.is_empty() || matches!(cell, "-" | "—" | "–") {
        return None;
    }
    let digits = cell.replace(',', "");
    if let Ok(v) = digits.parse::<i64>() {
        return Some(StatValue::Int(v));
    }
    if digits.chars().any(|c| c.is_ascii_digit()) {
        if let Ok(v) = digits.parse::<f64>() {
            if v.is_finite() {
                return Some(StatValue::Decimal(v));
            }
        }
    }
    Some(StatValue::Text(cell.to_string()))
}

/// Coerce every cell of a row under its raw column key. Blank cells are dropped.
pub fn coerce_row(raw_row: &RawRow) -> BTreeMap<String, StatValue> {
    raw_row
        .iter()
        .filter_map(|(column, cell)| coerce(cell).map(|value| (column.clone(), value)))
        .collect()
}

pub fn normalize(raw_row: &RawRow, category: StatCategory, season: &str, team: &str) -> StatRow {
    let mut fields = BTreeMap::new();
    for (column, cell) in raw_row {
        let Some(field) = field_for(category, column) else {
            trace!(%category, column = %column, "dropping unmapped column");
            continue;
        };
        if let Some(value) = coerce(cell) {
            fields.entry(field.to_string()).or_insert(value);
        }
    }
    StatRow {
        season: season.to_string(),
        category,
        team: team.to_string(),
        fields,
    }
}
