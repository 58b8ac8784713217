use scraper::{ElementRef, Html, Node, Selector};
use once_cell::sync::Lazy;
use tracing::debug;

use crate::normalize::RawRow;

static STATS_TABLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table.stats_table").expect("static selector"));
static CAPTION: Lazy<Selector> = Lazy::new(|| Selector::parse("caption").expect("static selector"));

const SKIPPED_ROW_CLASSES: [&str; 3] = ["thead", "over_header", "spacer"];

/// A stats table lifted out of the DOM
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    /// Caption text, or the table id when there is no caption
    pub heading: String,
    pub id: Option<String>,
    pub rows: Vec<RawRow>,
    /// `<tfoot>` rows, where the site puts career totals
    pub footer: Vec<RawRow>,
}

/// Collapse runs of whitespace the way a browser renders text.
pub fn clean_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn child_elements<'a>(el: ElementRef<'a>, name: &'a str) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    el.children()
        .filter_map(ElementRef::wrap)
        .filter(move |c| c.value().name() == name)
}

fn cells(row: ElementRef<'_>) -> impl Iterator<Item = ElementRef<'_>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .filter(|c| matches!(c.value().name(), "th" | "td"))
}

fn colspan(cell: ElementRef<'_>) -> usize {
    cell.value()
        .attr("colspan")
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(1)
}

fn is_meaningful(value: &str) -> bool {
    !matches!(value, "" | "-" | "—" | "–")
}

/// Column keys for a table: `data-stat` when present, otherwise the header
/// text, prefixed by its over-header group when the table has one.
fn header_keys(header_rows: &[ElementRef<'_>]) -> Vec<String> {
    let Some(last) = header_rows.last() else {
        return Vec::new();
    };

    let mut groups: Vec<String> = Vec::new();
    if header_rows.len() > 1 {
        for cell in cells(header_rows[header_rows.len() - 2]) {
            let text = clean_text(cell);
            for _ in 0..colspan(cell) {
                groups.push(text.clone());
            }
        }
    }

    let mut keys = Vec::new();
    let mut column = 0;
    for cell in cells(*last) {
        let span = colspan(cell);
        let key = match cell.value().attr("data-stat").map(str::trim) {
            Some(stat) if !stat.is_empty() => stat.to_string(),
            _ => {
                let text = clean_text(cell);
                match groups.get(column).filter(|g| !g.is_empty()) {
                    Some(group) if !text.is_empty() => format!("{group} {text}"),
                    _ => text,
                }
            }
        };
        keys.push(key);
        column += span;
    }
    keys
}

fn is_header_like(row: ElementRef<'_>) -> bool {
    if let Some(class) = row.value().attr("class") {
        if class
            .split_whitespace()
            .any(|c| SKIPPED_ROW_CLASSES.contains(&c))
        {
            return true;
        }
    }
    cells(row).any(|c| c.value().name() == "th" && c.value().attr("scope") == Some("col"))
}

/// Read headers and data rows from one `<table>`.
pub fn read_table(table: ElementRef<'_>) -> RawTable {
    let id = table.value().attr("id").map(str::to_string);
    let heading = table
        .select(&CAPTION)
        .next()
        .map(clean_text)
        .filter(|c| !c.is_empty())
        .or_else(|| id.clone())
        .unwrap_or_default();

    let thead_rows: Vec<ElementRef<'_>> = child_elements(table, "thead")
        .flat_map(|thead| child_elements(thead, "tr"))
        .collect();
    let mut body_rows: Vec<ElementRef<'_>> = child_elements(table, "tbody")
        .flat_map(|tbody| child_elements(tbody, "tr"))
        .collect();
    let foot_rows: Vec<ElementRef<'_>> = child_elements(table, "tfoot")
        .flat_map(|tfoot| child_elements(tfoot, "tr"))
        .collect();

    let headers = if thead_rows.is_empty() {
        // No <thead>: the parser has moved every row into <tbody>, so the
        // first one is the header.
        if body_rows.is_empty() {
            Vec::new()
        } else {
            let first = body_rows.remove(0);
            header_keys(&[first])
        }
    } else {
        header_keys(&thead_rows)
    };

    if headers.is_empty() {
        debug!(heading = %heading, "table has no headers");
        return RawTable {
            heading,
            id,
            ..RawTable::default()
        };
    }

    RawTable {
        heading,
        id,
        rows: data_rows(body_rows, &headers),
        footer: data_rows(foot_rows, &headers),
    }
}

fn data_rows(rows: Vec<ElementRef<'_>>, headers: &[String]) -> Vec<RawRow> {
    let mut out = Vec::new();
    for row in rows {
        if is_header_like(row) {
            continue;
        }
        let mut raw = RawRow::new();
        for (i, cell) in cells(row).enumerate() {
            let key = match cell.value().attr("data-stat").map(str::trim) {
                Some(stat) if !stat.is_empty() => stat.to_string(),
                _ => match headers.get(i) {
                    Some(h) if !h.is_empty() => h.clone(),
                    _ => continue,
                },
            };
            raw.entry(key).or_insert_with(|| clean_text(cell));
        }
        if raw.values().any(|v| is_meaningful(v)) {
            out.push(raw);
        }
    }
    out
}

/// All `table.stats_table` elements in document order, including tables the
/// site ships inside HTML comments to defer rendering.
pub fn stats_tables(document: &Html) -> Vec<RawTable> {
    let mut tables = Vec::new();
    for node in document.root_element().descendants() {
        match node.value() {
            Node::Element(el) if el.name() == "table" => {
                if let Some(table) = ElementRef::wrap(node) {
                    if STATS_TABLE.matches(&table) {
                        tables.push(read_table(table));
                    }
                }
            }
            Node::Comment(comment) => {
                let body: &str = comment;
                if body.contains("<table") {
                    let fragment = Html::parse_fragment(body);
                    tables.extend(fragment.select(&STATS_TABLE).map(read_table));
                }
            }
            _ => {}
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_table(html: &str) -> RawTable {
        let doc = Html::parse_document(html);
        stats_tables(&doc).into_iter().next().expect("table present")
    }

    #[test]
    fn reads_data_stat_keys_and_skips_repeated_headers() {
        let table = first_table(
            r#"<table class="stats_table" id="passing">
                <caption>Passing Table</caption>
                <thead><tr><th data-stat="year_id">Year</th><th data-stat="pass_cmp">Cmp</th></tr></thead>
                <tbody>
                  <tr><th data-stat="year_id">2021</th><td data-stat="pass_cmp">12</td></tr>
                  <tr class="thead"><th>Year</th><th>Cmp</th></tr>
                  <tr><th data-stat="year_id">2022</th><td data-stat="pass_cmp">315</td></tr>
                </tbody>
                <tfoot><tr><th data-stat="year_id">Career</th><td data-stat="pass_cmp">327</td></tr></tfoot>
              </table>"#,
        );
        assert_eq!(table.heading, "Passing Table");
        assert_eq!(table.id.as_deref(), Some("passing"));
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1]["pass_cmp"], "315");
        assert_eq!(table.footer.len(), 1);
        assert_eq!(table.footer[0]["pass_cmp"], "327");
    }

    #[test]
    fn grouped_header_text_without_data_stat() {
        let table = first_table(
            r#"<table class="stats_table">
                <thead>
                  <tr><th colspan="2"></th><th colspan="2">Rushing</th><th colspan="1">Receiving</th></tr>
                  <tr><th>Year</th><th>School</th><th>Att</th><th>Yds</th><th>Yds</th></tr>
                </thead>
                <tbody><tr><td>2020</td><td>Iowa</td><td>100</td><td>540</td><td>80</td></tr></tbody>
              </table>"#,
        );
        let row = &table.rows[0];
        assert_eq!(row["Year"], "2020");
        assert_eq!(row["Rushing Att"], "100");
        assert_eq!(row["Rushing Yds"], "540");
        assert_eq!(row["Receiving Yds"], "80");
    }

    #[test]
    fn finds_tables_hidden_in_comments() {
        let doc = Html::parse_document(
            r#"<html><body>
                <div id="all_scoring"><!--
                  <table class="stats_table" id="scoring"><caption>Scoring Table</caption>
                  <thead><tr><th data-stat="year_id">Year</th><th data-stat="points">Pts</th></tr></thead>
                  <tbody><tr><th data-stat="year_id">2019</th><td data-stat="points">42</td></tr></tbody>
                  </table>
                --></div>
               </body></html>"#,
        );
        let tables = stats_tables(&doc);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].heading, "Scoring Table");
        assert_eq!(tables[0].rows[0]["points"], "42");
    }

    #[test]
    fn table_without_thead_uses_first_row() {
        let table = first_table(
            r#"<table class="stats_table"><tr><th>Year</th><th>Pts</th></tr><tr><td>2018</td><td>6</td></tr></table>"#,
        );
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0]["Pts"], "6");
    }

    #[test]
    fn empty_rows_are_dropped() {
        let table = first_table(
            r#"<table class="stats_table"><thead><tr><th>Year</th><th>Pts</th></tr></thead>
               <tbody><tr><td></td><td>-</td></tr><tr><td>2018</td><td>6</td></tr></tbody></table>"#,
        );
        assert_eq!(table.rows.len(), 1);
    }
}
