//! Pipe-delimited markdown tables.
//!
//! The first row of a run of `|`-prefixed lines is the header; a following
//! `|---|:---:|` separator row is skipped. Header cells are mapped to canonical
//! field names through the column vocabulary, and each data row exposes its
//! cells positionally under those names.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

use super::vocab::ExtractVocabulary;

static SEPARATOR_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^:?-{1,}:?$").expect("separator regex"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub cells: Vec<String>,
    /// Canonical field → cell text, for columns whose header matched the vocabulary.
    pub fields: BTreeMap<String, String>,
}

impl TableRow {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Numeric value of a field; see [`parse_number`].
    pub fn number(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(parse_number)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    /// Canonical field per header position (`None` when the header is unknown).
    pub fields: Vec<Option<String>>,
    pub rows: Vec<TableRow>,
}

impl Table {
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().flatten().any(|f| f == name)
    }

    /// Values of `name` across rows, skipping rows without it.
    pub fn column(&self, name: &str) -> Vec<&str> {
        self.rows.iter().filter_map(|r| r.field(name)).collect()
    }
}

pub(crate) fn is_table_line(line: &str) -> bool {
    let t = line.trim();
    t.starts_with('|') && t.matches('|').count() >= 2
}

fn split_cells(line: &str) -> Vec<String> {
    let t = line.trim();
    let t = t.strip_prefix('|').unwrap_or(t);
    let t = t.strip_suffix('|').unwrap_or(t);
    t.split('|').map(|c| c.trim().to_string()).collect()
}

fn is_separator(cells: &[String]) -> bool {
    !cells.is_empty()
        && cells
            .iter()
            .all(|c| SEPARATOR_CELL.is_match(c.replace(' ', "").as_str()))
}

/// Strip markdown emphasis/code markers from a cell value.
fn clean_cell(cell: &str) -> String {
    cell.replace("**", "")
        .replace('`', "")
        .trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace())
        .to_string()
}

/// Collect every table in `body` in document order.
pub fn extract_tables(body: &str, vocab: &ExtractVocabulary) -> Vec<Table> {
    let mut tables = Vec::new();
    let mut block: Vec<&str> = Vec::new();

    for line in body.lines() {
        if is_table_line(line) {
            block.push(line);
        } else if !block.is_empty() {
            if let Some(t) = build_table(&block, vocab) {
                tables.push(t);
            }
            block.clear();
        }
    }
    if !block.is_empty() {
        if let Some(t) = build_table(&block, vocab) {
            tables.push(t);
        }
    }
    tables
}

fn build_table(lines: &[&str], vocab: &ExtractVocabulary) -> Option<Table> {
    let (header_line, rest) = lines.split_first()?;
    let headers: Vec<String> = split_cells(header_line).iter().map(|c| clean_cell(c)).collect();
    if is_separator(&headers) {
        return None;
    }
    let fields: Vec<Option<String>> = headers
        .iter()
        .map(|h| vocab.canonical_column(h).map(str::to_string))
        .collect();

    let mut rows = Vec::new();
    for line in rest {
        let cells = split_cells(line);
        if is_separator(&cells) {
            continue;
        }
        // Template placeholder rows like "[Table of ...]" or empty rows carry no data.
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        let mut row_fields = BTreeMap::new();
        for (i, cell) in cells.iter().enumerate() {
            if let Some(Some(field)) = fields.get(i) {
                let v = clean_cell(cell);
                if !v.is_empty() {
                    row_fields.entry(field.clone()).or_insert(v);
                }
            }
        }
        rows.push(TableRow {
            cells,
            fields: row_fields,
        });
    }

    Some(Table {
        headers,
        fields,
        rows,
    })
}

/// Parse a cell like `$155.20`, `28.5x`, `+12%`, `$2.10T` or `1,234`.
///
/// `K/M/B/T` suffixes scale the value. `N/A`, `-` and text return `None`.
/// For ranges like `$120.00/$180.00` only the first number is read.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    let s = s.split('/').next().unwrap_or(s).trim();
    let s: String = s
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '%' | '*' | ' ' | '€' | '£'))
        .collect();
    let s = s.trim_start_matches('+');
    let s = s.strip_suffix(['x', 'X']).unwrap_or(s);

    let (num, scale) = match s.chars().last()? {
        'K' | 'k' => (&s[..s.len() - 1], 1e3),
        'M' => (&s[..s.len() - 1], 1e6),
        'B' => (&s[..s.len() - 1], 1e9),
        'T' => (&s[..s.len() - 1], 1e12),
        _ => (s, 1.0),
    };
    let v: f64 = num.parse().ok()?;
    v.is_finite().then_some(v * scale)
}
