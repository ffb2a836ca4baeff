// src/extract/mod.rs
//! Markdown section extractor for generated research documents.
//!
//! Splits a document at headings of one fixed level (`##` by default) and
//! files each region under a canonical name from the heading vocabulary.
//! Unknown headings are kept verbatim as passthrough sections, so nothing in
//! the document is dropped. Within each section it pulls out tickers and pipe
//! tables; valuation verdicts come from the Valuation Reality Check section only.
//!
//! Extraction is a pure function of the input text and the vocabulary: it
//! never fails, and running it twice gives equal output.

pub mod tables;
pub mod tickers;
pub mod valuation;
pub mod vocab;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

pub use tables::{parse_number, Table, TableRow};
pub use tickers::extract_tickers;
pub use valuation::{ValuationCall, ValuationVerdict};
pub use vocab::{ColumnAlias, ExtractVocabulary, HeadingAlias};

pub const PREAMBLE_SECTION: &str = "Preamble";
pub const DOCUMENT_SECTION: &str = "Document";
pub const TLDR_SECTION: &str = "TLDR";
pub const RISK_SECTION: &str = "Risk Factors";
pub const VALUATION_SECTION: &str = "Valuation Reality Check";
pub const SUMMARY_SECTION: &str = "Executive Summary";

static NUMBERING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(?:\.\d+)*[.)]?\s+").expect("numbering regex"));
static INLINE_TLDR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\*\*TL;?DR:?\*\*:?\s*").expect("inline tldr regex"));
static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+(?P<item>.+)$").expect("list item regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    /// Heading matched the vocabulary; `name` is the canonical name.
    Recognized,
    /// Unknown heading, preamble or whole-document fallback; `name` is verbatim.
    Passthrough,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResearchSection {
    pub name: String,
    /// Heading text as written, without the leading `#`s. Empty for preamble/fallback.
    pub heading: String,
    pub kind: SectionKind,
    pub body: String,
    pub tickers: Vec<String>,
    pub tables: Vec<Table>,
    pub verdicts: Vec<ValuationCall>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ExtractedDocument {
    /// Frontmatter `key: value` pairs (theme, generated, tickers_found, ...).
    pub metadata: BTreeMap<String, String>,
    pub sections: Vec<ResearchSection>,
}

impl ExtractedDocument {
    /// First section with this name.
    pub fn section(&self, name: &str) -> Option<&ResearchSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn is_passthrough_only(&self) -> bool {
        self.sections.iter().all(|s| s.kind == SectionKind::Passthrough)
    }

    /// Every ticker across sections, first-occurrence order.
    pub fn tickers(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for t in self.sections.iter().flat_map(|s| s.tickers.iter()) {
            if !out.contains(t) {
                out.push(t.clone());
            }
        }
        out
    }

    /// Tickers from `ticker` table columns, in document order.
    pub fn table_tickers(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for table in self.sections.iter().flat_map(|s| s.tables.iter()) {
            for t in table.column("ticker") {
                let plausible = !t.is_empty()
                    && t.chars().all(|c| c.is_ascii_uppercase() || c == '.');
                if plausible && !out.iter().any(|o| o == t) {
                    out.push(t.to_string());
                }
            }
        }
        out
    }

    /// Document title from the first level-1 heading.
    pub fn title(&self) -> Option<String> {
        self.sections
            .iter()
            .filter(|s| s.kind == SectionKind::Passthrough)
            .flat_map(|s| s.body.lines())
            .find_map(|l| l.strip_prefix("# "))
            .map(|t| t.trim().to_string())
    }

    /// First paragraph of the TLDR section, or of an inline `**TLDR:**` marker.
    pub fn tldr(&self) -> Option<String> {
        if let Some(s) = self.section(TLDR_SECTION) {
            let body = s.body.trim_start();
            let body = match INLINE_TLDR.find(body) {
                Some(m) if m.start() == 0 => &body[m.end()..],
                _ => body,
            };
            if let Some(p) = first_paragraph(body) {
                return Some(p);
            }
        }
        self.sections.iter().find_map(|s| {
            INLINE_TLDR
                .find(&s.body)
                .and_then(|m| first_paragraph(&s.body[m.end()..]))
        })
    }

    /// First paragraph of the Executive Summary section.
    pub fn executive_summary(&self) -> Option<String> {
        self.section(SUMMARY_SECTION).and_then(|s| first_paragraph(&s.body))
    }

    /// Risk items from the Risk Factors section, or a `### Risk Factors` subsection.
    ///
    /// Table rows with a `risk` column are preferred over list items.
    pub fn risk_factors(&self) -> Vec<String> {
        if let Some(s) = self.section(RISK_SECTION) {
            let items = risk_items(&s.body, &s.tables);
            if !items.is_empty() {
                return items;
            }
        }
        for s in &self.sections {
            if let Some(sub) = subsection(&s.body, &["risk factors", "risks", "key risks"]) {
                let sub_tables: Vec<Table> = s
                    .tables
                    .iter()
                    .filter(|t| t.has_field("risk"))
                    .cloned()
                    .collect();
                let items = risk_items(&sub, &sub_tables);
                if !items.is_empty() {
                    return items;
                }
            }
        }
        Vec::new()
    }

    /// Valuation calls from the Valuation Reality Check section(s).
    pub fn verdicts(&self) -> Vec<&ValuationCall> {
        self.sections.iter().flat_map(|s| s.verdicts.iter()).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Extractor {
    vocab: ExtractVocabulary,
}

struct RawSection<'a> {
    heading: &'a str,
    canonical: Option<String>,
    lines: Vec<&'a str>,
}

impl Extractor {
    pub fn new(vocab: ExtractVocabulary) -> Self {
        Self { vocab }
    }

    pub fn vocabulary(&self) -> &ExtractVocabulary {
        &self.vocab
    }

    pub fn extract(&self, text: &str) -> ExtractedDocument {
        let (metadata, content) = split_frontmatter(text);

        let mut preamble: Vec<&str> = Vec::new();
        let mut raw: Vec<RawSection> = Vec::new();
        let mut in_fence = false;

        for line in content.lines() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_fence = !in_fence;
            }
            let heading = if in_fence {
                None
            } else {
                heading_text(line, self.vocab.heading_level)
            };
            match heading {
                Some(h) => raw.push(RawSection {
                    heading: h,
                    canonical: self
                        .vocab
                        .canonical_heading(strip_decorations(h))
                        .map(str::to_string),
                    lines: Vec::new(),
                }),
                None => match raw.last_mut() {
                    Some(sec) => sec.lines.push(line),
                    None => preamble.push(line),
                },
            }
        }

        let recognized = raw.iter().filter(|r| r.canonical.is_some()).count();
        if recognized == 0 {
            debug!(target: "extract", headings = raw.len(), "no recognized sections; passthrough document");
            return ExtractedDocument {
                metadata,
                sections: vec![self.section(
                    DOCUMENT_SECTION.to_string(),
                    String::new(),
                    SectionKind::Passthrough,
                    text.to_string(),
                )],
            };
        }

        let mut sections = Vec::with_capacity(raw.len() + 1);
        let pre = join_body(&preamble);
        if !pre.trim().is_empty() {
            sections.push(self.section(
                PREAMBLE_SECTION.to_string(),
                String::new(),
                SectionKind::Passthrough,
                pre,
            ));
        }
        for r in raw {
            let heading = r.heading.to_string();
            let (name, kind) = match r.canonical {
                Some(c) => (c, SectionKind::Recognized),
                None => (heading.clone(), SectionKind::Passthrough),
            };
            sections.push(self.section(name, heading, kind, join_body(&r.lines)));
        }

        debug!(
            target: "extract",
            sections = sections.len(),
            recognized,
            metadata_keys = metadata.len(),
            "document extracted"
        );
        ExtractedDocument { metadata, sections }
    }

    fn section(&self, name: String, heading: String, kind: SectionKind, body: String) -> ResearchSection {
        let tickers = extract_tickers(&body, &self.vocab);
        let tables = tables::extract_tables(&body, &self.vocab);
        // verdicts only from the valuation section
        let verdicts = if kind == SectionKind::Recognized && name == VALUATION_SECTION {
            valuation::extract_verdicts(&body, &tables)
        } else {
            Vec::new()
        };
        ResearchSection {
            name,
            heading,
            kind,
            body,
            tickers,
            tables,
            verdicts,
        }
    }
}

static DEFAULT_EXTRACTOR: Lazy<Extractor> = Lazy::new(Extractor::default);

/// Extract with the built-in vocabulary.
pub fn extract_with_default(text: &str) -> ExtractedDocument {
    DEFAULT_EXTRACTOR.extract(text)
}

/// Heading text if `line` is a heading of exactly `level` (`## Foo` for level 2).
fn heading_text(line: &str, level: usize) -> Option<&str> {
    let t = line.trim_start();
    let hashes = t.chars().take_while(|c| *c == '#').count();
    if hashes != level {
        return None;
    }
    let rest = &t[hashes..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let h = rest.trim().trim_end_matches('#').trim_end();
    (!h.is_empty()).then_some(h)
}

/// Drop leading emoji/punctuation/numbering and trailing `:`/`*` from a heading.
fn strip_decorations(heading: &str) -> &str {
    let h = heading.trim_start_matches(|c: char| !c.is_alphanumeric());
    let h = match NUMBERING.find(h) {
        Some(m) => h[m.end()..].trim_start_matches(|c: char| !c.is_alphanumeric()),
        None => h,
    };
    h.trim_end_matches(|c: char| c == ':' || c == '*' || c.is_whitespace())
}

/// Leading `---` block of `key: value` lines. Returns metadata and the remaining text.
fn split_frontmatter(text: &str) -> (BTreeMap<String, String>, &str) {
    let mut meta = BTreeMap::new();
    let body = text.trim_start_matches('\u{feff}');
    let Some(rest) = body
        .strip_prefix("---\n")
        .or_else(|| body.strip_prefix("---\r\n"))
    else {
        return (meta, text);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let l = line.trim_end_matches(['\n', '\r']);
        offset += line.len();
        if l.trim() == "---" {
            return (meta, &rest[offset..]);
        }
        if let Some((k, v)) = l.split_once(':') {
            let k = k.trim();
            if !k.is_empty() && !l.starts_with(char::is_whitespace) {
                let v = v.trim().trim_matches(|c| c == '"' || c == '\'');
                meta.insert(k.to_string(), v.to_string());
            }
        }
    }
    // no closing fence: not frontmatter
    (BTreeMap::new(), text)
}

fn join_body(lines: &[&str]) -> String {
    lines.join("\n").trim_matches('\n').to_string()
}

fn first_paragraph(text: &str) -> Option<String> {
    let para: Vec<&str> = text
        .trim_start()
        .lines()
        .take_while(|l| !l.trim().is_empty() && l.trim() != "---" && !l.starts_with('#'))
        .collect();
    let p = para.join(" ").trim().to_string();
    (!p.is_empty()).then_some(p)
}

/// Body of the first `###`+ sub-heading whose stripped text matches one of `names`.
fn subsection(body: &str, names: &[&str]) -> Option<String> {
    let mut out: Option<Vec<&str>> = None;
    for line in body.lines() {
        let t = line.trim_start();
        if t.starts_with("###") {
            if out.is_some() {
                break;
            }
            let h = strip_decorations(t.trim_start_matches('#').trim()).to_lowercase();
            if names.contains(&h.as_str()) {
                out = Some(Vec::new());
            }
            continue;
        }
        if let Some(lines) = out.as_mut() {
            lines.push(line);
        }
    }
    out.map(|l| join_body(&l))
}

fn risk_items(body: &str, tables: &[Table]) -> Vec<String> {
    let from_tables: Vec<String> = tables
        .iter()
        .flat_map(|t| t.column("risk"))
        .filter(|r| !r.starts_with('['))
        .map(str::to_string)
        .collect();
    if !from_tables.is_empty() {
        return from_tables;
    }
    body.lines()
        .filter_map(|l| LIST_ITEM.captures(l))
        .map(|c| c["item"].trim().replace("**", ""))
        .filter(|s| !s.is_empty())
        .collect()
}
