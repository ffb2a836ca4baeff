//! Valuation verdicts from the "Valuation Reality Check" section.
//!
//! Two shapes are read, bullets first and then tables, first mention of a
//! ticker wins:
//! - bullets under a verdict sub-heading: `- **INTC** (Intel): trades below 5Y average`
//! - table rows with ticker + verdict columns: `| NVDA | NVIDIA | ... | 🔴 PRICED IN |`

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::tables::Table;

static VERDICT_BULLET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*[-*+]\s+\*\*(?P<ticker>[A-Z]{1,5}(?:\.[A-Z]{1,2})?)\*\*\s*(?:\((?P<company>[^)]*)\))?\s*:?\s*(?P<rationale>.*)$",
    )
    .expect("verdict bullet regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuationVerdict {
    Underappreciated,
    FairValue,
    PricedIn,
    Speculative,
    Unknown,
}

impl ValuationVerdict {
    /// Recognize a verdict label anywhere in `text` (emoji and extra words are fine).
    pub fn from_text(text: &str) -> Self {
        let t = text.to_uppercase();
        if t.contains("UNDERAPPRECIATED") {
            ValuationVerdict::Underappreciated
        } else if t.contains("PRICED IN") || t.contains("PRICED-IN") {
            ValuationVerdict::PricedIn
        } else if t.contains("FAIR VALUE") {
            ValuationVerdict::FairValue
        } else if t.contains("SPECULATIVE") {
            ValuationVerdict::Speculative
        } else {
            ValuationVerdict::Unknown
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ValuationVerdict::Underappreciated => "UNDERAPPRECIATED",
            ValuationVerdict::FairValue => "FAIR VALUE",
            ValuationVerdict::PricedIn => "PRICED IN",
            ValuationVerdict::Speculative => "SPECULATIVE",
            ValuationVerdict::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValuationCall {
    pub ticker: String,
    pub company: Option<String>,
    pub verdict: ValuationVerdict,
    pub rationale: Option<String>,
}

pub fn extract_verdicts(body: &str, tables: &[Table]) -> Vec<ValuationCall> {
    let mut calls: Vec<ValuationCall> = Vec::new();
    let mut current: Option<ValuationVerdict> = None;

    for line in body.lines() {
        let t = line.trim_start();
        if t.starts_with('#') {
            current = Some(ValuationVerdict::from_text(t)).filter(|v| *v != ValuationVerdict::Unknown);
            continue;
        }
        let Some(verdict) = current else {
            continue;
        };
        let Some(caps) = VERDICT_BULLET.captures(line) else {
            continue;
        };
        let ticker = caps["ticker"].to_string();
        if calls.iter().any(|c| c.ticker == ticker) {
            continue;
        }
        calls.push(ValuationCall {
            ticker,
            company: non_empty(caps.name("company").map(|m| m.as_str())),
            verdict,
            rationale: non_empty(caps.name("rationale").map(|m| m.as_str())),
        });
    }

    for table in tables.iter().filter(|t| t.has_field("ticker") && t.has_field("verdict")) {
        for row in &table.rows {
            let (Some(ticker), Some(verdict)) = (row.field("ticker"), row.field("verdict")) else {
                continue;
            };
            if calls.iter().any(|c| c.ticker == ticker) {
                continue;
            }
            calls.push(ValuationCall {
                ticker: ticker.to_string(),
                company: row.field("company").map(str::to_string),
                verdict: ValuationVerdict::from_text(verdict),
                rationale: None,
            });
        }
    }

    calls
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::tables::extract_tables;
    use crate::extract::vocab::ExtractVocabulary;

    const SECTION: &str = "\
**Summary**: 1 underappreciated, 0 fair value, 1 priced in, 0 speculative

### 🟢 Underappreciated (Consider Accumulating)

- **INTC** (Intel): P/E 12x vs 15x five-year average

### 🔴 Priced In (Wait for Pullback)

- **NVDA** (NVIDIA): implies 40% growth

### Detailed Valuation Table

| Ticker | Company | P/E | 5Y Avg | vs History | Implied Growth | Verdict |
|--------|---------|-----|--------|------------|----------------|---------|
| NVDA | NVIDIA | 45.0x | 35.0x | +29% | 40% | 🔴 PRICED IN |
| AMD | AMD | 38.0x | 30.0x | +27% | 30% | 🟡 FAIR VALUE |
";

    #[test]
    fn bullets_then_table_rows() {
        let tables = extract_tables(SECTION, &ExtractVocabulary::default());
        let calls = extract_verdicts(SECTION, &tables);
        let got: Vec<(&str, ValuationVerdict)> =
            calls.iter().map(|c| (c.ticker.as_str(), c.verdict)).collect();
        assert_eq!(
            got,
            vec![
                ("INTC", ValuationVerdict::Underappreciated),
                ("NVDA", ValuationVerdict::PricedIn),
                ("AMD", ValuationVerdict::FairValue),
            ]
        );
        assert_eq!(calls[0].company.as_deref(), Some("Intel"));
        assert_eq!(
            calls[0].rationale.as_deref(),
            Some("P/E 12x vs 15x five-year average")
        );
        assert_eq!(calls[2].rationale, None);
    }

    #[test]
    fn bullets_outside_verdict_headings_are_ignored() {
        let calls = extract_verdicts("- **KEYS** (Keysight): strong\n", &[]);
        assert!(calls.is_empty());
    }

    #[test]
    fn verdict_labels() {
        assert_eq!(ValuationVerdict::from_text("⚪ speculative"), ValuationVerdict::Speculative);
        assert_eq!(ValuationVerdict::from_text("n/a"), ValuationVerdict::Unknown);
        assert_eq!(ValuationVerdict::PricedIn.label(), "PRICED IN");
    }
}
