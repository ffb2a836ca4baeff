//! Heading, column and ticker vocabularies for the extractor.
//!
//! TOML shape (`config/extract.toml`):
//! ```toml
//! heading_level = 2
//! ticker_deny = ["AI", "US"]
//! exchange_suffixes = ["L", "TO"]
//!
//! [[headings]]
//! name = "Risk Factors"
//! aliases = ["Risks"]
//!
//! [[columns]]
//! field = "pe_ratio"
//! aliases = ["P/E", "PE Ratio"]
//! ```
//! Lists are ordered: the first heading/column alias that matches wins.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_EXTRACT_CONFIG_PATH: &str = "config/extract.toml";
pub const ENV_EXTRACT_CONFIG_PATH: &str = "EXTRACT_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingAlias {
    /// Canonical section name used as the output key.
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnAlias {
    /// Canonical field name for table rows (e.g. `pe_ratio`).
    pub field: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractVocabulary {
    #[serde(default = "default_heading_level")]
    pub heading_level: usize,
    #[serde(default)]
    pub headings: Vec<HeadingAlias>,
    #[serde(default)]
    pub columns: Vec<ColumnAlias>,
    #[serde(default)]
    pub ticker_deny: BTreeSet<String>,
    #[serde(default)]
    pub exchange_suffixes: BTreeSet<String>,
}

fn default_heading_level() -> usize {
    2
}

impl ExtractVocabulary {
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let mut v: Self = toml::from_str(toml_str)?;
        if v.heading_level == 0 || v.heading_level > 6 {
            anyhow::bail!("heading_level must be 1..=6, got {}", v.heading_level);
        }
        v.ticker_deny = v.ticker_deny.iter().map(|t| t.trim().to_ascii_uppercase()).collect();
        v.exchange_suffixes = v
            .exchange_suffixes
            .iter()
            .map(|t| t.trim().to_ascii_uppercase())
            .collect();
        Ok(v)
    }

    /// Load from TOML. Uses EXTRACT_CONFIG_PATH or defaults to "config/extract.toml".
    pub fn from_toml() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_EXTRACT_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_EXTRACT_CONFIG_PATH));
        Self::from_toml_file(&path)
    }

    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading extract config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing extract config {}", path.display()))
    }

    pub fn load_or_default() -> Self {
        match Self::from_toml() {
            Ok(v) => v,
            Err(e) => {
                warn!(target: "extract", error = %format!("{e:#}"), "using built-in extract vocabulary");
                Self::default()
            }
        }
    }

    /// Canonical section name for a (decoration-stripped) heading, if known.
    pub fn canonical_heading(&self, heading: &str) -> Option<&str> {
        let h = fold(heading);
        self.headings
            .iter()
            .find(|a| fold(&a.name) == h || a.aliases.iter().any(|x| fold(x) == h))
            .map(|a| a.name.as_str())
    }

    /// Canonical field for a table header cell, if known.
    pub fn canonical_column(&self, header: &str) -> Option<&str> {
        let h = fold(header);
        if h.is_empty() {
            return None;
        }
        self.columns
            .iter()
            .find(|c| fold(&c.field) == h || c.aliases.iter().any(|x| fold(x) == h))
            .map(|c| c.field.as_str())
    }

    pub fn is_denied(&self, token: &str) -> bool {
        self.ticker_deny.contains(token)
    }

    pub fn is_exchange_suffix(&self, suffix: &str) -> bool {
        self.exchange_suffixes.contains(suffix)
    }
}

/// Case-insensitive comparison form: lowercase, `*`/`_` emphasis removed, whitespace collapsed.
fn fold(s: &str) -> String {
    s.chars()
        .filter(|c| *c != '*' && *c != '_' && *c != '`')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn heading(name: &str, aliases: &[&str]) -> HeadingAlias {
    HeadingAlias {
        name: name.to_string(),
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
    }
}

fn column(field: &str, aliases: &[&str]) -> ColumnAlias {
    ColumnAlias {
        field: field.to_string(),
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
    }
}

impl Default for ExtractVocabulary {
    fn default() -> Self {
        let headings = vec![
            heading("TLDR", &["TL;DR", "TL DR"]),
            heading("Executive Summary", &["Summary", "Overview"]),
            heading("Primary Players", &["Primary Players (First-Order)", "First-Order Players"]),
            heading("Second-Order Opportunities", &["Second Order Opportunities"]),
            heading(
                "Third-Order Opportunities",
                &["Third-Order Opportunities (if depth >= 3)", "Third Order Opportunities"],
            ),
            heading("Market Impact Analysis", &["Market Impact"]),
            heading("Investment Strategies", &["Investment Implications"]),
            heading("Risk Factors", &["Risks", "Risk", "Key Risks"]),
            heading("Valuation Reality Check", &["Valuation Check"]),
            heading("Market Valuation", &["Market Valuation (powered by Finnhub)"]),
            heading("Key Relationships to Monitor", &["Key Relationships"]),
            heading(
                "Recommended Watchlist Additions",
                &["Watchlist Additions", "Additional Watchlist Additions"],
            ),
            heading("Key Takeaways", &["Takeaways"]),
            heading("Sources", &["References", "Source Citations"]),
        ];

        let columns = vec![
            column("ticker", &["Ticker", "Symbol"]),
            column("company", &["Company", "Name", "Company Name"]),
            column("role", &["Role", "Investment Merit"]),
            column("price", &["Price", "Current Price", "Last Price"]),
            column("range_52w", &["52W High/Low", "52 Week Range", "52W Range"]),
            column("pe_ratio", &["P/E", "PE", "PE Ratio", "P/E Ratio", "P/E (TTM)"]),
            column("pe_5y_avg", &["5Y Avg", "5Y Avg P/E"]),
            column("vs_history", &["vs History"]),
            column("implied_growth", &["Implied Growth"]),
            column("market_cap", &["Market Cap", "Mkt Cap", "Market Capitalization"]),
            column("verdict", &["Verdict", "Valuation"]),
            column("severity", &["Severity"]),
            column("impact", &["Impact", "Impact Type", "Impact Channel"]),
            column("probability", &["Probability", "Likelihood"]),
            column("mitigation", &["Mitigation"]),
            column("risk", &["Risk", "Risk Factor"]),
            column("target_upside", &["Target Upside", "Upside"]),
            column("timeframe", &["Timeframe", "Horizon"]),
            column("priority", &["Priority"]),
            column("theme", &["Theme"]),
        ];

        let ticker_deny = [
            "AI", "US", "USA", "UK", "EU", "TLDR", "CEO", "CFO", "CTO", "COO", "ETF", "ETFS", "IPO",
            "API", "USD", "EUR", "EPS", "GDP", "CPI", "YOY", "QOQ", "TTM", "YTD", "FY", "PE", "EV",
            "ROI", "ROE", "CAGR", "THE", "AND", "FOR", "NOT", "BUY", "SELL", "HOLD", "HIGH", "LOW",
            "NA", "LLM", "GPU", "CPU", "HBM", "DRAM", "EUV", "SEC", "FDA", "DOE", "DOD", "NATO",
            "OEM", "RISK", "NOTE", "SAAS", "TAM", "ESG", "IP", "RD", "PRICED", "FAIR", "VALUE",
            "IN", "OF", "OR", "IS", "AN", "AT", "BY", "NO", "SO", "WE",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let exchange_suffixes = [
            "L", "TO", "V", "HK", "T", "AS", "PA", "DE", "F", "SW", "MI", "MC", "ST", "CO", "OL",
            "KS", "KQ", "TW", "SS", "SZ", "AX", "NS", "BO", "SA",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self {
            heading_level: default_heading_level(),
            headings,
            columns,
            ticker_deny,
            exchange_suffixes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_lookup_is_case_insensitive_and_alias_aware() {
        let v = ExtractVocabulary::default();
        assert_eq!(v.canonical_heading("tldr"), Some("TLDR"));
        assert_eq!(v.canonical_heading("RISKS"), Some("Risk Factors"));
        assert_eq!(v.canonical_heading("**Executive   Summary**"), Some("Executive Summary"));
        assert_eq!(v.canonical_heading("Foobar"), None);
    }

    #[test]
    fn column_aliases_map_to_fields() {
        let v = ExtractVocabulary::default();
        assert_eq!(v.canonical_column("P/E"), Some("pe_ratio"));
        assert_eq!(v.canonical_column("pe ratio"), Some("pe_ratio"));
        assert_eq!(v.canonical_column("Symbol"), Some("ticker"));
        assert_eq!(v.canonical_column(""), None);
    }

    #[test]
    fn toml_normalizes_deny_list_and_rejects_bad_level() {
        let v = ExtractVocabulary::from_toml_str(
            r#"
heading_level = 3
ticker_deny = [" foo "]

[[headings]]
name = "Catalysts"
aliases = ["Catalysts to Watch"]
"#,
        )
        .unwrap();
        assert_eq!(v.heading_level, 3);
        assert!(v.is_denied("FOO"));
        assert_eq!(v.canonical_heading("catalysts to watch"), Some("Catalysts"));
        assert!(v.columns.is_empty());

        assert!(ExtractVocabulary::from_toml_str("heading_level = 0").is_err());
    }
}
