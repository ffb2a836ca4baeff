// src/compare.rs
//! Side-by-side comparison of extracted research reports.
//!
//! Consumes [`ExtractedDocument`]s only through section names, so it works the
//! same for any vocabulary that keeps the TLDR, Executive Summary and Risk
//! Factors names. Sector exposure ranks the theme plus executive summary
//! against a [`SectorDetector`].

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::extract::ExtractedDocument;
use crate::sector::{SectorDetector, SectorMatch};

pub const MIN_REPORTS: usize = 2;
pub const MAX_REPORTS: usize = 4;
pub const TOP_TICKERS: usize = 5;
pub const TOP_RISKS: usize = 3;
pub const TOP_COMPANIES: usize = 10;

#[derive(Debug, Clone)]
pub struct ResearchReport {
    pub name: String,
    pub document: ExtractedDocument,
}

impl ResearchReport {
    pub fn new(name: impl Into<String>, document: ExtractedDocument) -> Self {
        Self {
            name: name.into(),
            document,
        }
    }

    /// Frontmatter `theme`, else the title without its "Investment Research:" prefix.
    pub fn theme(&self) -> Option<String> {
        if let Some(t) = self.document.metadata.get("theme").filter(|t| !t.is_empty()) {
            return Some(t.clone());
        }
        self.document.title().map(|t| {
            t.strip_prefix("Investment Research:")
                .map(str::trim)
                .unwrap_or(&t)
                .to_string()
        })
    }

    /// Ticker-column entries first, then tickers seen in prose.
    pub fn tickers(&self) -> Vec<String> {
        let mut out = self.document.table_tickers();
        for t in self.document.tickers() {
            if !out.contains(&t) {
                out.push(t);
            }
        }
        out
    }

    /// Rows carrying both a ticker and a company name, first row per ticker wins.
    pub fn key_companies(&self) -> Vec<KeyCompany> {
        let mut out: Vec<KeyCompany> = Vec::new();
        let rows = self
            .document
            .sections
            .iter()
            .flat_map(|s| s.tables.iter())
            .filter(|t| t.has_field("ticker") && t.has_field("company"))
            .flat_map(|t| t.rows.iter());
        for row in rows {
            let (Some(ticker), Some(company)) = (row.field("ticker"), row.field("company")) else {
                continue;
            };
            let (ticker, company) = (ticker.trim(), company.trim());
            if ticker.is_empty() || company.is_empty() || out.iter().any(|k| k.ticker == ticker) {
                continue;
            }
            out.push(KeyCompany {
                ticker: ticker.to_string(),
                company: company.to_string(),
            });
        }
        out
    }

    /// Sectors matched by the theme and executive summary, best first.
    pub fn sector_exposure(&self, detector: &SectorDetector) -> Vec<SectorMatch> {
        let text = [self.theme(), self.document.executive_summary()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        detector.rank(&text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyCompany {
    pub ticker: String,
    pub company: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub name: String,
    pub theme: Option<String>,
    /// Frontmatter `generated` value, verbatim.
    pub generated: Option<String>,
    pub tldr: Option<String>,
    pub executive_summary: Option<String>,
    pub top_tickers: Vec<String>,
    pub top_risks: Vec<String>,
    pub key_companies: Vec<KeyCompany>,
    pub sector_exposure: Vec<SectorMatch>,
    pub ticker_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub reports: Vec<ReportSummary>,
    /// Tickers present in every report, sorted.
    pub common_tickers: Vec<String>,
    /// Tickers present in any report, sorted.
    pub all_tickers: Vec<String>,
    /// Every sector any report is exposed to, sorted.
    pub unique_sectors: Vec<String>,
}

pub fn compare(reports: &[ResearchReport], detector: &SectorDetector) -> CoreResult<Comparison> {
    if !(MIN_REPORTS..=MAX_REPORTS).contains(&reports.len()) {
        return Err(CoreError::Comparison(format!(
            "need {MIN_REPORTS} to {MAX_REPORTS} reports, got {}",
            reports.len()
        )));
    }

    let ticker_sets: Vec<BTreeSet<String>> = reports
        .iter()
        .map(|r| r.tickers().into_iter().collect())
        .collect();

    let mut common = ticker_sets[0].clone();
    for set in &ticker_sets[1..] {
        common = common.intersection(set).cloned().collect();
    }
    let all: BTreeSet<String> = ticker_sets.iter().flatten().cloned().collect();

    let summaries: Vec<ReportSummary> = reports
        .iter()
        .zip(&ticker_sets)
        .map(|(r, set)| {
            let mut top_tickers = r.tickers();
            top_tickers.truncate(TOP_TICKERS);
            let mut top_risks = r.document.risk_factors();
            top_risks.truncate(TOP_RISKS);
            let mut key_companies = r.key_companies();
            key_companies.truncate(TOP_COMPANIES);
            ReportSummary {
                name: r.name.clone(),
                theme: r.theme(),
                generated: r.document.metadata.get("generated").filter(|g| !g.is_empty()).cloned(),
                tldr: r.document.tldr(),
                executive_summary: r.document.executive_summary(),
                top_tickers,
                top_risks,
                key_companies,
                sector_exposure: r.sector_exposure(detector),
                ticker_count: set.len(),
            }
        })
        .collect();

    let sectors: BTreeSet<String> = summaries
        .iter()
        .flat_map(|s| s.sector_exposure.iter().map(|m| m.label.clone()))
        .collect();

    debug!(
        target: "compare",
        reports = reports.len(),
        common = common.len(),
        all = all.len(),
        sectors = sectors.len(),
        "reports compared"
    );

    Ok(Comparison {
        reports: summaries,
        common_tickers: common.into_iter().collect(),
        all_tickers: all.into_iter().collect(),
        unique_sectors: sectors.into_iter().collect(),
    })
}

/// Tickers appearing in two or more reports, mapped to the report names.
pub fn ticker_overlap(reports: &[ResearchReport]) -> BTreeMap<String, Vec<String>> {
    let mut seen: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for r in reports {
        for t in r.tickers() {
            let names = seen.entry(t).or_default();
            if !names.contains(&r.name) {
                names.push(r.name.clone());
            }
        }
    }
    seen.retain(|_, names| names.len() >= 2);
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_with_default;

    fn report(name: &str, text: &str) -> ResearchReport {
        ResearchReport::new(name, extract_with_default(text))
    }

    #[test]
    fn rejects_too_few_or_too_many() {
        let one = vec![report("a", "## TLDR\nNVDA")];
        let d = SectorDetector::default_seed();
        let err = compare(&one, &d).unwrap_err();
        assert!(matches!(err, CoreError::Comparison(_)));

        let five: Vec<_> = (0..5).map(|i| report(&i.to_string(), "## TLDR\nNVDA")).collect();
        assert!(compare(&five, &d).is_err());
    }

    #[test]
    fn theme_prefers_frontmatter_then_title() {
        let r = report("a", "---\ntheme: Grid Storage\n---\n# Investment Research: Other\n## TLDR\nx");
        assert_eq!(r.theme().as_deref(), Some("Grid Storage"));
        let r = report("b", "# Investment Research: AI Power Demand\n## TLDR\nx");
        assert_eq!(r.theme().as_deref(), Some("AI Power Demand"));
    }

    #[test]
    fn key_companies_need_ticker_and_company_columns() {
        let r = report(
            "a",
            "## Primary Players\n| Ticker | Company |\n|---|---|\n| CEG | Constellation |\n| CEG | Dup |\n| VST |  |\n\n\
             ## Supply Chain\n| Ticker | Role |\n|---|---|\n| MU | Memory |\n",
        );
        assert_eq!(
            r.key_companies(),
            vec![KeyCompany {
                ticker: "CEG".into(),
                company: "Constellation".into()
            }]
        );
    }

    #[test]
    fn overlap_needs_two_reports() {
        let a = report("a", "## TLDR\nNVDA and TSM");
        let b = report("b", "## TLDR\nTSM and ASML.AS");
        let map = ticker_overlap(&[a, b]);
        assert_eq!(map.len(), 1);
        assert_eq!(map["TSM"], vec!["a".to_string(), "b".to_string()]);
    }
}
