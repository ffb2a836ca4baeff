//! # Sector Detector
//!
//! Maps a free-text research query (e.g. "quantum computing supply chain")
//! to a canonical sector label used as the cache partition key.
//!
//! - Vocabulary loads from TOML (`[[sectors]]` tables, registration order kept).
//! - Matching is on normalized text: lowercase, non-alphanumeric runs collapsed to one space.
//! - Keywords match as substrings, so "semiconductor" also scores "semiconductors".
//! - Highest total occurrence count wins; ties go to the first registered sector.
//! - No match (or empty query) yields the default label, `"general"`.

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_SECTOR_CONFIG_PATH: &str = "config/sectors.toml";
pub const ENV_SECTOR_CONFIG_PATH: &str = "SECTOR_CONFIG_PATH";
pub const GENERAL_SECTOR: &str = "general";

/// A canonical sector label plus the keywords that map to it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct SectorInfo {
    pub label: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// One scored sector, as returned by [`SectorDetector::rank`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SectorMatch {
    pub label: String,
    pub score: usize,
}

#[derive(Debug, Deserialize)]
struct SectorFile {
    #[serde(default = "default_label")]
    default_label: String,
    #[serde(default)]
    sectors: Vec<SectorInfo>,
}

fn default_label() -> String {
    GENERAL_SECTOR.to_string()
}

#[derive(Debug, Clone)]
pub struct SectorDetector {
    sectors: Vec<SectorInfo>,
    default_label: String,
}

impl SectorDetector {
    /// Build a detector from sectors in registration order.
    ///
    /// Keywords are normalized and empty ones dropped. Labels must be non-empty and
    /// unique, and a keyword may belong to one sector only.
    pub fn new(sectors: Vec<SectorInfo>, default_label: impl Into<String>) -> anyhow::Result<Self> {
        let default_label = default_label.into().trim().to_string();
        if default_label.is_empty() {
            anyhow::bail!("default sector label must not be empty");
        }

        let mut owner: HashMap<String, String> = HashMap::new();
        let mut out: Vec<SectorInfo> = Vec::with_capacity(sectors.len());

        for s in sectors {
            let label = s.label.trim().to_string();
            if label.is_empty() {
                anyhow::bail!("sector label must not be empty");
            }
            if label == default_label || out.iter().any(|o| o.label == label) {
                anyhow::bail!("duplicate sector label `{label}`");
            }

            let mut keywords = Vec::with_capacity(s.keywords.len());
            for kw in &s.keywords {
                let k = normalize(kw);
                if k.is_empty() || keywords.contains(&k) {
                    continue;
                }
                if let Some(prev) = owner.get(&k) {
                    anyhow::bail!("keyword `{k}` registered for both `{prev}` and `{label}`");
                }
                owner.insert(k.clone(), label.clone());
                keywords.push(k);
            }

            out.push(SectorInfo { label, keywords });
        }

        Ok(Self {
            sectors: out,
            default_label,
        })
    }

    /// Load from TOML. Uses SECTOR_CONFIG_PATH or defaults to "config/sectors.toml".
    pub fn from_toml() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_SECTOR_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SECTOR_CONFIG_PATH));
        Self::from_toml_file(&path)
    }

    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading sector config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing sector config {}", path.display()))
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let file: SectorFile = toml::from_str(toml_str)?;
        Self::new(file.sectors, file.default_label)
    }

    /// Like [`from_toml`](Self::from_toml), but falls back to [`default_seed`](Self::default_seed).
    pub fn load_or_default() -> Self {
        match Self::from_toml() {
            Ok(d) => d,
            Err(e) => {
                warn!(target: "sector", error = %format!("{e:#}"), "using built-in sector vocabulary");
                Self::default_seed()
            }
        }
    }

    /// Return the best-matching sector label for `query`.
    pub fn detect(&self, query: &str) -> &str {
        let text = normalize(query);
        let mut best: Option<(&SectorInfo, usize)> = None;

        if !text.is_empty() {
            for s in &self.sectors {
                let score = score_sector(s, &text);
                // Strictly greater: the first registered sector keeps a tie.
                if score > 0 && best.map_or(true, |(_, b)| score > b) {
                    best = Some((s, score));
                }
            }
        }

        let label = best
            .map(|(s, _)| s.label.as_str())
            .unwrap_or(self.default_label.as_str());
        debug!(
            target: "sector",
            id = %crate::anon_hash(query),
            sector = label,
            score = best.map(|(_, b)| b).unwrap_or(0),
            "sector detected"
        );
        label
    }

    /// All sectors with a non-zero score, best first (registration order among equals).
    pub fn rank(&self, query: &str) -> Vec<SectorMatch> {
        let text = normalize(query);
        if text.is_empty() {
            return Vec::new();
        }
        let mut out: Vec<SectorMatch> = self
            .sectors
            .iter()
            .map(|s| SectorMatch {
                label: s.label.clone(),
                score: score_sector(s, &text),
            })
            .filter(|m| m.score > 0)
            .collect();
        // stable sort keeps registration order for equal scores
        out.sort_by(|a, b| b.score.cmp(&a.score));
        out
    }

    pub fn sectors(&self) -> &[SectorInfo] {
        &self.sectors
    }

    pub fn info(&self, label: &str) -> Option<&SectorInfo> {
        self.sectors.iter().find(|s| s.label == label)
    }

    pub fn default_label(&self) -> &str {
        &self.default_label
    }

    /// Built-in vocabulary, used when no config file is found.
    pub fn default_seed() -> Self {
        let seed: &[(&str, &[&str])] = &[
            (
                "quantum_computing",
                &["quantum", "qubit", "superconducting qubit", "trapped ion", "cryogenic"],
            ),
            (
                "semiconductors",
                &[
                    "semiconductor",
                    "chip",
                    "foundry",
                    "wafer",
                    "lithography",
                    "euv",
                    "packaging",
                    "memory",
                ],
            ),
            (
                "artificial_intelligence",
                &[
                    "ai infrastructure",
                    "artificial intelligence",
                    "machine learning",
                    "generative ai",
                    "llm",
                    "gpu",
                    "data center",
                    "datacenter",
                    "inference",
                ],
            ),
            (
                "energy",
                &[
                    "energy",
                    "power grid",
                    "nuclear",
                    "uranium",
                    "solar",
                    "wind turbine",
                    "natural gas",
                    "crude oil",
                    "oil and gas",
                    "utilities",
                ],
            ),
            (
                "batteries_ev",
                &["battery", "batteries", "lithium", "electric vehicle", "ev charging", "cathode"],
            ),
            (
                "biotech",
                &["biotech", "pharma", "drug", "glp-1", "clinical trial", "genomics", "healthcare"],
            ),
            (
                "defense_aerospace",
                &["defense", "defence", "aerospace", "missile", "drone", "munitions"],
            ),
            ("space", &["satellite", "launch vehicle", "orbit", "space economy"]),
            (
                "materials",
                &["rare earth", "copper", "critical mineral", "mining stocks", "steel", "graphite"],
            ),
            (
                "networking",
                &["optical", "networking", "fiber", "5g", "interconnect", "photonics"],
            ),
            (
                "supply_chain",
                &["supply chain", "logistics", "shipping", "freight", "supplier"],
            ),
        ];

        let sectors = seed
            .iter()
            .map(|(label, kws)| SectorInfo {
                label: (*label).to_string(),
                keywords: kws.iter().map(|k| (*k).to_string()).collect(),
            })
            .collect();

        // Seed is a compile-time constant; it is validated by tests.
        Self::new(sectors, GENERAL_SECTOR).unwrap_or_else(|_| Self {
            sectors: Vec::new(),
            default_label: GENERAL_SECTOR.to_string(),
        })
    }
}

fn score_sector(s: &SectorInfo, text: &str) -> usize {
    s.keywords.iter().map(|k| text.matches(k.as_str()).count()).sum()
}

/// Lowercase and collapse every run of non-alphanumeric characters (except `-`) into one space.
pub(crate) fn normalize(s: &str) -> String {
    let lower = s.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut pending_space = false;
    for ch in lower.chars() {
        if ch.is_alphanumeric() || ch == '-' {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_seed_is_valid_and_non_empty() {
        let keywords: usize = default_seed_keywords();
        let d = SectorDetector::default_seed();
        assert_eq!(d.sectors().len(), 11);
        assert!(keywords > 0);
        assert_eq!(d.default_label(), GENERAL_SECTOR);
    }

    fn default_seed_keywords() -> usize {
        SectorDetector::default_seed()
            .sectors()
            .iter()
            .map(|s| s.keywords.len())
            .sum()
    }

    #[test]
    fn normalize_collapses_punctuation() {
        assert_eq!(normalize("  Semiconductor,Supply--Chain!! "), "semiconductor supply--chain");
        assert_eq!(normalize("AI / ML"), "ai ml");
        assert_eq!(normalize("GLP-1 drugs"), "glp-1 drugs");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn quantum_beats_generic_supply_chain() {
        let d = SectorDetector::default_seed();
        assert_eq!(d.detect("quantum computing supply chain"), "quantum_computing");
    }

    #[test]
    fn empty_query_is_general() {
        let d = SectorDetector::default_seed();
        assert_eq!(d.detect(""), GENERAL_SECTOR);
        assert_eq!(d.detect("   "), GENERAL_SECTOR);
        assert!(d.rank("").is_empty());
    }

    #[test]
    fn tie_goes_to_first_registered() {
        let d = SectorDetector::new(
            vec![
                SectorInfo {
                    label: "alpha".into(),
                    keywords: vec!["foo".into()],
                },
                SectorInfo {
                    label: "beta".into(),
                    keywords: vec!["bar".into()],
                },
            ],
            GENERAL_SECTOR,
        )
        .unwrap();
        assert_eq!(d.detect("bar foo"), "alpha");
        assert_eq!(d.detect("bar foo bar"), "beta");

        let ranked = d.rank("foo bar");
        assert_eq!(ranked[0].label, "alpha");
        assert_eq!(ranked[1].label, "beta");
    }

    #[test]
    fn substring_matching_tolerates_compounds() {
        let d = SectorDetector::default_seed();
        assert_eq!(d.detect("Semiconductors and wafers"), "semiconductors");
    }

    #[test]
    fn rejects_duplicate_labels_and_shared_keywords() {
        let dup = SectorDetector::new(
            vec![
                SectorInfo {
                    label: "a".into(),
                    keywords: vec!["x".into()],
                },
                SectorInfo {
                    label: "a".into(),
                    keywords: vec!["y".into()],
                },
            ],
            GENERAL_SECTOR,
        );
        assert!(dup.is_err());

        let shared = SectorDetector::new(
            vec![
                SectorInfo {
                    label: "a".into(),
                    keywords: vec!["Chip".into()],
                },
                SectorInfo {
                    label: "b".into(),
                    keywords: vec!["chip".into()],
                },
            ],
            GENERAL_SECTOR,
        );
        assert!(shared.is_err());
    }

    #[test]
    fn toml_preserves_registration_order() {
        let toml = r#"
default_label = "other"

[[sectors]]
label = "robotics"
keywords = ["robot", "actuator"]

[[sectors]]
label = "ai"
keywords = ["robot brain"]
"#;
        let d = SectorDetector::from_toml_str(toml).unwrap();
        assert_eq!(d.default_label(), "other");
        assert_eq!(d.sectors()[0].label, "robotics");
        // "robot brain" contains "robot" once for each sector: tie → robotics
        assert_eq!(d.detect("robot brain"), "robotics");
        assert_eq!(d.detect("nothing relevant"), "other");
        assert!(d.info("ai").is_some());
    }
}
