//! Best-effort ticker spotting in free text.
//!
//! A ticker is 2–5 uppercase ASCII letters on word boundaries, optionally
//! followed by `.SUFFIX` when the suffix is a known exchange code
//! (`ASML.AS`, `SHOP.TO`). Deny-listed tokens (AI, CEO, TLDR, ...) are dropped.
//! Uppercase prose will produce false positives; callers treat the list as a hint.

use once_cell::sync::Lazy;
use regex::Regex;

use super::vocab::ExtractVocabulary;

static TICKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?P<base>[A-Z]{2,5})(?:\.(?P<suffix>[A-Z]{1,2}))?\b").expect("ticker regex")
});

/// Distinct tickers in first-occurrence order.
pub fn extract_tickers(text: &str, vocab: &ExtractVocabulary) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in TICKER_RE.captures_iter(text) {
        let Some(base) = caps.name("base") else {
            continue;
        };
        let base = base.as_str();
        if vocab.is_denied(base) {
            continue;
        }
        let ticker = match caps.name("suffix").map(|m| m.as_str()) {
            Some(sfx) if vocab.is_exchange_suffix(sfx) => format!("{base}.{sfx}"),
            _ => base.to_string(),
        };
        if !out.contains(&ticker) {
            out.push(ticker);
        }
    }
    out
}

/// Like [`extract_tickers`] but for a single table cell: the whole cell must be one ticker.
pub fn cell_ticker(cell: &str, vocab: &ExtractVocabulary) -> Option<String> {
    let cleaned: String = cell
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != '*' && *c != '`')
        .collect();
    let found = extract_tickers(&cleaned, vocab);
    match found.as_slice() {
        [one] if one.len() >= cleaned.trim().len() => Some(one.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> ExtractVocabulary {
        ExtractVocabulary::default()
    }

    #[test]
    fn finds_tickers_and_skips_denied_tokens() {
        let out = extract_tickers("Buy KEYS. The CEO said AI demand lifts NVDA and KEYS.", &vocab());
        assert_eq!(out, vec!["KEYS".to_string(), "NVDA".to_string()]);
    }

    #[test]
    fn keeps_known_exchange_suffixes_only() {
        let out = extract_tickers("ASML.AS and SHOP.TO, but not ABC.ZZ", &vocab());
        assert_eq!(out, vec!["ASML.AS", "SHOP.TO", "ABC"]);
    }

    #[test]
    fn ignores_lowercase_single_letters_and_long_words() {
        let out = extract_tickers("iPhone P/E of 30x, SEMICONDUCTOR boom, Q3 FY2025", &vocab());
        assert!(out.is_empty(), "got {out:?}");
    }

    #[test]
    fn cashtags_and_possessives_resolve_to_the_symbol() {
        let out = extract_tickers("$TSM and NVDA's margins", &vocab());
        assert_eq!(out, vec!["TSM", "NVDA"]);
    }

    #[test]
    fn cell_ticker_requires_the_whole_cell() {
        let v = vocab();
        assert_eq!(cell_ticker(" **NVDA** ", &v), Some("NVDA".to_string()));
        assert_eq!(cell_ticker("ASML.AS", &v), Some("ASML.AS".to_string()));
        assert_eq!(cell_ticker("NVIDIA Corp", &v), None);
        assert_eq!(cell_ticker("Ticker", &v), None);
    }
}
