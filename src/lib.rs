// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod cache;
pub mod clock;
pub mod compare;
pub mod config;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod sector;

pub use crate::api::{router, AppState};
pub use crate::cache::{CacheKind, CacheStats, Lookup, SectorCache};
pub use crate::error::{CoreError, CoreResult};
pub use crate::extract::{extract_with_default, ExtractedDocument, Extractor};
pub use crate::sector::SectorDetector;

use once_cell::sync::OnceCell;
use shuttle_axum::axum::Router;

static METRICS: OnceCell<crate::metrics::Metrics> = OnceCell::new();

/// Short, stable id for a query so logs never carry the raw text.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Full application router: API routes plus `/metrics`.
///
/// The Prometheus recorder is installed once per process; later calls reuse it.
pub async fn app() -> anyhow::Result<Router> {
    app_with_state(AppState::from_env())
}

pub fn app_with_state(state: AppState) -> anyhow::Result<Router> {
    let ttl = state.cache.default_ttl();
    let metrics = METRICS.get_or_try_init(|| crate::metrics::Metrics::init(ttl))?;
    Ok(api::router(state).merge(metrics.router()))
}
