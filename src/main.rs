//! Supply-chain intel service: binary entrypoint.
//! Boots the Axum HTTP server with the sector detector, section extractor and sector cache.

use std::sync::Arc;
use std::time::Duration;

use shuttle_axum::ShuttleAxum;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use supply_chain_intel::config::CacheConfig;
use supply_chain_intel::extract::ExtractVocabulary;
use supply_chain_intel::{AppState, Extractor, SectorCache, SectorDetector};

const SWEEP_EVERY: Duration = Duration::from_secs(3600);

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - SCI_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("SCI_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sector=info,sector_cache=info,extract=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

/// Periodically drop expired entries and persist the rest.
fn spawn_sweeper(cache: Arc<SectorCache>, cfg: CacheConfig) {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(SWEEP_EVERY);
        tick.tick().await;
        loop {
            tick.tick().await;
            let removed = cache.cleanup();
            match cache.save_snapshot(&cfg.snapshot_path) {
                Ok(()) => info!(target: "sector_cache", removed, "sweep done"),
                Err(e) => warn!(target: "sector_cache", error = %e, "snapshot save failed"),
            }
        }
    });
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let cfg = CacheConfig::from_env();
    let cache = SectorCache::new(cfg.default_ttl);
    match cache.load_snapshot(&cfg.snapshot_path) {
        Ok(n) => info!(target: "sector_cache", restored = n, path = %cfg.snapshot_path.display(), "snapshot loaded"),
        Err(e) => warn!(target: "sector_cache", error = %e, "snapshot ignored"),
    }

    let state = AppState::new(
        SectorDetector::load_or_default(),
        Extractor::new(ExtractVocabulary::load_or_default()),
        cache,
    );
    spawn_sweeper(state.cache.clone(), cfg);

    let router = supply_chain_intel::app_with_state(state)?;
    Ok(router.into())
}
