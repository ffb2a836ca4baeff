//! One-shot maintenance: load the cache snapshot, drop expired entries, save it back
//! and print the cache report.

use supply_chain_intel::config::CacheConfig;
use supply_chain_intel::SectorCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let cfg = CacheConfig::from_env();
    let cache: SectorCache = SectorCache::new(cfg.default_ttl);

    let restored = cache.load_snapshot(&cfg.snapshot_path)?;
    let removed = cache.cleanup();
    cache.save_snapshot(&cfg.snapshot_path)?;

    tracing::info!(
        restored,
        removed,
        path = %cfg.snapshot_path.display(),
        "cache sweep done"
    );
    println!("{}", cache.render_report());
    Ok(())
}
