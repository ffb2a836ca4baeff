//! Integration tests for the sector cache: TTL expiry, key isolation, stats
//! accounting and snapshot persistence. Time is driven by `ManualClock`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use supply_chain_intel::cache::{CacheKind, Lookup, SectorCache};
use supply_chain_intel::clock::ManualClock;
use supply_chain_intel::CoreError;

const HOUR: Duration = Duration::from_secs(3600);

fn cache_with_clock() -> (SectorCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let cache = SectorCache::with_clock(Duration::from_secs(12 * 3600), clock.clone());
    (cache, clock)
}

#[test]
fn entry_expires_after_ttl_and_counts_as_eviction() {
    let (cache, clock) = cache_with_clock();

    cache
        .put("semiconductors", CacheKind::MarketData, json!({"KEYS": 155.0}), Some(HOUR))
        .unwrap();

    clock.advance(Duration::from_secs(30 * 60));
    let hit = cache.get("semiconductors", CacheKind::MarketData).unwrap();
    assert_eq!(hit, Lookup::Hit(json!({"KEYS": 155.0})));

    clock.advance(2 * HOUR);
    let before = cache.stats();
    let miss = cache.get("semiconductors", CacheKind::MarketData).unwrap();
    assert_eq!(miss, Lookup::Miss);

    let after = cache.stats();
    assert_eq!(after.evictions, before.evictions + 1);
    assert_eq!(after.misses, before.misses, "expired read is an eviction, not a plain miss");
    assert_eq!(after.expired_reads, before.expired_reads + 1);
    assert_eq!(after.lookups(), 2);
    assert_eq!(after.hit_rate_pct(), 50.0);
    assert_eq!(after.size, 0);
}

#[test]
fn keys_are_isolated_by_sector_and_kind() {
    let (cache, _clock) = cache_with_clock();
    cache
        .put("energy", CacheKind::MarketData, json!({"CEG": 300.0}), None)
        .unwrap();

    assert_eq!(
        cache.get("energy", CacheKind::SearchResults).unwrap(),
        Lookup::Miss
    );
    assert_eq!(
        cache.get("biotech", CacheKind::MarketData).unwrap(),
        Lookup::Miss
    );
    assert!(cache.get("energy", CacheKind::MarketData).unwrap().is_hit());
}

#[test]
fn stats_track_puts_hits_misses_and_evictions() {
    let (cache, clock) = cache_with_clock();

    // n = 3 puts, one with a short TTL
    cache.put("space", CacheKind::MarketData, json!(1), None).unwrap();
    cache.put("space", CacheKind::SearchResults, json!(2), None).unwrap();
    cache
        .put("materials", CacheKind::MarketData, json!(3), Some(Duration::from_secs(60)))
        .unwrap();

    // m = 2 hits
    assert!(cache.get("space", CacheKind::MarketData).unwrap().is_hit());
    assert!(cache.get("space", CacheKind::SearchResults).unwrap().is_hit());

    // k = 2 misses
    assert!(!cache.get("defense", CacheKind::MarketData).unwrap().is_hit());
    assert!(!cache.get("materials", CacheKind::SearchResults).unwrap().is_hit());

    // e = 1 eviction
    clock.advance(Duration::from_secs(120));
    assert!(!cache.get("materials", CacheKind::MarketData).unwrap().is_hit());

    let s = cache.stats();
    assert_eq!(s.hits, 2);
    assert_eq!(s.misses, 2);
    assert_eq!(s.expired_reads, 1);
    assert_eq!(s.evictions, 1);
    assert_eq!(s.size, 2);
    // k + e = 3 non-hit lookups out of 5
    assert_eq!(s.lookups(), 5);
    assert_eq!(s.hit_rate_pct(), 40.0);
}

#[test]
fn empty_sector_is_an_invalid_key() {
    let (cache, _clock) = cache_with_clock();
    let err = cache.get("  ", CacheKind::MarketData).unwrap_err();
    assert!(matches!(err, CoreError::InvalidKey(_)));
    assert!(cache.put("", CacheKind::SearchResults, json!([]), None).is_err());
    assert!(matches!(
        CacheKind::parse("prices"),
        Err(CoreError::InvalidKey(_))
    ));
}

#[test]
fn cleanup_removes_only_expired_entries() {
    let (cache, clock) = cache_with_clock();
    cache
        .put("energy", CacheKind::MarketData, json!(1), Some(HOUR))
        .unwrap();
    cache
        .put("energy", CacheKind::SearchResults, json!(2), Some(3 * HOUR))
        .unwrap();
    clock.advance(2 * HOUR);

    assert_eq!(cache.cleanup(), 1);
    assert_eq!(cache.stats().evictions, 1);
    assert_eq!(cache.sectors(), vec!["energy".to_string()]);
}

#[test]
fn snapshot_round_trip_drops_expired_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("sector_cache.json");

    let (cache, clock) = cache_with_clock();
    cache
        .put("semiconductors", CacheKind::MarketData, json!({"KEYS": 155.0}), Some(HOUR))
        .unwrap();
    cache
        .put("semiconductors", CacheKind::SearchResults, json!(["a", "b"]), Some(6 * HOUR))
        .unwrap();
    assert!(cache.get("semiconductors", CacheKind::MarketData).unwrap().is_hit());
    cache.save_snapshot(&path).unwrap();

    clock.advance(2 * HOUR);
    let restored = SectorCache::with_clock(Duration::from_secs(12 * 3600), clock.clone());
    assert_eq!(restored.load_snapshot(&path).unwrap(), 1);
    assert_eq!(
        restored.get("semiconductors", CacheKind::SearchResults).unwrap(),
        Lookup::Hit(json!(["a", "b"]))
    );
    assert_eq!(
        restored.get("semiconductors", CacheKind::MarketData).unwrap(),
        Lookup::Miss
    );
    // restored counters carry forward (1 hit before save + 1 hit now)
    assert_eq!(restored.stats().hits, 2);
}

#[test]
fn missing_snapshot_loads_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cache: SectorCache = SectorCache::new(HOUR);
    assert_eq!(cache.load_snapshot(&dir.path().join("absent.json")).unwrap(), 0);
}

#[tokio::test]
async fn get_or_fetch_calls_fetcher_once() {
    let (cache, _clock) = cache_with_clock();
    let calls = Arc::new(AtomicUsize::new(0));

    for expect_hit in [false, true] {
        let calls = calls.clone();
        let (value, hit) = cache
            .get_or_fetch("networking", CacheKind::MarketData, None, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(json!({"ANET": 95.5}))
            })
            .await
            .unwrap();
        assert_eq!(value, json!({"ANET": 95.5}));
        assert_eq!(hit, expect_hit);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_fetch_caches_nothing() {
    let (cache, _clock) = cache_with_clock();
    let res = cache
        .get_or_fetch("biotech", CacheKind::SearchResults, None, || async {
            Err(anyhow::anyhow!("provider down"))
        })
        .await;
    assert!(res.is_err());
    assert_eq!(cache.stats().size, 0);
}

#[test]
fn snapshot_keeps_sub_second_ttls() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sector_cache.json");

    let (cache, clock) = cache_with_clock();
    cache
        .put("space", CacheKind::MarketData, json!({"RKLB": 21.4}), Some(Duration::from_millis(1500)))
        .unwrap();
    cache.save_snapshot(&path).unwrap();

    let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(raw["entries"][0]["ttl_ms"], 1500);

    let restored: SectorCache = SectorCache::with_clock(Duration::from_secs(12 * 3600), clock.clone());
    assert_eq!(restored.load_snapshot(&path).unwrap(), 1);
    clock.advance(Duration::from_millis(1200));
    assert!(restored.get("space", CacheKind::MarketData).unwrap().is_hit());
    clock.advance(Duration::from_millis(400));
    assert_eq!(restored.get("space", CacheKind::MarketData).unwrap(), Lookup::Miss);
}
