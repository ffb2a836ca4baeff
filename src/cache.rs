//! # Sector Cache
//!
//! In-memory TTL cache for market data and search results, partitioned by
//! detected sector. Keys are `(sector, kind)` so independently sourced data
//! never collides.
//!
//! - Absolute TTL from creation; `put` resets the timestamp.
//! - Expired entries are dropped lazily on `get` (an eviction and an expired
//!   read, which counts toward the hit rate) and
//!   eagerly by `cleanup()`, which callers invoke explicitly.
//! - One mutex guards the map and counters for a single read-check-write;
//!   fetches run outside it (see [`SectorCache::get_or_fetch`]).

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

use crate::clock::{elapsed_since, Clock, SystemClock};
use crate::error::{CoreError, CoreResult};

pub const DEFAULT_TTL: Duration = Duration::from_secs(12 * 3600);

/// Which upstream produced the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    MarketData,
    SearchResults,
}

impl CacheKind {
    pub const ALL: [CacheKind; 2] = [CacheKind::MarketData, CacheKind::SearchResults];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::MarketData => "market_data",
            CacheKind::SearchResults => "search_results",
        }
    }

    pub fn parse(s: &str) -> CoreResult<Self> {
        match s.trim() {
            "market_data" => Ok(CacheKind::MarketData),
            "search_results" => Ok(CacheKind::SearchResults),
            other => Err(CoreError::InvalidKey(format!("unknown cache kind `{other}`"))),
        }
    }
}

impl FromStr for CacheKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a lookup. `Miss` is distinct from a cached payload that happens to be empty.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<V> {
    Hit(V),
    Miss,
}

impl<V> Lookup<V> {
    pub fn is_hit(&self) -> bool {
        matches!(self, Lookup::Hit(_))
    }

    pub fn into_option(self) -> Option<V> {
        match self {
            Lookup::Hit(v) => Some(v),
            Lookup::Miss => None,
        }
    }
}

/// A cached payload with its creation time and TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub sector: String,
    pub kind: CacheKind,
    pub payload: V,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "ttl_ms", with = "duration_ms")]
    pub ttl: Duration,
    #[serde(default)]
    pub access_count: u64,
}

impl<V> CacheEntry<V> {
    /// Valid iff `now - created_at < ttl`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        elapsed_since(self.created_at, now) < self.ttl
    }
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Reads that found an expired entry (also counted in `evictions`).
    #[serde(default)]
    pub expired_reads: u64,
    pub evictions: u64,
    /// Unexpired entries at the time of the snapshot.
    pub size: u64,
}

impl CacheStats {
    /// Every `get`: hits, plain misses and reads of expired entries.
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses + self.expired_reads
    }

    /// Hits as a percentage of all lookups, rounded to one decimal.
    pub fn hit_rate_pct(&self) -> f64 {
        let total = self.lookups();
        if total == 0 {
            return 0.0;
        }
        (self.hits as f64 / total as f64 * 1000.0).round() / 10.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    sector: String,
    kind: CacheKind,
}

#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
struct Counters {
    hits: u64,
    misses: u64,
    #[serde(default)]
    expired_reads: u64,
    evictions: u64,
}

struct Inner<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    counters: Counters,
}

/// On-disk snapshot layout.
#[derive(Serialize, Deserialize)]
struct Snapshot<V> {
    saved_at: DateTime<Utc>,
    #[serde(rename = "default_ttl_ms", with = "duration_ms")]
    default_ttl: Duration,
    counters: Counters,
    entries: Vec<CacheEntry<V>>,
}

pub struct SectorCache<V = serde_json::Value> {
    inner: Mutex<Inner<V>>,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V> fmt::Debug for SectorCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SectorCache")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl<V: Clone> SectorCache<V> {
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_clock(default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                counters: Counters::default(),
            }),
            default_ttl,
            clock,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up `(sector, kind)`. Expired entries are removed and reported as `Miss`.
    pub fn get(&self, sector: &str, kind: CacheKind) -> CoreResult<Lookup<V>> {
        let key = make_key(sector, kind)?;
        let now = self.clock.now();
        let mut guard = self.lock();
        let inner = &mut *guard;

        match inner.entries.get_mut(&key) {
            Some(entry) if entry.is_valid_at(now) => {
                entry.access_count += 1;
                let payload = entry.payload.clone();
                inner.counters.hits += 1;
                counter!("sector_cache_hits_total").increment(1);
                return Ok(Lookup::Hit(payload));
            }
            Some(_) => {}
            None => {
                inner.counters.misses += 1;
                counter!("sector_cache_misses_total").increment(1);
                return Ok(Lookup::Miss);
            }
        }

        // expired: evict now and report a miss to the caller
        inner.entries.remove(&key);
        inner.counters.expired_reads += 1;
        inner.counters.evictions += 1;
        counter!("sector_cache_expired_reads_total").increment(1);
        counter!("sector_cache_evictions_total").increment(1);
        debug!(target: "sector_cache", sector = %key.sector, kind = %kind, "expired entry evicted on read");
        Ok(Lookup::Miss)
    }

    /// Store `payload`, replacing any entry for `(sector, kind)`. `ttl: None` uses the default.
    pub fn put(
        &self,
        sector: &str,
        kind: CacheKind,
        payload: V,
        ttl: Option<Duration>,
    ) -> CoreResult<()> {
        let key = make_key(sector, kind)?;
        let entry = CacheEntry {
            sector: key.sector.clone(),
            kind,
            payload,
            created_at: self.clock.now(),
            ttl: ttl.unwrap_or(self.default_ttl),
            access_count: 0,
        };
        self.lock().entries.insert(key, entry);
        Ok(())
    }

    /// Return the cached payload, or run `fetch` and cache its result.
    ///
    /// The lock is released while `fetch` runs. A failed fetch caches nothing.
    /// The boolean is `true` on a cache hit.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        sector: &str,
        kind: CacheKind,
        ttl: Option<Duration>,
        fetch: F,
    ) -> anyhow::Result<(V, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<V>>,
    {
        if let Lookup::Hit(v) = self.get(sector, kind)? {
            return Ok((v, true));
        }
        let fresh = fetch().await?;
        self.put(sector, kind, fresh.clone(), ttl)?;
        Ok((fresh, false))
    }

    /// Remove every expired entry; returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.is_valid_at(now));
        let removed = before - inner.entries.len();
        inner.counters.evictions += removed as u64;
        drop(inner);

        if removed > 0 {
            counter!("sector_cache_evictions_total").increment(removed as u64);
        }
        info!(target: "sector_cache", removed, "cleanup finished");
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let inner = self.lock();
        let size = inner.entries.values().filter(|e| e.is_valid_at(now)).count();
        CacheStats {
            hits: inner.counters.hits,
            misses: inner.counters.misses,
            expired_reads: inner.counters.expired_reads,
            evictions: inner.counters.evictions,
            size: size as u64,
        }
    }

    /// Empty the cache and reset all counters.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.counters = Counters::default();
    }

    /// Drop every kind cached for `sector`; counted as evictions.
    pub fn invalidate_sector(&self, sector: &str) -> CoreResult<usize> {
        let sector = normalize_sector(sector)?;
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|k, _| k.sector != sector);
        let removed = before - inner.entries.len();
        inner.counters.evictions += removed as u64;
        drop(inner);

        if removed > 0 {
            counter!("sector_cache_evictions_total").increment(removed as u64);
        }
        info!(target: "sector_cache", %sector, removed, "sector invalidated");
        Ok(removed)
    }

    /// Sorted distinct sectors with at least one unexpired entry.
    pub fn sectors(&self) -> Vec<String> {
        let now = self.clock.now();
        let inner = self.lock();
        inner
            .entries
            .values()
            .filter(|e| e.is_valid_at(now))
            .map(|e| e.sector.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Markdown summary of cache performance.
    pub fn render_report(&self) -> String {
        let stats = self.stats();
        let now = self.clock.now();
        let per_kind: Vec<(CacheKind, usize)> = {
            let inner = self.lock();
            CacheKind::ALL
                .iter()
                .map(|k| {
                    let n = inner
                        .entries
                        .values()
                        .filter(|e| e.kind == *k && e.is_valid_at(now))
                        .count();
                    (*k, n)
                })
                .collect()
        };
        let sectors = self.sectors();

        let mut lines = vec![
            "## Sector Analysis Cache Report".to_string(),
            String::new(),
            "### Cache Performance".to_string(),
            format!(
                "- **Hit Rate**: {:.1}% ({}/{} requests)",
                stats.hit_rate_pct(),
                stats.hits,
                stats.lookups()
            ),
            format!(
                "- **Entries**: {}",
                per_kind
                    .iter()
                    .map(|(k, n)| format!("{n} {k}"))
                    .collect::<Vec<_>>()
                    .join(" + ")
            ),
            format!("- **Sectors Tracked**: {}", sectors.len()),
            format!("- **Entries Evicted**: {}", stats.evictions),
            format!("- **Default TTL**: {}h", self.default_ttl.as_secs() / 3600),
        ];
        if !sectors.is_empty() {
            lines.push(String::new());
            lines.push("### Cached Sectors".to_string());
            lines.extend(sectors.iter().map(|s| format!("- {s}")));
        }
        lines.join("\n")
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl<V: Clone + Serialize + DeserializeOwned> SectorCache<V> {
    /// Write entries and counters to `path` as JSON (parent dirs are created).
    pub fn save_snapshot(&self, path: &Path) -> CoreResult<()> {
        let snapshot = {
            let inner = self.lock();
            let mut entries: Vec<CacheEntry<V>> = inner.entries.values().cloned().collect();
            entries.sort_by(|a, b| (&a.sector, a.kind).cmp(&(&b.sector, b.kind)));
            Snapshot {
                saved_at: self.clock.now(),
                default_ttl: self.default_ttl,
                counters: inner.counters,
                entries,
            }
        };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(&snapshot)?)?;
        debug!(target: "sector_cache", path = %path.display(), entries = snapshot.entries.len(), "snapshot saved");
        Ok(())
    }

    /// Merge a snapshot from `path`, skipping expired entries. Missing file loads nothing.
    ///
    /// Restored counters are added to the current ones. Returns entries loaded.
    pub fn load_snapshot(&self, path: &Path) -> CoreResult<usize> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot<V> = serde_json::from_slice(&bytes)?;
        let now = self.clock.now();

        let mut inner = self.lock();
        let mut loaded = 0;
        for entry in snapshot.entries {
            if !entry.is_valid_at(now) {
                continue;
            }
            let key = CacheKey {
                sector: entry.sector.clone(),
                kind: entry.kind,
            };
            inner.entries.insert(key, entry);
            loaded += 1;
        }
        inner.counters.hits += snapshot.counters.hits;
        inner.counters.misses += snapshot.counters.misses;
        inner.counters.expired_reads += snapshot.counters.expired_reads;
        inner.counters.evictions += snapshot.counters.evictions;
        info!(target: "sector_cache", path = %path.display(), loaded, "snapshot restored");
        Ok(loaded)
    }
}

fn normalize_sector(sector: &str) -> CoreResult<String> {
    let s = sector.trim().to_lowercase();
    if s.is_empty() {
        return Err(CoreError::InvalidKey("sector label must not be empty".into()));
    }
    Ok(s)
}

fn make_key(sector: &str, kind: CacheKind) -> CoreResult<CacheKey> {
    Ok(CacheKey {
        sector: normalize_sector(sector)?,
        kind,
    })
}

/// Durations as whole milliseconds; anything finer is dropped.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
