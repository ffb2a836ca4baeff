// src/config/cache.rs
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_TTL_HOURS: &str = "SECTOR_CACHE_TTL_HOURS";
pub const ENV_SNAPSHOT_PATH: &str = "SECTOR_CACHE_SNAPSHOT";
pub const DEFAULT_SNAPSHOT_PATH: &str = "cache/sector_cache.json";

fn default_ttl_hours() -> u64 {
    12
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub default_ttl: Duration,
    pub snapshot_path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(default_ttl_hours() * 3600),
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
        }
    }
}

impl CacheConfig {
    /// Read SECTOR_CACHE_TTL_HOURS / SECTOR_CACHE_SNAPSHOT. Garbage or zero TTL falls back to 12h.
    pub fn from_env() -> Self {
        let secs = parse_hours(std::env::var(ENV_TTL_HOURS).ok())
            .and_then(|h| h.checked_mul(3600))
            .unwrap_or(default_ttl_hours() * 3600);
        let snapshot_path = std::env::var(ENV_SNAPSHOT_PATH)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH));

        Self {
            default_ttl: Duration::from_secs(secs),
            snapshot_path,
        }
    }
}

/// Positive hour count whose second count fits in a `u64`.
fn parse_hours(raw: Option<String>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|h| *h > 0 && h.checked_mul(3600).is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hours_rejects_garbage_and_zero() {
        assert_eq!(parse_hours(Some(" 6 ".into())), Some(6));
        assert_eq!(parse_hours(Some("0".into())), None);
        assert_eq!(parse_hours(Some("-3".into())), None);
        assert_eq!(parse_hours(Some("soon".into())), None);
        assert_eq!(parse_hours(None), None);
        assert_eq!(parse_hours(Some(u64::MAX.to_string())), None);
        assert_eq!(parse_hours(Some((u64::MAX / 3600 + 1).to_string())), None);
        assert_eq!(parse_hours(Some((u64::MAX / 3600).to_string())), Some(u64::MAX / 3600));
    }

    #[serial_test::serial]
    #[test]
    fn overflowing_ttl_falls_back_to_default() {
        std::env::set_var(ENV_TTL_HOURS, u64::MAX.to_string());
        let cfg = CacheConfig::from_env();
        std::env::remove_var(ENV_TTL_HOURS);
        assert_eq!(cfg.default_ttl, CacheConfig::default().default_ttl);
    }

    #[serial_test::serial]
    #[test]
    fn from_env_reads_overrides() {
        std::env::set_var(ENV_TTL_HOURS, "2");
        std::env::set_var(ENV_SNAPSHOT_PATH, "/tmp/sci_cache.json");
        let cfg = CacheConfig::from_env();
        assert_eq!(cfg.default_ttl, Duration::from_secs(7200));
        assert_eq!(cfg.snapshot_path, PathBuf::from("/tmp/sci_cache.json"));

        std::env::remove_var(ENV_TTL_HOURS);
        std::env::remove_var(ENV_SNAPSHOT_PATH);
        assert_eq!(CacheConfig::from_env(), CacheConfig::default());
    }
}
