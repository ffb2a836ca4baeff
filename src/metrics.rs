use std::time::Duration;

use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and publish the cache's default TTL.
    ///
    /// Fails if a global recorder is already installed in this process.
    pub fn init(default_ttl: Duration) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!("sector_cache_hits_total", "Cache lookups answered from a valid entry");
        describe_counter!("sector_cache_misses_total", "Cache lookups with no entry");
        describe_counter!("sector_cache_expired_reads_total", "Cache lookups that found an expired entry");
        describe_counter!("sector_cache_evictions_total", "Entries removed by expiry or invalidation");
        describe_gauge!("sector_cache_default_ttl_secs", "Default TTL for new cache entries");

        gauge!("sector_cache_default_ttl_secs").set(default_ttl.as_secs_f64());

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
