use std::sync::Arc;
use std::time::Duration;

use shuttle_axum::axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::cache::{CacheKind, CacheStats, Lookup, SectorCache};
use crate::compare::{self, Comparison, ResearchReport};
use crate::config::CacheConfig;
use crate::error::CoreError;
use crate::extract::{ExtractVocabulary, ExtractedDocument, Extractor};
use crate::sector::{SectorDetector, SectorMatch};

#[derive(Clone)]
pub struct AppState {
    pub detector: Arc<SectorDetector>,
    pub extractor: Arc<Extractor>,
    pub cache: Arc<SectorCache>,
}

impl AppState {
    pub fn new(detector: SectorDetector, extractor: Extractor, cache: SectorCache) -> Self {
        Self {
            detector: Arc::new(detector),
            extractor: Arc::new(extractor),
            cache: Arc::new(cache),
        }
    }

    /// Sector and extract configs from their TOML paths (seed on failure), cache TTL from env.
    pub fn from_env() -> Self {
        let cfg = CacheConfig::from_env();
        Self::new(
            SectorDetector::load_or_default(),
            Extractor::new(ExtractVocabulary::load_or_default()),
            SectorCache::new(cfg.default_ttl),
        )
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/detect", post(detect))
        .route("/extract", post(extract))
        .route("/compare", post(compare_reports))
        .route("/cache/stats", get(cache_stats))
        .route("/cache/report", get(cache_report))
        .route("/cache/cleanup", post(cache_cleanup))
        .route("/cache/clear", post(cache_clear))
        .route("/cache/{sector}/{kind}", get(cache_get).put(cache_put))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Maps core errors onto HTTP status codes.
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            warn!(error = %self.0, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(serde::Deserialize)]
struct DetectReq {
    query: String,
}

#[derive(serde::Serialize)]
struct DetectResp {
    sector: String,
    matches: Vec<SectorMatch>,
}

async fn detect(State(state): State<AppState>, Json(body): Json<DetectReq>) -> Json<DetectResp> {
    Json(DetectResp {
        sector: state.detector.detect(&body.query).to_string(),
        matches: state.detector.rank(&body.query),
    })
}

#[derive(serde::Deserialize)]
struct ExtractReq {
    text: String,
}

async fn extract(
    State(state): State<AppState>,
    Json(body): Json<ExtractReq>,
) -> Json<ExtractedDocument> {
    Json(state.extractor.extract(&body.text))
}

#[derive(serde::Deserialize)]
struct CompareItem {
    name: String,
    text: String,
}

#[derive(serde::Deserialize)]
struct CompareReq {
    reports: Vec<CompareItem>,
}

async fn compare_reports(
    State(state): State<AppState>,
    Json(body): Json<CompareReq>,
) -> Result<Json<Comparison>, ApiError> {
    let reports: Vec<ResearchReport> = body
        .reports
        .into_iter()
        .map(|r| ResearchReport::new(r.name, state.extractor.extract(&r.text)))
        .collect();
    Ok(Json(compare::compare(&reports, &state.detector)?))
}

#[derive(serde::Serialize)]
struct StatsOut {
    #[serde(flatten)]
    stats: CacheStats,
    hit_rate_pct: f64,
    sectors: Vec<String>,
}

async fn cache_stats(State(state): State<AppState>) -> Json<StatsOut> {
    let stats = state.cache.stats();
    Json(StatsOut {
        hit_rate_pct: stats.hit_rate_pct(),
        stats,
        sectors: state.cache.sectors(),
    })
}

async fn cache_report(State(state): State<AppState>) -> String {
    state.cache.render_report()
}

#[derive(serde::Serialize)]
struct CleanupOut {
    removed: usize,
}

async fn cache_cleanup(State(state): State<AppState>) -> Json<CleanupOut> {
    Json(CleanupOut {
        removed: state.cache.cleanup(),
    })
}

async fn cache_clear(State(state): State<AppState>) -> StatusCode {
    state.cache.clear();
    StatusCode::NO_CONTENT
}

async fn cache_get(
    State(state): State<AppState>,
    Path((sector, kind)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let kind = CacheKind::parse(&kind)?;
    Ok(match state.cache.get(&sector, kind)? {
        Lookup::Hit(payload) => Json(payload).into_response(),
        Lookup::Miss => StatusCode::NOT_FOUND.into_response(),
    })
}

#[derive(serde::Deserialize)]
struct PutReq {
    payload: serde_json::Value,
    #[serde(default)]
    ttl_secs: Option<u64>,
}

async fn cache_put(
    State(state): State<AppState>,
    Path((sector, kind)): Path<(String, String)>,
    Json(body): Json<PutReq>,
) -> Result<StatusCode, ApiError> {
    let kind = CacheKind::parse(&kind)?;
    let ttl = body.ttl_secs.map(Duration::from_secs);
    state.cache.put(&sector, kind, body.payload, ttl)?;
    Ok(StatusCode::NO_CONTENT)
}
