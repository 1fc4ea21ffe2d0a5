// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`.  Screen names and query parameters are
// validated before anything is fetched; a bad value is a 400.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::scanner::ScanReport;
use crate::screens::{CanslimPreset, ScreenParams, TrendMethod};
use crate::types::{ScreenKind, Verdict};

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/screens/:screen/latest", get(latest_results))
        .route("/api/v1/screens/:screen/run", post(run_screen))
        .route("/api/v1/options/signals", get(option_signals))
        .route("/api/v1/cache/refresh", post(refresh_cache))
        .layer(cors)
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, Json(body)).into_response()
}

fn parse_screen(raw: &str) -> Result<ScreenKind, Response> {
    raw.parse::<ScreenKind>()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    state_version: u64,
    server_time: i64,
    uptime_secs: u64,
    screens: Vec<&'static str>,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
        uptime_secs: state.uptime_secs(),
        screens: ScreenKind::ALL.iter().map(|k| k.as_str()).collect(),
    };
    Json(resp)
}

// =============================================================================
// Screen results
// =============================================================================

#[derive(Serialize)]
struct ResultsResponse<'a> {
    screen: ScreenKind,
    run_id: uuid::Uuid,
    date: String,
    time: String,
    results: Vec<&'a Verdict>,
    evaluated: usize,
    skipped: &'a [crate::scanner::SkippedInstrument],
}

impl<'a> ResultsResponse<'a> {
    fn from_report(report: &'a ScanReport) -> Self {
        Self {
            screen: report.screen,
            run_id: report.run_id,
            date: report.finished_at.date_naive().to_string(),
            time: report.finished_at.format("%H:%M:%S").to_string(),
            results: report.hits(),
            evaluated: report.verdicts.len(),
            skipped: &report.skipped,
        }
    }
}

async fn latest_results(
    State(state): State<Arc<AppState>>,
    Path(screen): Path<String>,
) -> Response {
    let screen = match parse_screen(&screen) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match state.store.latest_for_today(screen) {
        Some(report) => Json(ResultsResponse::from_report(&report)).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("no {screen} results for today"),
        ),
    }
}

// =============================================================================
// Run a screen now
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct RunQuery {
    /// Comma-separated override of the universe.
    symbols: Option<String>,
    method: Option<String>,
    slope_thresh: Option<f64>,
    pct_thresh: Option<f64>,
    lookback: Option<usize>,
    preset: Option<String>,
    top_n: Option<usize>,
}

impl RunQuery {
    /// Apply screen-specific overrides on top of the configured parameters.
    fn apply(&self, screen: ScreenKind, params: &mut ScreenParams) -> anyhow::Result<()> {
        let bora_args = self.method.is_some()
            || self.slope_thresh.is_some()
            || self.pct_thresh.is_some()
            || self.lookback.is_some();
        if bora_args && screen != ScreenKind::Bora {
            anyhow::bail!("method, slope_thresh, pct_thresh and lookback only apply to bora");
        }
        if self.preset.is_some() && screen != ScreenKind::Canslim {
            anyhow::bail!("preset only applies to canslim");
        }
        if self.top_n.is_some() && screen != ScreenKind::MostTraded {
            anyhow::bail!("top_n only applies to most_traded");
        }

        if let Some(method) = &self.method {
            params.bora.method = method.parse::<TrendMethod>()?;
        }
        if let Some(v) = self.slope_thresh {
            params.bora.slope_thresh = v;
        }
        if let Some(v) = self.pct_thresh {
            params.bora.pct_thresh = v;
        }
        if let Some(v) = self.lookback {
            params.bora.lookback = v;
        }
        if let Some(preset) = &self.preset {
            params.canslim = preset.parse::<CanslimPreset>()?.params();
        }
        if let Some(n) = self.top_n {
            params.most_traded.top_n = n;
        }
        params.validate()
    }

    fn symbols(&self) -> Option<Vec<String>> {
        self.symbols
            .as_ref()
            .map(|raw| raw.split(',').map(|s| s.to_string()).collect())
    }
}

async fn run_screen(
    State(state): State<Arc<AppState>>,
    Path(screen): Path<String>,
    Query(query): Query<RunQuery>,
) -> Response {
    let screen = match parse_screen(&screen) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    let explicit = query.symbols();
    let symbols = state.symbols_for(screen, explicit.as_deref());
    if symbols.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "no valid symbols to screen");
    }

    let mut request = state.scan_request(screen, symbols);
    if let Err(e) = query.apply(screen, &mut request.params) {
        return error_response(StatusCode::BAD_REQUEST, format!("{e:#}"));
    }

    match state.scanner.run(request).await {
        Ok(report) => {
            let body = serde_json::json!({
                "summary": ResultsResponse::from_report(&report),
                "report": &report,
            });
            info!(%screen, run_id = %report.run_id, "on-demand scan stored");
            state.store.append(report);
            state.increment_version();
            Json(body).into_response()
        }
        Err(e) => {
            warn!(%screen, error = %e, "on-demand scan failed");
            error_response(StatusCode::GATEWAY_TIMEOUT, format!("{e:#}"))
        }
    }
}

// =============================================================================
// Option signals
// =============================================================================

async fn option_signals(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.latest_option_signals())
}

// =============================================================================
// Cache refresh
// =============================================================================

async fn refresh_cache(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.refresh_caches();
    Json(serde_json::json!({
        "status": "ok",
        "state_version": state.current_state_version(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::market_data::FundamentalsProvider;
    use crate::runtime_config::RuntimeConfig;
    use crate::scanner::test_support::{downtrend, uptrend, FakeFundamentals, FakeMarket};
    use crate::verdict_store::VerdictStore;

    fn state_with(market: Arc<FakeMarket>) -> Arc<AppState> {
        let config = RuntimeConfig {
            symbols: vec!["UP".into(), "DOWN".into()],
            ..RuntimeConfig::default()
        };
        let fundamentals: Arc<dyn FundamentalsProvider> = Arc::new(FakeFundamentals::default());
        Arc::new(AppState::new(
            config,
            market,
            fundamentals,
            Arc::new(VerdictStore::in_memory()),
        ))
    }

    fn market() -> Arc<FakeMarket> {
        Arc::new(
            FakeMarket::default()
                .with("UP", uptrend(300))
                .with("DOWN", downtrend(300))
                .with("QQQ", uptrend(300)),
        )
    }

    async fn call(state: &Arc<AppState>, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_lists_screens() {
        let state = state_with(market());
        let (status, body) = call(&state, "GET", "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        let screens = body["screens"].as_array().unwrap();
        assert_eq!(screens.len(), ScreenKind::ALL.len());
        assert!(screens.iter().any(|s| s == "canslim"));
    }

    #[tokio::test]
    async fn unknown_screen_is_rejected_before_fetching() {
        let market = market();
        let state = state_with(market.clone());
        let (status, _) = call(&state, "GET", "/api/v1/screens/moonshot/latest").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = call(&state, "POST", "/api/v1/screens/moonshot/run").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("moonshot"));
        assert_eq!(market.calls(), 0);
    }

    #[tokio::test]
    async fn bad_parameters_are_rejected_before_fetching() {
        let market = market();
        let state = state_with(market.clone());
        for uri in [
            "/api/v1/screens/bora/run?method=zigzag",
            "/api/v1/screens/bora/run?lookback=1",
            "/api/v1/screens/stage2/run?preset=legacy",
            "/api/v1/screens/canslim/run?preset=aggressive",
            "/api/v1/screens/golden_cross/run?method=slope",
            "/api/v1/screens/bora/run?slope_thresh=NaN",
            "/api/v1/screens/bora/run?pct_thresh=inf",
            "/api/v1/screens/trending/run?top_n=3",
            "/api/v1/screens/most_traded/run?top_n=0",
        ] {
            let (status, _) = call(&state, "POST", uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        }
        assert_eq!(market.calls(), 0);
    }

    #[tokio::test]
    async fn run_then_latest() {
        let state = state_with(market());
        let (status, _) = call(&state, "GET", "/api/v1/screens/stage2/latest").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&state, "POST", "/api/v1/screens/stage2/run").await;
        assert_eq!(status, StatusCode::OK);
        let results = body["summary"]["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["instrument"], "UP");
        assert_eq!(body["summary"]["evaluated"], 2);

        let (status, body) = call(&state, "GET", "/api/v1/screens/stage2/latest").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["results"][0]["instrument"], "UP");
        assert!(body["date"].is_string());
    }

    #[tokio::test]
    async fn bora_accepts_trend_parameters() {
        let state = state_with(market());
        let (status, body) = call(
            &state,
            "POST",
            "/api/v1/screens/bora/run?method=strict&lookback=5&symbols=up",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"]["results"][0]["instrument"], "UP");
        assert_eq!(body["summary"]["evaluated"], 1);
    }

    #[tokio::test]
    async fn trending_runs_over_the_universe() {
        let state = state_with(market());
        let (status, body) = call(&state, "POST", "/api/v1/screens/trending/run").await;
        assert_eq!(status, StatusCode::OK);
        // Smooth 1-point steps stay under 2% a day.
        assert_eq!(body["summary"]["evaluated"], 2);
        assert!(body["summary"]["results"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn most_traded_honours_top_n() {
        use crate::market_data::PriceBar;
        use chrono::{TimeZone, Utc};
        let minute = |volume: f64| {
            let t = Utc.with_ymd_and_hms(2024, 3, 4, 15, 0, 0).unwrap();
            vec![PriceBar::new(t, 10.0, 10.5, 9.5, 10.2, volume)]
        };
        let market = Arc::new(
            FakeMarket::default()
                .with_intraday("UP", minute(5_000.0))
                .with_intraday("DOWN", minute(9_000.0)),
        );
        let state = state_with(market);
        let (status, body) =
            call(&state, "POST", "/api/v1/screens/most-traded/run?top_n=1").await;
        assert_eq!(status, StatusCode::OK);
        let results = body["summary"]["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["instrument"], "DOWN");
        assert_eq!(results[0]["details"]["buy_pct"], 100.0);
        assert_eq!(body["summary"]["evaluated"], 2);
    }

    #[tokio::test]
    async fn sector_breadth_ignores_explicit_symbols() {
        let market = Arc::new(
            FakeMarket::default()
                .with("UP", uptrend(30))
                .with("UP2", uptrend(30))
                .with("DOWN", downtrend(30)),
        );
        let mut config = RuntimeConfig::default();
        config.screens.sector_breadth.sectors = [
            ("Growth", vec!["UP", "UP2"]),
            ("Value", vec!["DOWN"]),
        ]
        .into_iter()
        .map(|(name, members)| {
            (
                name.to_string(),
                members.into_iter().map(String::from).collect(),
            )
        })
        .collect();
        let fundamentals: Arc<dyn FundamentalsProvider> = Arc::new(FakeFundamentals::default());
        let state = Arc::new(AppState::new(
            config,
            market,
            fundamentals,
            Arc::new(VerdictStore::in_memory()),
        ));

        let (status, body) = call(
            &state,
            "POST",
            "/api/v1/screens/follow_the_money/run?symbols=ZZZ",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summary"]["screen"], "sector_breadth");
        assert_eq!(body["summary"]["evaluated"], 2);
        let results = body["summary"]["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["instrument"], "Growth");
        assert_eq!(results[0]["details"]["class"], "leader");
    }

    #[tokio::test]
    async fn option_signals_report_each_strategy() {
        let state = state_with(market());
        let (status, _) = call(&state, "POST", "/api/v1/screens/leap_option_qqq_gap/run").await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = call(&state, "GET", "/api/v1/options/signals").await;
        assert_eq!(status, StatusCode::OK);
        // No gap in a smooth uptrend: both strategies present but empty.
        assert!(body["leap_option_qqq"].is_null());
        assert!(body["leap_option_qqq_gap"].is_null());
        assert_eq!(body.as_object().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cache_refresh_forces_refetch() {
        let market = market();
        let state = state_with(market.clone());
        call(&state, "POST", "/api/v1/screens/bora/run?symbols=UP").await;
        call(&state, "POST", "/api/v1/screens/bora/run?symbols=UP").await;
        assert_eq!(market.calls(), 1);

        let (status, body) = call(&state, "POST", "/api/v1/cache/refresh").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        call(&state, "POST", "/api/v1/screens/bora/run?symbols=UP").await;
        assert_eq!(market.calls(), 2);
    }
}
