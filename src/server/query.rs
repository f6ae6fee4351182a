//! Public time-windowed history query.

use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{Duration, SecondsFormat, Utc};
use common::config::QueryConfig;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error};
use wind_store::WindRow;

use super::ServerState;

pub fn create_router() -> Router<ServerState> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route(
            "/api/wind-history",
            get(wind_history)
                .options(preflight)
                .fallback(method_not_allowed),
        )
        .layer(cors)
}

/// Raw query parameters. Kept as strings so malformed values fall back to
/// defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<String>,
    pub hours: Option<String>,
}

/// Parsed and clamped window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryWindow {
    pub limit: u32,
    pub hours: i64,
}

impl HistoryWindow {
    pub fn from_params(params: &HistoryParams, cfg: &QueryConfig) -> Self {
        let limit = params
            .limit
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(cfg.default_limit as i64)
            .clamp(1, cfg.max_limit.max(1) as i64) as u32;
        let hours = params
            .hours
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(cfg.default_hours)
            .clamp(1, cfg.max_hours.max(1));
        Self { limit, hours }
    }
}

/// Aggregates over the returned window, rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowStats {
    pub count: usize,
    pub avg_wind_speed: f64,
    pub max_gust: f64,
    /// Over rows with a nonzero speed; null when there are none.
    pub min_wind_speed: Option<f64>,
    pub max_wind_speed: f64,
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn compute_stats(rows: &[WindRow]) -> Option<WindowStats> {
    if rows.is_empty() {
        return None;
    }
    let count = rows.len();
    let total: f64 = rows.iter().map(|r| r.wind_speed_knots).sum();
    let max_gust = rows
        .iter()
        .map(|r| r.wind_gust_knots.unwrap_or(0.0))
        .fold(0.0, f64::max);
    let max_speed = rows.iter().map(|r| r.wind_speed_knots).fold(0.0, f64::max);
    let min_speed = rows
        .iter()
        .map(|r| r.wind_speed_knots)
        .filter(|s| *s > 0.0)
        .reduce(f64::min);

    Some(WindowStats {
        count,
        avg_wind_speed: round2(total / count as f64),
        max_gust: round2(max_gust),
        min_wind_speed: min_speed.map(round2),
        max_wind_speed: round2(max_speed),
    })
}

async fn wind_history(
    State(state): State<ServerState>,
    Query(params): Query<HistoryParams>,
) -> Response {
    let window = HistoryWindow::from_params(&params, &state.query);
    let now = Utc::now();
    let from = now - Duration::hours(window.hours);

    let rows = match state.store.query_since(from, window.limit).await {
        Ok(rows) => rows,
        Err(e) => {
            error!("Error fetching wind history: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response();
        }
    };
    debug!(
        "History query hours={} limit={} -> {} rows",
        window.hours,
        window.limit,
        rows.len()
    );

    let stats = compute_stats(&rows);
    let latest = rows.first().cloned();
    let count = rows.len();

    Json(json!({
        "success": true,
        "latest": latest,
        "history": rows,
        "stats": stats,
        "meta": {
            "count": count,
            "hours": window.hours,
            "timeRange": {
                "from": from.to_rfc3339_opts(SecondsFormat::Millis, true),
                "to": now.to_rfc3339_opts(SecondsFormat::Millis, true),
            }
        }
    }))
    .into_response()
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::create_app;
    use crate::server::test_support::*;
    use axum::body::Body;
    use axum::http::Request;
    use common::Error;
    use wind_store::{MeasurementStore, SqliteWindStore};

    fn empty_state(dir: &tempfile::TempDir) -> (SqliteWindStore, ServerState) {
        let store = SqliteWindStore::new(dir.path().join("wind.db"));
        let state = state_with(Err(Error::NoDevice("unused".into())), store.clone(), "s");
        (store, state)
    }

    fn get_history(query: &str) -> Request<Body> {
        Request::get(format!("/api/wind-history{query}"))
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_window_defaults_and_clamping() {
        let cfg = QueryConfig::default();
        let w = HistoryWindow::from_params(&HistoryParams::default(), &cfg);
        assert_eq!(w, HistoryWindow { limit: 100, hours: 24 });

        let w = HistoryWindow::from_params(
            &HistoryParams {
                limit: Some("50000".into()),
                hours: Some("0".into()),
            },
            &cfg,
        );
        assert_eq!(w, HistoryWindow { limit: 1000, hours: 1 });

        let w = HistoryWindow::from_params(
            &HistoryParams {
                limit: Some("-3".into()),
                hours: Some("banana".into()),
            },
            &cfg,
        );
        assert_eq!(w, HistoryWindow { limit: 1, hours: 24 });

        let w = HistoryWindow::from_params(
            &HistoryParams {
                limit: None,
                hours: Some("100000".into()),
            },
            &cfg,
        );
        assert_eq!(w.hours, 720);
    }

    #[tokio::test]
    async fn test_empty_store_returns_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let (_, state) = empty_state(&dir);

        let (status, body) = send(create_app(state), get_history("?hours=24&limit=100")).await;
        assert_eq!(status, 200);
        assert_eq!(body["success"], true);
        assert!(body["latest"].is_null());
        assert_eq!(body["history"], serde_json::json!([]));
        assert!(body["stats"].is_null());
        assert_eq!(body["meta"]["count"], 0);
        assert_eq!(body["meta"]["hours"], 24);
    }

    #[tokio::test]
    async fn test_history_window_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let (store, state) = empty_state(&dir);
        let now = Utc::now();

        for (mins, speed, gust) in [
            (5, 0.0, None),
            (15, 12.346, Some(18.0)),
            (25, 20.0, Some(26.5)),
            (35, 16.0, Some(21.0)),
            (180, 30.0, Some(40.0)),
        ] {
            store
                .insert(&measurement(now - Duration::minutes(mins), speed, gust, 90.0))
                .await
                .unwrap();
        }

        let (status, body) = send(create_app(state), get_history("?hours=1&limit=3")).await;
        assert_eq!(status, 200);

        let history = body["history"].as_array().unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(body["latest"], history[0]);
        assert_eq!(history[0]["wind_speed_knots"], 0.0);
        assert_eq!(history[2]["wind_speed_knots"], 20.0);

        // Stats cover only the three returned rows.
        let stats = &body["stats"];
        assert_eq!(stats["count"], 3);
        assert_eq!(stats["avgWindSpeed"], 10.78);
        assert_eq!(stats["maxGust"], 26.5);
        assert_eq!(stats["minWindSpeed"], 12.35);
        assert_eq!(stats["maxWindSpeed"], 20.0);
        assert_eq!(body["meta"]["hours"], 1);
    }

    #[tokio::test]
    async fn test_response_reads_back_through_relay_client() {
        let dir = tempfile::tempdir().unwrap();
        let (store, state) = empty_state(&dir);
        let now = Utc::now();
        for (mins, speed, gust, dir) in [(5, 18.0, Some(24.0), 270.0), (15, 14.0, None, 90.0)] {
            store
                .insert(&measurement(now - Duration::minutes(mins), speed, gust, dir))
                .await
                .unwrap();
        }

        let (status, body) = send(create_app(state), get_history("?hours=6&limit=10")).await;
        assert_eq!(status, 200);

        let remote = station_client::proxied::parse_history(&body.to_string())
            .expect("relay client should read its own endpoint");
        assert_eq!(remote.skipped, 0);
        assert_eq!(remote.measurements.len(), 2);
        assert_eq!(remote.measurements[0].wind_speed_knots(), 18.0);
        assert_eq!(remote.measurements[0].wind_gust_knots(), Some(24.0));
        assert!(remote.measurements[0].safety().is_offshore);
        assert_eq!(remote.stats.map(|s| s.max_gust), Some(24.0));
        let meta = remote.meta.unwrap();
        assert_eq!((meta.count, meta.hours), (2, 6));
        assert!(meta.time_range.is_some());
    }

    #[test]
    fn test_min_speed_null_when_all_calm() {
        let row = |speed: f64| WindRow {
            id: 1,
            timestamp: "2026-03-01T10:00:00.000Z".into(),
            wind_speed_knots: speed,
            wind_gust_knots: None,
            max_gust_knots: None,
            wind_direction: 90.0,
            wind_direction_avg: 90.0,
            temperature_f: None,
            humidity: None,
            pressure: None,
            safety_level: "caution".into(),
            safety_text: "Caution".into(),
            safety_color: "#f59e0b".into(),
            is_offshore: false,
            is_onshore: true,
            data_source: "ambient_weather".into(),
        };
        let stats = compute_stats(&[row(0.0), row(0.0)]).unwrap();
        assert_eq!(stats.min_wind_speed, None);
        assert_eq!(stats.max_gust, 0.0);
        assert!(compute_stats(&[]).is_none());
    }

    #[tokio::test]
    async fn test_options_and_method_not_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let (_, state) = empty_state(&dir);
        let app = create_app(state);

        let options = Request::builder()
            .method("OPTIONS")
            .uri("/api/wind-history")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(app.clone(), options).await;
        assert_eq!(status, 200);

        let post = Request::builder()
            .method("POST")
            .uri("/api/wind-history")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(app, post).await;
        assert_eq!(status, 405);
        assert_eq!(body, serde_json::json!({ "error": "Method not allowed" }));
    }

    #[tokio::test]
    async fn test_cors_header_on_get() {
        let dir = tempfile::tempdir().unwrap();
        let (_, state) = empty_state(&dir);
        let req = Request::get("/api/wind-history")
            .header("origin", "https://kite.example.com")
            .body(Body::empty())
            .unwrap();

        let resp = tower::ServiceExt::oneshot(create_app(state), req).await.unwrap();
        assert_eq!(
            resp.headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_500() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_with(
            Err(Error::NoDevice("unused".into())),
            SqliteWindStore::new(dir.path()),
            "s",
        );
        let (status, body) = send(create_app(state), get_history("")).await;
        assert_eq!(status, 500);
        assert_eq!(body["success"], false);
    }
}
