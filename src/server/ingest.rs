//! Scheduled ingestion: one authorized invocation writes one durable row.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use common::Error;
use serde_json::json;
use station_client::MeasurementSource;
use tracing::{error, info, warn};
use wind_store::{MeasurementStore, WindRow};

use super::ServerState;

pub fn create_router() -> Router<ServerState> {
    Router::new().route(
        "/api/collect-wind-data",
        get(collect_wind_data).post(collect_wind_data),
    )
}

/// Result of one ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    pub row: WindRow,
    /// The reading was already stored and dedupe is on.
    pub duplicate: bool,
}

/// Check `Authorization: Bearer <secret>`. An unset secret rejects everyone.
pub fn authorize(headers: &HeaderMap, secret: &str) -> Result<(), Error> {
    if secret.is_empty() {
        return Err(Error::Auth("ingestion secret is not configured".into()));
    }
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if token == secret => Ok(()),
        Some(_) => Err(Error::Auth("bearer token mismatch".into())),
        None => Err(Error::Auth("missing bearer token".into())),
    }
}

/// Fetch one measurement and store it. Errors are returned unmodified and
/// never retried here; the next scheduled tick is the retry.
pub async fn run_ingestion(
    source: &dyn MeasurementSource,
    store: &dyn MeasurementStore,
    dedupe_on_source_timestamp: bool,
) -> Result<IngestOutcome, Error> {
    let measurement = source.fetch_latest().await?;

    if dedupe_on_source_timestamp {
        if let Some(row) = store
            .find_by_timestamp_source(measurement.timestamp(), measurement.source_id())
            .await?
        {
            info!(
                "Reading at {} from {} already stored as row {}",
                row.timestamp, row.data_source, row.id
            );
            return Ok(IngestOutcome {
                row,
                duplicate: true,
            });
        }
    }

    let row = store.insert(&measurement).await?;
    info!(
        "Stored {:.1} kn {} ({}) as row {}",
        row.wind_speed_knots, measurement.cardinal(), row.safety_level, row.id
    );
    Ok(IngestOutcome {
        row,
        duplicate: false,
    })
}

async fn collect_wind_data(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    if let Err(e) = authorize(&headers, &state.ingest.cron_secret) {
        warn!("Rejected ingestion trigger: {}", e);
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response();
    }

    match run_ingestion(
        state.source.as_ref(),
        state.store.as_ref(),
        state.ingest.dedupe_on_source_timestamp,
    )
    .await
    {
        Ok(outcome) => {
            let message = if outcome.duplicate {
                "Wind data already collected"
            } else {
                "Wind data collected successfully"
            };
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": message,
                    "data": outcome.row,
                })),
            )
                .into_response()
        }
        Err(e) => {
            error!("Error collecting wind data ({}): {}", e.kind(), e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
