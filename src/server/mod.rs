//! HTTP surface: scheduled ingestion trigger and public history query.
//!
//! Handlers are stateless invocations that share only the durable store.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{response::IntoResponse, routing::get, Json, Router};
use common::config::{IngestConfig, QueryConfig};
use common::Error;
use station_client::MeasurementSource;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use wind_store::MeasurementStore;

pub mod ingest;
pub mod query;

/// Shared handler state. Everything inside is immutable or internally
/// synchronized.
#[derive(Clone)]
pub struct ServerState {
    pub source: Arc<dyn MeasurementSource>,
    pub store: Arc<dyn MeasurementStore>,
    pub ingest: IngestConfig,
    pub query: QueryConfig,
}

/// Create the application router.
pub fn create_app(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(ingest::create_router())
        .merge(query::create_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "kitewatch",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Bind and serve until `shutdown` resolves.
pub async fn start_server<F>(addr: SocketAddr, state: ServerState, shutdown: F) -> Result<(), Error>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = create_app(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Config(format!("cannot bind {addr}: {e}")))?;
    info!("Listening on http://{}", addr);
    info!("Ingestion trigger: /api/collect-wind-data, history: /api/wind-history");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Network(format!("server error: {e}")))
}
