//! Web server module

mod routes;
mod ws;

use anyhow::Result;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::config::Config;
use crate::error::DataError;
use crate::live::{simulator::SimulationClock, Broadcaster, SubscriberRegistry};
use crate::query::QueryService;

pub struct AppState {
    pub query: QueryService,
    pub registry: Arc<SubscriberRegistry>,
    pub broadcaster: Broadcaster,
    pub simulator: SimulationClock,
}

/// Translates query/cache failures into HTTP responses at the route
/// boundary.
pub struct ApiError(DataError);

impl From<DataError> for ApiError {
    fn from(e: DataError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_not_found() {
            StatusCode::NOT_FOUND
        } else {
            error!(error = %self.0, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Read API
        .route("/api/threats", get(routes::list_threats))
        .route("/api/threats/:id", get(routes::get_threat))
        .route("/api/vendors", get(routes::list_vendors))
        .route("/api/vendors/:id", get(routes::get_vendor))
        .route("/api/dashboard", get(routes::dashboard_overview))
        .route("/api/analytics", get(routes::analytics))
        // Manual operations
        .route("/api/refresh", post(routes::refresh))
        .route("/api/alerts/trigger", post(routes::trigger_alert))
        .route("/api/simulation/start", post(routes::simulation_start))
        .route("/api/simulation/stop", post(routes::simulation_stop))
        .route("/api/simulation", get(routes::simulation_status))
        // Readiness
        .route("/api/health", get(routes::health))
        // Live-update channel
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: &Config, state: Arc<AppState>) -> Result<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Web server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
