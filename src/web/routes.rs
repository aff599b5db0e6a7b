//! JSON API handlers: thin translation onto the query layer and the live
//! channel, no logic of their own.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::{ApiError, AppState};
use crate::model::{CacheStats, Threat, UnitStatus, Vendor};
use crate::query::{ThreatFilter, VendorFilter};

pub async fn list_threats(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ThreatFilter>,
) -> Result<Json<Vec<Threat>>, ApiError> {
    Ok(Json(state.query.get_threats(&filter).await?))
}

pub async fn get_threat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Threat>, ApiError> {
    Ok(Json(state.query.get_threat_by_id(&id).await?))
}

pub async fn list_vendors(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<VendorFilter>,
) -> Result<Json<Vec<Vendor>>, ApiError> {
    Ok(Json(state.query.get_vendors(&filter).await?))
}

pub async fn get_vendor(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vendor>, ApiError> {
    Ok(Json(state.query.get_vendor_by_id(&id).await?))
}

pub async fn dashboard_overview(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.query.get_dashboard_overview().await?))
}

pub async fn analytics(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.query.get_analytics().await?))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// Manual refresh: degrades gracefully, never fails the caller.
pub async fn refresh(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    state.query.refresh_data().await;
    Json(StatusResponse { status: "refreshed" })
}

#[derive(Debug, Default, Deserialize)]
pub struct TriggerAlertRequest {
    pub threat_id: Option<String>,
}

pub async fn trigger_alert(
    State(state): State<Arc<AppState>>,
    body: Option<Json<TriggerAlertRequest>>,
) -> Json<StatusResponse> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    state
        .broadcaster
        .trigger_threat_alert(request.threat_id.as_deref())
        .await;
    Json(StatusResponse { status: "triggered" })
}

#[derive(Debug, Default, Deserialize)]
pub struct SimulationStartRequest {
    pub interval_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct SimulationStatusResponse {
    pub running: bool,
    pub subscribers: usize,
}

pub async fn simulation_start(
    State(state): State<Arc<AppState>>,
    body: Option<Json<SimulationStartRequest>>,
) -> Json<SimulationStatusResponse> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    state
        .simulator
        .start(request.interval_ms.map(Duration::from_millis))
        .await;
    simulation_status_response(&state).await
}

pub async fn simulation_stop(State(state): State<Arc<AppState>>) -> Json<SimulationStatusResponse> {
    state.simulator.stop().await;
    simulation_status_response(&state).await
}

pub async fn simulation_status(
    State(state): State<Arc<AppState>>,
) -> Json<SimulationStatusResponse> {
    simulation_status_response(&state).await
}

async fn simulation_status_response(state: &AppState) -> Json<SimulationStatusResponse> {
    Json(SimulationStatusResponse {
        running: state.simulator.is_running().await,
        subscribers: state.registry.count().await,
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ready: bool,
    pub units: Vec<UnitStatus>,
    pub cache: CacheStats,
    pub subscribers: usize,
}

/// Readiness report built from `describe_units` and `stats`; forces no
/// loads.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let units = state.query.cache().describe_units().await;
    let cache = state.query.cache().stats().await;
    let ready = units.iter().all(|u| u.loaded);
    Json(HealthResponse {
        ready,
        units,
        cache,
        subscribers: state.registry.count().await,
    })
}
