//! REST API handlers

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use catalogue_bridge::{DeviceRecord, RegistryEntry, WELL_KNOWN_PREFIX};
use catalogue_transport::DeviceTransport;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

/// Symbolic lookup of the well-known root (usage hint)
pub async fn well_known_root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    resolve(&state, WELL_KNOWN_PREFIX.to_string()).await
}

/// Symbolic lookup: `/.well-known/<type>[/<name>[/<resource>]]`
pub async fn well_known(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> impl IntoResponse {
    resolve(&state, format!("{WELL_KNOWN_PREFIX}/{path}")).await
}

/// Diagnostics are part of the payload, the status is always 200
async fn resolve(state: &AppState, path: String) -> impl IntoResponse {
    debug!(path = %path, "Lookup requested");
    let (content_type, body) = state.resolver.resolve(&path).await.into_body();
    (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], body)
}

/// Registry view of a device
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceView {
    #[serde(flatten)]
    pub record: DeviceRecord,
    pub connected: bool,
    pub entries: Vec<RegistryEntry>,
}

/// List registered devices with the entries they serve
pub async fn list_devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let connected = state.transport.connected_device_ids().await;
    let mut devices = Vec::new();
    for record in state.registry.devices().await {
        let entries = state.registry.entries_for(&record.device_id).await;
        devices.push(DeviceView {
            connected: connected.contains(&record.device_id),
            record,
            entries,
        });
    }
    Json(devices)
}

/// Re-load a configured database from disk and reconnect it
pub async fn reload_database(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Some(db) = state.config.database(&id) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiError::new("Database not configured")),
        )
            .into_response();
    };

    info!(device_id = %id, "Database reload requested");

    match state.connect_database(db).await {
        Ok((is_new, instances)) => Json(serde_json::json!({
            "status": if is_new { "registered" } else { "updated" },
            "device_id": id,
            "instances": instances,
        }))
        .into_response(),
        Err(e) => {
            warn!(device_id = %id, error = %e, "Database reload failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::new(format!("Reload failed: {:#}", e))),
            )
                .into_response()
        }
    }
}

/// Disconnect a database
pub async fn remove_database(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    info!(device_id = %id, "Database disconnect requested");

    if state.disconnect_database(&id).await {
        Json(serde_json::json!({
            "status": "disconnected",
            "device_id": id
        }))
        .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ApiError::new("Database not connected")),
        )
            .into_response()
    }
}
