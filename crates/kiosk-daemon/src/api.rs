//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use kiosk_core::{DemoError, DeviceKind};
use kiosk_serial::{ConnectOutcome, HardwareError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::host::{self, DemoCommand, HostError};
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

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(ApiError::new(msg))).into_response()
}

fn hardware_error(e: HardwareError) -> Response {
    let status = match &e {
        HardwareError::UnknownDevice(_) => StatusCode::NOT_FOUND,
        HardwareError::NotConnected(_) => StatusCode::CONFLICT,
        HardwareError::PortUnavailable { .. }
        | HardwareError::ReadFailure { .. }
        | HardwareError::WriteFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
    };
    error_response(status, e.to_string())
}

fn host_error(e: HostError) -> Response {
    let status = match &e {
        HostError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
        HostError::Demo(DemoError::NotRunning) => StatusCode::CONFLICT,
        HostError::Demo(_) => StatusCode::BAD_REQUEST,
    };
    error_response(status, e.to_string())
}

fn parse_device(id: &str) -> Result<DeviceKind, Response> {
    id.parse::<DeviceKind>()
        .map_err(|e| error_response(StatusCode::NOT_FOUND, e.to_string()))
}

/// List all configured devices
pub async fn list_devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.devices())
}

/// Get a specific device by name
pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.get_device(&id) {
        Some(device) => Json(device).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Device not found"),
    }
}

/// Open a device's serial link
pub async fn connect_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let kind = match parse_device(&id) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    info!(device = %kind, "Manual connect requested");

    let manager = state.manager.clone();
    let result = tokio::task::spawn_blocking(move || manager.connect(kind)).await;
    match result {
        Ok(Ok(outcome)) => Json(json!({
            "device": kind,
            "already_connected": outcome == ConnectOutcome::AlreadyConnected,
        }))
        .into_response(),
        Ok(Err(e)) => hardware_error(e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Close a device's serial link
pub async fn disconnect_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let kind = match parse_device(&id) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };

    let manager = state.manager.clone();
    match tokio::task::spawn_blocking(move || manager.disconnect(kind)).await {
        Ok(Ok(())) => Json(json!({ "device": kind, "status": "disconnected" })).into_response(),
        Ok(Err(e)) => hardware_error(e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[derive(Deserialize)]
pub struct SendRequest {
    command: String,
}

/// Write a command line to a connected device
pub async fn send_command(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<SendRequest>,
) -> Response {
    let kind = match parse_device(&id) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    if req.command.contains('\n') {
        return error_response(StatusCode::BAD_REQUEST, "Command must be a single line");
    }

    let manager = state.manager.clone();
    let command = req.command.clone();
    match tokio::task::spawn_blocking(move || manager.send(kind, &command)).await {
        Ok(Ok(())) => Json(json!({ "device": kind, "sent": req.command })).into_response(),
        Ok(Err(e)) => hardware_error(e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Disconnect and reconnect every device
pub async fn restart_hardware(State(state): State<Arc<AppState>>) -> Response {
    info!("Hardware restart requested");
    let manager = state.manager.clone();
    match tokio::task::spawn_blocking(move || manager.restart_connections()).await {
        Ok(connected) => Json(json!({ "connected_count": connected })).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn demo(state: &AppState, command: DemoCommand) -> Response {
    match host::request(state, command).await {
        Ok(status) => Json(status).into_response(),
        Err(e) => host_error(e),
    }
}

pub async fn demo_status(State(state): State<Arc<AppState>>) -> Response {
    demo(&state, DemoCommand::Status).await
}

pub async fn start_demo(State(state): State<Arc<AppState>>) -> Response {
    demo(&state, DemoCommand::Start).await
}

pub async fn stop_demo(State(state): State<Arc<AppState>>) -> Response {
    demo(&state, DemoCommand::Stop).await
}

pub async fn next_slide(State(state): State<Arc<AppState>>) -> Response {
    demo(&state, DemoCommand::Next).await
}

pub async fn previous_slide(State(state): State<Arc<AppState>>) -> Response {
    demo(&state, DemoCommand::Previous).await
}

pub async fn jump_to_slide(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Response {
    demo(&state, DemoCommand::Jump(id)).await
}

#[derive(Deserialize)]
pub struct DemoSettings {
    #[serde(default)]
    interval_ms: Option<u64>,
    #[serde(default)]
    loop_enabled: Option<bool>,
}

pub async fn update_demo_settings(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DemoSettings>,
) -> Response {
    demo(
        &state,
        DemoCommand::Settings {
            interval_ms: req.interval_ms,
            loop_enabled: req.loop_enabled,
        },
    )
    .await
}

/// Slide catalog with the slide currently on screen
pub async fn list_slides(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "current_slide": state.current_slide(),
        "dev_mode": state.is_dev_mode(),
        "slides": state.catalog.slides(),
    }))
}

/// Recent signals, oldest first
pub async fn signal_history(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.history())
}
