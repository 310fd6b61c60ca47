//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{get, post, put},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;
use crate::state::AppState;
use crate::ws;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Hardware
        .route("/api/devices", get(api::list_devices))
        .route("/api/devices/{id}", get(api::get_device))
        .route("/api/devices/{id}/connect", post(api::connect_device))
        .route("/api/devices/{id}/disconnect", post(api::disconnect_device))
        .route("/api/devices/{id}/send", post(api::send_command))
        .route("/api/hardware/restart", post(api::restart_hardware))
        // Demo
        .route("/api/demo", get(api::demo_status))
        .route("/api/demo/start", post(api::start_demo))
        .route("/api/demo/stop", post(api::stop_demo))
        .route("/api/demo/next", post(api::next_slide))
        .route("/api/demo/previous", post(api::previous_slide))
        .route("/api/demo/jump/{id}", post(api::jump_to_slide))
        .route("/api/demo/settings", put(api::update_demo_settings))
        .route("/api/slides", get(api::list_slides))
        .route("/api/history", get(api::signal_history))
        // WebSocket for real-time updates
        .route("/ws", get(ws::websocket_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve the UI adapter until `shutdown` resolves
pub async fn run<F>(state: Arc<AppState>, bind: String, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(address = %bind, "Starting web server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
