//! Liveness and status endpoints

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::ApiState;
use crate::audio::{DeviceDescriptor, StreamDirection};
use crate::capabilities::Capabilities;

/// Liveness response
#[derive(Serialize)]
pub struct PingResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub version: &'static str,
}

/// Full status response: per-subsystem state for external monitoring
#[derive(Serialize)]
pub struct StatusResponse {
    pub server: ServerStatus,
    pub capabilities: Capabilities,
    pub audio: AudioStatus,
    pub wake_word: WakeWordStatus,
    pub servo: ServoStatus,
    pub backend: BackendStatus,
}

#[derive(Serialize)]
pub struct ServerStatus {
    pub status: &'static str,
    pub is_processing: bool,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct AudioStatus {
    pub backend: &'static str,
    pub devices: Vec<DeviceDescriptor>,
    pub open_streams: Vec<OpenStreamStatus>,
}

#[derive(Serialize)]
pub struct OpenStreamStatus {
    pub id: String,
    pub direction: &'static str,
}

#[derive(Serialize)]
pub struct WakeWordStatus {
    pub available: bool,
    pub state: &'static str,
    pub phrases: Vec<String>,
}

#[derive(Serialize)]
pub struct ServoStatus {
    pub actuator: &'static str,
    pub position: i32,
}

#[derive(Serialize)]
pub struct BackendStatus {
    pub url: String,
    pub healthy: bool,
}

/// Liveness probe
async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Per-subsystem status, including a live backend health probe
async fn status(State(state): State<Arc<ApiState>>) -> Json<StatusResponse> {
    let backend = state.backend.clone();
    let healthy = tokio::task::spawn_blocking(move || backend.health_check())
        .await
        .unwrap_or(false);

    let open_streams = state
        .arbiter
        .open_streams()
        .into_iter()
        .map(|(id, direction)| OpenStreamStatus {
            id,
            direction: match direction {
                StreamDirection::Capture => "capture",
                StreamDirection::Playback => "playback",
            },
        })
        .collect();

    let (listener_state, phrases) = state.listener.as_ref().map_or_else(
        || ("stopped", Vec::new()),
        |l| (l.state().as_str(), l.phrases().to_vec()),
    );

    Json(StatusResponse {
        server: ServerStatus {
            status: "running",
            is_processing: state.orchestrator.is_processing(),
            version: env!("CARGO_PKG_VERSION"),
        },
        capabilities: state.capabilities,
        audio: AudioStatus {
            backend: state.arbiter.backend_name(),
            devices: state.arbiter.list_devices(),
            open_streams,
        },
        wake_word: WakeWordStatus {
            available: state.capabilities.decoder,
            state: listener_state,
            phrases,
        },
        servo: ServoStatus {
            actuator: state.servo.actuator_name(),
            position: state.servo.position(),
        },
        backend: BackendStatus {
            url: state.backend.base_url().to_string(),
            healthy,
        },
    })
}

/// Build the health router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/status", get(status))
        .with_state(state)
}
