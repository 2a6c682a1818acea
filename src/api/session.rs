//! Wake trigger and response playback endpoints

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::servo::PhonemeEvent;

/// Generic success acknowledgement
#[derive(Serialize)]
pub struct AckResponse {
    pub success: bool,
    pub message: &'static str,
}

/// Manual wake trigger. Returns immediately; the session runs on its own
/// worker thread and a trigger during an active session is dropped.
async fn wake(State(state): State<Arc<ApiState>>) -> Json<AckResponse> {
    tracing::info!("manual wake trigger");
    state.orchestrator.trigger();
    Json(AckResponse {
        success: true,
        message: "wake processing initiated",
    })
}

/// Response playback request
#[derive(Deserialize)]
pub struct RespondRequest {
    /// Base64 WAV audio
    pub audio: Option<String>,

    /// Phoneme timeline for mouth animation
    #[serde(default)]
    pub phonemes: Vec<PhonemeEvent>,
}

/// Play supplied response audio with synchronized mouth animation, blocking
/// until both playback and animation finish
async fn respond(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<RespondRequest>,
) -> Result<Json<AckResponse>, ApiError> {
    let Some(audio) = request.audio else {
        return Err(ApiError::BadRequest("audio data required"));
    };

    tracing::info!(phonemes = request.phonemes.len(), "response playback requested");

    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::task::spawn_blocking(move || orchestrator.play_response(&audio, &request.phonemes))
        .await
        .map_err(|e| ApiError::Internal(format!("playback task failed: {e}")))?
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(AckResponse {
        success: true,
        message: "response played",
    }))
}

/// Build the session router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/wake", post(wake))
        .route("/respond", post(respond))
        .with_state(state)
}

/// Session endpoint errors
#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.to_string()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}
