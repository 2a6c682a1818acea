//! Direct servo control endpoints

use std::sync::Arc;

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::{Deserialize, Serialize};

use super::ApiState;

/// Position request
#[derive(Deserialize)]
pub struct PositionRequest {
    pub position: i32,
}

/// Position acknowledgement
#[derive(Serialize)]
pub struct PositionResponse {
    pub success: bool,
    pub position: i32,
}

/// Set the servo position directly
async fn position(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<PositionRequest>,
) -> Result<Json<PositionResponse>, StatusCode> {
    if !(0..=180).contains(&request.position) {
        return Err(StatusCode::BAD_REQUEST);
    }

    state.servo.move_to(request.position);
    Ok(Json(PositionResponse {
        success: true,
        position: request.position,
    }))
}

/// Emotion request
#[derive(Deserialize)]
pub struct EmotionRequest {
    #[serde(default = "default_emotion")]
    pub emotion: String,
}

fn default_emotion() -> String {
    "happy".to_string()
}

/// Emotion acknowledgement
#[derive(Serialize)]
pub struct EmotionResponse {
    pub success: bool,
    pub emotion: String,
}

/// Step through an emotion sequence. Fire-and-forget: the sequence runs on a
/// blocking worker while the request returns immediately.
async fn emotion(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<EmotionRequest>,
) -> Json<EmotionResponse> {
    let servo = Arc::clone(&state.servo);
    let name = request.emotion.clone();
    let _ = tokio::task::spawn_blocking(move || servo.express(&name));

    Json(EmotionResponse {
        success: true,
        emotion: request.emotion,
    })
}

/// Build the servo router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/servo/position", post(position))
        .route("/servo/emotion", post(emotion))
        .with_state(state)
}
