//! Audio device enumeration endpoint

use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use super::ApiState;
use crate::audio::DeviceDescriptor;

/// Device listing response
#[derive(Serialize)]
pub struct DevicesResponse {
    pub devices: Vec<DeviceDescriptor>,
}

/// List input-capable audio devices
async fn devices(State(state): State<Arc<ApiState>>) -> Json<DevicesResponse> {
    Json(DevicesResponse {
        devices: state.arbiter.list_devices(),
    })
}

/// Build the devices router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new().route("/devices", get(devices)).with_state(state)
}
