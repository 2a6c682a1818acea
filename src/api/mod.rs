//! HTTP surface of the controller
//!
//! Thin glue: every route maps directly onto one core operation. The server
//! runs on tokio; handlers that enter the blocking core hop through
//! `spawn_blocking`.

pub mod devices;
pub mod health;
pub mod servo;
pub mod session;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::audio::AudioDeviceArbiter;
use crate::backend::BackendClient;
use crate::capabilities::Capabilities;
use crate::listener::WakeWordListener;
use crate::servo::ServoAnimator;
use crate::session::SessionOrchestrator;
use crate::{Error, Result};

/// Shared state for API handlers
pub struct ApiState {
    /// Session orchestrator behind `/wake` and `/respond`
    pub orchestrator: Arc<SessionOrchestrator>,

    /// Wake listener; absent when the decoder capability is unavailable
    pub listener: Option<Arc<WakeWordListener>>,

    /// Audio device owner, for `/devices` and status
    pub arbiter: Arc<AudioDeviceArbiter>,

    /// Mouth servo behind `/servo/*`
    pub servo: Arc<ServoAnimator>,

    /// Dialog backend client, for the status health probe
    pub backend: BackendClient,

    /// Startup capability probe results
    pub capabilities: Capabilities,

    /// Directory served under `/audio`
    pub audio_dir: PathBuf,
}

/// HTTP API server
pub struct ApiServer {
    state: Arc<ApiState>,
    host: String,
    port: u16,
}

impl ApiServer {
    /// Create a server over the assembled state
    #[must_use]
    pub fn new(state: Arc<ApiState>, host: String, port: u16) -> Self {
        Self { state, host, port }
    }

    /// Build the router with all routes
    fn router(&self) -> Router {
        let audio_dir = self.state.audio_dir.clone();

        let router = Router::new()
            .merge(health::router(self.state.clone()))
            .merge(session::router(self.state.clone()))
            .merge(servo::router(self.state.clone()))
            .merge(devices::router(self.state.clone()))
            .nest_service("/audio", ServeDir::new(audio_dir));

        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if the server fails to bind or serve
    pub async fn run(self) -> Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind API server on {addr}: {e}")))?;

        tracing::info!(addr, "API server listening");

        axum::serve(listener, self.router())
            .await
            .map_err(|e| Error::Config(format!("API server error: {e}")))?;

        Ok(())
    }

    /// Run the API server in a background task
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}
