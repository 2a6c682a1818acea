//! Dialog backend client
//!
//! Sends transcribed text to the remote dialog service and returns the
//! synthesized response: base64 audio, a phoneme timeline, and the reply
//! text. Transport failures are retried with capped exponential backoff;
//! when retries exhaust, a canned apologetic response is returned instead of
//! an error so the session flow never fails on backend trouble.
//!
//! The blocking client is built on the calling worker thread, never inside
//! the async runtime, so its internal runtime is created and dropped outside
//! the async context.

use std::time::Duration;

use serde::Deserialize;

use crate::config::BackendConfig;
use crate::servo::PhonemeEvent;
use crate::{Error, Result};

/// Retry policy for backend calls
///
/// Delay doubles per attempt from `base_delay`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts before falling back
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub base_delay: Duration,

    /// Delay cap
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Compute the backoff delay before retrying after `attempt` (0-based)
#[must_use]
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    policy
        .base_delay
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(policy.max_delay)
}

/// A dialog response, normalized from the wire shape
#[derive(Debug, Clone)]
pub struct DialogResponse {
    /// Base64 WAV audio, when the backend synthesized speech
    pub audio: Option<String>,

    /// Phoneme timeline for mouth animation
    pub phonemes: Vec<PhonemeEvent>,

    /// Reply text
    pub text: String,

    /// True when this is the canned offline fallback, not a real reply
    pub is_fallback: bool,
}

/// Wire shape of the backend's chat endpoint
#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(rename = "audioBase64")]
    audio_base64: Option<String>,

    #[serde(default)]
    phonemes: Vec<PhonemeEvent>,

    #[serde(default)]
    text: String,
}

fn map_response(wire: WireResponse) -> DialogResponse {
    DialogResponse {
        audio: wire.audio_base64.filter(|a| !a.is_empty()),
        phonemes: wire.phonemes,
        text: wire.text,
        is_fallback: false,
    }
}

/// Canned response used when the backend cannot be reached
fn fallback_response() -> DialogResponse {
    DialogResponse {
        audio: None,
        phonemes: Vec::new(),
        text: "I'm having trouble connecting right now, but I'm listening!".to_string(),
        is_fallback: true,
    }
}

/// Client for the remote dialog backend
#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    timeout: Duration,
    policy: RetryPolicy,
}

impl BackendClient {
    /// Create a client for the configured backend
    #[must_use]
    pub fn new(config: &BackendConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            policy: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy (tests use short delays)
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Backend base URL, for the status surface
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe the backend health endpoint. Must be called from a blocking
    /// context (worker thread or `spawn_blocking`).
    #[must_use]
    pub fn health_check(&self) -> bool {
        let Ok(client) = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
        else {
            return false;
        };

        client
            .get(format!("{}/health", self.base_url))
            .send()
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }

    /// Send transcribed text and return the dialog response, retrying with
    /// capped exponential backoff and degrading to the canned fallback after
    /// the final attempt. Must be called from a blocking context.
    #[must_use]
    pub fn request_response(&self, text: &str) -> DialogResponse {
        let client = match reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, "failed to build http client");
                return fallback_response();
            }
        };

        for attempt in 0..self.policy.max_attempts {
            tracing::info!(
                attempt = attempt + 1,
                max = self.policy.max_attempts,
                "sending text to backend"
            );

            match self.try_request(&client, text) {
                Ok(response) => {
                    tracing::info!(
                        has_audio = response.audio.is_some(),
                        phonemes = response.phonemes.len(),
                        "backend response received"
                    );
                    return response;
                }
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "backend request failed");
                    if attempt + 1 < self.policy.max_attempts {
                        std::thread::sleep(delay_for_attempt(&self.policy, attempt));
                    }
                }
            }
        }

        tracing::warn!("backend retries exhausted, using fallback response");
        fallback_response()
    }

    fn try_request(&self, client: &reqwest::blocking::Client, text: &str) -> Result<DialogResponse> {
        let response = client
            .post(format!("{}/api/chat", self.base_url))
            .json(&serde_json::json!({ "text": text }))
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(Error::BackendUnreachable(format!("{status}: {body}")));
        }

        let wire: WireResponse = response.json()?;
        Ok(map_response(wire))
    }
}
