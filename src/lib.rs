//! Marionette - onboard voice-interaction controller for animatronic devices
//!
//! Listens for a wake phrase, records a voice command with automatic
//! end-pointing, transcribes it locally, forwards the text to a remote
//! dialog backend, and plays back the synthesized response while animating a
//! mouth servo in sync with phoneme timing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  HTTP surface                        │
//! │  /wake  /respond  /servo/*  /devices  /status       │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              SessionOrchestrator                     │
//! │  listener → recorder → decoder → backend → respond  │
//! └──────┬─────────────┬──────────────────┬─────────────┘
//!        │             │                  │
//! ┌──────▼──────┐ ┌────▼─────────┐ ┌──────▼───────────┐
//! │ AudioDevice │ │ SpeechEngine │ │  ServoAnimator   │
//! │   Arbiter   │ │ (streaming)  │ │ (phoneme timing) │
//! └─────────────┘ └──────────────┘ └──────────────────┘
//! ```

pub mod api;
pub mod artifacts;
pub mod audio;
pub mod backend;
pub mod capabilities;
pub mod config;
pub mod decoder;
pub mod error;
pub mod listener;
pub mod recorder;
pub mod servo;
pub mod session;

pub use artifacts::{ArtifactStore, ResponseAudioKind};
pub use audio::{
    AudioDeviceArbiter, AudioFrame, CpalBackend, DeviceBackend, DeviceDescriptor, MockBackend,
    SampleRateAdapter, StreamSpec, VoiceActivityGate,
};
pub use backend::{BackendClient, DialogResponse};
pub use capabilities::Capabilities;
pub use config::Config;
pub use decoder::{DecodeEvent, SpeechEngine, StreamingDecoder};
pub use error::{Error, Result};
pub use listener::{ListenerState, WakeDetection, WakePhraseMatcher, WakeWordListener};
pub use recorder::{CommandRecorder, Utterance};
pub use servo::{Actuator, MockActuator, PhonemeEvent, ServoAnimator, SysfsPwmActuator};
pub use session::{SessionOrchestrator, SessionSettings};
