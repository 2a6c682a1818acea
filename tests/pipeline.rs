//! Voice pipeline integration tests
//!
//! Exercises the capture-to-response pipeline over the mock device backend,
//! without audio hardware, a recognition model, or a reachable dialog
//! backend.

mod common;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use marionette::audio::wav;
use marionette::config::{BackendConfig, ServoConfig, VadConfig, WakeWordConfig};
use marionette::{
    ArtifactStore, AudioDeviceArbiter, BackendClient, CommandRecorder, DecodeEvent, ListenerState,
    MockActuator, MockBackend, SampleRateAdapter, ServoAnimator, SessionOrchestrator,
    SessionSettings, SpeechEngine, StreamingDecoder, WakePhraseMatcher, WakeWordListener,
};

use common::{silence_samples, sine_samples, small_spec};

// ── scripted speech engine ────────────────────────────────────

/// Engine whose streams pop pre-scripted decode events, then report empty
/// partials
struct ScriptedEngine {
    events: Arc<Mutex<VecDeque<DecodeEvent>>>,
}

impl ScriptedEngine {
    fn new(events: Vec<DecodeEvent>) -> Self {
        Self {
            events: Arc::new(Mutex::new(events.into())),
        }
    }
}

struct ScriptedStream {
    events: Arc<Mutex<VecDeque<DecodeEvent>>>,
}

impl SpeechEngine for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn create_stream(&self) -> marionette::Result<Box<dyn StreamingDecoder>> {
        Ok(Box::new(ScriptedStream {
            events: Arc::clone(&self.events),
        }))
    }
}

impl StreamingDecoder for ScriptedStream {
    fn accept_pcm(&mut self, _samples: &[i16]) -> marionette::Result<DecodeEvent> {
        let next = self.events.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| DecodeEvent::Partial(String::new())))
    }

    fn finalize(&mut self) -> marionette::Result<Option<String>> {
        Ok(None)
    }
}

// ── sample adaptation ─────────────────────────────────────────

#[test]
fn stereo_capture_adapts_to_recognizer_format() {
    // 2 ch / 48 kHz native down to mono / 16 kHz: average then keep 1 in 3
    let adapter = SampleRateAdapter::new(2, 3);

    let interleaved: Vec<i16> = (0..960).collect();
    let adapted = adapter.adapt(&interleaved);

    // 960 interleaved -> 480 mono -> floor(480/3) = 160
    assert_eq!(adapted.len(), 160);
    // First mono sample is the average of the first stereo pair
    assert_eq!(adapted[0], 0);
}

#[test]
fn loud_sine_survives_adaptation_above_vad_threshold() {
    let adapter = SampleRateAdapter::new(1, 3);
    let loud = sine_samples(440.0, 0.1, 0.5, 48_000);

    let adapted = adapter.adapt(&loud);
    assert!(marionette::audio::frame_energy(&adapted) > 0.01);
}

// ── wake detection end to end ─────────────────────────────────

#[test]
fn wake_detection_cooldown_scenario() {
    // Threshold 0.7, cooldown 5s: "furby" fires, again within 1s does not,
    // after a simulated 6s it fires a second time
    let config = WakeWordConfig {
        phrases: vec!["furby".to_string()],
        confidence_threshold: 0.7,
        cooldown: Duration::from_secs(5),
    };
    let mut matcher = WakePhraseMatcher::new(&config);
    let base = Instant::now();

    assert!(matcher.check_at("furby", base).is_some());
    assert!(matcher.check_at("furby", base + Duration::from_secs(1)).is_none());
    assert!(matcher.check_at("furby", base + Duration::from_secs(6)).is_some());
}

#[test]
fn listener_fires_callback_once_per_detection() {
    let arbiter = Arc::new(AudioDeviceArbiter::new(Arc::new(MockBackend::new())));
    let engine = Arc::new(ScriptedEngine::new(vec![DecodeEvent::Final(
        "hey furby wake up".to_string(),
    )]));

    let fired = Arc::new(AtomicUsize::new(0));
    let fired_cb = Arc::clone(&fired);

    let listener = Arc::new(WakeWordListener::new(
        Arc::clone(&arbiter),
        engine,
        WakeWordConfig {
            phrases: vec!["hey furby".to_string()],
            confidence_threshold: 0.7,
            cooldown: Duration::from_secs(5),
        },
        small_spec(),
        1,
        Box::new(move || {
            fired_cb.fetch_add(1, Ordering::SeqCst);
        }),
    ));

    listener.start().unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while fired.load(Ordering::SeqCst) < 1 {
        assert!(Instant::now() < deadline, "wake callback never fired");
        std::thread::sleep(Duration::from_millis(5));
    }

    // Self-paused: silence keeps flowing but no further detections occur
    assert_eq!(listener.state(), ListenerState::Paused);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    listener.stop();
    assert!(arbiter.open_streams().is_empty());
}

// ── recording ─────────────────────────────────────────────────

#[test]
fn recorded_utterance_roundtrips_through_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let arbiter = Arc::new(AudioDeviceArbiter::new(Arc::new(MockBackend::new())));
    let recorder = CommandRecorder::new(
        Arc::clone(&arbiter),
        ArtifactStore::new(dir.path()).unwrap(),
        small_spec(),
        VadConfig {
            silence_duration: Duration::from_millis(50),
            energy_threshold: 0.01,
            max_recording_duration: Duration::from_secs(30),
        },
    );

    let utterance = recorder
        .record(Duration::from_millis(120))
        .unwrap()
        .expect("utterance");

    let content = wav::read_wav(&utterance.path).unwrap();
    assert_eq!(content.channels, 1);
    assert_eq!(content.sample_rate, 16_000);
    assert_eq!(content.samples, utterance.samples);

    // The recorder released the device
    assert!(arbiter.open_streams().is_empty());
}

#[test]
fn arbiter_survives_defensive_double_close() {
    let arbiter = AudioDeviceArbiter::new(Arc::new(MockBackend::new()));
    arbiter.open_capture("recorder", &small_spec()).unwrap();

    arbiter.close("recorder");
    arbiter.close("recorder");
}

// ── full session over mock hardware ───────────────────────────

fn build_session(
    engine: Option<Arc<dyn SpeechEngine>>,
) -> (Arc<SessionOrchestrator>, Arc<ServoAnimator>, Arc<AudioDeviceArbiter>) {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = ArtifactStore::new(dir.keep()).unwrap();
    let arbiter = Arc::new(AudioDeviceArbiter::new(Arc::new(MockBackend::new())));

    let recorder = CommandRecorder::new(
        Arc::clone(&arbiter),
        artifacts.clone(),
        small_spec(),
        VadConfig {
            silence_duration: Duration::from_millis(50),
            energy_threshold: 0.01,
            max_recording_duration: Duration::from_millis(120),
        },
    );

    let servo = Arc::new(ServoAnimator::new(
        Box::new(MockActuator),
        ServoConfig {
            pwm_chip: 0,
            pwm_channel: 0,
            min_pulse: 500.0,
            max_pulse: 2500.0,
            closed_position: 90,
        },
    ));

    // Nothing listens on this port; every attempt fails fast and the client
    // degrades to the canned fallback
    let backend = BackendClient::new(&BackendConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        timeout: Duration::from_millis(200),
    })
    .with_policy(marionette::backend::RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
    });

    let orchestrator = Arc::new(SessionOrchestrator::new(
        Arc::clone(&arbiter),
        recorder,
        engine,
        backend,
        Arc::clone(&servo),
        artifacts,
        SessionSettings {
            frame_size: 160,
            max_recording: Duration::from_millis(120),
            resume_delay: Duration::from_millis(10),
            development_mode: true,
        },
    ));

    (orchestrator, servo, arbiter)
}

#[test]
fn wake_to_fallback_session_resumes_listener() {
    // Scripted decode: the listener hears the wake phrase; the transcription
    // replay then decodes the recorded command
    let events = vec![
        DecodeEvent::Final("furby".to_string()),
        DecodeEvent::Final("what time is it".to_string()),
    ];
    let engine: Arc<dyn SpeechEngine> = Arc::new(ScriptedEngine::new(events));

    let (orchestrator, servo, arbiter) = build_session(Some(Arc::clone(&engine)));

    let triggered = Arc::new(AtomicUsize::new(0));
    let listener = {
        let orchestrator_weak = Arc::downgrade(&orchestrator);
        let triggered = Arc::clone(&triggered);
        Arc::new(WakeWordListener::new(
            Arc::clone(&arbiter),
            engine,
            WakeWordConfig {
                phrases: vec!["furby".to_string()],
                confidence_threshold: 0.7,
                cooldown: Duration::from_secs(5),
            },
            small_spec(),
            1,
            Box::new(move || {
                triggered.fetch_add(1, Ordering::SeqCst);
                if let Some(orchestrator) = orchestrator_weak.upgrade() {
                    orchestrator.trigger();
                }
            }),
        ))
    };
    orchestrator.attach_listener(Arc::clone(&listener));

    listener.start().unwrap();

    // The wake phrase fires, the session records, transcribes "what time is
    // it", fails over to the backend fallback, runs the canned animation,
    // and resumes the listener
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        assert!(Instant::now() < deadline, "session never completed");
        if triggered.load(Ordering::SeqCst) >= 1
            && !orchestrator.is_processing()
            && listener.state() == ListenerState::Listening
        {
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    assert_eq!(triggered.load(Ordering::SeqCst), 1);
    // Canned fallback animation ended at the closed position
    assert_eq!(servo.position(), 90);

    listener.stop();
    assert_eq!(listener.state(), ListenerState::Stopped);
}

#[test]
fn session_without_engine_aborts_and_recovers() {
    let (orchestrator, servo, arbiter) = build_session(None);

    orchestrator.run_session();

    assert!(!orchestrator.is_processing());
    assert!(arbiter.open_streams().is_empty());
    // No animation ran; the servo never left rest
    assert_eq!(servo.position(), 90);
}

// ── silence handling ──────────────────────────────────────────

#[test]
fn silence_only_recording_runs_to_max_duration() {
    let dir = tempfile::tempdir().unwrap();
    let arbiter = Arc::new(AudioDeviceArbiter::new(Arc::new(MockBackend::new())));
    let recorder = CommandRecorder::new(
        arbiter,
        ArtifactStore::new(dir.path()).unwrap(),
        small_spec(),
        VadConfig {
            // Far shorter than the cap: if silence end-pointed before speech,
            // this recording would stop early
            silence_duration: Duration::from_millis(30),
            energy_threshold: 0.01,
            max_recording_duration: Duration::from_secs(30),
        },
    );

    let max = Duration::from_millis(200);
    let utterance = recorder.record(max).unwrap().expect("utterance");

    assert!(utterance.duration_seconds >= max.as_secs_f64());
}

#[test]
fn silence_frames_are_below_vad_threshold() {
    let silence = silence_samples(0.1, 16_000);
    assert!(marionette::audio::frame_energy(&silence) < 0.01);

    let speech = sine_samples(440.0, 0.1, 0.3, 16_000);
    assert!(marionette::audio::frame_energy(&speech) > 0.01);
}
