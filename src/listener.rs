//! Continuous wake-word listening
//!
//! A dedicated thread pulls native-format frames through the arbiter, adapts
//! them to the recognizer format, feeds a streaming decoder, and matches
//! decoded text against the configured phrase set. On an accepted detection
//! the listener pauses itself (so the triggered session cannot re-trigger it)
//! and invokes the registered callback synchronously on the loop thread; the
//! callback is expected to hand real work to another thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, mpsc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::audio::{AudioDeviceArbiter, SampleRateAdapter, StreamSpec};
use crate::config::WakeWordConfig;
use crate::decoder::SpeechEngine;
use crate::{Error, Result};

/// Logical stream id the listener holds on the arbiter
pub const STREAM_ID: &str = "wake_word";

/// How long the loop sleeps when no frame is buffered yet
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long a paused loop waits between drain reads
const PAUSED_POLL: Duration = Duration::from_millis(100);

/// Bounded wait for the loop thread to exit on stop
const STOP_TIMEOUT: Duration = Duration::from_secs(3);

/// Listener lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// No loop thread running
    Stopped,
    /// Pulling frames and decoding
    Listening,
    /// Pulling frames (to keep the device buffer drained) but not decoding
    Paused,
}

impl ListenerState {
    /// Short lowercase name for logs and the status surface
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Listening => "listening",
            Self::Paused => "paused",
        }
    }
}

/// An accepted wake detection
#[derive(Debug, Clone, PartialEq)]
pub struct WakeDetection {
    /// The phrase that matched
    pub phrase: String,

    /// Confidence in [0, 1]
    pub confidence: f32,
}

/// Matches decoded text against a wake phrase set with word-overlap
/// confidence scoring and a refractory cooldown
#[derive(Debug)]
pub struct WakePhraseMatcher {
    phrases: Vec<String>,
    confidence_threshold: f32,
    cooldown: Duration,
    last_detection: Option<Instant>,
}

impl WakePhraseMatcher {
    /// Create a matcher from the loaded wake configuration
    #[must_use]
    pub fn new(config: &WakeWordConfig) -> Self {
        Self {
            phrases: config.phrases.clone(),
            confidence_threshold: config.confidence_threshold,
            cooldown: config.cooldown,
            last_detection: None,
        }
    }

    /// Confidence that `text` contains `phrase`: the fraction of the
    /// phrase's words present in the text. An exact full-string match
    /// short-circuits to 1.0.
    #[must_use]
    pub fn confidence(text: &str, phrase: &str) -> f32 {
        if text == phrase {
            return 1.0;
        }

        let text_words: Vec<&str> = text.split_whitespace().collect();
        let phrase_words: Vec<&str> = phrase.split_whitespace().collect();
        if phrase_words.is_empty() {
            return 0.0;
        }

        let matches = phrase_words
            .iter()
            .filter(|w| text_words.contains(w))
            .count();
        #[allow(clippy::cast_precision_loss)]
        {
            matches as f32 / phrase_words.len() as f32
        }
    }

    /// Check decoded text at the given instant. Returns the first phrase
    /// meeting the confidence threshold, or `None` when the text is empty,
    /// the cooldown window is still open, or nothing matches. An accepted
    /// detection opens a new cooldown window.
    pub fn check_at(&mut self, text: &str, now: Instant) -> Option<WakeDetection> {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }

        if let Some(last) = self.last_detection {
            if now.duration_since(last) < self.cooldown {
                return None;
            }
        }

        for phrase in &self.phrases {
            let confidence = Self::confidence(&text, phrase);
            if confidence >= self.confidence_threshold {
                self.last_detection = Some(now);
                return Some(WakeDetection {
                    phrase: phrase.clone(),
                    confidence,
                });
            }
        }

        None
    }
}

/// Wake-word listener driving the continuous capture loop
pub struct WakeWordListener {
    arbiter: Arc<AudioDeviceArbiter>,
    engine: Arc<dyn SpeechEngine>,
    config: WakeWordConfig,
    native_spec: StreamSpec,
    adapter: SampleRateAdapter,
    on_wake: Box<dyn Fn() + Send + Sync>,
    state: Mutex<ListenerState>,
    state_changed: Condvar,
    loop_thread: Mutex<Option<LoopHandle>>,
    read_fault_logged: AtomicBool,
}

struct LoopHandle {
    thread: JoinHandle<()>,
    done: Receiver<()>,
}

impl WakeWordListener {
    /// Create a listener. `native_spec` is the capture hardware format;
    /// `decimation_ratio` brings it down to the engine's rate.
    pub fn new(
        arbiter: Arc<AudioDeviceArbiter>,
        engine: Arc<dyn SpeechEngine>,
        config: WakeWordConfig,
        native_spec: StreamSpec,
        decimation_ratio: usize,
        on_wake: Box<dyn Fn() + Send + Sync>,
    ) -> Self {
        Self {
            arbiter,
            engine,
            adapter: SampleRateAdapter::new(native_spec.channels, decimation_ratio),
            native_spec,
            config,
            on_wake,
            state: Mutex::new(ListenerState::Stopped),
            state_changed: Condvar::new(),
            loop_thread: Mutex::new(None),
            read_fault_logged: AtomicBool::new(false),
        }
    }

    /// Current lifecycle state
    #[must_use]
    pub fn state(&self) -> ListenerState {
        self.state.lock().map_or(ListenerState::Stopped, |s| *s)
    }

    /// Configured wake phrases
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.config.phrases
    }

    /// Start the listening loop. No-op if the loop is already running.
    ///
    /// # Errors
    ///
    /// Returns error if the capture stream cannot be opened or the decoder
    /// cannot create a stream
    pub fn start(self: &Arc<Self>) -> Result<()> {
        {
            let state = self
                .state
                .lock()
                .map_err(|_| Error::Audio("listener state poisoned".to_string()))?;
            if *state != ListenerState::Stopped {
                tracing::warn!(state = state.as_str(), "listener already running");
                return Ok(());
            }
        }

        self.arbiter.open_capture(STREAM_ID, &self.native_spec)?;
        let decoder = match self.engine.create_stream() {
            Ok(decoder) => decoder,
            Err(e) => {
                self.arbiter.close(STREAM_ID);
                return Err(e);
            }
        };

        self.set_state(ListenerState::Listening);

        let (done_tx, done_rx) = mpsc::channel();
        let this = Arc::clone(self);
        let thread = std::thread::spawn(move || {
            this.listen_loop(decoder);
            let _ = done_tx.send(());
        });

        if let Ok(mut slot) = self.loop_thread.lock() {
            *slot = Some(LoopHandle {
                thread,
                done: done_rx,
            });
        }

        tracing::info!(phrases = ?self.config.phrases, "wake word listening started");
        Ok(())
    }

    /// Pause decoding. The loop keeps pulling frames so the capture buffer
    /// cannot overflow upstream.
    pub fn pause(&self) {
        if let Ok(mut state) = self.state.lock() {
            if *state == ListenerState::Listening {
                *state = ListenerState::Paused;
                self.state_changed.notify_all();
                tracing::debug!("wake word listening paused");
            }
        }
    }

    /// Resume decoding after a pause
    pub fn resume(&self) {
        if let Ok(mut state) = self.state.lock() {
            if *state == ListenerState::Paused {
                *state = ListenerState::Listening;
                self.state_changed.notify_all();
                tracing::debug!("wake word listening resumed");
            }
        }
    }

    /// Stop the loop, wait up to the bounded stop timeout for it to exit,
    /// then release the capture stream whether or not it did
    pub fn stop(&self) {
        self.set_state(ListenerState::Stopped);

        let handle = self.loop_thread.lock().ok().and_then(|mut slot| slot.take());
        if let Some(handle) = handle {
            match handle.done.recv_timeout(STOP_TIMEOUT) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    let _ = handle.thread.join();
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::warn!("listener thread did not exit within the stop timeout");
                    // The thread is left detached; resource cleanup proceeds
                    // regardless so the device cannot stay locked
                }
            }
        }

        self.arbiter.close(STREAM_ID);
        tracing::info!("wake word listening stopped");
    }

    fn set_state(&self, next: ListenerState) {
        if let Ok(mut state) = self.state.lock() {
            *state = next;
            self.state_changed.notify_all();
        }
    }

    fn listen_loop(self: &Arc<Self>, mut decoder: Box<dyn crate::decoder::StreamingDecoder>) {
        let mut matcher = WakePhraseMatcher::new(&self.config);

        loop {
            let guard = match self.state.lock() {
                Ok(guard) => guard,
                Err(_) => break,
            };

            match *guard {
                ListenerState::Stopped => break,
                ListenerState::Paused => {
                    drop(guard);
                    // Drain the device so the capture buffer cannot overflow
                    let _ = self.arbiter.read(STREAM_ID);
                    if let Ok(guard) = self.state.lock() {
                        if *guard == ListenerState::Paused {
                            let _ = self.state_changed.wait_timeout(guard, PAUSED_POLL);
                        }
                    }
                    continue;
                }
                ListenerState::Listening => drop(guard),
            }

            match self.arbiter.read(STREAM_ID) {
                Ok(Some(frame)) => {
                    let mono = self.adapter.adapt(&frame.samples);
                    if mono.is_empty() {
                        continue;
                    }
                    match decoder.accept_pcm(&mono) {
                        Ok(event) => self.handle_text(event.text(), &mut matcher),
                        Err(e) => {
                            tracing::warn!(error = %e, "decoder error");
                            std::thread::sleep(PAUSED_POLL);
                        }
                    }
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    // The recorder replaces this stream for the session; once
                    // we are listening again the stream is ours to reclaim.
                    // Re-check the state first so a just-paused loop cannot
                    // evict an active recording.
                    if self.state() == ListenerState::Listening
                        && self.arbiter.open_capture(STREAM_ID, &self.native_spec).is_ok()
                    {
                        tracing::debug!("capture stream reclaimed");
                        self.read_fault_logged.store(false, Ordering::Relaxed);
                        continue;
                    }
                    if !self.read_fault_logged.swap(true, Ordering::Relaxed) {
                        tracing::warn!(error = %e, "wake word frame read failed");
                    }
                    std::thread::sleep(PAUSED_POLL);
                }
            }
        }
    }

    fn handle_text(&self, text: &str, matcher: &mut WakePhraseMatcher) {
        if let Some(detection) = matcher.check_at(text, Instant::now()) {
            tracing::info!(
                phrase = %detection.phrase,
                confidence = detection.confidence,
                "wake word detected"
            );
            // Self-pause before the callback so the triggered session cannot
            // re-trigger while it runs
            self.pause();
            (self.on_wake)();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::MockBackend;
    use crate::decoder::{DecodeEvent, StreamingDecoder};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    fn wake_config(threshold: f32, cooldown: Duration) -> WakeWordConfig {
        WakeWordConfig {
            phrases: vec!["furby".to_string(), "hey furby".to_string()],
            confidence_threshold: threshold,
            cooldown,
        }
    }

    // -- confidence -----------------------------------------------------------

    #[test]
    fn confidence_all_phrase_words_present() {
        assert!(
            (WakePhraseMatcher::confidence("hey furby wake up", "hey furby") - 1.0).abs()
                < f32::EPSILON
        );
    }

    #[test]
    fn confidence_half_phrase_words_present() {
        assert!((WakePhraseMatcher::confidence("furby", "hey furby") - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn confidence_exact_match_is_one() {
        assert!((WakePhraseMatcher::confidence("furby", "furby") - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn confidence_no_overlap_is_zero() {
        assert!(WakePhraseMatcher::confidence("hello world", "hey furby") < f32::EPSILON);
    }

    // -- matcher --------------------------------------------------------------

    #[test]
    fn matcher_accepts_above_threshold() {
        let mut matcher = WakePhraseMatcher::new(&wake_config(0.7, Duration::from_secs(5)));
        let detection = matcher.check_at("Furby ", Instant::now()).unwrap();
        assert_eq!(detection.phrase, "furby");
        assert!((detection.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn matcher_rejects_below_threshold() {
        let mut matcher = WakePhraseMatcher::new(&wake_config(0.7, Duration::from_secs(5)));
        assert!(matcher.check_at("something else entirely", Instant::now()).is_none());
    }

    #[test]
    fn matcher_rejects_empty_text() {
        let mut matcher = WakePhraseMatcher::new(&wake_config(0.0, Duration::ZERO));
        assert!(matcher.check_at("   ", Instant::now()).is_none());
    }

    #[test]
    fn matcher_cooldown_suppresses_then_reopens() {
        let mut matcher = WakePhraseMatcher::new(&wake_config(0.7, Duration::from_secs(5)));
        let base = Instant::now();

        assert!(matcher.check_at("furby", base).is_some());
        // Inside the cooldown window
        assert!(matcher.check_at("furby", base + Duration::from_secs(1)).is_none());
        // Past the cooldown window
        assert!(matcher.check_at("furby", base + Duration::from_secs(6)).is_some());
    }

    #[test]
    fn matcher_takes_first_phrase_meeting_threshold() {
        let config = WakeWordConfig {
            phrases: vec!["hey furby".to_string(), "furby".to_string()],
            confidence_threshold: 0.5,
            cooldown: Duration::ZERO,
        };
        let mut matcher = WakePhraseMatcher::new(&config);
        // "furby" gives 0.5 for "hey furby" and 1.0 for "furby"; the first
        // phrase meeting the threshold wins
        let detection = matcher.check_at("furby", Instant::now()).unwrap();
        assert_eq!(detection.phrase, "hey furby");
    }

    // -- listener loop --------------------------------------------------------

    struct ScriptedEngine {
        events: Arc<Mutex<VecDeque<DecodeEvent>>>,
    }

    struct ScriptedStream {
        events: Arc<Mutex<VecDeque<DecodeEvent>>>,
    }

    impl crate::decoder::SpeechEngine for ScriptedEngine {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn create_stream(&self) -> crate::Result<Box<dyn StreamingDecoder>> {
            Ok(Box::new(ScriptedStream {
                events: Arc::clone(&self.events),
            }))
        }
    }

    impl StreamingDecoder for ScriptedStream {
        fn accept_pcm(&mut self, _samples: &[i16]) -> crate::Result<DecodeEvent> {
            let next = self.events.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| DecodeEvent::Partial(String::new())))
        }

        fn finalize(&mut self) -> crate::Result<Option<String>> {
            Ok(None)
        }
    }

    fn tiny_spec() -> StreamSpec {
        StreamSpec {
            channels: 1,
            sample_rate: 16_000,
            frame_size: 16,
        }
    }

    fn wait_for(counter: &AtomicUsize, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while counter.load(Ordering::SeqCst) < expected {
            assert!(Instant::now() < deadline, "callback count never reached {expected}");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn listener_detects_pauses_and_resumes() {
        let arbiter = Arc::new(AudioDeviceArbiter::new(Arc::new(MockBackend::new())));
        let events = Arc::new(Mutex::new(VecDeque::from(vec![DecodeEvent::Final(
            "furby".to_string(),
        )])));
        let engine = Arc::new(ScriptedEngine {
            events: Arc::clone(&events),
        });

        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = Arc::clone(&fired);

        let listener = Arc::new(WakeWordListener::new(
            arbiter.clone(),
            engine,
            wake_config(0.7, Duration::ZERO),
            tiny_spec(),
            1,
            Box::new(move || {
                fired_cb.fetch_add(1, Ordering::SeqCst);
            }),
        ));

        listener.start().unwrap();
        wait_for(&fired, 1);

        // Self-paused after the detection
        assert_eq!(listener.state(), ListenerState::Paused);

        // Starting again while running is a no-op
        listener.start().unwrap();
        assert_eq!(listener.state(), ListenerState::Paused);

        // Queue another detection, resume, expect a second callback
        events
            .lock()
            .unwrap()
            .push_back(DecodeEvent::Final("furby".to_string()));
        listener.resume();
        wait_for(&fired, 2);

        listener.stop();
        assert_eq!(listener.state(), ListenerState::Stopped);
        assert!(arbiter.open_streams().is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stop_without_start_is_safe() {
        let arbiter = Arc::new(AudioDeviceArbiter::new(Arc::new(MockBackend::new())));
        let engine = Arc::new(ScriptedEngine {
            events: Arc::new(Mutex::new(VecDeque::new())),
        });
        let listener = Arc::new(WakeWordListener::new(
            arbiter,
            engine,
            wake_config(0.7, Duration::ZERO),
            tiny_spec(),
            1,
            Box::new(|| {}),
        ));

        listener.stop();
        assert_eq!(listener.state(), ListenerState::Stopped);
    }
}
