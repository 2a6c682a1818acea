//! Device backends behind the arbiter
//!
//! [`DeviceBackend`] is the seam between the arbiter and the hardware. The
//! cpal backend drives the real device; the mock backend produces silence and
//! discards playback, so every consumer keeps working when no hardware is
//! present.
//!
//! cpal streams are not `Send`, so each open stream lives on a dedicated
//! thread that owns the `cpal::Stream` and exchanges samples with its handle
//! through a shared buffer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};

use super::frame::{AudioFrame, DeviceDescriptor, StreamSpec};
use crate::{Error, Result};

/// Capture frames buffered before the oldest are dropped, in frames
const CAPTURE_BUFFER_FRAMES: usize = 64;

/// An audio device the arbiter can open streams on
pub trait DeviceBackend: Send + Sync {
    /// Backend name for logs and the status surface
    fn name(&self) -> &'static str;

    /// Enumerate input-capable devices
    fn list_devices(&self) -> Vec<DeviceDescriptor>;

    /// Open a capture stream with the given format
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceUnavailable` if the device is missing, busy, or
    /// rejects the format
    fn open_capture(&self, spec: &StreamSpec) -> Result<Box<dyn CaptureStream>>;

    /// Open a playback stream with the given format
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceUnavailable` if the device is missing, busy, or
    /// rejects the format
    fn open_playback(&self, spec: &StreamSpec) -> Result<Box<dyn PlaybackStream>>;
}

/// An open capture stream
pub trait CaptureStream: Send {
    /// Non-blocking read of one full frame. `Ok(None)` means no complete
    /// frame is buffered yet.
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if the underlying stream has faulted
    fn read_frame(&mut self) -> Result<Option<AudioFrame>>;
}

/// An open playback stream
pub trait PlaybackStream: Send {
    /// Queue one frame for playback; returns the number of bytes accepted
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if the underlying stream has faulted
    fn write_frame(&mut self, frame: &AudioFrame) -> Result<usize>;

    /// Samples queued but not yet played, for drain-before-close
    fn pending_samples(&self) -> usize;
}

// ── cpal backend ──────────────────────────────────────────────

/// Real audio device driven through cpal
pub struct CpalBackend {
    device_name: Option<String>,
}

impl CpalBackend {
    /// Create a backend targeting the named device, or the host default
    #[must_use]
    pub fn new(device_name: Option<String>) -> Self {
        Self { device_name }
    }

    fn input_device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host
                .default_input_device()
                .ok_or_else(|| Error::DeviceUnavailable("no default input device".to_string())),
            Some(name) => {
                let devices = host
                    .input_devices()
                    .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
                for device in devices {
                    if device.name().is_ok_and(|n| &n == name) {
                        return Ok(device);
                    }
                }
                Err(Error::DeviceUnavailable(format!(
                    "input device not found: {name}"
                )))
            }
        }
    }

    fn output_device(&self) -> Result<cpal::Device> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host
                .default_output_device()
                .ok_or_else(|| Error::DeviceUnavailable("no default output device".to_string())),
            Some(name) => {
                let devices = host
                    .output_devices()
                    .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
                for device in devices {
                    if device.name().is_ok_and(|n| &n == name) {
                        return Ok(device);
                    }
                }
                Err(Error::DeviceUnavailable(format!(
                    "output device not found: {name}"
                )))
            }
        }
    }
}

impl DeviceBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        let host = cpal::default_host();
        let Ok(devices) = host.input_devices() else {
            return Vec::new();
        };

        devices
            .enumerate()
            .map(|(index, device)| {
                let name = device.name().unwrap_or_else(|_| "unknown".to_string());
                let (channels, sample_rate) = device
                    .default_input_config()
                    .map(|c| (c.channels(), c.sample_rate().0))
                    .unwrap_or((0, 0));
                DeviceDescriptor {
                    index,
                    name,
                    channels,
                    sample_rate,
                }
            })
            .collect()
    }

    fn open_capture(&self, spec: &StreamSpec) -> Result<Box<dyn CaptureStream>> {
        let device = self.input_device()?;

        // The hardware delivers 16-bit samples; anything else is an
        // unsupported format, reported rather than converted
        let supported = device
            .supported_input_configs()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .find(|c| {
                c.channels() == spec.channels
                    && c.sample_format() == SampleFormat::I16
                    && c.min_sample_rate() <= SampleRate(spec.sample_rate)
                    && c.max_sample_rate() >= SampleRate(spec.sample_rate)
            })
            .ok_or_else(|| {
                Error::DeviceUnavailable(format!(
                    "no 16-bit input config for {} ch at {} Hz",
                    spec.channels, spec.sample_rate
                ))
            })?;

        let config = supported.with_sample_rate(SampleRate(spec.sample_rate)).config();
        let samples_per_frame = spec.samples_per_frame();
        let buffer: Arc<Mutex<VecDeque<i16>>> = Arc::new(Mutex::new(VecDeque::new()));
        let failed = Arc::new(AtomicBool::new(false));

        let worker = spawn_stream_thread({
            let buffer = Arc::clone(&buffer);
            let failed = Arc::clone(&failed);
            let max_buffered = samples_per_frame * CAPTURE_BUFFER_FRAMES;
            move || build_capture_stream(&device, &config, buffer, failed, max_buffered)
        })?;

        Ok(Box::new(CpalCaptureStream {
            buffer,
            failed,
            samples_per_frame,
            _worker: worker,
        }))
    }

    fn open_playback(&self, spec: &StreamSpec) -> Result<Box<dyn PlaybackStream>> {
        let device = self.output_device()?;

        let supported = device
            .supported_output_configs()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .find(|c| {
                c.channels() == spec.channels
                    && c.sample_format() == SampleFormat::I16
                    && c.min_sample_rate() <= SampleRate(spec.sample_rate)
                    && c.max_sample_rate() >= SampleRate(spec.sample_rate)
            })
            .ok_or_else(|| {
                Error::DeviceUnavailable(format!(
                    "no 16-bit output config for {} ch at {} Hz",
                    spec.channels, spec.sample_rate
                ))
            })?;

        let config = supported.with_sample_rate(SampleRate(spec.sample_rate)).config();
        let queue: Arc<Mutex<VecDeque<i16>>> = Arc::new(Mutex::new(VecDeque::new()));
        let failed = Arc::new(AtomicBool::new(false));

        let worker = spawn_stream_thread({
            let queue = Arc::clone(&queue);
            let failed = Arc::clone(&failed);
            move || build_playback_stream(&device, &config, queue, failed)
        })?;

        Ok(Box::new(CpalPlaybackStream {
            queue,
            failed,
            _worker: worker,
        }))
    }
}

/// Spawn a thread that builds a cpal stream, reports the build outcome, and
/// keeps the stream alive until the worker is dropped
fn spawn_stream_thread<F>(build: F) -> Result<StreamWorker>
where
    F: FnOnce() -> Result<cpal::Stream> + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let (ready_tx, ready_rx) = mpsc::channel::<Result<()>>();

    let thread = std::thread::spawn(move || {
        let stream = match build() {
            Ok(stream) => {
                let _ = ready_tx.send(Ok(()));
                stream
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };

        while !stop_flag.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(50));
        }
        drop(stream);
    });

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(StreamWorker {
            stop,
            thread: Some(thread),
        }),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            let _ = thread.join();
            Err(Error::DeviceUnavailable(
                "stream thread exited during setup".to_string(),
            ))
        }
    }
}

fn build_capture_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    buffer: Arc<Mutex<VecDeque<i16>>>,
    failed: Arc<AtomicBool>,
    max_buffered: usize,
) -> Result<cpal::Stream> {
    let err_failed = Arc::clone(&failed);
    let stream = device
        .build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Ok(mut buf) = buffer.lock() {
                    buf.extend(data.iter().copied());
                    // Drop the oldest samples on overflow
                    while buf.len() > max_buffered {
                        buf.pop_front();
                    }
                }
            },
            move |err| {
                tracing::error!(error = %err, "capture stream error");
                err_failed.store(true, Ordering::Relaxed);
            },
            None,
        )
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
    Ok(stream)
}

fn build_playback_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    queue: Arc<Mutex<VecDeque<i16>>>,
    failed: Arc<AtomicBool>,
) -> Result<cpal::Stream> {
    let err_failed = Arc::clone(&failed);
    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                if let Ok(mut queue) = queue.lock() {
                    for out in data.iter_mut() {
                        *out = queue.pop_front().unwrap_or(0);
                    }
                } else {
                    data.fill(0);
                }
            },
            move |err| {
                tracing::error!(error = %err, "playback stream error");
                err_failed.store(true, Ordering::Relaxed);
            },
            None,
        )
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

    stream
        .play()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;
    Ok(stream)
}

/// Owns the thread keeping a cpal stream alive
struct StreamWorker {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct CpalCaptureStream {
    buffer: Arc<Mutex<VecDeque<i16>>>,
    failed: Arc<AtomicBool>,
    samples_per_frame: usize,
    _worker: StreamWorker,
}

impl CaptureStream for CpalCaptureStream {
    fn read_frame(&mut self) -> Result<Option<AudioFrame>> {
        if self.failed.load(Ordering::Relaxed) {
            return Err(Error::Audio("capture stream faulted".to_string()));
        }

        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| Error::Audio("capture buffer poisoned".to_string()))?;

        if buffer.len() < self.samples_per_frame {
            return Ok(None);
        }

        let samples: Vec<i16> = buffer.drain(..self.samples_per_frame).collect();
        Ok(Some(AudioFrame { samples }))
    }
}

struct CpalPlaybackStream {
    queue: Arc<Mutex<VecDeque<i16>>>,
    failed: Arc<AtomicBool>,
    _worker: StreamWorker,
}

impl PlaybackStream for CpalPlaybackStream {
    fn write_frame(&mut self, frame: &AudioFrame) -> Result<usize> {
        if self.failed.load(Ordering::Relaxed) {
            return Err(Error::Audio("playback stream faulted".to_string()));
        }

        let mut queue = self
            .queue
            .lock()
            .map_err(|_| Error::Audio("playback queue poisoned".to_string()))?;
        queue.extend(frame.samples.iter().copied());
        Ok(frame.byte_len())
    }

    fn pending_samples(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }
}

// ── mock backend ──────────────────────────────────────────────

/// Silence-producing, playback-discarding backend for degraded mode and
/// hardware-free tests. Capture is paced to real time against a clock so
/// consumers observe the same timing as with a real device; tests may
/// pre-load scripted frames that are served before the silence.
pub struct MockBackend {
    scripted: Arc<Mutex<VecDeque<Vec<i16>>>>,
    samples_played: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Backend producing only silence
    #[must_use]
    pub fn new() -> Self {
        Self {
            scripted: Arc::new(Mutex::new(VecDeque::new())),
            samples_played: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Backend serving the given frames first, then silence
    #[must_use]
    pub fn with_frames(frames: Vec<Vec<i16>>) -> Self {
        Self {
            scripted: Arc::new(Mutex::new(frames.into())),
            samples_played: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Total samples written to mock playback streams
    #[must_use]
    pub fn samples_played(&self) -> usize {
        self.samples_played.load(Ordering::Relaxed)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn list_devices(&self) -> Vec<DeviceDescriptor> {
        Vec::new()
    }

    fn open_capture(&self, spec: &StreamSpec) -> Result<Box<dyn CaptureStream>> {
        Ok(Box::new(MockCaptureStream {
            scripted: Arc::clone(&self.scripted),
            spec: *spec,
            next_frame_at: Instant::now(),
        }))
    }

    fn open_playback(&self, _spec: &StreamSpec) -> Result<Box<dyn PlaybackStream>> {
        Ok(Box::new(MockPlaybackStream {
            samples_played: Arc::clone(&self.samples_played),
        }))
    }
}

struct MockCaptureStream {
    scripted: Arc<Mutex<VecDeque<Vec<i16>>>>,
    spec: StreamSpec,
    next_frame_at: Instant,
}

impl CaptureStream for MockCaptureStream {
    fn read_frame(&mut self) -> Result<Option<AudioFrame>> {
        // Pace against the clock instead of sleeping so reads stay
        // non-blocking like the real backend
        if Instant::now() < self.next_frame_at {
            return Ok(None);
        }
        self.next_frame_at = Instant::now() + self.spec.frame_duration();

        let scripted = self
            .scripted
            .lock()
            .map_err(|_| Error::Audio("mock buffer poisoned".to_string()))?
            .pop_front();

        let samples = scripted.unwrap_or_else(|| vec![0; self.spec.samples_per_frame()]);
        Ok(Some(AudioFrame { samples }))
    }
}

struct MockPlaybackStream {
    samples_played: Arc<AtomicUsize>,
}

impl PlaybackStream for MockPlaybackStream {
    fn write_frame(&mut self, frame: &AudioFrame) -> Result<usize> {
        self.samples_played
            .fetch_add(frame.samples.len(), Ordering::Relaxed);
        Ok(frame.byte_len())
    }

    fn pending_samples(&self) -> usize {
        0
    }
}
