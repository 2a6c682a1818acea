//! Single-owner arbitration of the physical audio device
//!
//! The arbiter is the only component that opens or closes streams on the
//! device. Logical stream identifiers let call sites express intent
//! ("wake_word" vs "recorder") without implying the streams can coexist: the
//! hardware serves one capture and one playback stream, so opening replaces,
//! never stacks.
//!
//! The arbiter is constructed once at the composition root and passed
//! explicitly to every consumer; it holds no global state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::device::{CaptureStream, DeviceBackend, PlaybackStream};
use super::frame::{AudioFrame, DeviceDescriptor, StreamDirection, StreamSpec};
use crate::{Error, Result};

enum OpenStream {
    Capture(Box<dyn CaptureStream>),
    Playback(Box<dyn PlaybackStream>),
}

impl OpenStream {
    fn direction(&self) -> StreamDirection {
        match self {
            Self::Capture(_) => StreamDirection::Capture,
            Self::Playback(_) => StreamDirection::Playback,
        }
    }
}

/// Broker for capture and playback streams on the single audio device
pub struct AudioDeviceArbiter {
    backend: Arc<dyn DeviceBackend>,
    streams: Mutex<HashMap<String, OpenStream>>,
}

impl AudioDeviceArbiter {
    /// Create an arbiter over the given device backend
    #[must_use]
    pub fn new(backend: Arc<dyn DeviceBackend>) -> Self {
        Self {
            backend,
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Name of the backend in use, for the status surface
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Enumerate input-capable devices
    #[must_use]
    pub fn list_devices(&self) -> Vec<DeviceDescriptor> {
        self.backend.list_devices()
    }

    /// Open a capture stream under the given logical id, replacing any
    /// existing stream with that id and any other capture stream
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceUnavailable` if the device cannot be opened
    pub fn open_capture(&self, id: &str, spec: &StreamSpec) -> Result<()> {
        let mut streams = self.lock()?;
        Self::evict(&mut streams, id, StreamDirection::Capture);

        let stream = self.backend.open_capture(spec)?;
        streams.insert(id.to_string(), OpenStream::Capture(stream));
        tracing::debug!(id, backend = self.backend.name(), "capture stream opened");
        Ok(())
    }

    /// Open a playback stream under the given logical id, replacing any
    /// existing stream with that id and any other playback stream
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceUnavailable` if the device cannot be opened
    pub fn open_playback(&self, id: &str, spec: &StreamSpec) -> Result<()> {
        let mut streams = self.lock()?;
        Self::evict(&mut streams, id, StreamDirection::Playback);

        let stream = self.backend.open_playback(spec)?;
        streams.insert(id.to_string(), OpenStream::Playback(stream));
        tracing::debug!(id, backend = self.backend.name(), "playback stream opened");
        Ok(())
    }

    /// Non-blocking read of one frame from a capture stream.
    /// `Ok(None)` means no complete frame is buffered yet.
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if the id has no open capture stream or the
    /// stream has faulted
    pub fn read(&self, id: &str) -> Result<Option<AudioFrame>> {
        let mut streams = self.lock()?;
        match streams.get_mut(id) {
            Some(OpenStream::Capture(stream)) => stream.read_frame(),
            _ => Err(Error::Audio(format!("no open capture stream '{id}'"))),
        }
    }

    /// Queue one frame on a playback stream; returns bytes accepted
    ///
    /// # Errors
    ///
    /// Returns `Error::Audio` if the id has no open playback stream or the
    /// stream has faulted
    pub fn write(&self, id: &str, frame: &AudioFrame) -> Result<usize> {
        let mut streams = self.lock()?;
        match streams.get_mut(id) {
            Some(OpenStream::Playback(stream)) => stream.write_frame(frame),
            _ => Err(Error::Audio(format!("no open playback stream '{id}'"))),
        }
    }

    /// Samples queued but not yet played on a playback stream. Returns 0 for
    /// unknown ids so drain loops terminate after a close.
    #[must_use]
    pub fn pending_playback(&self, id: &str) -> usize {
        self.lock().ok().map_or(0, |streams| match streams.get(id) {
            Some(OpenStream::Playback(stream)) => stream.pending_samples(),
            _ => 0,
        })
    }

    /// Close the stream under the given id. Idempotent: closing an unknown
    /// or already-closed id is a no-op. Multiple shutdown paths call this
    /// defensively.
    pub fn close(&self, id: &str) {
        if let Ok(mut streams) = self.lock() {
            if streams.remove(id).is_some() {
                tracing::debug!(id, "stream closed");
            }
        }
    }

    /// Close every open stream (shutdown / forced reset)
    pub fn reset(&self) {
        if let Ok(mut streams) = self.lock() {
            let count = streams.len();
            streams.clear();
            if count > 0 {
                tracing::info!(count, "all audio streams closed");
            }
        }
    }

    /// Logical ids and directions of the currently open streams
    #[must_use]
    pub fn open_streams(&self) -> Vec<(String, StreamDirection)> {
        self.lock().map_or_else(
            |_| Vec::new(),
            |streams| {
                streams
                    .iter()
                    .map(|(id, s)| (id.clone(), s.direction()))
                    .collect()
            },
        )
    }

    /// Remove the stream with the given id and any other stream in the same
    /// direction. The hardware permits one open handle per direction, so
    /// replacing up front prevents device-busy errors.
    fn evict(streams: &mut HashMap<String, OpenStream>, id: &str, direction: StreamDirection) {
        let evicted: Vec<String> = streams
            .iter()
            .filter(|(k, s)| k.as_str() == id || s.direction() == direction)
            .map(|(k, _)| k.clone())
            .collect();

        for key in evicted {
            streams.remove(&key);
            tracing::debug!(id = %key, "replaced existing stream");
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, OpenStream>>> {
        self.streams
            .lock()
            .map_err(|_| Error::Audio("arbiter lock poisoned".to_string()))
    }
}
