//! Audio pipeline: device arbitration, format adaptation, voice activity
//! detection, and WAV persistence helpers

mod arbiter;
mod device;
mod frame;
mod resample;
mod vad;
pub mod wav;

pub use arbiter::AudioDeviceArbiter;
pub use device::{CaptureStream, CpalBackend, DeviceBackend, MockBackend, PlaybackStream};
pub use frame::{AudioFrame, DeviceDescriptor, StreamDirection, StreamSpec};
pub use resample::SampleRateAdapter;
pub use vad::{VoiceActivityGate, frame_energy};
