pub mod decoder;
pub mod output;

use std::path::Path;
use std::time::Duration;

use crate::error::{DecodeError, OutputError};

pub use decoder::SymphoniaSource;
pub use output::CpalBackend;

/// Format of a decoded stream as handed to the output primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

/// Decoded audio over one track's source file.
pub trait AudioStream: Send {
    fn spec(&self) -> StreamSpec;

    /// Read up to `max_frames` interleaved frames of signed 16-bit samples.
    /// `Ok(None)` signals end of stream.
    fn read_chunk(&mut self, max_frames: usize) -> Result<Option<Vec<i16>>, DecodeError>;

    /// Seek to a whole-second offset from the start of the track.
    fn seek(&mut self, seconds: u32) -> Result<(), DecodeError>;

    /// Current position in whole seconds.
    fn tell(&self) -> u32;
}

/// Factory for decoded streams plus duration probing for the catalog scan.
pub trait TrackSource: Send + Sync {
    /// Total duration in whole seconds; 0 when the file is missing or
    /// unreadable.
    fn probe_seconds(&self, path: &Path) -> u32;

    fn open(&self, path: &Path) -> Result<Box<dyn AudioStream>, DecodeError>;
}

/// One opened output session. Created and owned by the driver thread.
pub trait OutputDevice {
    /// Queue a buffer of interleaved samples behind any in-flight buffers.
    fn submit(&mut self, pcm: Vec<i16>) -> Result<(), OutputError>;

    /// Buffers submitted but not yet consumed by the device.
    fn in_flight(&self) -> usize;

    /// Block until an in-flight buffer completes or the timeout passes.
    fn wait_done(&mut self, timeout: Duration);

    /// Drop all queued audio immediately.
    fn reset(&mut self);
}

/// Factory for output sessions.
pub trait OutputBackend: Send + Sync {
    /// Whether an output device can currently be opened at all. Checked on
    /// the control path before a driver task is started.
    fn available(&self) -> bool;

    fn open(&self, spec: StreamSpec) -> Result<Box<dyn OutputDevice>, OutputError>;
}
