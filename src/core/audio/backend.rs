//! Device backend abstraction for audio capture and playback.
//!
//! Streams are opened and driven from dedicated worker threads, so the stream
//! traits are blocking and need not be `Send`. The backend itself is shared
//! between the session layer and the workers.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while driving audio devices.
#[derive(Debug, Error)]
pub enum AudioError {
    /// No usable device was found
    #[error("Audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The device rejected the requested stream format
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Building or starting the stream failed
    #[error("Failed to start audio stream: {0}")]
    StreamStartFailed(String),

    /// Error reported by a running stream
    #[error("Audio stream error: {0}")]
    StreamError(String),

    /// A worker thread could not be spawned or exited before reporting
    #[error("Audio worker error: {0}")]
    WorkerError(String),
}

/// Result type for audio operations.
pub type AudioResult<T> = Result<T, AudioError>;

/// Linear PCM stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per channel in one frame.
    pub frame_samples: usize,
}

impl AudioFormat {
    /// Mono 16-bit little-endian PCM at 24 kHz, 1024-sample frames.
    pub const PCM16_24K_MONO: AudioFormat = AudioFormat {
        sample_rate: 24_000,
        channels: 1,
        frame_samples: 1024,
    };

    pub const BYTES_PER_SAMPLE: usize = 2;

    /// Size of one frame in bytes.
    pub fn frame_bytes(&self) -> usize {
        self.frame_samples * self.channels as usize * Self::BYTES_PER_SAMPLE
    }

    /// Wall-clock duration of one frame.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_micros(self.frame_samples as u64 * 1_000_000 / self.sample_rate as u64)
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::PCM16_24K_MONO
    }
}

/// An open capture stream.
pub trait InputStream {
    /// Read one frame of PCM16 bytes, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when no frame became available in time.
    fn read_frame(&mut self, timeout: Duration) -> AudioResult<Option<Vec<u8>>>;

    /// Stop the stream and release the device.
    fn close(&mut self) {}
}

/// An open playback stream.
pub trait OutputStream {
    /// Write one chunk of PCM16 bytes. May block until the device accepts it.
    fn write_frame(&mut self, pcm: &[u8]) -> AudioResult<()>;

    /// Stop the stream and release the device.
    fn close(&mut self) {}
}

/// Factory for capture and playback streams.
pub trait AudioBackend: Send + Sync + 'static {
    /// Human-readable backend name for logs.
    fn name(&self) -> &str;

    fn open_input(&self, format: AudioFormat) -> AudioResult<Box<dyn InputStream>>;

    fn open_output(&self, format: AudioFormat) -> AudioResult<Box<dyn OutputStream>>;

    /// Release backend-wide resources. Called once during cleanup.
    fn terminate(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_format_constants() {
        let format = AudioFormat::default();
        assert_eq!(format, AudioFormat::PCM16_24K_MONO);
        assert_eq!(format.sample_rate, 24_000);
        assert_eq!(format.channels, 1);
        assert_eq!(format.frame_bytes(), 2048);
    }

    #[test]
    fn test_frame_duration() {
        let format = AudioFormat::PCM16_24K_MONO;
        // 1024 samples at 24 kHz
        assert_eq!(format.frame_duration(), Duration::from_micros(42_666));
    }

    #[test]
    fn test_error_display() {
        let err = AudioError::DeviceUnavailable("no input device".to_string());
        assert_eq!(err.to_string(), "Audio device unavailable: no input device");
    }
}
