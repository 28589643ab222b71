//! Audio capture and playback.
//!
//! # Audio Format
//!
//! Both directions use mono PCM 16-bit signed little-endian at 24kHz,
//! moved in frames of 1024 samples.
//!
//! Device access sits behind [`AudioBackend`]; the `native-audio` feature
//! provides [`CpalBackend`] for real microphones and speakers.

mod backend;
#[cfg(feature = "native-audio")]
mod cpal_backend;
pub mod pcm;
mod processor;
mod queue;

pub use backend::{AudioBackend, AudioError, AudioFormat, AudioResult, InputStream, OutputStream};
#[cfg(feature = "native-audio")]
pub use cpal_backend::CpalBackend;
pub use processor::{AudioProcessor, JOIN_TIMEOUT};
pub use queue::{AudioQueue, POLL_INTERVAL};
