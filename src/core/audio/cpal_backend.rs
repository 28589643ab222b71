//! Native microphone and speaker access through cpal.
//!
//! cpal delivers audio through driver callbacks. The input side assembles the
//! callback buffers into fixed-size frames handed to the capture worker over a
//! bounded channel; the output side keeps a small sample buffer that the
//! playback worker fills and the driver callback empties.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::backend::{AudioBackend, AudioError, AudioFormat, AudioResult, InputStream, OutputStream};
use super::pcm::{FrameAssembler, bytes_to_samples, downmix_to_mono, f32_to_i16, i16_to_f32};

/// Captured frames buffered before the capture worker picks them up.
const INPUT_FRAME_BACKLOG: usize = 64;

/// Playback buffer high-water mark, in multiples of one frame.
const OUTPUT_BUFFERED_FRAMES: usize = 4;

/// Longest a write waits for the device to make room. Shorter than the
/// processor's join timeout so a stalled device never outlives a stop.
const OUTPUT_STALL_TIMEOUT: Duration = Duration::from_millis(500);

const OUTPUT_WAIT_SLICE: Duration = Duration::from_millis(50);

/// Default-device backend.
///
/// Device names select a specific device; `None` uses the host default.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    input_device: Option<String>,
    output_device: Option<String>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input_device(mut self, name: impl Into<String>) -> Self {
        self.input_device = Some(name.into());
        self
    }

    pub fn with_output_device(mut self, name: impl Into<String>) -> Self {
        self.output_device = Some(name.into());
        self
    }

    fn find_input(&self) -> AudioResult<Device> {
        let host = cpal::default_host();
        match &self.input_device {
            None => host
                .default_input_device()
                .ok_or_else(|| AudioError::DeviceUnavailable("no default input device".to_string())),
            Some(name) => {
                let devices = host
                    .input_devices()
                    .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
                find_named(devices, name)
            }
        }
    }

    fn find_output(&self) -> AudioResult<Device> {
        let host = cpal::default_host();
        match &self.output_device {
            None => host
                .default_output_device()
                .ok_or_else(|| AudioError::DeviceUnavailable("no default output device".to_string())),
            Some(name) => {
                let devices = host
                    .output_devices()
                    .map_err(|e| AudioError::DeviceUnavailable(e.to_string()))?;
                find_named(devices, name)
            }
        }
    }
}

fn find_named(devices: impl Iterator<Item = Device>, name: &str) -> AudioResult<Device> {
    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name == name {
                return Ok(device);
            }
        }
    }
    Err(AudioError::DeviceUnavailable(format!("device '{name}' not found")))
}

/// Pick a supported configuration at the requested rate, preferring the
/// requested channel count and 16-bit samples.
fn choose_config(
    ranges: impl Iterator<Item = SupportedStreamConfigRange>,
    format: AudioFormat,
) -> AudioResult<(StreamConfig, SampleFormat)> {
    let rate = SampleRate(format.sample_rate);
    let mut best: Option<(u8, StreamConfig, SampleFormat)> = None;

    for range in ranges {
        if range.min_sample_rate() > rate || range.max_sample_rate() < rate {
            continue;
        }
        let sample_format = range.sample_format();
        if !matches!(sample_format, SampleFormat::I16 | SampleFormat::F32) {
            continue;
        }

        let mut score = 0u8;
        if range.channels() == format.channels {
            score += 2;
        }
        if sample_format == SampleFormat::I16 {
            score += 1;
        }

        if best.as_ref().map(|(s, _, _)| score > *s).unwrap_or(true) {
            let config = range.with_sample_rate(rate).config();
            best = Some((score, config, sample_format));
        }
    }

    best.map(|(_, config, sample_format)| (config, sample_format))
        .ok_or_else(|| {
            AudioError::UnsupportedFormat(format!(
                "no device configuration supports {} Hz PCM",
                format.sample_rate
            ))
        })
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn open_input(&self, format: AudioFormat) -> AudioResult<Box<dyn InputStream>> {
        let device = self.find_input()?;
        let ranges = device
            .supported_input_configs()
            .map_err(|e| AudioError::UnsupportedFormat(e.to_string()))?;
        let (config, sample_format) = choose_config(ranges, format)?;
        let channels = config.channels as usize;

        let (frames_tx, frames_rx) = bounded(INPUT_FRAME_BACKLOG);
        let failure = Arc::new(Mutex::new(None::<String>));
        let err_slot = failure.clone();
        let on_error = move |err: cpal::StreamError| {
            tracing::error!("Audio input stream error: {}", err);
            *err_slot.lock() = Some(err.to_string());
        };

        let mut assembler = FrameAssembler::new(format.frame_samples);
        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let mono = downmix_to_mono(data, channels);
                    forward_frames(&frames_tx, assembler.push(&mono));
                },
                on_error,
                None,
            ),
            _ => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<i16> = data.iter().map(|&s| f32_to_i16(s)).collect();
                    let mono = downmix_to_mono(&samples, channels);
                    forward_frames(&frames_tx, assembler.push(&mono));
                },
                on_error,
                None,
            ),
        }
        .map_err(|e| AudioError::StreamStartFailed(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamStartFailed(e.to_string()))?;

        tracing::debug!(
            "Opened input device '{}' at {} Hz, {} channel(s), {:?}",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            format.sample_rate,
            channels,
            sample_format
        );

        Ok(Box::new(CpalInput {
            stream: Some(stream),
            frames: frames_rx,
            failure,
        }))
    }

    fn open_output(&self, format: AudioFormat) -> AudioResult<Box<dyn OutputStream>> {
        let device = self.find_output()?;
        let ranges = device
            .supported_output_configs()
            .map_err(|e| AudioError::UnsupportedFormat(e.to_string()))?;
        let (config, sample_format) = choose_config(ranges, format)?;
        let channels = config.channels as usize;

        let buffer = Arc::new(PlaybackBuffer::default());
        let failure = Arc::new(Mutex::new(None::<String>));
        let err_slot = failure.clone();
        let on_error = move |err: cpal::StreamError| {
            tracing::error!("Audio output stream error: {}", err);
            *err_slot.lock() = Some(err.to_string());
        };

        let source = buffer.clone();
        let stream = match sample_format {
            SampleFormat::I16 => device.build_output_stream(
                &config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    source.fill(data, channels, |s| s);
                },
                on_error,
                None,
            ),
            _ => device.build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    source.fill(data, channels, i16_to_f32);
                },
                on_error,
                None,
            ),
        }
        .map_err(|e| AudioError::StreamStartFailed(e.to_string()))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamStartFailed(e.to_string()))?;

        tracing::debug!(
            "Opened output device '{}' at {} Hz, {} channel(s), {:?}",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            format.sample_rate,
            channels,
            sample_format
        );

        Ok(Box::new(CpalOutput {
            stream: Some(stream),
            buffer,
            high_water: format.frame_samples * OUTPUT_BUFFERED_FRAMES,
            failure,
        }))
    }

    fn terminate(&self) {
        tracing::debug!("cpal backend released");
    }
}

fn forward_frames(tx: &Sender<Vec<u8>>, frames: Vec<Vec<u8>>) {
    for frame in frames {
        if let Err(TrySendError::Full(_)) = tx.try_send(frame) {
            tracing::warn!("Capture backlog full, dropping audio frame");
        }
    }
}

struct CpalInput {
    stream: Option<Stream>,
    frames: Receiver<Vec<u8>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl InputStream for CpalInput {
    fn read_frame(&mut self, timeout: Duration) -> AudioResult<Option<Vec<u8>>> {
        if let Some(reason) = self.failure.lock().take() {
            return Err(AudioError::StreamError(reason));
        }
        match self.frames.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(AudioError::StreamError("input stream ended".to_string()))
            }
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
        }
    }
}

/// Samples waiting for the output callback.
#[derive(Default)]
struct PlaybackBuffer {
    samples: Mutex<VecDeque<i16>>,
    drained: Condvar,
}

impl PlaybackBuffer {
    /// Fill an interleaved device buffer from the mono queue, padding with silence.
    fn fill<T: Copy + Default>(&self, out: &mut [T], channels: usize, convert: impl Fn(i16) -> T) {
        let mut samples = self.samples.lock();
        for frame in out.chunks_mut(channels.max(1)) {
            let value = samples.pop_front().map(&convert).unwrap_or_default();
            for slot in frame.iter_mut() {
                *slot = value;
            }
        }
        drop(samples);
        self.drained.notify_all();
    }

    /// Append samples once the buffer is below `high_water`, like a blocking
    /// hardware write. Fails if the device reports an error or drains nothing
    /// for `stall_timeout`.
    fn push(
        &self,
        incoming: Vec<i16>,
        high_water: usize,
        stall_timeout: Duration,
        failure: &Mutex<Option<String>>,
    ) -> AudioResult<()> {
        let deadline = Instant::now() + stall_timeout;
        let mut samples = self.samples.lock();

        while samples.len() >= high_water {
            if let Some(reason) = failure.lock().take() {
                return Err(AudioError::StreamError(reason));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(AudioError::StreamError(format!(
                    "output device consumed no audio for {stall_timeout:?}"
                )));
            }
            self.drained
                .wait_for(&mut samples, OUTPUT_WAIT_SLICE.min(deadline - now));
        }

        samples.extend(incoming);
        Ok(())
    }
}

struct CpalOutput {
    stream: Option<Stream>,
    buffer: Arc<PlaybackBuffer>,
    high_water: usize,
    failure: Arc<Mutex<Option<String>>>,
}

impl OutputStream for CpalOutput {
    fn write_frame(&mut self, pcm: &[u8]) -> AudioResult<()> {
        self.buffer.push(
            bytes_to_samples(pcm),
            self.high_water,
            OUTPUT_STALL_TIMEOUT,
            &self.failure,
        )
    }

    fn close(&mut self) {
        self.buffer.samples.lock().clear();
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_buffer_pads_with_silence() {
        let buffer = PlaybackBuffer::default();
        buffer.samples.lock().extend([1i16, 2]);

        let mut out = [9i16; 6];
        buffer.fill(&mut out, 2, |s| s);
        assert_eq!(out, [1, 1, 2, 2, 0, 0]);
        assert!(buffer.samples.lock().is_empty());
    }

    #[test]
    fn test_push_gives_up_on_stalled_device() {
        let buffer = PlaybackBuffer::default();
        let failure = Mutex::new(None);
        buffer.push(vec![0; 8], 8, Duration::from_millis(100), &failure).unwrap();

        // Nothing drains the buffer, so the second write must not block forever.
        let started = Instant::now();
        let result = buffer.push(vec![1; 8], 8, Duration::from_millis(100), &failure);
        assert!(matches!(result, Err(AudioError::StreamError(_))));
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(buffer.samples.lock().len(), 8);
    }

    #[test]
    fn test_push_resumes_when_device_drains() {
        let buffer = Arc::new(PlaybackBuffer::default());
        let failure = Mutex::new(None);
        buffer.push(vec![5; 4], 4, OUTPUT_STALL_TIMEOUT, &failure).unwrap();

        let device = buffer.clone();
        let drain = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            let mut out = [0i16; 4];
            device.fill(&mut out, 1, |s| s);
            out
        });

        buffer.push(vec![6; 4], 4, OUTPUT_STALL_TIMEOUT, &failure).unwrap();
        assert_eq!(drain.join().unwrap(), [5; 4]);
        assert_eq!(buffer.samples.lock().iter().copied().collect::<Vec<_>>(), vec![6; 4]);
    }

    #[test]
    fn test_push_reports_stream_failure() {
        let buffer = PlaybackBuffer::default();
        let failure = Mutex::new(None);
        buffer.push(vec![0; 4], 4, OUTPUT_STALL_TIMEOUT, &failure).unwrap();

        *failure.lock() = Some("device unplugged".to_string());
        match buffer.push(vec![0; 4], 4, OUTPUT_STALL_TIMEOUT, &failure) {
            Err(AudioError::StreamError(reason)) => assert_eq!(reason, "device unplugged"),
            other => panic!("expected stream error, got {other:?}"),
        }
    }

    #[test]
    #[ignore = "requires audio hardware"]
    fn test_open_default_devices() {
        let backend = CpalBackend::new();
        let mut input = backend.open_input(AudioFormat::PCM16_24K_MONO).unwrap();
        let frame = input.read_frame(Duration::from_secs(1)).unwrap();
        assert!(frame.is_some());
        input.close();

        let mut output = backend.open_output(AudioFormat::PCM16_24K_MONO).unwrap();
        output.write_frame(&[0u8; 2048]).unwrap();
        output.close();
    }
}
