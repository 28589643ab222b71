//! Capture, send and playback workers bridging audio devices to the session.
//!
//! Capture and playback are independent directions. Each running direction
//! owns a fresh stop flag and its worker threads; devices are opened on the
//! worker that drives them and closed by that worker when it exits.
//!
//! ```text
//!  mic ─► [capture thread] ─► outbound queue ─► [send thread] ─► forwarder task ─► connection
//!  connection ─► queue_audio ─► inbound queue ─► [playback thread] ─► speaker
//! ```

use base64::prelude::*;
use bytes::Bytes;
use crossbeam_channel::RecvTimeoutError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle as TaskHandle;
use tracing::{debug, error, info, trace, warn};

use super::backend::{AudioBackend, AudioError, AudioFormat, AudioResult};
use super::queue::{AudioQueue, POLL_INTERVAL};
use crate::core::realtime::EventSender;

/// How long a stop waits for each worker thread before detaching it.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// A spawned worker thread plus a signal that fires when it exits.
struct Worker {
    name: &'static str,
    handle: JoinHandle<()>,
    exited: crossbeam_channel::Receiver<()>,
}

impl Worker {
    fn spawn<F>(name: &'static str, body: F) -> AudioResult<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (exit_tx, exited) = crossbeam_channel::bounded::<()>(0);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                // Dropped on return or unwind, which disconnects `exited`.
                let _exit_guard = exit_tx;
                body();
            })
            .map_err(|e| AudioError::WorkerError(format!("failed to spawn {name}: {e}")))?;

        Ok(Self {
            name,
            handle,
            exited,
        })
    }

    /// Join if the thread exits within `timeout`, otherwise detach it.
    fn join_bounded(self, timeout: Duration) {
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    warn!("Audio worker {} panicked", self.name);
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Audio worker {} did not stop within {:?}, detaching",
                    self.name, timeout
                );
            }
        }
    }
}

/// Workers and stop flag of one running direction.
struct RunningDirection {
    stop: Arc<AtomicBool>,
    workers: Vec<Worker>,
    /// Task moving captured frames onto the connection, capture only
    forwarder: Option<TaskHandle<()>>,
}

impl RunningDirection {
    fn new(stop: Arc<AtomicBool>, workers: Vec<Worker>) -> Self {
        Self {
            stop,
            workers,
            forwarder: None,
        }
    }

    fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Join every worker with [`JOIN_TIMEOUT`] off the async runtime, then
    /// drop whatever the forwarder has not sent yet.
    async fn join(self) {
        let workers = self.workers;
        let forwarder = self.forwarder;
        if !workers.is_empty() {
            Self::join_workers(workers).await;
        }
        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
    }

    async fn join_workers(workers: Vec<Worker>) {
        let joined = tokio::task::spawn_blocking(move || {
            for worker in workers {
                worker.join_bounded(JOIN_TIMEOUT);
            }
        })
        .await;
        if let Err(e) = joined {
            warn!("Failed to join audio workers: {}", e);
        }
    }
}

/// Lifecycle of one audio direction.
enum DirectionState {
    Stopped,
    Running(RunningDirection),
}

impl DirectionState {
    fn is_running(&self) -> bool {
        matches!(self, DirectionState::Running(_))
    }

    fn take(&mut self) -> Option<RunningDirection> {
        match std::mem::replace(self, DirectionState::Stopped) {
            DirectionState::Running(direction) => Some(direction),
            DirectionState::Stopped => None,
        }
    }
}

/// Owns the audio devices, their worker threads and the two handoff queues.
pub struct AudioProcessor {
    backend: Arc<dyn AudioBackend>,
    sender: EventSender,
    owns_connection: bool,
    format: AudioFormat,
    outbound: AudioQueue<String>,
    inbound: AudioQueue<Bytes>,
    capture: DirectionState,
    playback: DirectionState,
    terminated: bool,
}

impl AudioProcessor {
    /// Create a processor that sends captured audio through `sender`.
    ///
    /// When `owns_connection` is set, [`cleanup`](Self::cleanup) also closes
    /// the connection behind `sender`.
    pub fn new(backend: Arc<dyn AudioBackend>, sender: EventSender, owns_connection: bool) -> Self {
        info!(
            "Audio processor initialized with {} backend ({} Hz, {} channel, {} samples per frame)",
            backend.name(),
            AudioFormat::PCM16_24K_MONO.sample_rate,
            AudioFormat::PCM16_24K_MONO.channels,
            AudioFormat::PCM16_24K_MONO.frame_samples
        );
        Self {
            backend,
            sender,
            owns_connection,
            format: AudioFormat::PCM16_24K_MONO,
            outbound: AudioQueue::new(),
            inbound: AudioQueue::new(),
            capture: DirectionState::Stopped,
            playback: DirectionState::Stopped,
            terminated: false,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_running()
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_running()
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Frames captured but not yet handed to the runtime.
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Frames received but not yet written to the output device.
    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    /// Open the input device and start the capture and send workers.
    ///
    /// Must be called from within a tokio runtime; the send worker posts
    /// each frame to it without waiting. Does nothing if already capturing.
    pub async fn start_capture(&mut self) -> AudioResult<()> {
        if self.capture.is_running() {
            debug!("Audio capture already running");
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();

        let capture_worker = {
            let backend = self.backend.clone();
            let format = self.format;
            let stop = stop.clone();
            let outbound = self.outbound.clone();
            Worker::spawn("audio-capture", move || {
                capture_loop(backend, format, stop, outbound, ready_tx)
            })?
        };

        let opened = ready_rx.await.unwrap_or_else(|_| {
            Err(AudioError::WorkerError(
                "capture worker exited before opening the input device".to_string(),
            ))
        });
        if let Err(e) = opened {
            RunningDirection::new(stop, vec![capture_worker]).join().await;
            error!("Failed to start audio capture: {}", e);
            return Err(e);
        }

        // One task drains the handoff so frames reach the connection in capture order.
        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let forwarder = tokio::spawn(forward_audio(self.sender.clone(), frames_rx));

        let send_worker = {
            let stop = stop.clone();
            let outbound = self.outbound.clone();
            Worker::spawn("audio-send", move || send_loop(frames_tx, stop, outbound))
        };
        let send_worker = match send_worker {
            Ok(worker) => worker,
            Err(e) => {
                let mut direction = RunningDirection::new(stop, vec![capture_worker]);
                direction.forwarder = Some(forwarder);
                direction.signal_stop();
                direction.join().await;
                self.outbound.drain();
                return Err(e);
            }
        };

        let mut direction = RunningDirection::new(stop, vec![capture_worker, send_worker]);
        direction.forwarder = Some(forwarder);
        self.capture = DirectionState::Running(direction);
        info!("Started audio capture");
        Ok(())
    }

    /// Stop capturing, join the workers and discard unsent frames.
    pub async fn stop_capture(&mut self) {
        let Some(direction) = self.capture.take() else {
            return;
        };

        direction.signal_stop();
        direction.join().await;

        let dropped = self.outbound.drain();
        if dropped > 0 {
            debug!("Discarded {} unsent audio frames", dropped);
        }
        info!("Stopped audio capture");
    }

    /// Open the output device and start the playback worker.
    ///
    /// Does nothing if already playing.
    pub async fn start_playback(&mut self) -> AudioResult<()> {
        if self.playback.is_running() {
            debug!("Audio playback already running");
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = oneshot::channel();

        let playback_worker = {
            let backend = self.backend.clone();
            let format = self.format;
            let stop = stop.clone();
            let inbound = self.inbound.clone();
            Worker::spawn("audio-playback", move || {
                playback_loop(backend, format, stop, inbound, ready_tx)
            })?
        };

        let opened = ready_rx.await.unwrap_or_else(|_| {
            Err(AudioError::WorkerError(
                "playback worker exited before opening the output device".to_string(),
            ))
        });
        if let Err(e) = opened {
            RunningDirection::new(stop, vec![playback_worker]).join().await;
            error!("Failed to start audio playback: {}", e);
            return Err(e);
        }

        self.playback = DirectionState::Running(RunningDirection::new(stop, vec![playback_worker]));
        info!("Audio playback system ready");
        Ok(())
    }

    /// Stop playback immediately, discarding any queued audio.
    pub async fn stop_playback(&mut self) {
        let Some(direction) = self.playback.take() else {
            return;
        };

        direction.signal_stop();
        let mut dropped = self.inbound.drain();
        direction.join().await;
        dropped += self.inbound.drain();

        if dropped > 0 {
            debug!("Discarded {} queued playback chunks", dropped);
        }
        info!("Stopped audio playback");
    }

    /// Queue decoded PCM for playback. Dropped unless playback is running.
    pub fn queue_audio(&self, pcm: Bytes) {
        if self.playback.is_running() {
            self.inbound.put(pcm);
        } else {
            trace!("Playback stopped, dropping {} bytes of audio", pcm.len());
        }
    }

    /// Stop both directions, release the backend and, if owned, the connection.
    pub async fn cleanup(&mut self) {
        self.stop_playback().await;
        self.stop_capture().await;

        if !self.terminated {
            self.backend.terminate();
            self.terminated = true;
        }

        if self.owns_connection && !self.sender.is_closed() {
            self.sender.close();
            debug!("Closed connection owned by audio processor");
        }

        info!("Audio processor cleaned up");
    }
}

impl Drop for AudioProcessor {
    fn drop(&mut self) {
        // Workers cannot be joined here; make sure they wind down on their own.
        for state in [&self.capture, &self.playback] {
            if let DirectionState::Running(direction) = state {
                direction.signal_stop();
                if let Some(forwarder) = &direction.forwarder {
                    forwarder.abort();
                }
            }
        }
    }
}

fn capture_loop(
    backend: Arc<dyn AudioBackend>,
    format: AudioFormat,
    stop: Arc<AtomicBool>,
    outbound: AudioQueue<String>,
    ready: oneshot::Sender<AudioResult<()>>,
) {
    let mut input = match backend.open_input(format) {
        Ok(input) => {
            let _ = ready.send(Ok(()));
            input
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while !stop.load(Ordering::Acquire) {
        match input.read_frame(POLL_INTERVAL) {
            Ok(Some(frame)) => {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                outbound.put(BASE64_STANDARD.encode(&frame));
            }
            Ok(None) => {}
            Err(e) => {
                if !stop.load(Ordering::Acquire) {
                    error!("Error in audio capture: {}", e);
                }
                break;
            }
        }
    }

    input.close();
    debug!("Audio capture loop exited");
}

fn send_loop(
    frames: mpsc::UnboundedSender<String>,
    stop: Arc<AtomicBool>,
    outbound: AudioQueue<String>,
) {
    while !stop.load(Ordering::Acquire) {
        let Some(audio) = outbound.poll() else {
            continue;
        };

        // Never blocks the thread; the forwarder applies connection backpressure.
        if frames.send(audio).is_err() {
            trace!("Audio forwarder gone, dropping captured frame");
        }
    }
    debug!("Audio send loop exited");
}

/// Send handed-off frames one at a time, in the order they were captured.
async fn forward_audio(sender: EventSender, mut frames: mpsc::UnboundedReceiver<String>) {
    while let Some(audio) = frames.recv().await {
        if let Err(e) = sender.append_audio(audio).await {
            if sender.is_closed() {
                debug!("Dropping audio after connection closed: {}", e);
                break;
            }
            error!("Error sending audio: {}", e);
        }
    }
    debug!("Audio forwarder exited");
}

fn playback_loop(
    backend: Arc<dyn AudioBackend>,
    format: AudioFormat,
    stop: Arc<AtomicBool>,
    inbound: AudioQueue<Bytes>,
    ready: oneshot::Sender<AudioResult<()>>,
) {
    let mut output = match backend.open_output(format) {
        Ok(output) => {
            let _ = ready.send(Ok(()));
            output
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while !stop.load(Ordering::Acquire) {
        let Some(chunk) = inbound.poll() else {
            continue;
        };
        if stop.load(Ordering::Acquire) {
            break;
        }
        if let Err(e) = output.write_frame(&chunk) {
            error!("Error in audio playback: {}", e);
            break;
        }
    }

    output.close();
    debug!("Audio playback loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::backend::{InputStream, OutputStream};
    use crate::core::realtime::{ClientEvent, EventSender};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct CountingBackend {
        inputs_opened: AtomicUsize,
        outputs_opened: AtomicUsize,
        terminated: AtomicUsize,
        fail_input: bool,
        written: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    struct SilentInput;

    impl InputStream for SilentInput {
        fn read_frame(&mut self, timeout: Duration) -> AudioResult<Option<Vec<u8>>> {
            thread::sleep(timeout.min(Duration::from_millis(5)));
            Ok(Some(vec![0u8; 16]))
        }
    }

    struct RecordingOutput {
        written: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl OutputStream for RecordingOutput {
        fn write_frame(&mut self, pcm: &[u8]) -> AudioResult<()> {
            self.written.lock().push(pcm.to_vec());
            Ok(())
        }
    }

    impl AudioBackend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        fn open_input(&self, _format: AudioFormat) -> AudioResult<Box<dyn InputStream>> {
            self.inputs_opened.fetch_add(1, Ordering::SeqCst);
            if self.fail_input {
                return Err(AudioError::DeviceUnavailable("no microphone".to_string()));
            }
            Ok(Box::new(SilentInput))
        }

        fn open_output(&self, _format: AudioFormat) -> AudioResult<Box<dyn OutputStream>> {
            self.outputs_opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(RecordingOutput {
                written: self.written.clone(),
            }))
        }

        fn terminate(&self) {
            self.terminated.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn processor(
        backend: Arc<CountingBackend>,
    ) -> (AudioProcessor, mpsc::Receiver<ClientEvent>, CancellationToken) {
        let (tx, rx) = mpsc::channel(1024);
        let closed = CancellationToken::new();
        let sender = EventSender::new(tx, closed.clone());
        (AudioProcessor::new(backend, sender, true), rx, closed)
    }

    #[tokio::test]
    async fn test_start_capture_is_idempotent() {
        let backend = Arc::new(CountingBackend::default());
        let (mut audio, _rx, _closed) = processor(backend.clone());

        audio.start_capture().await.unwrap();
        audio.start_capture().await.unwrap();
        assert!(audio.is_capturing());
        assert_eq!(backend.inputs_opened.load(Ordering::SeqCst), 1);

        audio.stop_capture().await;
        assert!(!audio.is_capturing());
        assert_eq!(audio.outbound_len(), 0);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let backend = Arc::new(CountingBackend::default());
        let (mut audio, _rx, _closed) = processor(backend.clone());

        audio.stop_capture().await;
        audio.stop_playback().await;
        assert!(!audio.is_capturing());
        assert!(!audio.is_playing());
        assert_eq!(backend.inputs_opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_capture_failure_leaves_capture_stopped() {
        let backend = Arc::new(CountingBackend {
            fail_input: true,
            ..Default::default()
        });
        let (mut audio, _rx, _closed) = processor(backend);

        let result = audio.start_capture().await;
        assert!(matches!(result, Err(AudioError::DeviceUnavailable(_))));
        assert!(!audio.is_capturing());
    }

    #[tokio::test]
    async fn test_captured_frames_are_sent_as_base64() {
        let backend = Arc::new(CountingBackend::default());
        let (mut audio, mut rx, _closed) = processor(backend);

        audio.start_capture().await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        audio.stop_capture().await;

        match event {
            ClientEvent::InputAudioBufferAppend { audio } => {
                assert_eq!(BASE64_STANDARD.decode(audio).unwrap(), vec![0u8; 16]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_queue_audio_requires_playback() {
        let backend = Arc::new(CountingBackend::default());
        let (mut audio, _rx, _closed) = processor(backend.clone());

        audio.queue_audio(Bytes::from_static(&[1, 2]));
        assert_eq!(audio.inbound_len(), 0);

        audio.start_playback().await.unwrap();
        audio.queue_audio(Bytes::from_static(&[1, 2]));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while backend.written.lock().is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(backend.written.lock().as_slice(), &[vec![1u8, 2]]);

        audio.stop_playback().await;
        assert!(!audio.is_playing());
    }

    #[tokio::test]
    async fn test_cleanup_stops_everything_and_closes_connection() {
        let backend = Arc::new(CountingBackend::default());
        let (mut audio, _rx, closed) = processor(backend.clone());

        audio.start_capture().await.unwrap();
        audio.start_playback().await.unwrap();
        audio.cleanup().await;
        audio.cleanup().await;

        assert!(!audio.is_capturing());
        assert!(!audio.is_playing());
        assert_eq!(backend.terminated.load(Ordering::SeqCst), 1);
        assert!(closed.is_cancelled());
    }
}
