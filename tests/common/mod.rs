//! Shared test infrastructure
//!
//! - `MockBackend`: in-memory microphone and speaker with counters
//! - `ScriptedPeer`: the service side of a `Connection::from_parts` connection

// Not every test binary uses every helper
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use base64::prelude::*;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use voicelive_assistant::core::audio::{
    AudioBackend, AudioError, AudioFormat, AudioResult, InputStream, OutputStream,
};
use voicelive_assistant::core::realtime::{
    ClientEvent, Connection, EventSender, RealtimeResult, ServerEvent, WS_CHANNEL_CAPACITY,
};

/// How long helpers wait for something that should happen promptly.
pub const STEP_TIMEOUT: Duration = Duration::from_secs(3);

// =============================================================================
// Audio backend
// =============================================================================

#[derive(Default)]
struct BackendCounters {
    inputs_opened: AtomicUsize,
    outputs_opened: AtomicUsize,
    terminated: AtomicUsize,
}

/// Audio backend whose microphone emits a fixed frame on an interval and
/// whose speaker records every write.
pub struct MockBackend {
    counters: Arc<BackendCounters>,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    frame: Vec<u8>,
    frame_interval: Duration,
    write_delay: Duration,
    sequenced: bool,
    fail_input: bool,
    fail_output: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            counters: Arc::default(),
            written: Arc::default(),
            frame: vec![1, 0, 2, 0],
            frame_interval: Duration::from_millis(20),
            write_delay: Duration::ZERO,
            sequenced: false,
            fail_input: false,
            fail_output: false,
        }
    }

    /// Each speaker write takes `delay`, like a device buffer draining.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = delay;
        self
    }

    /// Each microphone frame is a little-endian `u32` counting up from zero,
    /// produced every `interval`.
    pub fn with_sequenced_frames(mut self, interval: Duration) -> Self {
        self.sequenced = true;
        self.frame_interval = interval;
        self
    }

    pub fn without_microphone(mut self) -> Self {
        self.fail_input = true;
        self
    }

    pub fn without_speaker(mut self) -> Self {
        self.fail_output = true;
        self
    }

    pub fn inputs_opened(&self) -> usize {
        self.counters.inputs_opened.load(Ordering::SeqCst)
    }

    pub fn outputs_opened(&self) -> usize {
        self.counters.outputs_opened.load(Ordering::SeqCst)
    }

    pub fn terminated(&self) -> usize {
        self.counters.terminated.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }

    pub fn written_count(&self) -> usize {
        self.written.lock().len()
    }
}

struct MockInput {
    frame: Vec<u8>,
    interval: Duration,
    sequence: Option<u32>,
}

impl InputStream for MockInput {
    fn read_frame(&mut self, timeout: Duration) -> AudioResult<Option<Vec<u8>>> {
        std::thread::sleep(self.interval.min(timeout));
        match self.sequence.as_mut() {
            Some(next) => {
                let frame = next.to_le_bytes().to_vec();
                *next += 1;
                Ok(Some(frame))
            }
            None => Ok(Some(self.frame.clone())),
        }
    }
}

struct MockOutput {
    written: Arc<Mutex<Vec<Vec<u8>>>>,
    delay: Duration,
}

impl OutputStream for MockOutput {
    fn write_frame(&mut self, pcm: &[u8]) -> AudioResult<()> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.written.lock().push(pcm.to_vec());
        Ok(())
    }
}

impl AudioBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn open_input(&self, _format: AudioFormat) -> AudioResult<Box<dyn InputStream>> {
        self.counters.inputs_opened.fetch_add(1, Ordering::SeqCst);
        if self.fail_input {
            return Err(AudioError::DeviceUnavailable("no microphone".to_string()));
        }
        Ok(Box::new(MockInput {
            frame: self.frame.clone(),
            interval: self.frame_interval,
            sequence: self.sequenced.then_some(0),
        }))
    }

    fn open_output(&self, _format: AudioFormat) -> AudioResult<Box<dyn OutputStream>> {
        self.counters.outputs_opened.fetch_add(1, Ordering::SeqCst);
        if self.fail_output {
            return Err(AudioError::DeviceUnavailable("no speaker".to_string()));
        }
        Ok(Box::new(MockOutput {
            written: self.written.clone(),
            delay: self.write_delay,
        }))
    }

    fn terminate(&self) {
        self.counters.terminated.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Scripted service peer
// =============================================================================

/// The service end of an in-memory connection.
///
/// Every client event is recorded; everything except audio appends is also
/// delivered in order through [`next_control`](Self::next_control).
pub struct ScriptedPeer {
    events: Option<mpsc::Sender<RealtimeResult<ServerEvent>>>,
    control: mpsc::UnboundedReceiver<ClientEvent>,
    log: Arc<Mutex<Vec<ClientEvent>>>,
    closed: CancellationToken,
}

/// A connection whose far side is driven by the returned peer.
pub fn scripted_connection() -> (Connection, ScriptedPeer) {
    let (client_tx, mut client_rx) = mpsc::channel::<ClientEvent>(WS_CHANNEL_CAPACITY);
    let (server_tx, server_rx) = mpsc::channel(WS_CHANNEL_CAPACITY);
    let (control_tx, control) = mpsc::unbounded_channel();
    let closed = CancellationToken::new();
    let log: Arc<Mutex<Vec<ClientEvent>>> = Arc::default();

    let recorder = log.clone();
    tokio::spawn(async move {
        while let Some(event) = client_rx.recv().await {
            if !matches!(event, ClientEvent::InputAudioBufferAppend { .. }) {
                let _ = control_tx.send(event.clone());
            }
            recorder.lock().push(event);
        }
    });

    let connection = Connection::from_parts(EventSender::new(client_tx, closed.clone()), server_rx);
    (
        connection,
        ScriptedPeer {
            events: Some(server_tx),
            control,
            log,
            closed,
        },
    )
}

impl ScriptedPeer {
    /// Deliver a server event written as its wire JSON.
    pub async fn push(&self, event: Value) {
        let event: ServerEvent = serde_json::from_value(event).expect("valid server event");
        self.events
            .as_ref()
            .expect("peer already hung up")
            .send(Ok(event))
            .await
            .expect("client stopped reading");
    }

    pub async fn session_updated(&self, id: &str) {
        self.push(serde_json::json!({"type": "session.updated", "session": {"id": id}}))
            .await;
    }

    pub async fn audio_delta(&self, pcm: &[u8]) {
        self.push(serde_json::json!({
            "type": "response.audio.delta",
            "item_id": "item_audio",
            "delta": BASE64_STANDARD.encode(pcm),
        }))
        .await;
    }

    pub async fn function_call(&self, item_id: &str, call_id: &str, name: &str) {
        self.push(serde_json::json!({
            "type": "conversation.item.created",
            "item": {"id": item_id, "type": "function_call", "call_id": call_id, "name": name},
        }))
        .await;
    }

    pub async fn arguments_done(&self, call_id: &str, arguments: &str) {
        self.push(serde_json::json!({
            "type": "response.function_call_arguments.done",
            "call_id": call_id,
            "arguments": arguments,
        }))
        .await;
    }

    pub async fn response_done(&self) {
        self.push(serde_json::json!({"type": "response.done", "response": {"id": "resp_1"}}))
            .await;
    }

    /// Next non-audio client event, failing the test if none arrives in time.
    pub async fn next_control(&mut self) -> ClientEvent {
        tokio::time::timeout(STEP_TIMEOUT, self.control.recv())
            .await
            .expect("timed out waiting for a client event")
            .expect("client event stream ended")
    }

    /// Next non-audio client event if one arrives within `wait`.
    pub async fn maybe_control(&mut self, wait: Duration) -> Option<ClientEvent> {
        tokio::time::timeout(wait, self.control.recv())
            .await
            .ok()
            .flatten()
    }

    pub fn audio_appends(&self) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|event| matches!(event, ClientEvent::InputAudioBufferAppend { .. }))
            .count()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.log.lock().iter().filter(|e| e.kind() == kind).count()
    }

    /// Whether the client closed its end.
    pub fn client_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// End the event stream, as if the socket dropped.
    pub fn hang_up(&mut self) {
        self.events = None;
    }
}

/// Poll `condition` until it holds or [`STEP_TIMEOUT`] elapses.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
