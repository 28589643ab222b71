//! Session client: owns the connection, the audio processor and the
//! function-call orchestrator, and runs the event loop that ties them together.
//!
//! Events are handled one at a time in delivery order. Nothing in the loop
//! waits on a function call: the orchestrator's waits surface as a deadline
//! branch of the loop's `select!`, and tool execution reports back through a
//! completion channel.

use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::base::{
    CallOutcomeCallback, RealtimeError, RealtimeErrorCallback, RealtimeResult, SessionState,
    TranscriptCallback, TranscriptResult, TranscriptRole,
};
use super::connection::{Connection, EventSender};
use super::messages::{InputAudioTranscription, ServerEvent, SessionConfig};
use super::orchestrator::{CallOutcome, FunctionCallOrchestrator};
use crate::config::AssistantConfig;
use crate::core::audio::{AudioBackend, AudioProcessor};
use crate::tools::ToolRegistry;

/// Audio format name used in both directions.
const PCM16: &str = "pcm16";

/// Voice assistant session over one realtime connection.
pub struct SessionClient {
    config: AssistantConfig,
    registry: Arc<ToolRegistry>,
    backend: Arc<dyn AudioBackend>,
    shutdown: CancellationToken,
    state_tx: watch::Sender<SessionState>,
    session_id: Option<String>,
    transcript_callback: Option<TranscriptCallback>,
    error_callback: Option<RealtimeErrorCallback>,
    call_outcome_callback: Option<CallOutcomeCallback>,
}

impl SessionClient {
    /// Create a client. The tool registry is fixed for the life of the session.
    pub fn new(config: AssistantConfig, registry: ToolRegistry, backend: Arc<dyn AudioBackend>) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Connecting);
        Self {
            config,
            registry: Arc::new(registry),
            backend,
            shutdown: CancellationToken::new(),
            state_tx,
            session_id: None,
            transcript_callback: None,
            error_callback: None,
            call_outcome_callback: None,
        }
    }

    /// Token that ends the session when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Observe state transitions.
    pub fn state_watch(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Session id assigned by the service once the session is ready.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn on_transcript(&mut self, callback: TranscriptCallback) {
        self.transcript_callback = Some(callback);
    }

    pub fn on_error(&mut self, callback: RealtimeErrorCallback) {
        self.error_callback = Some(callback);
    }

    pub fn on_call_outcome(&mut self, callback: CallOutcomeCallback) {
        self.call_outcome_callback = Some(callback);
    }

    /// Session configuration sent once after connecting.
    pub fn build_session_config(&self) -> SessionConfig {
        let tools = self.registry.declarations();
        SessionConfig {
            modalities: Some(vec!["text".to_string(), "audio".to_string()]),
            instructions: Some(self.config.instructions.clone()),
            voice: Some(self.config.voice.to_voice()),
            input_audio_format: Some(PCM16.to_string()),
            output_audio_format: Some(PCM16.to_string()),
            input_audio_transcription: self
                .config
                .transcription_model
                .clone()
                .map(|model| InputAudioTranscription { model }),
            turn_detection: Some(self.config.turn_detection.to_turn_detection()),
            tools: (!tools.is_empty()).then(|| tools.to_vec()),
            tool_choice: (!tools.is_empty()).then(|| "auto".to_string()),
            temperature: None,
        }
    }

    /// Connect and run until shutdown, connection loss or a fatal error.
    pub async fn run(self) -> RealtimeResult<()> {
        info!("Connecting to VoiceLive API with model {}", self.config.model);
        let connection = match Connection::connect(&self.config).await {
            Ok(connection) => connection,
            Err(e) => {
                error!("Connection error: {}", e);
                self.set_state(SessionState::Closed);
                return Err(e);
            }
        };
        self.run_with_connection(connection).await
    }

    /// Run the session over an already open connection.
    ///
    /// Audio cleanup and connection close happen on every exit path.
    pub async fn run_with_connection(mut self, mut connection: Connection) -> RealtimeResult<()> {
        let sender = connection.sender();

        self.set_state(SessionState::Configuring);
        info!(
            "Setting up voice conversation session with {} function tools",
            self.registry.declarations().len()
        );
        if let Err(e) = sender.update_session(self.build_session_config()).await {
            error!("Failed to send session configuration: {}", e);
            self.set_state(SessionState::Closing);
            connection.close().await;
            self.set_state(SessionState::Closed);
            return Err(e);
        }
        info!("Session configuration sent");

        let mut audio = AudioProcessor::new(self.backend.clone(), sender.clone(), true);
        if let Err(e) = audio.start_playback().await {
            warn!("Audio playback unavailable, continuing without output: {}", e);
        }

        let (mut orchestrator, mut completions) = FunctionCallOrchestrator::new(
            self.registry.clone(),
            sender.clone(),
            self.config.function_call_timeout,
        );

        let result = self
            .event_loop(&mut connection, &mut audio, &mut orchestrator, &mut completions)
            .await;

        self.set_state(SessionState::Closing);
        orchestrator.abort();
        audio.cleanup().await;
        connection.close().await;
        self.set_state(SessionState::Closed);

        match &result {
            Ok(()) => info!("Session closed"),
            Err(e) => error!("Session ended with error: {}", e),
        }
        result
    }

    async fn event_loop(
        &mut self,
        connection: &mut Connection,
        audio: &mut AudioProcessor,
        orchestrator: &mut FunctionCallOrchestrator,
        completions: &mut mpsc::UnboundedReceiver<CallOutcome>,
    ) -> RealtimeResult<()> {
        let shutdown = self.shutdown.clone();
        let sender = connection.sender();

        loop {
            let deadline = orchestrator.deadline();

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Shutdown requested");
                    return Ok(());
                }

                // Ahead of connection events so a finished call clears before
                // the next function call item is looked at.
                Some(outcome) = completions.recv() => {
                    let outcome = orchestrator.on_completion(outcome);
                    self.report_outcome(outcome).await;
                }

                event = connection.next_event() => {
                    match event {
                        Some(Ok(event)) => {
                            self.handle_event(event, audio, orchestrator, &sender).await?;
                        }
                        Some(Err(e)) => {
                            error!("Connection error: {}", e);
                            return Err(e);
                        }
                        None => {
                            info!("Connection closed");
                            return Ok(());
                        }
                    }
                }

                _ = wait_until(deadline) => {
                    if let Some(outcome) = orchestrator.on_deadline(Instant::now()) {
                        self.report_outcome(outcome).await;
                    }
                }
            }
        }
    }

    async fn handle_event(
        &mut self,
        event: ServerEvent,
        audio: &mut AudioProcessor,
        orchestrator: &mut FunctionCallOrchestrator,
        sender: &EventSender,
    ) -> RealtimeResult<()> {
        match event {
            ServerEvent::SessionCreated { session } => {
                debug!("Session created: {}", session.id);
            }

            ServerEvent::SessionUpdated { session } => {
                if self.state() != SessionState::Configuring {
                    debug!("Session updated: {}", session.id);
                    return Ok(());
                }

                info!("Session ready: {}", session.id);
                self.session_id = Some(session.id);
                self.set_state(SessionState::Ready);

                // Capture only ever starts once the service has accepted the session.
                audio.start_capture().await?;
                info!("Ready for voice input");
            }

            ServerEvent::SpeechStarted { audio_start_ms, .. } => {
                info!("User started speaking at {}ms - stopping playback", audio_start_ms);
                audio.stop_playback().await;

                if let Err(e) = sender.cancel_response().await {
                    debug!("No response to cancel: {}", e);
                }
                if self.state().is_live() {
                    self.set_state(SessionState::Interrupted);
                }
            }

            ServerEvent::SpeechStopped { audio_end_ms, .. } => {
                info!("User stopped speaking at {}ms", audio_end_ms);
                if let Err(e) = audio.start_playback().await {
                    warn!("Failed to restart audio playback: {}", e);
                }
                if self.state().is_live() {
                    self.set_state(SessionState::Streaming);
                }
            }

            ServerEvent::ResponseCreated { response } => {
                info!("Assistant response created: {}", response.id);
                if self.state() == SessionState::Ready {
                    self.set_state(SessionState::Streaming);
                }
            }

            ServerEvent::TextDelta { delta, .. } => {
                info!("Text response: {}", delta);
            }

            ServerEvent::AudioDelta { delta, .. } => {
                match ServerEvent::decode_audio_delta(&delta) {
                    Ok(pcm) => audio.queue_audio(Bytes::from(pcm)),
                    Err(e) => warn!("Failed to decode audio delta: {}", e),
                }
            }

            ServerEvent::AudioDone { .. } => {
                info!("Assistant finished speaking");
            }

            ServerEvent::ResponseDone { response } => {
                info!(
                    "Response complete: {} ({})",
                    response.id,
                    response.status.as_deref().unwrap_or("unknown")
                );
                if let Some(outcome) = orchestrator.on_response_done() {
                    self.report_outcome(outcome).await;
                }
            }

            ServerEvent::Error { error } => {
                error!("VoiceLive error: {} - {}", error.error_type, error.message);
                if let Some(cb) = &self.error_callback {
                    let err = RealtimeError::ProviderError(format!(
                        "{}: {}",
                        error.error_type, error.message
                    ));
                    cb(err).await;
                }
            }

            ServerEvent::ConversationItemCreated { item, .. } => {
                debug!(
                    "Conversation item created: {} ({})",
                    item.id.as_deref().unwrap_or("-"),
                    item.item_type
                );
                if item.is_function_call() {
                    if let Some(outcome) = orchestrator.begin(&item) {
                        self.report_outcome(outcome).await;
                    }
                }
            }

            ServerEvent::FunctionCallArgumentsDone {
                call_id, arguments, ..
            } => {
                if let Some(outcome) = orchestrator.on_arguments_done(&call_id, &arguments) {
                    self.report_outcome(outcome).await;
                }
            }

            ServerEvent::FunctionCallArgumentsDelta { call_id, delta } => {
                trace!("Arguments delta for {}: {}", call_id, delta);
            }

            ServerEvent::TranscriptionCompleted {
                item_id,
                transcript,
            } => {
                info!("User said: {}", transcript);
                self.emit_transcript(TranscriptRole::User, transcript, item_id)
                    .await;
            }

            ServerEvent::TranscriptionFailed { item_id, error } => {
                warn!("Transcription failed for {}: {}", item_id, error.message);
            }

            ServerEvent::AudioTranscriptDone {
                item_id,
                transcript,
            } => {
                info!("Assistant said: {}", transcript);
                self.emit_transcript(TranscriptRole::Assistant, transcript, item_id)
                    .await;
            }

            other => {
                trace!("Unhandled event: {}", other.kind());
            }
        }

        Ok(())
    }

    async fn emit_transcript(&self, role: TranscriptRole, text: String, item_id: String) {
        if let Some(cb) = &self.transcript_callback {
            cb(TranscriptResult {
                role,
                text,
                item_id,
            })
            .await;
        }
    }

    async fn report_outcome(&self, outcome: CallOutcome) {
        if let Some(cb) = &self.call_outcome_callback {
            cb(outcome).await;
        }
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!("Session state: {} -> {}", previous, state);
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
