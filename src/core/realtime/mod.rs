//! Realtime session with the Voice Live service.
//!
//! This module owns the single WebSocket connection to the conversational
//! model, configures the remote session, and runs the event loop that routes
//! speech, audio and function-call events.
//!
//! # Architecture
//!
//! - [`Connection`] / [`EventSender`] - socket task and its single writer
//! - [`SessionClient`] - state machine and event loop
//! - [`FunctionCallOrchestrator`] - per-call tool invocation protocol
//! - Callback-based event surfacing for transcripts, errors and call outcomes
//!
//! # Audio Format
//!
//! PCM 16-bit signed little-endian at 24kHz, base64-encoded on the wire.
//!
//! # Example
//!
//! ```rust,ignore
//! use voicelive_assistant::{AssistantConfig, SessionClient, ToolRegistry};
//! use voicelive_assistant::core::audio::CpalBackend;
//! use std::sync::Arc;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let config = AssistantConfig::from_env().unwrap();
//!     let client = SessionClient::new(config, ToolRegistry::empty(), Arc::new(CpalBackend::new()));
//!     client.run().await.unwrap();
//! }
//! ```

mod base;
mod client;
mod connection;
pub mod messages;
mod orchestrator;

pub use base::{
    CallOutcomeCallback, RealtimeError, RealtimeErrorCallback, RealtimeResult, SessionState,
    TranscriptCallback, TranscriptResult, TranscriptRole,
};
pub use client::SessionClient;
pub use connection::{Connection, EventSender, WS_CHANNEL_CAPACITY};
pub use messages::{ClientEvent, ConversationItem, ServerEvent, SessionConfig, ToolDef};
pub use orchestrator::{CallOutcome, CallStage, FunctionCallOrchestrator, PendingFunctionCall};
