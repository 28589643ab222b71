//! Shared types for the realtime session layer.
//!
//! # Audio Format
//!
//! Audio crosses the connection as base64-encoded PCM 16-bit signed
//! little-endian at 24kHz.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use super::orchestrator::CallOutcome;
use crate::core::audio::AudioError;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during realtime operations.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the service failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Error event reported by the service
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Not connected
    #[error("Not connected")]
    NotConnected,

    /// Audio device failure that ends the session
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle of a session client.
///
/// `Connecting → Configuring → Ready → (Streaming ⇄ Interrupted) → Closing → Closed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Opening the connection
    #[default]
    Connecting,
    /// Session configuration sent, waiting for acknowledgement
    Configuring,
    /// Session acknowledged, capture running
    Ready,
    /// Assistant response in progress
    Streaming,
    /// User barged in over the assistant
    Interrupted,
    /// Cleaning up
    Closing,
    /// Fully shut down
    Closed,
}

impl SessionState {
    /// Whether capture may be running in this state.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            SessionState::Ready | SessionState::Streaming | SessionState::Interrupted
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Configuring => write!(f, "configuring"),
            SessionState::Ready => write!(f, "ready"),
            SessionState::Streaming => write!(f, "streaming"),
            SessionState::Interrupted => write!(f, "interrupted"),
            SessionState::Closing => write!(f, "closing"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

// =============================================================================
// Transcripts
// =============================================================================

/// Role of the speaker in a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptRole {
    /// User speech
    User,
    /// Assistant speech
    Assistant,
}

impl fmt::Display for TranscriptRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscriptRole::User => write!(f, "user"),
            TranscriptRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// A completed transcript of one side of the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub role: TranscriptRole,
    pub text: String,
    /// Conversation item the transcript belongs to
    pub item_id: String,
}

// =============================================================================
// Callback Types
// =============================================================================

/// Callback for completed transcripts.
pub type TranscriptCallback =
    Arc<dyn Fn(TranscriptResult) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback for errors surfaced by the session.
pub type RealtimeErrorCallback =
    Arc<dyn Fn(RealtimeError) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Callback for the outcome of every function call.
pub type CallOutcomeCallback =
    Arc<dyn Fn(CallOutcome) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

// =============================================================================
// Tests
// =============================================================================
