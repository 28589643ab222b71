pub mod audio;
pub mod realtime;

// Re-export commonly used types for convenience
pub use audio::{
    AudioBackend, AudioError, AudioFormat, AudioProcessor, AudioQueue, AudioResult, InputStream,
    OutputStream,
};

#[cfg(feature = "native-audio")]
pub use audio::CpalBackend;

pub use realtime::{
    CallOutcome, CallOutcomeCallback, Connection, EventSender, FunctionCallOrchestrator,
    RealtimeError, RealtimeErrorCallback, RealtimeResult, SessionClient, SessionState,
    TranscriptCallback, TranscriptResult, TranscriptRole,
};
