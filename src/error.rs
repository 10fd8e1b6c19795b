//! Structured error taxonomy for agent lifecycle and property operations.
//!
//! Mirrors the teacher's layered, contextual error style (see
//! `error_code` in the reference pack): every variant carries the fields
//! a caller needs to react, rather than an opaque message.

use thiserror::Error;

use crate::event::EventName;

/// Agent-lifecycle errors: configuration, communication, publication.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent in state {current_state:?} cannot {attempted_op}")]
    AgentState {
        current_state: &'static str,
        attempted_op: &'static str,
    },

    #[error("communication error: {message}")]
    AgentCommunication { message: String },

    #[error("configuration error: {message}")]
    AgentConfiguration { message: String },

    #[error("failed to publish field {field:?}: {message}")]
    Publication {
        message: String,
        field: EventName,
    },

    #[error("could not claim {length} bytes on stream {stream} after {max_attempts} attempts")]
    ClaimBuffer {
        stream: u32,
        length: usize,
        max_attempts: u32,
    },

    #[error("back-pressure on stream {stream} after {max_attempts} attempts")]
    PublicationBackPressure { stream: u32, max_attempts: u32 },

    #[error("publication failed on stream {stream} after {max_attempts} attempts")]
    PublicationFailure { stream: u32, max_attempts: u32 },

    #[error("stream {stream_name:?} (index {stream_index}) not found")]
    StreamNotFound {
        stream_name: &'static str,
        stream_index: usize,
    },

    #[error("communication not initialized for {op}")]
    CommunicationNotInitialized { op: &'static str },

    #[error("missing required environment variable {name}")]
    EnvironmentVariable { name: &'static str },

    #[error(transparent)]
    Property(#[from] PropertyError),

    #[error(transparent)]
    Timer(#[from] TimerError),
}

/// Property-store errors, surfaced to the caller through `Error` events.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PropertyError {
    #[error("property {0:?} not found")]
    PropertyNotFound(EventName),

    #[error("property {name:?} expected {expected}, got {actual}")]
    PropertyType {
        name: EventName,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("property {name:?} does not allow {mode}")]
    PropertyAccess {
        name: EventName,
        mode: &'static str,
    },

    #[error("property {name:?} failed validation: {message}")]
    PropertyValidation { name: EventName, message: String },
}

/// Timer-scheduler errors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TimerError {
    #[error("timer {0} not found")]
    TimerNotFound(u64),

    #[error("invalid timer: {0}")]
    InvalidTimer(String),

    #[error("could not schedule timer for {reason}, deadline {deadline_ns}")]
    TimerScheduling { reason: String, deadline_ns: i64 },
}

/// The sole control-flow signal that is allowed to unwind the duty-cycle
/// dispatcher. Deliberately *not* a variant of [`AgentError`] so that `?`
/// on ordinary errors can never accidentally terminate the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentTermination;

impl std::fmt::Display for AgentTermination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "agent termination requested")
    }
}

impl std::error::Error for AgentTermination {}

/// Outcome of a single HSM dispatch: either the event was handled (or
/// quietly dropped), or the agent must terminate.
pub type DispatchResult = Result<(), AgentTermination>;
