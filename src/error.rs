use thiserror::Error;

/// Errors surfaced by the recording session controller and its parts.
///
/// Only misuse (`AlreadyRecording`, `NotRecording`) and start-up failures
/// reach the caller of `start`/`stop`. Upload failures are folded into the
/// session outcome instead of being returned.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("a recording session is already active")]
    AlreadyRecording,

    #[error("no recording session is active")]
    NotRecording,

    #[error("invalid meeting id {0:?}: use 1-128 letters, digits, '-' or '_'")]
    InvalidMeetingId(String),

    #[error("capture stream unavailable: {0}")]
    StreamUnavailable(String),

    #[error("operation failed after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("recorder failure: {0}")]
    Recorder(String),

    #[error("unexpected finalize failure: {0}")]
    UnexpectedFinalizeFailure(String),
}
