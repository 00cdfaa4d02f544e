use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::queue::JobSnapshot;

/// Lifecycle of a recording session as seen by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Recording,
    StopRequested,
    Finalizing,
    Done,
    Error,
}

impl SessionState {
    /// A stop has been requested and finalization has not finished yet
    pub fn is_stopping(self) -> bool {
        matches!(self, SessionState::StopRequested | SessionState::Finalizing)
    }
}

/// One capture session for one meeting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingSession {
    /// Generated at start, never changes afterwards
    pub session_id: String,

    /// External meeting record this session belongs to
    pub meeting_id: String,

    /// When the recording started
    pub started_at: DateTime<Utc>,

    pub state: SessionState,

    /// Number of segments handed to the upload queue so far
    pub last_segment_number: u32,
}

impl RecordingSession {
    pub fn new(meeting_id: impl Into<String>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            meeting_id: meeting_id.into(),
            started_at: Utc::now(),
            state: SessionState::Recording,
            last_segment_number: 0,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        elapsed.num_milliseconds().max(0) as f64 / 1000.0
    }
}

/// Final outcome of a session, handed to every `stop()` caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub meeting_id: String,
    pub session_id: String,

    /// Either `Done` or `Error`
    pub state: SessionState,

    pub duration_secs: f64,

    /// Every enqueued part with its terminal status, in part order
    pub parts: Vec<JobSnapshot>,

    pub error_message: Option<String>,
}

impl SessionReport {
    pub fn is_success(&self) -> bool {
        self.state == SessionState::Done
    }
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub state: SessionState,

    /// Present while a session is active
    pub session: Option<RecordingSession>,

    /// Seconds since the active session started
    pub elapsed_secs: Option<f64>,

    /// Outcome of the most recently finalized session
    pub last_report: Option<SessionReport>,
}
