//! Segmented recording sessions
//!
//! This module provides the `SessionController` that manages:
//! - Capture through a rotating recorder (`SegmentProducer`)
//! - Durable, ordered upload of every closed segment (`UploadQueue`)
//! - A single-shot finalize barrier that `stop()` resolves through
//! - Session outcome bookkeeping (`FinalizationCoordinator`)

mod barrier;
mod config;
mod controller;
mod finalize;
mod producer;
mod queue;
mod state;

pub use barrier::{BarrierResolver, FinalizeBarrier};
pub use config::RecorderConfig;
pub use controller::SessionController;
pub use finalize::{FinalizationCoordinator, FinalizeContext};
pub use producer::{Segment, SegmentProducer, SegmentSink};
pub use queue::{JobSnapshot, JobStatus, UploadQueue, UploadTarget};
pub use state::{ControllerStatus, RecordingSession, SessionReport, SessionState};
