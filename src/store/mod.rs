//! Durable storage collaborators
//!
//! Segment payloads go to a `BlobStore`; segment rows, session status and
//! post-processing jobs go to a `MetadataStore`. Both are called through the
//! retry executor, so every operation must be safe to repeat.

mod fs;
mod memory;

pub use fs::FsBlobStore;
pub use memory::{MemoryBlobStore, MemoryMetadataStore};

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Object storage for segment payloads.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` at `path`. Re-putting identical bytes to the same path succeeds.
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()>;
}

/// Relational metadata for segments, sessions and downstream jobs.
#[async_trait::async_trait]
pub trait MetadataStore: Send + Sync {
    async fn insert_segment_record(&self, record: &SegmentRecord) -> Result<()>;

    async fn update_session_status(&self, update: &SessionStatusUpdate) -> Result<()>;

    async fn enqueue_post_processing_job(&self, job: &PostProcessingJob) -> Result<()>;
}

/// Storage outcome of one segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Uploaded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub meeting_id: String,
    pub session_id: String,
    pub part_number: u32,
    pub path: String,
    pub byte_size: u64,
    pub status: SegmentStatus,
}

/// Session-level status as persisted for the meeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Recording,
    Done,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatusUpdate {
    pub meeting_id: String,
    pub session_id: String,
    pub status: SessionStatus,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Downstream work run once a session has been stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostProcessingKind {
    /// Concatenate the stored parts into a single artifact
    Compile,
    /// Export the compiled artifact to downstream consumers
    Export,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostProcessingJob {
    pub meeting_id: String,
    pub session_id: String,
    pub storage_prefix: String,
    pub kind: PostProcessingKind,
}

const MAX_MEETING_ID_LEN: usize = 128;

/// Whether `meeting_id` is safe as a single path segment and NATS subject token
pub fn is_valid_meeting_id(meeting_id: &str) -> bool {
    !meeting_id.is_empty()
        && meeting_id.len() <= MAX_MEETING_ID_LEN
        && meeting_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Storage prefix shared by every part of a session
pub fn storage_prefix(meeting_id: &str, session_id: &str) -> String {
    format!("{}/{}/", meeting_id, session_id)
}

/// Deterministic, collision-free path of one part
pub fn segment_path(meeting_id: &str, session_id: &str, part_number: u32, extension: &str) -> String {
    format!(
        "{}part_{:06}.{}",
        storage_prefix(meeting_id, session_id),
        part_number,
        extension
    )
}
