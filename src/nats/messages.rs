use serde::{Deserialize, Serialize};

use crate::store::{PostProcessingJob, PostProcessingKind, SegmentRecord, SessionStatusUpdate};

/// Metadata change published to NATS for the downstream persister
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MetadataEvent {
    SegmentRecorded(SegmentRecord),
    SessionStatus(SessionStatusUpdate),
    PostProcessingJob(PostProcessingJob),
}

/// Envelope carried on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataMessage {
    pub timestamp: String, // RFC3339 timestamp
    pub event: MetadataEvent,
}

impl MetadataMessage {
    pub fn new(event: MetadataEvent) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            event,
        }
    }

    /// Subject the message is published on
    pub fn subject(&self) -> String {
        match &self.event {
            MetadataEvent::SegmentRecorded(record) => {
                format!("recording.segment.{}", record.meeting_id)
            }
            MetadataEvent::SessionStatus(update) => {
                format!("recording.session.{}", update.meeting_id)
            }
            MetadataEvent::PostProcessingJob(job) => {
                let kind = match job.kind {
                    PostProcessingKind::Compile => "compile",
                    PostProcessingKind::Export => "export",
                };
                format!("recording.jobs.{}", kind)
            }
        }
    }
}
