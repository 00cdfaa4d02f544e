use std::sync::Arc;

use tracing::{error, info, warn};

use super::queue::UploadQueue;
use super::state::{RecordingSession, SessionReport, SessionState};
use crate::retry::RetryPolicy;
use crate::store::{
    storage_prefix, MetadataStore, PostProcessingJob, PostProcessingKind, SessionStatus,
    SessionStatusUpdate,
};

/// Everything finalization needs from the stopped session
pub struct FinalizeContext {
    pub session: RecordingSession,
    pub queue: UploadQueue,
    /// Capture-side problems (recorder errors, missed quiescence)
    pub capture_faults: Vec<String>,
}

/// Settles a stopped session once capture has quiesced.
///
/// Every step runs even when an earlier one failed; failures turn the session
/// outcome into `Error` instead of aborting.
pub struct FinalizationCoordinator {
    metadata: Arc<dyn MetadataStore>,
    retry: RetryPolicy,
    post_processing: Vec<PostProcessingKind>,
}

impl FinalizationCoordinator {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        retry: RetryPolicy,
        post_processing: Vec<PostProcessingKind>,
    ) -> Self {
        Self {
            metadata,
            retry,
            post_processing,
        }
    }

    pub async fn run(&self, ctx: FinalizeContext) -> SessionReport {
        let FinalizeContext {
            session,
            queue,
            capture_faults,
        } = ctx;

        info!(
            "Finalizing session {} for meeting {}",
            session.session_id, session.meeting_id
        );

        if !queue.is_idle() {
            info!("Waiting for pending uploads of session {}", session.session_id);
        }
        queue.drain().await;

        let duration_secs = session.elapsed_secs();
        let parts = queue.snapshot();

        let mut problems = capture_faults;
        problems.extend(queue.failures().iter().map(|job| {
            format!(
                "part {} failed: {}",
                job.part_number,
                job.error.as_deref().unwrap_or("unknown error")
            )
        }));

        let outcome = if problems.is_empty() {
            self.complete(&session, duration_secs).await
        } else {
            Err(problems.join("; "))
        };

        let (state, error_message) = match outcome {
            Ok(()) => {
                info!(
                    "Session {} done: {} parts, {:.1}s",
                    session.session_id,
                    parts.len(),
                    duration_secs
                );
                (SessionState::Done, None)
            }
            Err(message) => {
                self.mark_error(&session, duration_secs, &message).await;
                (SessionState::Error, Some(message))
            }
        };

        SessionReport {
            meeting_id: session.meeting_id,
            session_id: session.session_id,
            state,
            duration_secs,
            parts,
            error_message,
        }
    }

    async fn complete(&self, session: &RecordingSession, duration_secs: f64) -> Result<(), String> {
        let update = SessionStatusUpdate {
            meeting_id: session.meeting_id.clone(),
            session_id: session.session_id.clone(),
            status: SessionStatus::Done,
            duration_seconds: duration_secs,
            error_message: None,
        };
        let metadata = &self.metadata;
        let update = &update;
        self.retry
            .run("session done status", || async move {
                metadata.update_session_status(update).await
            })
            .await
            .map_err(|e| format!("failed to record session status: {}", e))?;

        let prefix = storage_prefix(&session.meeting_id, &session.session_id);
        for &kind in &self.post_processing {
            let job = PostProcessingJob {
                meeting_id: session.meeting_id.clone(),
                session_id: session.session_id.clone(),
                storage_prefix: prefix.clone(),
                kind,
            };
            let job = &job;
            self.retry
                .run("post-processing job", || async move {
                    metadata.enqueue_post_processing_job(job).await
                })
                .await
                .map_err(|e| format!("failed to enqueue {:?} job: {}", kind, e))?;
            info!("Enqueued {:?} job for {}", kind, prefix);
        }

        Ok(())
    }

    async fn mark_error(&self, session: &RecordingSession, duration_secs: f64, message: &str) {
        warn!("Session {} ended with errors: {}", session.session_id, message);

        let update = SessionStatusUpdate {
            meeting_id: session.meeting_id.clone(),
            session_id: session.session_id.clone(),
            status: SessionStatus::Error,
            duration_seconds: duration_secs,
            error_message: Some(message.to_string()),
        };
        let metadata = &self.metadata;
        let update = &update;
        if let Err(e) = self
            .retry
            .run("session error status", || async move {
                metadata.update_session_status(update).await
            })
            .await
        {
            error!(
                "Could not record error status for session {}: {}",
                session.session_id, e
            );
        }
    }
}
