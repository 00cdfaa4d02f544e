use std::sync::{Arc, Weak};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::barrier::{BarrierResolver, FinalizeBarrier};
use super::config::RecorderConfig;
use super::finalize::{FinalizationCoordinator, FinalizeContext};
use super::producer::{SegmentProducer, SegmentSink};
use super::queue::{UploadQueue, UploadTarget};
use super::state::{ControllerStatus, RecordingSession, SessionReport, SessionState};
use crate::capture::{CaptureDevice, MediaStream};
use crate::error::RecorderError;
use crate::retry::RetryPolicy;
use crate::store::{
    is_valid_meeting_id, BlobStore, MetadataStore, SessionStatus, SessionStatusUpdate,
};

/// Resources owned by the one active session
struct ActiveSession {
    session: RecordingSession,
    stream: Arc<dyn MediaStream>,
    producer: SegmentProducer,
    queue: UploadQueue,
    rotation_task: JoinHandle<()>,
    ended_task: JoinHandle<()>,
    /// Best-effort write of the `Recording` status
    start_status: Option<JoinHandle<()>>,
    barrier: Option<FinalizeBarrier>,
}

#[derive(Default)]
struct ControllerState {
    active: Option<ActiveSession>,
    last_report: Option<SessionReport>,
}

impl ControllerState {
    fn state(&self) -> SessionState {
        self.active
            .as_ref()
            .map(|active| active.session.state)
            .unwrap_or(SessionState::Idle)
    }
}

struct ControllerInner {
    config: RecorderConfig,
    device: Arc<dyn CaptureDevice>,
    blobs: Arc<dyn BlobStore>,
    metadata: Arc<dyn MetadataStore>,
    state: Mutex<ControllerState>,
}

/// Orchestrates one recording session at a time: start, timed rotation,
/// stop, and the finalize barrier that `stop()` waits on.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

impl SessionController {
    pub fn new(
        config: RecorderConfig,
        device: Arc<dyn CaptureDevice>,
        blobs: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                config,
                device,
                blobs,
                metadata,
                state: Mutex::new(ControllerState::default()),
            }),
        }
    }

    /// Start recording `meeting_id`. Returns the new session id.
    pub async fn start(&self, meeting_id: &str) -> Result<String, RecorderError> {
        if !is_valid_meeting_id(meeting_id) {
            warn!("Rejecting start for invalid meeting id {:?}", meeting_id);
            return Err(RecorderError::InvalidMeetingId(meeting_id.to_string()));
        }

        let mut state = self.inner.state.lock().await;
        if state.active.is_some() {
            warn!("Recording already active, refusing to start {}", meeting_id);
            return Err(RecorderError::AlreadyRecording);
        }

        info!(
            "Starting recording for meeting {} on {}",
            meeting_id,
            self.inner.device.name()
        );

        let stream = self
            .inner
            .device
            .open_stream()
            .await
            .map_err(|e| RecorderError::StreamUnavailable(format!("{:#}", e)))?;

        let session = RecordingSession::new(meeting_id);
        let config = &self.inner.config;

        let queue = UploadQueue::new(UploadTarget {
            meeting_id: session.meeting_id.clone(),
            session_id: session.session_id.clone(),
            extension: config.segment_extension.clone(),
            blobs: Arc::clone(&self.inner.blobs),
            metadata: Arc::clone(&self.inner.metadata),
            retry: config.retry_policy(),
        });

        let sink_queue = queue.clone();
        let sink: SegmentSink = Arc::new(move |segment| sink_queue.enqueue(segment));

        let producer = match SegmentProducer::start(Arc::clone(&stream), sink) {
            Ok(producer) => producer,
            Err(e) => {
                error!("Failed to begin capture: {}", e);
                stream.release();
                return Err(e);
            }
        };

        let start_status = tokio::spawn(record_session_start(
            Arc::clone(&self.inner.metadata),
            config.retry_policy(),
            session.clone(),
        ));

        let weak = Arc::downgrade(&self.inner);
        let rotation_task = tokio::spawn(rotation_loop(weak.clone(), config.rotation_interval));
        let ended_task = tokio::spawn(watch_stream_end(weak, Arc::clone(&stream)));

        let session_id = session.session_id.clone();
        info!(
            "Recording session {} started (rotation every {:?})",
            session_id, config.rotation_interval
        );

        state.active = Some(ActiveSession {
            session,
            stream,
            producer,
            queue,
            rotation_task,
            ended_task,
            start_status: Some(start_status),
            barrier: None,
        });

        Ok(session_id)
    }

    /// Stop the active session and wait until it is finalized.
    ///
    /// Concurrent calls share one finalization and receive the same report.
    /// Upload failures come back as a report in state `Error`, not as `Err`.
    pub async fn stop(&self) -> Result<SessionReport, RecorderError> {
        let barrier = {
            let mut state = self.inner.state.lock().await;
            let Some(active) = state.active.as_mut() else {
                return Err(RecorderError::NotRecording);
            };

            if let Some(barrier) = active.barrier.clone() {
                debug!("Stop already in flight, joining it");
                barrier
            } else {
                info!("Stop requested for session {}", active.session.session_id);
                active.session.state = SessionState::StopRequested;
                active.rotation_task.abort();

                let (barrier, resolver) = FinalizeBarrier::new();
                active.barrier = Some(barrier.clone());
                tokio::spawn(finalize_session(Arc::clone(&self.inner), resolver));
                barrier
            }
        };

        barrier.wait().await
    }

    /// Close the current segment and continue in a fresh one.
    ///
    /// Driven by the rotation timer; a no-op once a stop has been requested.
    pub async fn rotate(&self) {
        rotate_active(&self.inner).await;
    }

    pub async fn state(&self) -> SessionState {
        self.inner.state.lock().await.state()
    }

    pub async fn status(&self) -> ControllerStatus {
        let state = self.inner.state.lock().await;
        let (session, elapsed_secs) = match &state.active {
            Some(active) => {
                let mut session = active.session.clone();
                session.last_segment_number = active.producer.last_part_number().await;
                let elapsed = session.elapsed_secs();
                (Some(session), Some(elapsed))
            }
            None => (None, None),
        };

        ControllerStatus {
            state: state.state(),
            session,
            elapsed_secs,
            last_report: state.last_report.clone(),
        }
    }

}

/// Best-effort `Recording` status write, run outside the controller lock
async fn record_session_start(
    metadata: Arc<dyn MetadataStore>,
    retry: RetryPolicy,
    session: RecordingSession,
) {
    let update = SessionStatusUpdate {
        meeting_id: session.meeting_id.clone(),
        session_id: session.session_id.clone(),
        status: SessionStatus::Recording,
        duration_seconds: 0.0,
        error_message: None,
    };
    let metadata = &metadata;
    let update = &update;
    // Capture matters more than the status row; a failure here is only logged
    if let Err(e) = retry
        .run("session start status", || async move {
            metadata.update_session_status(update).await
        })
        .await
    {
        warn!(
            "Could not record start of session {}: {}",
            session.session_id, e
        );
    }
}

async fn rotate_active(inner: &ControllerInner) {
    let producer = {
        let state = inner.state.lock().await;
        match &state.active {
            Some(active) if !active.session.state.is_stopping() => {
                active.producer.clone()
            }
            _ => return,
        }
    };
    producer.rotate().await;
}

async fn rotation_loop(inner: Weak<ControllerInner>, period: std::time::Duration) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        rotate_active(&inner).await;
    }
}

/// External termination of the capture source goes through the normal stop path
async fn watch_stream_end(inner: Weak<ControllerInner>, stream: Arc<dyn MediaStream>) {
    stream.ended().await;
    let Some(inner) = inner.upgrade() else {
        return;
    };
    info!("Capture source ended, stopping session");
    let controller = SessionController { inner };
    match controller.stop().await {
        Ok(report) => debug!("Session {} stopped after source ended", report.session_id),
        Err(RecorderError::NotRecording) => {}
        Err(e) => error!("Stop after source end failed: {}", e),
    }
}

async fn finalize_session(inner: Arc<ControllerInner>, resolver: BarrierResolver) {
    let (producer, queue, start_status) = {
        let mut state = inner.state.lock().await;
        match state.active.as_mut() {
            Some(active) => (
                active.producer.clone(),
                active.queue.clone(),
                active.start_status.take(),
            ),
            None => {
                resolver.resolve(Err("no active session to finalize".to_string()));
                return;
            }
        }
    };

    let mut capture_faults = Vec::new();

    let fallback = inner.config.fallback_timeout;
    let closing = tokio::spawn({
        let producer = producer.clone();
        async move { producer.finish().await }
    });
    let abort = closing.abort_handle();
    match tokio::time::timeout(fallback, closing).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("Segment producer failed while stopping: {}", e);
            capture_faults.push(format!("segment producer failed while stopping: {}", e));
        }
        Err(_) => {
            abort.abort();
            producer.abandon().await;
            warn!(
                "Recorder did not quiesce within {}ms, finalizing anyway",
                fallback.as_millis()
            );
            capture_faults.push(format!(
                "recorder did not quiesce within {}ms; the last segment was abandoned",
                fallback.as_millis()
            ));
        }
    }
    capture_faults.extend(producer.faults().await);

    // The final status must land after the `Recording` one
    if let Some(start_status) = start_status {
        let _ = start_status.await;
    }

    let session = {
        let mut state = inner.state.lock().await;
        match state.active.as_mut() {
            Some(active) => {
                active.session.state = SessionState::Finalizing;
                active.session.last_segment_number = producer.last_part_number().await;
                active.session.clone()
            }
            None => {
                resolver.resolve(Err("session vanished during finalization".to_string()));
                return;
            }
        }
    };

    let coordinator = FinalizationCoordinator::new(
        Arc::clone(&inner.metadata),
        inner.config.retry_policy(),
        inner.config.post_processing.clone(),
    );
    let finalized = tokio::spawn(async move {
        coordinator
            .run(FinalizeContext {
                session,
                queue,
                capture_faults,
            })
            .await
    })
    .await;

    // Release capture resources whatever the outcome
    let mut state = inner.state.lock().await;
    if let Some(mut active) = state.active.take() {
        active.ended_task.abort();
        active.rotation_task.abort();
        active.stream.release();
        active.session.state = match &finalized {
            Ok(report) => report.state,
            Err(_) => SessionState::Error,
        };
        debug!(
            "Session {} released in state {:?}",
            active.session.session_id, active.session.state
        );
    }

    match finalized {
        Ok(report) => {
            state.last_report = Some(report.clone());
            drop(state);
            resolver.resolve(Ok(report));
        }
        Err(e) => {
            drop(state);
            error!("Finalization failed unexpectedly: {}", e);
            resolver.resolve(Err(format!("finalization task failed: {}", e)));
        }
    }
}
