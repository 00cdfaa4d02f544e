//! Serial upload queue
//!
//! Closed segments are appended without blocking. A single worker drains the
//! queue front to back, so parts reach the stores in part order. A job that
//! exhausts its retries is marked failed and the worker moves on.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::producer::Segment;
use crate::retry::RetryPolicy;
use crate::store::{segment_path, BlobStore, MetadataStore, SegmentRecord, SegmentStatus};

/// Upload job lifecycle: `Pending → Uploading → Stored | Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Uploading,
    Stored,
    Failed,
}

/// Observable state of one upload job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub part_number: u32,
    pub path: String,
    pub byte_size: u64,
    pub status: JobStatus,
    pub error: Option<String>,
}

/// Where a session's parts are stored
pub struct UploadTarget {
    pub meeting_id: String,
    pub session_id: String,
    pub extension: String,
    pub blobs: Arc<dyn BlobStore>,
    pub metadata: Arc<dyn MetadataStore>,
    pub retry: RetryPolicy,
}

struct UploadJob {
    segment: Segment,
    path: String,
    slot: usize,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<UploadJob>,
    worker_running: bool,
    ledger: Vec<JobSnapshot>,
}

struct QueueInner {
    target: Arc<UploadTarget>,
    state: Mutex<QueueState>,
    /// True when nothing is pending and no job is mid-upload
    idle: watch::Sender<bool>,
}

impl QueueInner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Single-consumer FIFO of segments waiting for durable storage
#[derive(Clone)]
pub struct UploadQueue {
    inner: Arc<QueueInner>,
}

impl UploadQueue {
    pub fn new(target: UploadTarget) -> Self {
        let (idle, _) = watch::channel(true);
        Self {
            inner: Arc::new(QueueInner {
                target: Arc::new(target),
                state: Mutex::new(QueueState::default()),
                idle,
            }),
        }
    }

    /// Append a segment. Never blocks; starts the worker if it is not running.
    pub fn enqueue(&self, segment: Segment) {
        let target = &self.inner.target;
        let path = segment_path(
            &target.meeting_id,
            &target.session_id,
            segment.part_number,
            &target.extension,
        );

        let mut state = self.inner.lock();
        let slot = state.ledger.len();
        state.ledger.push(JobSnapshot {
            part_number: segment.part_number,
            path: path.clone(),
            byte_size: segment.byte_size(),
            status: JobStatus::Pending,
            error: None,
        });
        info!(
            "Enqueued part {} ({} bytes) -> {}",
            segment.part_number,
            segment.byte_size(),
            path
        );
        state.pending.push_back(UploadJob {
            segment,
            path,
            slot,
        });
        self.inner.idle.send_replace(false);

        if !state.worker_running {
            state.worker_running = true;
            tokio::spawn(run_worker(Arc::clone(&self.inner)));
        }
    }

    /// Resolves once the queue is empty and no job is mid-upload.
    ///
    /// Resolves immediately when already idle.
    pub async fn drain(&self) {
        let mut idle = self.inner.idle.subscribe();
        // The current value is checked before waiting, so an exit that raced
        // the subscription is still observed.
        let _ = idle.wait_for(|idle| *idle).await;
    }

    pub fn is_idle(&self) -> bool {
        *self.inner.idle.borrow()
    }

    /// Every job enqueued so far, in part order
    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        self.inner.lock().ledger.clone()
    }

    pub fn failures(&self) -> Vec<JobSnapshot> {
        self.inner
            .lock()
            .ledger
            .iter()
            .filter(|job| job.status == JobStatus::Failed)
            .cloned()
            .collect()
    }
}

async fn run_worker(inner: Arc<QueueInner>) {
    debug!("Upload worker started");

    loop {
        let job = {
            let mut state = inner.lock();
            match state.pending.pop_front() {
                Some(job) => {
                    state.ledger[job.slot].status = JobStatus::Uploading;
                    job
                }
                None => {
                    state.worker_running = false;
                    inner.idle.send_replace(true);
                    debug!("Upload worker idle");
                    return;
                }
            }
        };

        let slot = job.slot;
        let part_number = job.segment.part_number;

        // Run each job in its own task so a panicking store cannot strand the queue
        let outcome = match tokio::spawn(upload(Arc::clone(&inner.target), job)).await {
            Ok(outcome) => outcome,
            Err(e) => Err(format!("upload task panicked: {}", e)),
        };

        let mut state = inner.lock();
        let entry = &mut state.ledger[slot];
        match outcome {
            Ok(()) => {
                entry.status = JobStatus::Stored;
                info!("Part {} stored at {}", part_number, entry.path);
            }
            Err(message) => {
                entry.status = JobStatus::Failed;
                error!("Part {} failed: {}", part_number, message);
                entry.error = Some(message);
            }
        }
    }
}

async fn upload(target: Arc<UploadTarget>, job: UploadJob) -> Result<(), String> {
    let part_number = job.segment.part_number;
    let blobs = &target.blobs;
    let metadata = &target.metadata;
    let path = job.path.as_str();
    let payload: &[u8] = &job.segment.payload;

    let mut record = SegmentRecord {
        meeting_id: target.meeting_id.clone(),
        session_id: target.session_id.clone(),
        part_number,
        path: job.path.clone(),
        byte_size: job.segment.byte_size(),
        status: SegmentStatus::Uploaded,
    };

    let stored = target
        .retry
        .run(&format!("upload of part {}", part_number), || async move {
            blobs.put(path, payload).await
        })
        .await;

    if let Err(e) = stored {
        record.status = SegmentStatus::Failed;
        let record = &record;
        let noted = target
            .retry
            .run(&format!("failure row for part {}", part_number), || async move {
                metadata.insert_segment_record(record).await
            })
            .await;
        if let Err(row_err) = noted {
            warn!(
                "Could not record failure of part {}: {}",
                part_number, row_err
            );
        }
        return Err(e.to_string());
    }

    let record = &record;
    target
        .retry
        .run(&format!("segment row for part {}", part_number), || async move {
            metadata.insert_segment_record(record).await
        })
        .await
        .map_err(|e| e.to_string())
}
