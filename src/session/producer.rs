//! Segment production
//!
//! One recorder at a time is `Capturing` from the shared stream. Rotation
//! starts the successor before the old recorder is stopped, so closes run in
//! the background while capture continues. Closed segments are numbered in
//! the order they were opened. After a stop request the producer goes
//! `Closing → Quiescent` once every close has completed.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::capture::{MediaRecorder, MediaStream};
use crate::error::RecorderError;

/// One bounded slice of captured media
#[derive(Debug, Clone)]
pub struct Segment {
    /// 1-based, assigned in recording order
    pub part_number: u32,
    /// Written once at close time, never modified
    pub payload: Arc<[u8]>,
}

impl Segment {
    pub fn new(part_number: u32, payload: Vec<u8>) -> Self {
        Self {
            part_number,
            payload: payload.into(),
        }
    }

    pub fn byte_size(&self) -> u64 {
        self.payload.len() as u64
    }
}

/// Continuation invoked with every non-empty closed segment
pub type SegmentSink = Arc<dyn Fn(Segment) + Send + Sync>;

struct ActiveSegment {
    recorder: Box<dyn MediaRecorder>,
    chunks: mpsc::UnboundedReceiver<Vec<u8>>,
}

enum Phase {
    NoActiveSegment,
    Capturing(ActiveSegment),
    /// No recorder running, closes still in flight
    Closing,
    Quiescent,
}

struct ProducerState {
    phase: Phase,
    stop_requested: bool,
    abandoned: bool,
    last_part: u32,
    closes_in_flight: usize,
    /// Completion of the most recently spawned close
    last_close: Option<oneshot::Receiver<()>>,
    faults: Vec<String>,
}

struct ProducerInner {
    stream: Arc<dyn MediaStream>,
    sink: SegmentSink,
    state: Mutex<ProducerState>,
    quiesced: watch::Sender<bool>,
}

/// Turns a continuous capture stream into numbered, closed segments
#[derive(Clone)]
pub struct SegmentProducer {
    inner: Arc<ProducerInner>,
}

impl SegmentProducer {
    /// Bind to `stream` and begin capturing segment 1.
    pub fn start(stream: Arc<dyn MediaStream>, sink: SegmentSink) -> Result<Self, RecorderError> {
        let active = open_segment(stream.as_ref())?;
        let (quiesced, _) = watch::channel(false);

        info!("Segment producer started");

        Ok(Self {
            inner: Arc::new(ProducerInner {
                stream,
                sink,
                state: Mutex::new(ProducerState {
                    phase: Phase::Capturing(active),
                    stop_requested: false,
                    abandoned: false,
                    last_part: 0,
                    closes_in_flight: 0,
                    last_close: None,
                    faults: Vec::new(),
                }),
                quiesced,
            }),
        })
    }

    /// Start a fresh segment and close the current one behind it.
    ///
    /// Returns false when there was nothing to rotate (stopping, no active
    /// segment, or the source has ended and is about to stop the session).
    pub async fn rotate(&self) -> bool {
        let mut state = self.inner.state.lock().await;
        if state.stop_requested {
            return false;
        }
        if !self.inner.stream.is_live() {
            debug!("Capture source ended, skipping rotation");
            return false;
        }

        let previous = match std::mem::replace(&mut state.phase, Phase::Closing) {
            Phase::Capturing(active) => active,
            other => {
                state.phase = other;
                return false;
            }
        };

        info!("Rotating segment after part {}", state.last_part);

        // The successor is capturing before the old recorder is asked to stop
        match open_segment(self.inner.stream.as_ref()) {
            Ok(next) => state.phase = Phase::Capturing(next),
            Err(e) => {
                error!("Failed to open next segment: {}", e);
                state.faults.push(format!("failed to open next segment: {}", e));
            }
        }

        self.spawn_close(&mut state, previous);
        true
    }

    /// Request stop and wait until the capture side is fully quiesced.
    ///
    /// Every open segment is closed and handed to the sink before this resolves.
    pub async fn finish(&self) {
        let mut quiesced = self.inner.quiesced.subscribe();
        {
            let mut state = self.inner.state.lock().await;
            state.stop_requested = true;
            match std::mem::replace(&mut state.phase, Phase::Closing) {
                Phase::Capturing(active) => {
                    info!("Closing final segment");
                    self.spawn_close(&mut state, active);
                }
                Phase::Quiescent => state.phase = Phase::Quiescent,
                // In-flight closes see `stop_requested` and quiesce
                Phase::Closing | Phase::NoActiveSegment => {
                    if state.closes_in_flight == 0 {
                        self.quiesce(&mut state);
                    }
                }
            }
        }
        let _ = quiesced.wait_for(|quiesced| *quiesced).await;
    }

    /// Give up on in-flight closes. A close that completes later is discarded.
    pub async fn abandon(&self) {
        let mut state = self.inner.state.lock().await;
        state.stop_requested = true;
        state.abandoned = true;
        state.phase = Phase::Quiescent;
        self.inner.quiesced.send_replace(true);
    }

    pub async fn last_part_number(&self) -> u32 {
        self.inner.state.lock().await.last_part
    }

    /// Capture-side problems seen so far (recorder errors, failed reopen)
    pub async fn faults(&self) -> Vec<String> {
        self.inner.state.lock().await.faults.clone()
    }

    fn quiesce(&self, state: &mut ProducerState) {
        state.phase = Phase::Quiescent;
        self.inner.quiesced.send_replace(true);
        info!("Capture quiesced after {} parts", state.last_part);
    }

    fn spawn_close(&self, state: &mut ProducerState, active: ActiveSegment) {
        state.closes_in_flight += 1;
        let previous = state.last_close.take();
        let (done_tx, done_rx) = oneshot::channel();
        state.last_close = Some(done_rx);

        let producer = self.clone();
        tokio::spawn(async move {
            let ActiveSegment {
                mut recorder,
                mut chunks,
            } = active;

            // Isolated so a panicking recorder still reaches completion below
            let stopped = tokio::spawn(async move { recorder.stop().await }).await;
            let close_error = match stopped {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("recorder failed while closing: {:#}", e)),
                Err(e) => Some(format!("recorder panicked while closing: {}", e)),
            };

            let mut collected = Vec::new();
            while let Ok(chunk) = chunks.try_recv() {
                collected.push(chunk);
            }

            // Part numbers follow opening order even when closes overlap
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            producer.complete_close(collected, close_error).await;
            let _ = done_tx.send(());
        });
    }

    async fn complete_close(&self, chunks: Vec<Vec<u8>>, close_error: Option<String>) {
        let mut state = self.inner.state.lock().await;
        state.closes_in_flight = state.closes_in_flight.saturating_sub(1);
        let byte_size: usize = chunks.iter().map(Vec::len).sum();

        if state.abandoned {
            warn!(
                "Discarding {} bytes closed after the session was finalized",
                byte_size
            );
            return;
        }

        if let Some(message) = close_error {
            warn!("{}", message);
            state.faults.push(message);
        }

        if byte_size == 0 {
            info!("Discarding empty segment");
        } else {
            state.last_part += 1;
            let part_number = state.last_part;
            info!("Closed part {} ({} bytes)", part_number, byte_size);
            (self.inner.sink)(Segment::new(part_number, chunks.concat()));
        }

        if state.closes_in_flight > 0 {
            return;
        }
        if state.stop_requested {
            self.quiesce(&mut state);
        } else if matches!(state.phase, Phase::Closing) {
            debug!("No active segment after part {}", state.last_part);
            state.phase = Phase::NoActiveSegment;
        }
    }
}

fn open_segment(stream: &dyn MediaStream) -> Result<ActiveSegment, RecorderError> {
    if !stream.is_live() {
        return Err(RecorderError::StreamUnavailable(
            "capture stream is not live".to_string(),
        ));
    }

    let mut recorder = stream
        .create_recorder()
        .map_err(|e| RecorderError::Recorder(format!("{:#}", e)))?;
    let (sink, chunks) = mpsc::unbounded_channel();
    recorder
        .start(sink)
        .map_err(|e| RecorderError::Recorder(format!("{:#}", e)))?;

    Ok(ActiveSegment { recorder, chunks })
}
