use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ChunkSink, MediaRecorder, MediaStream};

/// Frames buffered per recorder before it starts lagging
const FRAME_BUFFER: usize = 1024;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// A frame tagged with its position in the stream
#[derive(Debug, Clone)]
struct Sequenced {
    seq: u64,
    frame: AudioFrame,
}

#[derive(Default)]
struct Feed {
    next_seq: u64,
    /// Cutoff slot of the most recently created recorder
    latest: Option<Arc<OnceLock<u64>>>,
}

/// Live PCM capture stream
///
/// Frames pushed into the stream fan out to every recorder bound to it, so a
/// closing recorder and its successor overlap during rotation. Each frame
/// still belongs to exactly one of them: creating a recorder hands every
/// later frame to it and caps its predecessor at that point.
pub struct PcmStream {
    sample_rate: u32,
    channels: u16,
    frames: broadcast::Sender<Sequenced>,
    feed: Mutex<Feed>,
    live: AtomicBool,
    ended: watch::Sender<bool>,
}

impl PcmStream {
    pub fn new(sample_rate: u32, channels: u16) -> Arc<Self> {
        let (frames, _) = broadcast::channel(FRAME_BUFFER);
        let (ended, _) = watch::channel(false);

        Arc::new(Self {
            sample_rate,
            channels,
            frames,
            feed: Mutex::new(Feed::default()),
            live: AtomicBool::new(true),
            ended,
        })
    }

    /// Feed a captured frame. Returns false once the stream has ended.
    pub fn push(&self, frame: AudioFrame) -> bool {
        if !self.is_live() {
            return false;
        }
        let mut feed = self.feed();
        let seq = feed.next_seq;
        feed.next_seq += 1;
        // No recorder attached is not an error; the frame is simply not captured.
        let _ = self.frames.send(Sequenced { seq, frame });
        true
    }

    fn feed(&self) -> MutexGuard<'_, Feed> {
        self.feed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Signal that the source terminated on its own.
    pub fn end(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            info!("PCM capture stream ended");
        }
        self.ended.send_replace(true);
    }

    fn wav_spec(&self) -> hound::WavSpec {
        hound::WavSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }
}

#[async_trait::async_trait]
impl MediaStream for PcmStream {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn create_recorder(&self) -> Result<Box<dyn MediaRecorder>> {
        if !self.is_live() {
            bail!("PCM stream has ended");
        }

        let mut feed = self.feed();
        let frames = self.frames.subscribe();
        let cutoff = Arc::new(OnceLock::new());
        if let Some(previous) = feed.latest.replace(Arc::clone(&cutoff)) {
            let _ = previous.set(feed.next_seq);
        }
        debug!("WAV recorder takes over at frame {}", feed.next_seq);

        Ok(Box::new(WavRecorder::new(frames, cutoff, self.wav_spec())))
    }

    async fn ended(&self) {
        let mut rx = self.ended.subscribe();
        let _ = rx.wait_for(|ended| *ended).await;
    }

    fn release(&self) {
        self.live.store(false, Ordering::SeqCst);
        self.ended.send_replace(true);
        debug!("PCM capture stream released");
    }
}

/// Recorder that buffers PCM frames and emits one WAV blob when stopped
struct WavRecorder {
    frames: Option<broadcast::Receiver<Sequenced>>,
    /// First frame owned by the successor, once one exists
    cutoff: Arc<OnceLock<u64>>,
    spec: hound::WavSpec,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<()>>>,
}

impl WavRecorder {
    fn new(
        frames: broadcast::Receiver<Sequenced>,
        cutoff: Arc<OnceLock<u64>>,
        spec: hound::WavSpec,
    ) -> Self {
        Self {
            frames: Some(frames),
            cutoff,
            spec,
            stop_tx: None,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl MediaRecorder for WavRecorder {
    fn start(&mut self, sink: ChunkSink) -> Result<()> {
        let Some(mut frames) = self.frames.take() else {
            bail!("Recorder already started");
        };

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let spec = self.spec;
        let cutoff = Arc::clone(&self.cutoff);
        let owned = move |seq: u64| cutoff.get().map_or(true, |&end| seq < end);

        let task = tokio::spawn(async move {
            let mut samples: Vec<i16> = Vec::new();

            loop {
                let received = tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    received = frames.recv() => received,
                };

                match received {
                    Ok(item) if owned(item.seq) => {
                        samples.extend_from_slice(&item.frame.samples)
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("WAV recorder lagged, {} frames skipped", skipped);
                    }
                    Err(RecvError::Closed) => {
                        let _ = (&mut stop_rx).await;
                        break;
                    }
                }
            }

            // Frames already queued before the stop request still belong here
            loop {
                match frames.try_recv() {
                    Ok(item) if owned(item.seq) => {
                        samples.extend_from_slice(&item.frame.samples)
                    }
                    Ok(_) => {}
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }

            if samples.is_empty() {
                return Ok(());
            }

            let bytes = encode_wav(&samples, spec)?;
            if sink.send(bytes).is_err() {
                warn!("Chunk sink closed before final WAV chunk was delivered");
            }
            Ok(())
        });

        self.stop_tx = Some(stop_tx);
        self.task = Some(task);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        match self.task.take() {
            Some(task) => task.await.context("WAV recorder task panicked")?,
            None => Ok(()),
        }
    }
}

fn encode_wav(samples: &[i16], spec: hound::WavSpec) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).context("Failed to create WAV writer")?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .context("Failed to write sample to WAV")?;
        }
        writer
            .finalize()
            .context("Failed to finalize WAV segment")?;
    }
    Ok(cursor.into_inner())
}
