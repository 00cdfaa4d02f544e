// Scripted capture and storage fakes shared by the integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use meeting_recorder::{
    BlobStore, CaptureDevice, ChunkSink, MediaRecorder, MediaStream, MemoryBlobStore,
    MemoryMetadataStore, RecorderConfig, SessionController,
};
use tokio::sync::watch;

/// How the next recorders behave when asked to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBehavior {
    Flush,
    Fail,
    Hang,
}

#[derive(Default)]
struct Shared {
    current: Mutex<Option<(usize, ChunkSink)>>,
    behavior: Mutex<Option<StopBehavior>>,
    created: AtomicUsize,
}

/// A stream whose chunks are emitted by the test itself
pub struct ScriptedStream {
    shared: Arc<Shared>,
    live: AtomicBool,
    released: AtomicBool,
    ended: watch::Sender<bool>,
}

impl ScriptedStream {
    pub fn new() -> Arc<Self> {
        let (ended, _) = watch::channel(false);
        Arc::new(Self {
            shared: Arc::new(Shared::default()),
            live: AtomicBool::new(true),
            released: AtomicBool::new(false),
            ended,
        })
    }

    /// Deliver a chunk to the recorder currently running. False if none is.
    pub fn emit(&self, bytes: &[u8]) -> bool {
        let current = self.shared.current.lock().unwrap();
        match current.as_ref() {
            Some((_, sink)) => sink.send(bytes.to_vec()).is_ok(),
            None => false,
        }
    }

    pub fn set_stop_behavior(&self, behavior: StopBehavior) {
        *self.shared.behavior.lock().unwrap() = Some(behavior);
    }

    /// Terminate the source as if the user revoked it
    pub fn end(&self) {
        self.live.store(false, Ordering::SeqCst);
        self.ended.send_replace(true);
    }

    pub fn recorders_created(&self) -> usize {
        self.shared.created.load(Ordering::SeqCst)
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MediaStream for ScriptedStream {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn create_recorder(&self) -> Result<Box<dyn MediaRecorder>> {
        let id = self.shared.created.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(ScriptedRecorder {
            id,
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn ended(&self) {
        let mut rx = self.ended.subscribe();
        let _ = rx.wait_for(|ended| *ended).await;
    }

    // Stays live so the same device can serve the next session
    fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

struct ScriptedRecorder {
    id: usize,
    shared: Arc<Shared>,
}

#[async_trait::async_trait]
impl MediaRecorder for ScriptedRecorder {
    fn start(&mut self, sink: ChunkSink) -> Result<()> {
        *self.shared.current.lock().unwrap() = Some((self.id, sink));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let behavior = self
            .shared
            .behavior
            .lock()
            .unwrap()
            .unwrap_or(StopBehavior::Flush);

        if behavior == StopBehavior::Hang {
            std::future::pending::<()>().await;
        }

        {
            let mut current = self.shared.current.lock().unwrap();
            if matches!(current.as_ref(), Some((id, _)) if *id == self.id) {
                *current = None;
            }
        }

        if behavior == StopBehavior::Fail {
            bail!("encoder crashed");
        }
        Ok(())
    }
}

/// Hands out the same scripted stream, or refuses like a denied permission
pub struct ScriptedDevice {
    stream: Arc<ScriptedStream>,
    available: bool,
}

impl ScriptedDevice {
    pub fn new(stream: Arc<ScriptedStream>) -> Self {
        Self {
            stream,
            available: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            stream: ScriptedStream::new(),
            available: false,
        }
    }
}

#[async_trait::async_trait]
impl CaptureDevice for ScriptedDevice {
    async fn open_stream(&self) -> Result<Arc<dyn MediaStream>> {
        if !self.available {
            bail!("permission denied by user");
        }
        let stream: Arc<dyn MediaStream> = self.stream.clone();
        Ok(stream)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Blob store that rejects writes to matching paths a number of times
pub struct FlakyBlobStore {
    inner: MemoryBlobStore,
    fail_matching: Option<String>,
    failures_left: AtomicUsize,
    attempts: AtomicUsize,
}

impl FlakyBlobStore {
    pub fn reliable() -> Self {
        Self {
            inner: MemoryBlobStore::new(),
            fail_matching: None,
            failures_left: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn failing(pattern: &str, failures: usize) -> Self {
        Self {
            fail_matching: Some(pattern.to_string()),
            failures_left: AtomicUsize::new(failures),
            ..Self::reliable()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub async fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.get(path).await
    }

    pub async fn paths(&self) -> Vec<String> {
        self.inner.paths().await
    }
}

#[async_trait::async_trait]
impl BlobStore for FlakyBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(pattern) = &self.fail_matching {
            if path.contains(pattern.as_str()) {
                let left = self.failures_left.load(Ordering::SeqCst);
                if left > 0 {
                    self.failures_left.store(left - 1, Ordering::SeqCst);
                    bail!("network unreachable");
                }
            }
        }
        self.inner.put(path, bytes).await
    }
}

pub struct Harness {
    pub controller: SessionController,
    pub stream: Arc<ScriptedStream>,
    pub blobs: Arc<FlakyBlobStore>,
    pub metadata: Arc<MemoryMetadataStore>,
}

pub fn harness(blobs: FlakyBlobStore) -> Harness {
    harness_with(RecorderConfig::default(), blobs)
}

pub fn harness_with(config: RecorderConfig, blobs: FlakyBlobStore) -> Harness {
    let stream = ScriptedStream::new();
    let blobs = Arc::new(blobs);
    let metadata = Arc::new(MemoryMetadataStore::new());
    let controller = SessionController::new(
        config,
        Arc::new(ScriptedDevice::new(Arc::clone(&stream))),
        blobs.clone(),
        metadata.clone(),
    );

    Harness {
        controller,
        stream,
        blobs,
        metadata,
    }
}

/// Let spawned tasks run without crossing any retry or rotation deadline
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
