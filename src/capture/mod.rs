//! Capture device collaborators
//!
//! The controller only sees three seams:
//! - `CaptureDevice` hands out a live `MediaStream` when a session starts
//! - `MediaStream` builds `MediaRecorder`s bound to that stream and reports
//!   external termination (e.g. the user revoking the source)
//! - `MediaRecorder` delivers raw byte chunks into a `ChunkSink` while running
//!   and flushes its last chunk before `stop()` resolves

pub mod file;
pub mod pcm;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;

pub use file::{AudioFile, FileCaptureDevice};
pub use pcm::{AudioFrame, PcmStream};

/// Receives raw byte chunks from a running recorder.
pub type ChunkSink = mpsc::UnboundedSender<Vec<u8>>;

/// A recorder instance bound to one stream, used for exactly one segment.
#[async_trait::async_trait]
pub trait MediaRecorder: Send {
    /// Begin capturing; chunks are pushed into `sink` as they become available.
    fn start(&mut self, sink: ChunkSink) -> Result<()>;

    /// Stop capturing. Resolves once every chunk has been delivered to the sink.
    async fn stop(&mut self) -> Result<()>;
}

/// A continuous capture stream shared by consecutive recorders.
#[async_trait::async_trait]
pub trait MediaStream: Send + Sync {
    /// Whether the stream can still feed a new recorder.
    fn is_live(&self) -> bool;

    /// Construct a recorder bound to this stream. Not started yet.
    fn create_recorder(&self) -> Result<Box<dyn MediaRecorder>>;

    /// Resolves when the source terminates on its own.
    async fn ended(&self);

    /// Stop the underlying tracks and free device resources.
    fn release(&self);
}

/// Source of capture streams, asked once per session start.
#[async_trait::async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn open_stream(&self) -> Result<Arc<dyn MediaStream>>;

    /// Get device name for logging
    fn name(&self) -> &str;
}
