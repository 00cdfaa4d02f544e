pub mod capture;
pub mod config;
pub mod error;
pub mod http;
pub mod nats;
pub mod retry;
pub mod session;
pub mod store;

pub use capture::{
    AudioFile, AudioFrame, CaptureDevice, ChunkSink, FileCaptureDevice, MediaRecorder,
    MediaStream, PcmStream,
};
pub use config::Config;
pub use error::RecorderError;
pub use http::{create_router, AppState};
pub use nats::{MetadataMessage, NatsMetadataStore};
pub use retry::RetryPolicy;
pub use session::{
    RecorderConfig, RecordingSession, SessionController, SessionReport, SessionState,
};
pub use store::{BlobStore, FsBlobStore, MemoryBlobStore, MemoryMetadataStore, MetadataStore};
