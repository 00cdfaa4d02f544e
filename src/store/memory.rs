use std::collections::BTreeMap;

use anyhow::{bail, Result};
use tokio::sync::Mutex;

use super::{
    BlobStore, MetadataStore, PostProcessingJob, SegmentRecord, SessionStatusUpdate,
};

/// In-process blob store, keyed by path
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.lock().await.get(path).cloned()
    }

    /// Stored paths in lexical (and therefore part) order
    pub async fn paths(&self) -> Vec<String> {
        self.blobs.lock().await.keys().cloned().collect()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let mut blobs = self.blobs.lock().await;
        match blobs.get(path) {
            Some(existing) if existing.as_slice() == bytes => Ok(()),
            Some(_) => bail!("Blob already exists with different content: {}", path),
            None => {
                blobs.insert(path.to_string(), bytes.to_vec());
                Ok(())
            }
        }
    }
}

/// In-process metadata store that keeps every write in arrival order
#[derive(Default)]
pub struct MemoryMetadataStore {
    segments: Mutex<Vec<SegmentRecord>>,
    statuses: Mutex<Vec<SessionStatusUpdate>>,
    jobs: Mutex<Vec<PostProcessingJob>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn segments(&self) -> Vec<SegmentRecord> {
        self.segments.lock().await.clone()
    }

    pub async fn statuses(&self) -> Vec<SessionStatusUpdate> {
        self.statuses.lock().await.clone()
    }

    pub async fn jobs(&self) -> Vec<PostProcessingJob> {
        self.jobs.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn insert_segment_record(&self, record: &SegmentRecord) -> Result<()> {
        let mut segments = self.segments.lock().await;
        // Retried inserts of the same row are absorbed
        if !segments.contains(record) {
            segments.push(record.clone());
        }
        Ok(())
    }

    async fn update_session_status(&self, update: &SessionStatusUpdate) -> Result<()> {
        self.statuses.lock().await.push(update.clone());
        Ok(())
    }

    async fn enqueue_post_processing_job(&self, job: &PostProcessingJob) -> Result<()> {
        self.jobs.lock().await.push(job.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SegmentStatus;

    #[tokio::test]
    async fn test_blob_put_is_idempotent_for_same_bytes() {
        let store = MemoryBlobStore::new();
        store.put("a/b/part_000001.webm", b"abc").await.unwrap();
        store.put("a/b/part_000001.webm", b"abc").await.unwrap();
        assert!(store.put("a/b/part_000001.webm", b"xyz").await.is_err());
        assert_eq!(store.get("a/b/part_000001.webm").await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_duplicate_segment_rows_are_absorbed() {
        let store = MemoryMetadataStore::new();
        let record = SegmentRecord {
            meeting_id: "m".to_string(),
            session_id: "s".to_string(),
            part_number: 1,
            path: "m/s/part_000001.webm".to_string(),
            byte_size: 3,
            status: SegmentStatus::Uploaded,
        };
        store.insert_segment_record(&record).await.unwrap();
        store.insert_segment_record(&record).await.unwrap();
        assert_eq!(store.segments().await.len(), 1);
    }
}
