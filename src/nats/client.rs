use anyhow::{Context, Result};
use async_nats::Client;
use tracing::{debug, info};

use super::messages::{MetadataEvent, MetadataMessage};
use crate::store::{MetadataStore, PostProcessingJob, SegmentRecord, SessionStatusUpdate};

pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    /// Publish a metadata message and wait for the server to acknowledge the flush
    pub async fn publish(&self, message: &MetadataMessage) -> Result<()> {
        let subject = message.subject();
        let payload = serde_json::to_vec(message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish metadata message")?;
        self.client
            .flush()
            .await
            .context("Failed to flush NATS connection")?;

        debug!("Published metadata message to {}", subject);

        Ok(())
    }
}

/// Metadata store backed by NATS subjects
///
/// Rows, status changes and jobs are published as JSON; a downstream service
/// persists them. Publishing is at-least-once under retry, so consumers must
/// treat repeated messages as the same row.
pub struct NatsMetadataStore {
    client: NatsClient,
}

impl NatsMetadataStore {
    pub fn new(client: NatsClient) -> Self {
        Self { client }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        Ok(Self::new(NatsClient::connect(url).await?))
    }
}

#[async_trait::async_trait]
impl MetadataStore for NatsMetadataStore {
    async fn insert_segment_record(&self, record: &SegmentRecord) -> Result<()> {
        self.client
            .publish(&MetadataMessage::new(MetadataEvent::SegmentRecorded(
                record.clone(),
            )))
            .await
    }

    async fn update_session_status(&self, update: &SessionStatusUpdate) -> Result<()> {
        self.client
            .publish(&MetadataMessage::new(MetadataEvent::SessionStatus(
                update.clone(),
            )))
            .await
    }

    async fn enqueue_post_processing_job(&self, job: &PostProcessingJob) -> Result<()> {
        self.client
            .publish(&MetadataMessage::new(MetadataEvent::PostProcessingJob(
                job.clone(),
            )))
            .await
    }
}
