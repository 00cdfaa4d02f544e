use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::session::RecorderConfig;
use crate::store::PostProcessingKind;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub recorder: RecorderSection,
    pub retry: RetrySection,
    pub storage: StorageConfig,
    #[serde(default)]
    pub nats: NatsConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct RecorderSection {
    pub rotation_interval_secs: u64,
    pub fallback_timeout_ms: u64,
    pub segment_extension: String,
    #[serde(default = "default_post_processing")]
    pub post_processing: Vec<PostProcessingKind>,
}

#[derive(Debug, Deserialize)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub blob_root: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct NatsConfig {
    /// Publish metadata to NATS when set; keep it in memory otherwise
    pub url: Option<String>,
}

fn default_post_processing() -> Vec<PostProcessingKind> {
    vec![PostProcessingKind::Compile]
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("MEETING_RECORDER").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    pub fn recorder_config(&self) -> Result<RecorderConfig> {
        let recorder = RecorderConfig {
            rotation_interval: Duration::from_secs(self.recorder.rotation_interval_secs),
            fallback_timeout: Duration::from_millis(self.recorder.fallback_timeout_ms),
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            segment_extension: self.recorder.segment_extension.clone(),
            post_processing: self.recorder.post_processing.clone(),
        };
        recorder
            .validate()
            .context("Invalid [recorder] or [retry] configuration")?;
        Ok(recorder)
    }
}
