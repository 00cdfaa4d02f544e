use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hound::WavReader;
use tracing::info;

use super::pcm::{AudioFrame, PcmStream};
use super::{CaptureDevice, MediaStream};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split the file into consecutive frames of `frame_ms` each (last one may be short)
    pub fn frames(&self, frame_ms: u64) -> Vec<AudioFrame> {
        let per_frame = (self.sample_rate as u64 * self.channels as u64 * frame_ms / 1000).max(1);

        self.samples
            .chunks(per_frame as usize)
            .enumerate()
            .map(|(i, samples)| AudioFrame {
                samples: samples.to_vec(),
                sample_rate: self.sample_rate,
                channels: self.channels,
                timestamp_ms: i as u64 * frame_ms,
            })
            .collect()
    }
}

/// Capture device that replays a WAV file as a live source
///
/// Frames are fed in real time; the stream ends by itself at end of file,
/// which stops any session recording from it.
pub struct FileCaptureDevice {
    path: PathBuf,
    frame_ms: u64,
}

impl FileCaptureDevice {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            frame_ms: 100,
        }
    }
}

#[async_trait::async_trait]
impl CaptureDevice for FileCaptureDevice {
    async fn open_stream(&self) -> Result<Arc<dyn MediaStream>> {
        let audio = AudioFile::open(&self.path)?;
        let stream = PcmStream::new(audio.sample_rate, audio.channels);
        let frames = audio.frames(self.frame_ms);
        let frame_ms = self.frame_ms;

        let feeder = Arc::clone(&stream);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(frame_ms));
            for frame in frames {
                ticker.tick().await;
                if !feeder.push(frame) {
                    return;
                }
            }
            feeder.end();
        });

        Ok(stream)
    }

    fn name(&self) -> &str {
        "WAV file replay"
    }
}
