use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::BlobStore;

/// Blob store rooted in a local directory
///
/// Writes never overwrite: a part that already exists with identical bytes
/// counts as stored, anything else is a conflict.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            bail!("Invalid blob path: {}", path);
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create blob directory: {:?}", parent))?;
        }

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let existing = fs::read(&target)
                    .await
                    .with_context(|| format!("Failed to read existing blob: {:?}", target))?;
                if existing == bytes {
                    debug!("Blob {} already stored, skipping", path);
                    return Ok(());
                }
                bail!("Blob already exists with different content: {}", path);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create blob: {:?}", target))
            }
        };

        let written = async {
            file.write_all(bytes).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            // A torn write must not be mistaken for a stored part on retry
            let _ = fs::remove_file(&target).await;
            return Err(e).with_context(|| format!("Failed to write blob: {:?}", target));
        }

        Ok(())
    }
}
