//! Storage for downloaded video content.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::core::models::FetchedContent;
use crate::error::{GateError, Result};

/// Where finished videos are written.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist content for generation `id`. Returns its location.
    async fn put(&self, id: &str, content: &FetchedContent) -> Result<String>;

    /// Remove content at `location`. Missing content is not an error.
    async fn delete(&self, location: &str) -> Result<()>;
}

/// Files under one directory, named `<id>.<ext>`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    dir: PathBuf,
}

impl FsBlobStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str, content: &FetchedContent) -> Result<PathBuf> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(GateError::Storage(format!("refusing to store content under id '{id}'")));
        }
        Ok(self.dir.join(format!("{id}.{}", content.extension())))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, id: &str, content: &FetchedContent) -> Result<String> {
        let path = self.path_for(id, content)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write beside the target and rename so readers never see a partial file.
        let partial = path.with_extension("partial");
        let written = match tokio::fs::write(&partial, &content.bytes).await {
            Ok(()) => tokio::fs::rename(&partial, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %partial.display(), error = %cleanup, "could not remove partial video");
                }
            }
            return Err(e.into());
        }

        tracing::debug!(generation_id = id, path = %path.display(), bytes = content.bytes.len(), "stored video");
        Ok(path.display().to_string())
    }

    async fn delete(&self, location: &str) -> Result<()> {
        let path = Path::new(location);
        if !path.starts_with(&self.dir) {
            return Err(GateError::Storage(format!(
                "{location} is outside {}",
                self.dir.display()
            )));
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Content kept in memory, addressed as `memory://<id>`.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes stored at `location`.
    #[must_use]
    pub fn bytes(&self, location: &str) -> Option<Vec<u8>> {
        self.blobs.read().ok()?.get(location).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().map_or(0, |b| b.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, id: &str, content: &FetchedContent) -> Result<String> {
        let location = format!("memory://{id}");
        self.blobs
            .write()
            .map_err(|_| GateError::Storage("blob store lock poisoned".to_string()))?
            .insert(location.clone(), content.bytes.clone());
        Ok(location)
    }

    async fn delete(&self, location: &str) -> Result<()> {
        self.blobs
            .write()
            .map_err(|_| GateError::Storage("blob store lock poisoned".to_string()))?
            .remove(location);
        Ok(())
    }
}
