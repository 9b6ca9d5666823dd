//! Blob storage collaborator for multipart file uploads and downloads.

use anyhow::{Context, Result};
use std::path::PathBuf;

pub trait BlobStore: Send + Sync {
    /// Persist `content` under `id`.
    fn save(&self, id: &str, content: &[u8]) -> Result<()>;

    /// Read a blob back, e.g. for file downloads.
    fn load(&self, id: &str) -> Result<Vec<u8>>;

    /// Delete a blob. Missing blobs are not an error.
    fn remove(&self, id: &str) -> Result<()>;
}

/// Blobs as plain files under a configured directory.
pub struct FileBlobStore {
    dir: PathBuf,
}

impl FileBlobStore {
    pub fn new(dir: &str) -> Self {
        Self { dir: PathBuf::from(dir) }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }
}

impl BlobStore for FileBlobStore {
    fn save(&self, id: &str, content: &[u8]) -> Result<()> {
        let path = self.path_for(id);
        std::fs::write(&path, content)
            .with_context(|| format!("cannot write blob {}", path.display()))
    }

    fn load(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.path_for(id);
        std::fs::read(&path).with_context(|| format!("cannot read blob {}", path.display()))
    }

    fn remove(&self, id: &str) -> Result<()> {
        let path = self.path_for(id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("cannot remove blob {}", path.display())),
        }
    }
}
