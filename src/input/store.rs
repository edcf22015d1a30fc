//! Storage for conditioning images the engine reads by bare filename.
//!
//! The engine's input directory is shared by every in-flight request, so
//! stores hand out names that cannot collide and never overwrite.
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

#[async_trait]
pub trait InputStore: Send + Sync {
    /// Write `bytes` under a fresh filename ending in `extension`
    /// (including the leading dot) and return that bare filename.
    async fn write_unique(&self, extension: &str, bytes: &[u8]) -> io::Result<String>;
}

fn unique_name(extension: &str) -> String {
    format!("task_{}_input{}", Uuid::new_v4(), extension)
}

/// The engine's input directory on local disk.
pub struct DirInputStore {
    root: PathBuf,
}

impl DirInputStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirInputStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl InputStore for DirInputStore {
    async fn write_unique(&self, extension: &str, bytes: &[u8]) -> io::Result<String> {
        tokio::fs::create_dir_all(&self.root).await?;
        let filename = unique_name(extension);
        let path = self.root.join(&filename);
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        fill(file, &path, bytes).await?;
        tracing::debug!(path = %path.display(), size = bytes.len(), "Stored input image");
        Ok(filename)
    }
}

/// Write `bytes` through `writer`. On failure the partial file at `path` is
/// removed so the input directory never holds truncated images.
async fn fill<W>(mut writer: W, path: &Path, bytes: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        writer.write_all(bytes).await?;
        writer.flush().await
    }
    .await;
    if let Err(e) = written {
        drop(writer);
        if let Err(rm) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %rm, "Failed to remove partial input image");
        }
        return Err(e);
    }
    Ok(())
}

/// In-process store, handy for tests and dry runs.
#[derive(Default)]
pub struct MemoryInputStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryInputStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, filename: &str) -> Option<Vec<u8>> {
        self.files.lock().ok()?.get(filename).cloned()
    }

    pub fn filenames(&self) -> Vec<String> {
        self.files
            .lock()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.files.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl InputStore for MemoryInputStore {
    async fn write_unique(&self, extension: &str, bytes: &[u8]) -> io::Result<String> {
        let filename = unique_name(extension);
        let mut files = self
            .files
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "input store poisoned"))?;
        files.insert(filename.clone(), bytes.to_vec());
        Ok(filename)
    }
}
