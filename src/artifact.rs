//! Reads the finished job's video from disk.
use std::path::{Path, PathBuf};

use crate::error::{AppResult, GenerationError};

/// Video bytes held in memory between retrieval and encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultArtifact {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// Pick the first output in lexicographic order and read it.
pub async fn retrieve(outputs: &[PathBuf]) -> AppResult<ResultArtifact> {
    let Some(path) = outputs.iter().min() else {
        tracing::error!("Job produced no video output");
        return Err(GenerationError::artifact("video not found"));
    };
    if outputs.len() > 1 {
        tracing::info!(count = outputs.len(), selected = %path.display(), "Multiple outputs, using first");
    }

    let bytes = tokio::fs::read(path).await.map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "Cannot read video output");
        GenerationError::artifact("video not found")
    })?;
    tracing::info!(path = %path.display(), size = bytes.len(), "Read video output");
    Ok(ResultArtifact { bytes, mime: mime_for(path) })
}

/// MIME type guessed from the file extension, octet-stream when unknown.
pub fn mime_for(path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}
