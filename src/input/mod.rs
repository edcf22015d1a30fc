//! Turns the request's image reference into a file the engine can read.
//!
//! Three sources are supported: an HTTP(S) URL that is downloaded, a local
//! path that is copied, and a base64 payload (optionally a data URI) that is
//! decoded. Each call writes exactly one file through the [`InputStore`] and
//! returns its bare filename.
pub mod store;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, Url};

use crate::error::{AppResult, GenerationError};
use crate::request::ImageSource;

pub use store::{DirInputStore, InputStore, MemoryInputStore};

const DEFAULT_EXTENSION: &str = ".jpg";

/// A filename present in the engine's input area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub filename: String,
}

pub struct InputResolver {
    client: Client,
    store: Arc<dyn InputStore>,
}

impl InputResolver {
    pub fn new(store: Arc<dyn InputStore>, download_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(download_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        InputResolver { client, store }
    }

    pub async fn resolve(&self, source: &ImageSource) -> AppResult<ResolvedImage> {
        let (extension, bytes) = match source {
            ImageSource::Url(url) => self.download(url).await?,
            ImageSource::Path(path) => read_local(path).await?,
            ImageSource::Base64(payload) => (DEFAULT_EXTENSION.to_string(), decode_base64(payload)?),
        };

        let filename = self
            .store
            .write_unique(&extension, &bytes)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to store input image");
                GenerationError::input("failed to store image")
            })?;
        tracing::info!(%filename, size = bytes.len(), "Resolved input image");
        Ok(ResolvedImage { filename })
    }

    async fn download(&self, url: &str) -> AppResult<(String, Vec<u8>)> {
        tracing::info!(%url, "Downloading input image");
        let failed = |e: reqwest::Error| {
            tracing::warn!(%url, error = %e, "Image download failed");
            GenerationError::input("download failed")
        };
        let response = self.client.get(url).send().await.map_err(failed)?;
        let response = response.error_for_status().map_err(failed)?;
        let bytes = response.bytes().await.map_err(failed)?;
        Ok((extension_from_url(url), bytes.to_vec()))
    }
}

async fn read_local(path: &Path) -> AppResult<(String, Vec<u8>)> {
    tracing::info!(path = %path.display(), "Copying local input image");
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        tracing::warn!(path = %path.display(), error = %e, "Cannot read input image");
        if e.kind() == std::io::ErrorKind::NotFound {
            GenerationError::input("file not found")
        } else {
            GenerationError::input("file not readable")
        }
    })?;
    Ok((extension_from_path(path), bytes))
}

/// Decode a raw or data-URI base64 payload.
pub fn decode_base64(payload: &str) -> AppResult<Vec<u8>> {
    let payload = payload.trim();
    let body = if payload.starts_with("data:") {
        match payload.split_once(',') {
            Some((_, rest)) => rest,
            None => return Err(GenerationError::input("invalid base64 payload")),
        }
    } else {
        payload
    };

    match general_purpose::STANDARD.decode(body) {
        Ok(bytes) if !bytes.is_empty() => Ok(bytes),
        Ok(_) => Err(GenerationError::input("invalid base64 payload")),
        Err(e) => {
            tracing::warn!(error = %e, "Base64 decode failed");
            Err(GenerationError::input("invalid base64 payload"))
        }
    }
}

/// Extension of the URL's path component (with leading dot), or `.jpg`.
pub fn extension_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segs| segs.next_back().map(str::to_string))
        })
        .map(|last| extension_from_path(Path::new(&last)))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

fn extension_from_path(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(store: Arc<MemoryInputStore>) -> InputResolver {
        InputResolver::new(store, Duration::from_secs(5))
    }

    #[test]
    fn url_extension_is_preserved() {
        assert_eq!(extension_from_url("https://x/y.png"), ".png");
        assert_eq!(extension_from_url("https://x/dir/y.webp?sig=abc"), ".webp");
    }

    #[test]
    fn url_without_extension_defaults_to_jpg() {
        assert_eq!(extension_from_url("https://x/image"), ".jpg");
        assert_eq!(extension_from_url("https://x/"), ".jpg");
        assert_eq!(extension_from_url("not a url"), ".jpg");
    }

    #[test]
    fn data_uri_prefix_is_stripped() {
        let raw = general_purpose::STANDARD.encode(b"\x89PNG fake");
        let uri = format!("data:image/png;base64,{}", raw);
        assert_eq!(decode_base64(&uri).unwrap(), b"\x89PNG fake");
        assert_eq!(decode_base64(&raw).unwrap(), b"\x89PNG fake");
    }

    #[test]
    fn corrupted_character_is_rejected() {
        let mut raw = general_purpose::STANDARD.encode(b"hello world!");
        raw.replace_range(3..4, "!");
        let err = decode_base64(&format!("data:image/png;base64,{}", raw)).unwrap_err();
        assert_eq!(err, GenerationError::input("invalid base64 payload"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(
            decode_base64("not-base64!!").unwrap_err(),
            GenerationError::input("invalid base64 payload")
        );
    }

    #[tokio::test]
    async fn base64_is_written_as_jpeg() {
        let store = Arc::new(MemoryInputStore::new());
        let payload = format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(b"img"));
        let resolved = resolver(store.clone())
            .resolve(&ImageSource::Base64(payload))
            .await
            .unwrap();

        assert!(resolved.filename.ends_with(".jpg"));
        assert_eq!(store.get(&resolved.filename), Some(b"img".to_vec()));
    }

    #[tokio::test]
    async fn local_file_is_copied_with_its_extension() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("frame.png");
        std::fs::write(&src, b"pixels").unwrap();

        let store = Arc::new(MemoryInputStore::new());
        let resolved = resolver(store.clone())
            .resolve(&ImageSource::Path(src))
            .await
            .unwrap();

        assert!(resolved.filename.ends_with(".png"));
        assert!(!resolved.filename.contains('/'));
        assert_eq!(store.get(&resolved.filename), Some(b"pixels".to_vec()));
    }

    #[tokio::test]
    async fn missing_local_file_fails() {
        let store = Arc::new(MemoryInputStore::new());
        let err = resolver(store.clone())
            .resolve(&ImageSource::Path("/definitely/not/here.png".into()))
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::input("file not found"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unreachable_url_fails() {
        let store = Arc::new(MemoryInputStore::new());
        // Port 9 (discard) is closed on any sane test host.
        let err = resolver(store.clone())
            .resolve(&ImageSource::Url("http://127.0.0.1:9/a.png".into()))
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::input("download failed"));
        assert!(store.is_empty());
    }
}
