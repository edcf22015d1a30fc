//! Outbound contract: `{"video": ...}` or `{"error": ...}`.
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

use crate::artifact::ResultArtifact;
use crate::error::GenerationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerationResponse {
    Video { video: String },
    Error { error: String },
}

impl GenerationResponse {
    pub fn success(artifact: &ResultArtifact, data_uri: bool) -> Self {
        let encoded = general_purpose::STANDARD.encode(&artifact.bytes);
        let video = if data_uri {
            format!("data:{};base64,{}", artifact.mime, encoded)
        } else {
            encoded
        };
        GenerationResponse::Video { video }
    }

    /// Only the taxonomy message reaches the caller.
    pub fn failure(err: &GenerationError) -> Self {
        GenerationResponse::Error { error: err.to_string() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, GenerationResponse::Video { .. })
    }
}
