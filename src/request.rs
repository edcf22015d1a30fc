//! Inbound request types.
//!
//! `GenerationInput` mirrors the wire format of the `input` object.
//! `GenerationRequest` is the validated, read-only value the pipeline works
//! with. Conversion checks everything that can be checked without touching
//! the network or the filesystem.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

pub const DEFAULT_LENGTH: u32 = 81;
pub const DEFAULT_STEPS: u32 = 10;

/// Envelope around the request body: `{"input": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RunEnvelope {
    pub input: GenerationInput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
    pub prompt: String,
    pub seed: u64,
    pub cfg: f64,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_length")]
    pub length: u32,
    #[serde(default = "default_steps")]
    pub steps: u32,
    #[serde(default)]
    pub lora_pairs: Vec<AdapterPair>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterPair {
    pub high: String,
    pub low: String,
    #[serde(default = "default_weight")]
    pub high_weight: f64,
    #[serde(default = "default_weight")]
    pub low_weight: f64,
}

fn default_length() -> u32 {
    DEFAULT_LENGTH
}

fn default_steps() -> u32 {
    DEFAULT_STEPS
}

fn default_weight() -> f64 {
    1.0
}

/// Where the conditioning image comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Url(String),
    Path(PathBuf),
    Base64(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub image: ImageSource,
    pub prompt: String,
    pub seed: u64,
    pub cfg: f64,
    pub width: u32,
    pub height: u32,
    pub length: u32,
    pub steps: u32,
    pub lora_pairs: Vec<AdapterPair>,
}

impl TryFrom<GenerationInput> for GenerationRequest {
    type Error = GenerationError;

    fn try_from(input: GenerationInput) -> Result<Self, Self::Error> {
        // Empty strings count as absent.
        let path = input.image_path.filter(|s| !s.trim().is_empty());
        let b64 = input.image_base64.filter(|s| !s.trim().is_empty());

        let image = match (path, b64) {
            (Some(p), None) if is_http_url(&p) => ImageSource::Url(p),
            (Some(p), None) => ImageSource::Path(PathBuf::from(p)),
            (None, Some(b)) => ImageSource::Base64(b),
            _ => return Err(GenerationError::input("ambiguous or missing image input")),
        };

        if input.prompt.trim().is_empty() {
            return Err(GenerationError::input("prompt must not be empty"));
        }
        if input.width == 0 || input.height == 0 {
            return Err(GenerationError::input("width and height must be positive"));
        }
        if input.length == 0 || input.steps == 0 {
            return Err(GenerationError::input("length and steps must be positive"));
        }
        if input
            .lora_pairs
            .iter()
            .any(|p| !is_bare_name(&p.high) || !is_bare_name(&p.low))
        {
            return Err(GenerationError::input("invalid adapter name"));
        }

        Ok(GenerationRequest {
            image,
            prompt: input.prompt,
            seed: input.seed,
            cfg: input.cfg,
            width: input.width,
            height: input.height,
            length: input.length,
            steps: input.steps,
            lora_pairs: input.lora_pairs,
        })
    }
}

pub fn is_http_url(s: &str) -> bool {
    let lower = s.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn is_bare_name(name: &str) -> bool {
    !name.trim().is_empty() && !name.contains('/') && !name.contains('\\') && name != ".." && name != "."
}
