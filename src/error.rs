//! Error types shared across the pipeline.
//!
//! `EngineError` covers the transport to the execution engine.
//! `GenerationError` is the caller-facing taxonomy: every stage fails with
//! exactly one of its variants and the message is what ends up in the
//! `{"error": ...}` response.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("HTTP request failed: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("engine API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("unexpected engine response: {0}")]
    Payload(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("{0}")]
    Input(String),

    #[error("{0}")]
    Template(String),

    #[error("{0}")]
    Job(String),

    #[error("{0}")]
    Artifact(String),
}

impl GenerationError {
    pub fn input(msg: impl Into<String>) -> Self {
        GenerationError::Input(msg.into())
    }

    pub fn template(msg: impl Into<String>) -> Self {
        GenerationError::Template(msg.into())
    }

    pub fn job(msg: impl Into<String>) -> Self {
        GenerationError::Job(msg.into())
    }

    pub fn artifact(msg: impl Into<String>) -> Self {
        GenerationError::Artifact(msg.into())
    }

    /// Short name of the failing stage, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationError::Input(_) => "input",
            GenerationError::Template(_) => "template",
            GenerationError::Job(_) => "job",
            GenerationError::Artifact(_) => "artifact",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GenerationError::Job(msg) if msg == crate::job::TIMED_OUT)
    }
}

pub type AppResult<T> = Result<T, GenerationError>;
