//! The execution engine as the pipeline sees it.
//!
//! The pipeline only submits graphs, observes job status and asks where
//! the outputs landed. [`crate::comfyui::ComfyUIClient`] is the production
//! implementation; tests plug in scripted engines.
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::EngineError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed { detail: String },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed { .. })
    }
}

#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Queue a graph; returns the engine's job id.
    async fn submit(&self, graph: &Value) -> Result<String, EngineError>;

    async fn status(&self, job_id: &str) -> Result<JobStatus, EngineError>;

    /// Files the finished job produced, in no particular order.
    async fn outputs(&self, job_id: &str) -> Result<Vec<PathBuf>, EngineError>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), EngineError>;
}
