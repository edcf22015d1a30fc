//! Thin HTTP client for ComfyUI endpoints.
//!
//! - `queue_prompt` posts a graph to `/prompt` and returns the `prompt_id`.
//! - `get_history` fetches `/history/<prompt_id>` as JSON.
//! - `get_queue` fetches `/queue` as JSON.
//! - `ping` hits the root URL.
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::comfyui::history;
use crate::engine::{ExecutionEngine, JobStatus};
use crate::error::EngineError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct QueueResponse {
    prompt_id: String,
}

#[derive(Clone)]
pub struct ComfyUIClient {
    client: Client,
    base_url: String,
    client_id: String,
    output_dir: PathBuf,
}

impl ComfyUIClient {
    pub fn new(base_url: String, output_dir: PathBuf) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        ComfyUIClient {
            client,
            base_url: base,
            client_id: Uuid::new_v4().to_string(),
            output_dir,
        }
    }

    /// Queue a graph with ComfyUI.
    ///
    /// Expects an API-format graph (node id -> node). Returns the prompt id
    /// ComfyUI assigned to the job.
    pub async fn queue_prompt(&self, graph: &Value) -> Result<String, EngineError> {
        let url = format!("{}/prompt", self.base_url);
        tracing::info!("Sending prompt to ComfyUI at URL: {}", url);
        tracing::debug!("Prompt payload: {}", graph);

        let body = json!({ "prompt": graph, "client_id": self.client_id });
        let response = self.client.post(&url).json(&body).send().await?;

        if response.status().is_success() {
            let queued: QueueResponse = response
                .json()
                .await
                .map_err(|e| EngineError::Payload(format!("missing prompt_id: {}", e)))?;
            tracing::info!(prompt_id = %queued.prompt_id, "Successfully queued prompt");
            Ok(queued.prompt_id)
        } else {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error body".to_string());
            tracing::error!("Failed to queue prompt. Status: {}, Body: {}", status, body);
            Err(EngineError::Api { status: status.as_u16(), body })
        }
    }

    /// Retrieve the execution history entry for one prompt.
    pub async fn get_history(&self, prompt_id: &str) -> Result<Value, EngineError> {
        let url = format!("{}/history/{}", self.base_url, prompt_id);
        self.get_json(&url).await
    }

    /// Retrieve the running and pending queues.
    pub async fn get_queue(&self) -> Result<Value, EngineError> {
        let url = format!("{}/queue", self.base_url);
        self.get_json(&url).await
    }

    async fn get_json(&self, url: &str) -> Result<Value, EngineError> {
        let response = self.client.get(url).send().await?;
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            Err(EngineError::Api { status, body })
        }
    }
}

#[async_trait]
impl ExecutionEngine for ComfyUIClient {
    async fn submit(&self, graph: &Value) -> Result<String, EngineError> {
        self.queue_prompt(graph).await
    }

    async fn status(&self, job_id: &str) -> Result<JobStatus, EngineError> {
        let hist = self.get_history(job_id).await?;
        if let Some(status) = history::status_from_history(&hist, job_id) {
            return Ok(status);
        }
        let queue = self.get_queue().await?;
        if history::queue_contains(&queue, "queue_running", job_id) {
            Ok(JobStatus::Running)
        } else {
            Ok(JobStatus::Pending)
        }
    }

    async fn outputs(&self, job_id: &str) -> Result<Vec<PathBuf>, EngineError> {
        let hist = self.get_history(job_id).await?;
        Ok(history::output_files(&hist, job_id, &self.output_dir))
    }

    async fn ping(&self) -> Result<(), EngineError> {
        let response = self.client.get(format!("{}/", self.base_url)).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(EngineError::Api {
                status: response.status().as_u16(),
                body: String::new(),
            })
        }
    }
}
