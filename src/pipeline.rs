//! One request, start to finish.
//!
//! Stages run strictly in order (validate, resolve image, build graph, wait
//! for engine, submit and poll, read artifact) and the first failure ends
//! the request.
use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::artifact::{self, ResultArtifact};
use crate::comfyui::ComfyUIClient;
use crate::config::Config;
use crate::engine::ExecutionEngine;
use crate::error::{AppResult, GenerationError};
use crate::input::{DirInputStore, InputResolver};
use crate::job::{JobRunner, TokioClock};
use crate::request::{GenerationInput, GenerationRequest};
use crate::response::GenerationResponse;
use crate::workflow::{TemplateStore, WorkflowBuilder};

/// A finished request: the body for the caller and, when it failed, the
/// error it was folded from.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub response: GenerationResponse,
    pub error: Option<GenerationError>,
}

pub struct Pipeline {
    resolver: InputResolver,
    builder: WorkflowBuilder,
    runner: JobRunner,
    data_uri: bool,
}

impl Pipeline {
    pub fn new(resolver: InputResolver, builder: WorkflowBuilder, runner: JobRunner, data_uri: bool) -> Self {
        Pipeline { resolver, builder, runner, data_uri }
    }

    /// Production wiring: ComfyUI over HTTP, the input directory on disk,
    /// wall-clock polling.
    pub fn from_config(config: &Config, templates: Arc<TemplateStore>) -> (Self, Arc<dyn ExecutionEngine>) {
        let engine: Arc<dyn ExecutionEngine> = Arc::new(ComfyUIClient::new(
            config.comfyui_url.clone(),
            config.output_dir.clone(),
        ));
        let resolver = InputResolver::new(
            Arc::new(DirInputStore::new(config.input_dir.clone())),
            config.download_timeout,
        );
        let runner = JobRunner::new(
            engine.clone(),
            Arc::new(TokioClock::new()),
            config.poll_policy(),
            config.engine_ready_timeout,
        );
        let pipeline = Pipeline::new(resolver, WorkflowBuilder::new(templates), runner, config.video_data_uri);
        (pipeline, engine)
    }

    pub async fn generate(&self, input: GenerationInput) -> AppResult<ResultArtifact> {
        let task_id = Uuid::new_v4();
        let span = tracing::info_span!("generation", %task_id);
        async move {
            let request = GenerationRequest::try_from(input)?;
            tracing::info!(
                seed = request.seed,
                width = request.width,
                height = request.height,
                length = request.length,
                steps = request.steps,
                lora_pairs = request.lora_pairs.len(),
                "Accepted generation request"
            );

            let image = self.resolver.resolve(&request.image).await?;
            let workflow = self.builder.build(&request, image)?;
            self.runner.wait_for_engine().await?;
            let job = self.runner.run(&workflow).await?;
            artifact::retrieve(&job.outputs).await
        }
        .instrument(span)
        .await
    }

    /// Run the request and fold any failure into the error contract.
    pub async fn run(&self, input: GenerationInput) -> Outcome {
        match self.generate(input).await {
            Ok(artifact) => Outcome {
                response: GenerationResponse::success(&artifact, self.data_uri),
                error: None,
            },
            Err(e) => {
                tracing::error!(stage = e.kind(), error = %e, "Generation failed");
                Outcome {
                    response: GenerationResponse::failure(&e),
                    error: Some(e),
                }
            }
        }
    }

    pub async fn handle(&self, input: GenerationInput) -> GenerationResponse {
        self.run(input).await.response
    }
}
