//! Synchronous image-to-video API in front of a ComfyUI server.
//!
//! Modules:
//! - `api`: Axum HTTP handlers and router used by the server binary.
//! - `request`: Wire format and validation of generation requests.
//! - `input`: Materializes the conditioning image in the engine's input area.
//! - `workflow`: Graph templates and request-value injection.
//! - `engine`: The execution-engine interface the pipeline depends on.
//! - `comfyui`: ComfyUI implementation of that interface.
//! - `job`: Submit/poll state machine.
//! - `artifact`: Reading the produced video.
//! - `response`: The `{"video"}` / `{"error"}` contract.
//! - `pipeline`: Wires the stages together for one request.
//! - `config`: Env-driven configuration loader.
//! - `error`: Error taxonomy and result alias.
//!
//! Re-exports are provided for common types: `Config`, `ComfyUIClient`,
//! `Pipeline`, and `WorkflowBuilder`.
pub mod api;
pub mod artifact;
pub mod comfyui;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod job;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod workflow;

pub use comfyui::ComfyUIClient;
pub use config::Config;
pub use pipeline::Pipeline;
pub use workflow::WorkflowBuilder;
