//! Parameterizes a graph template with request values.
//!
//! Injection is strictly key-based: every value goes to one declared
//! `node.inputs.key` slot, and only keys the template already has are
//! overwritten, so the built graph has exactly the template's shape.
pub mod template;

use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::{AppResult, GenerationError};
use crate::input::ResolvedImage;
use crate::request::GenerationRequest;

pub use template::{Slot, TemplateKind, TemplateLoadError, TemplateStore};

/// A fully parameterized job payload.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowGraph {
    pub kind: TemplateKind,
    pub graph: Value,
}

impl WorkflowGraph {
    /// Canonical serialized payload. Object keys are emitted sorted, so equal
    /// graphs always serialize to equal bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.graph).unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct WorkflowBuilder {
    templates: Arc<TemplateStore>,
}

impl WorkflowBuilder {
    pub fn new(templates: Arc<TemplateStore>) -> Self {
        WorkflowBuilder { templates }
    }

    pub fn build(&self, req: &GenerationRequest, image: ResolvedImage) -> AppResult<WorkflowGraph> {
        let kind = TemplateKind::for_pair_count(req.lora_pairs.len())?;
        let mut graph = self
            .templates
            .get(kind)
            .cloned()
            .ok_or_else(|| GenerationError::template("malformed template"))?;
        tracing::info!(template = kind.file_name(), "Selected workflow template");

        inject(&mut graph, template::IMAGE, Value::String(image.filename))?;
        inject(&mut graph, template::PROMPT, Value::String(req.prompt.clone()))?;
        inject(&mut graph, template::SEED, json!(req.seed))?;
        inject(&mut graph, template::CFG, json!(req.cfg))?;
        inject(&mut graph, template::WIDTH, json!(req.width))?;
        inject(&mut graph, template::HEIGHT, json!(req.height))?;
        inject(&mut graph, template::LENGTH, json!(req.length))?;
        inject(&mut graph, template::STEPS, json!(req.steps))?;
        inject(&mut graph, template::SPLIT_STEP, json!(split_step(req.steps)))?;

        for (i, (pair, group)) in req.lora_pairs.iter().zip(kind.adapter_groups()).enumerate() {
            let [high_name, high_weight, low_name, low_weight] = group.slots();
            inject(&mut graph, high_name, Value::String(pair.high.clone()))?;
            inject(&mut graph, high_weight, json!(pair.high_weight))?;
            inject(&mut graph, low_name, Value::String(pair.low.clone()))?;
            inject(&mut graph, low_weight, json!(pair.low_weight))?;
            tracing::info!(
                pair = i + 1,
                high = %pair.high,
                high_weight = pair.high_weight,
                low = %pair.low,
                low_weight = pair.low_weight,
                "Applied adapter pair"
            );
        }

        Ok(WorkflowGraph { kind, graph })
    }
}

/// High-noise steps: 60% of the total, rounded down.
pub fn split_step(steps: u32) -> u32 {
    // Widened so large step counts cannot overflow; the result is <= steps.
    (u64::from(steps) * 3 / 5) as u32
}

/// Overwrite one existing slot. A slot the template does not declare is a
/// template fault, never a reason to add a key.
fn inject(graph: &mut Value, slot: Slot, value: Value) -> AppResult<()> {
    let inputs = graph
        .get_mut(slot.node)
        .and_then(|node| node.get_mut("inputs"))
        .and_then(|inputs| inputs.as_object_mut())
        .ok_or_else(|| malformed(slot))?;
    match inputs.get_mut(slot.input) {
        Some(existing) => {
            *existing = value;
            Ok(())
        }
        None => Err(malformed(slot)),
    }
}

fn malformed(slot: Slot) -> GenerationError {
    tracing::error!(node = slot.node, input = slot.input, "Template slot missing");
    GenerationError::template("malformed template")
}
