//! Graph templates, one per adapter-pair count.
//!
//! Templates are ComfyUI API-format graphs (`{"<node id>": {"class_type": ..,
//! "inputs": {..}}}`) loaded once at start-up and never mutated; each build
//! clones the template and fills its slots.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::error::{AppResult, GenerationError};

/// A named injection point: an input key on a specific node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot {
    pub node: &'static str,
    pub input: &'static str,
}

impl Slot {
    const fn new(node: &'static str, input: &'static str) -> Self {
        Slot { node, input }
    }
}

pub const IMAGE: Slot = Slot::new("260", "image");
pub const PROMPT: Slot = Slot::new("246", "value");
pub const SEED: Slot = Slot::new("835", "noise_seed");
pub const CFG: Slot = Slot::new("830", "cfg");
pub const WIDTH: Slot = Slot::new("849", "value");
pub const HEIGHT: Slot = Slot::new("848", "value");
pub const LENGTH: Slot = Slot::new("846", "value");
pub const STEPS: Slot = Slot::new("834", "steps");
/// Step at which sampling hands over from the high-noise to the low-noise model.
pub const SPLIT_STEP: Slot = Slot::new("829", "step");

pub const BASE_SLOTS: [Slot; 9] = [IMAGE, PROMPT, SEED, CFG, WIDTH, HEIGHT, LENGTH, STEPS, SPLIT_STEP];

pub const LORA_NAME: &str = "lora_name";
pub const LORA_STRENGTH: &str = "strength_model";

/// Loader nodes for one adapter pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterSlots {
    pub high_node: &'static str,
    pub low_node: &'static str,
}

impl AdapterSlots {
    pub fn slots(&self) -> [Slot; 4] {
        [
            Slot::new(self.high_node, LORA_NAME),
            Slot::new(self.high_node, LORA_STRENGTH),
            Slot::new(self.low_node, LORA_NAME),
            Slot::new(self.low_node, LORA_STRENGTH),
        ]
    }
}

static ADAPTER_GROUPS: [AdapterSlots; 3] = [
    AdapterSlots { high_node: "282", low_node: "286" },
    AdapterSlots { high_node: "339", low_node: "337" },
    AdapterSlots { high_node: "340", low_node: "338" },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateKind {
    NoLora,
    OneLora,
    TwoLora,
    ThreeLora,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 4] = [
        TemplateKind::NoLora,
        TemplateKind::OneLora,
        TemplateKind::TwoLora,
        TemplateKind::ThreeLora,
    ];

    pub fn for_pair_count(count: usize) -> AppResult<Self> {
        match count {
            0 => Ok(TemplateKind::NoLora),
            1 => Ok(TemplateKind::OneLora),
            2 => Ok(TemplateKind::TwoLora),
            3 => Ok(TemplateKind::ThreeLora),
            _ => Err(GenerationError::template("unsupported adapter-pair count")),
        }
    }

    pub fn pair_count(self) -> usize {
        match self {
            TemplateKind::NoLora => 0,
            TemplateKind::OneLora => 1,
            TemplateKind::TwoLora => 2,
            TemplateKind::ThreeLora => 3,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            TemplateKind::NoLora => "wan22_nolora.json",
            TemplateKind::OneLora => "wan22_1lora.json",
            TemplateKind::TwoLora => "wan22_2lora.json",
            TemplateKind::ThreeLora => "wan22_3lora.json",
        }
    }

    /// Adapter loader groups, in pair order.
    pub fn adapter_groups(self) -> &'static [AdapterSlots] {
        &ADAPTER_GROUPS[..self.pair_count()]
    }

    /// Every slot a template of this kind must declare.
    pub fn required_slots(self) -> Vec<Slot> {
        let mut slots = BASE_SLOTS.to_vec();
        for group in self.adapter_groups() {
            slots.extend(group.slots());
        }
        slots
    }
}

#[derive(Debug, Error)]
pub enum TemplateLoadError {
    #[error("failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse template {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("template {path} is missing slot {node}.inputs.{input}")]
    MissingSlot {
        path: PathBuf,
        node: &'static str,
        input: &'static str,
    },
}

/// The four graph templates, keyed by kind.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: BTreeMap<TemplateKind, Value>,
}

impl TemplateStore {
    /// Load all four templates from `dir` and check their slots.
    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, TemplateLoadError> {
        let mut templates = BTreeMap::new();
        for kind in TemplateKind::ALL {
            let path = dir.as_ref().join(kind.file_name());
            let raw = std::fs::read_to_string(&path).map_err(|source| TemplateLoadError::Io {
                path: path.clone(),
                source,
            })?;
            let graph: Value = serde_json::from_str(&raw).map_err(|source| TemplateLoadError::Parse {
                path: path.clone(),
                source,
            })?;
            // Some exports wrap the graph as {"prompt": {...}}.
            let graph = match graph.get("prompt") {
                Some(inner) if inner.is_object() => inner.clone(),
                _ => graph,
            };
            if let Some(slot) = missing_slot(&graph, kind) {
                return Err(TemplateLoadError::MissingSlot {
                    path,
                    node: slot.node,
                    input: slot.input,
                });
            }
            tracing::info!(template = kind.file_name(), nodes = graph.as_object().map(|o| o.len()).unwrap_or(0), "Loaded workflow template");
            templates.insert(kind, graph);
        }
        Ok(TemplateStore { templates })
    }

    /// Build a store from in-memory graphs without slot checks.
    pub fn from_templates(templates: impl IntoIterator<Item = (TemplateKind, Value)>) -> Self {
        TemplateStore {
            templates: templates.into_iter().collect(),
        }
    }

    pub fn get(&self, kind: TemplateKind) -> Option<&Value> {
        self.templates.get(&kind)
    }
}

/// First required slot the graph does not declare, if any.
pub fn missing_slot(graph: &Value, kind: TemplateKind) -> Option<Slot> {
    kind.required_slots().into_iter().find(|slot| {
        graph
            .get(slot.node)
            .and_then(|node| node.get("inputs"))
            .and_then(|inputs| inputs.as_object())
            .map(|inputs| !inputs.contains_key(slot.input))
            .unwrap_or(true)
    })
}
