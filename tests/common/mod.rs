#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{routing::get, Router};
use serde_json::{json, Value};

use wan_i2v_proxy::engine::{ExecutionEngine, JobStatus};
use wan_i2v_proxy::error::EngineError;
use wan_i2v_proxy::input::{InputResolver, MemoryInputStore};
use wan_i2v_proxy::job::{JobRunner, ManualClock, PollPolicy};
use wan_i2v_proxy::workflow::{TemplateKind, TemplateStore};
use wan_i2v_proxy::{Pipeline, WorkflowBuilder};

/// A template declaring every slot its kind needs, plus one unrelated node.
pub fn skeleton(kind: TemplateKind) -> Value {
    let mut graph = serde_json::Map::new();
    graph.insert(
        "1".into(),
        json!({"class_type": "VHS_VideoCombine", "inputs": {"frame_rate": 16, "images": ["2", 0]}}),
    );
    for slot in kind.required_slots() {
        let node = graph
            .entry(slot.node.to_string())
            .or_insert_with(|| json!({"class_type": "Stub", "inputs": {}}));
        node["inputs"][slot.input] = json!(null);
    }
    Value::Object(graph)
}

pub fn templates() -> Arc<TemplateStore> {
    Arc::new(TemplateStore::from_templates(
        TemplateKind::ALL.map(|k| (k, skeleton(k))),
    ))
}

/// Engine that answers status checks from a script and reports fixed outputs.
pub struct StubEngine {
    statuses: Mutex<Vec<JobStatus>>,
    outputs: Vec<PathBuf>,
    pub submitted: Mutex<Vec<Value>>,
    /// When set, every ping fails as if the engine were down.
    pub offline: bool,
}

impl StubEngine {
    pub fn new(statuses: Vec<JobStatus>, outputs: Vec<PathBuf>) -> Self {
        StubEngine {
            statuses: Mutex::new(statuses),
            outputs,
            submitted: Mutex::new(Vec::new()),
            offline: false,
        }
    }

    pub fn succeeding(output: PathBuf) -> Self {
        Self::new(vec![JobStatus::Running, JobStatus::Succeeded], vec![output])
    }

    pub fn submissions(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl ExecutionEngine for StubEngine {
    async fn submit(&self, graph: &Value) -> Result<String, EngineError> {
        self.submitted.lock().unwrap().push(graph.clone());
        Ok("prompt-1".into())
    }

    async fn status(&self, _job_id: &str) -> Result<JobStatus, EngineError> {
        let mut statuses = self.statuses.lock().unwrap();
        if statuses.len() > 1 {
            Ok(statuses.remove(0))
        } else {
            Ok(statuses.first().cloned().unwrap_or(JobStatus::Pending))
        }
    }

    async fn outputs(&self, _job_id: &str) -> Result<Vec<PathBuf>, EngineError> {
        Ok(self.outputs.clone())
    }

    async fn ping(&self) -> Result<(), EngineError> {
        if self.offline {
            return Err(EngineError::Api { status: 502, body: "bad gateway".into() });
        }
        Ok(())
    }
}

pub struct Harness {
    pub pipeline: Pipeline,
    pub engine: Arc<StubEngine>,
    pub store: Arc<MemoryInputStore>,
    pub clock: Arc<ManualClock>,
}

pub fn harness(engine: StubEngine) -> Harness {
    let engine = Arc::new(engine);
    let store = Arc::new(MemoryInputStore::new());
    let clock = Arc::new(ManualClock::new());
    let policy = PollPolicy {
        interval: Duration::from_secs(1),
        deadline: Duration::from_secs(30),
        max_status_failures: 3,
    };
    let pipeline = Pipeline::new(
        InputResolver::new(store.clone(), Duration::from_secs(5)),
        WorkflowBuilder::new(templates()),
        JobRunner::new(engine.clone(), clock.clone(), policy, Duration::from_secs(5)),
        false,
    );
    Harness { pipeline, engine, store, clock }
}

/// Serve `bytes` at `route` on an ephemeral local port.
pub async fn serve_image(route: &str, bytes: &'static [u8]) -> SocketAddr {
    serve(Router::new().route(route, get(move || async move { bytes })))
}

/// Run `app` on an ephemeral local port for the rest of the test.
pub fn serve(app: Router) -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener).unwrap().serve(app.into_make_service());
    tokio::spawn(server);
    addr
}
