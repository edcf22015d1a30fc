//! Submits a graph and waits for the job to finish.
//!
//! The wait is an explicit state machine: [`transition`] is a pure function
//! from (state, observation, elapsed) to the next state, and [`JobRunner`]
//! drives it with an injected [`Clock`].
pub mod clock;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::{ExecutionEngine, JobStatus};
use crate::error::{AppResult, GenerationError};
use crate::workflow::WorkflowGraph;

pub use clock::{Clock, ManualClock, TokioClock};

pub const SUBMISSION_REJECTED: &str = "submission rejected";
pub const STATUS_CHECK_FAILED: &str = "status check failed";
pub const TIMED_OUT: &str = "timed out";
pub const ENGINE_UNAVAILABLE: &str = "engine unavailable";

const READY_PROBE_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Wall-clock budget measured from submission.
    pub deadline: Duration,
    /// Consecutive failed status checks tolerated before giving up.
    pub max_status_failures: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy {
            interval: Duration::from_secs(1),
            deadline: Duration::from_secs(1800),
            max_status_failures: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Submitted,
    Waiting { last: JobStatus, failures: u32 },
    Succeeded,
    Failed { detail: String },
    TimedOut,
    StatusUnavailable,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Submitted | PollState::Waiting { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Status(JobStatus),
    CheckFailed,
}

pub fn transition(state: &PollState, observation: Observation, elapsed: Duration, policy: &PollPolicy) -> PollState {
    if state.is_terminal() {
        return state.clone();
    }
    let (last, failures) = match state {
        PollState::Waiting { last, failures } => (last.clone(), *failures),
        _ => (JobStatus::Pending, 0),
    };
    let out_of_time = elapsed >= policy.deadline;

    match observation {
        Observation::Status(JobStatus::Succeeded) => PollState::Succeeded,
        Observation::Status(JobStatus::Failed { detail }) => PollState::Failed { detail },
        Observation::Status(_) if out_of_time => PollState::TimedOut,
        Observation::Status(status) => PollState::Waiting { last: status, failures: 0 },
        Observation::CheckFailed if failures + 1 > policy.max_status_failures => PollState::StatusUnavailable,
        Observation::CheckFailed if out_of_time => PollState::TimedOut,
        Observation::CheckFailed => PollState::Waiting { last, failures: failures + 1 },
    }
}

/// A job the engine reported as succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedJob {
    pub job_id: String,
    pub outputs: Vec<PathBuf>,
}

pub struct JobRunner {
    engine: Arc<dyn ExecutionEngine>,
    clock: Arc<dyn Clock>,
    policy: PollPolicy,
    ready_timeout: Duration,
}

impl JobRunner {
    pub fn new(engine: Arc<dyn ExecutionEngine>, clock: Arc<dyn Clock>, policy: PollPolicy, ready_timeout: Duration) -> Self {
        JobRunner { engine, clock, policy, ready_timeout }
    }

    /// Probe the engine until it answers or the readiness budget runs out.
    pub async fn wait_for_engine(&self) -> AppResult<()> {
        let start = self.clock.now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.engine.ping().await {
                Ok(()) => {
                    tracing::debug!(attempt, "Engine reachable");
                    return Ok(());
                }
                Err(e) => {
                    let elapsed = self.clock.now().saturating_sub(start);
                    tracing::warn!(attempt, error = %e, "Engine not reachable yet");
                    if elapsed >= self.ready_timeout {
                        tracing::error!(attempt, "Engine did not become reachable");
                        return Err(GenerationError::job(ENGINE_UNAVAILABLE));
                    }
                    let remaining = self.ready_timeout - elapsed;
                    self.clock.sleep(READY_PROBE_INTERVAL.min(remaining)).await;
                }
            }
        }
    }

    pub async fn run(&self, workflow: &WorkflowGraph) -> AppResult<CompletedJob> {
        let job_id = self.engine.submit(&workflow.graph).await.map_err(|e| {
            tracing::error!(error = %e, "Engine rejected submission");
            GenerationError::job(SUBMISSION_REJECTED)
        })?;
        tracing::info!(prompt_id = %job_id, "Job submitted");

        let start = self.clock.now();
        let mut state = PollState::Submitted;
        loop {
            let observation = match self.engine.status(&job_id).await {
                Ok(status) => Observation::Status(status),
                Err(e) => {
                    tracing::warn!(prompt_id = %job_id, error = %e, "Status check failed");
                    Observation::CheckFailed
                }
            };
            let elapsed = self.clock.now().saturating_sub(start);
            let next = transition(&state, observation, elapsed, &self.policy);
            if next != state {
                tracing::debug!(prompt_id = %job_id, state = ?next, "Job state changed");
            }
            state = next;

            match &state {
                PollState::Succeeded => break,
                PollState::Failed { detail } => {
                    tracing::error!(prompt_id = %job_id, %detail, "Job failed");
                    return Err(GenerationError::job(format!("job failed: {}", detail)));
                }
                PollState::TimedOut => {
                    // The engine keeps the job; nothing here can cancel it.
                    tracing::error!(prompt_id = %job_id, elapsed_ms = elapsed.as_millis() as u64, "Job timed out");
                    return Err(GenerationError::job(TIMED_OUT));
                }
                PollState::StatusUnavailable => {
                    tracing::error!(prompt_id = %job_id, "Giving up on status checks");
                    return Err(GenerationError::job(STATUS_CHECK_FAILED));
                }
                PollState::Submitted | PollState::Waiting { .. } => {}
            }

            let remaining = self.policy.deadline.saturating_sub(elapsed);
            self.clock.sleep(self.policy.interval.min(remaining)).await;
        }

        tracing::info!(prompt_id = %job_id, "Job succeeded");
        let outputs = self.engine.outputs(&job_id).await.map_err(|e| {
            tracing::error!(prompt_id = %job_id, error = %e, "Could not list job outputs");
            GenerationError::job(STATUS_CHECK_FAILED)
        })?;
        Ok(CompletedJob { job_id, outputs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::error::EngineError;
    use crate::workflow::TemplateKind;

    fn policy() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(1),
            deadline: Duration::from_secs(10),
            max_status_failures: 2,
        }
    }

    fn waiting(failures: u32) -> PollState {
        PollState::Waiting { last: JobStatus::Running, failures }
    }

    #[test]
    fn success_is_terminal() {
        let s = transition(&PollState::Submitted, Observation::Status(JobStatus::Succeeded), Duration::ZERO, &policy());
        assert_eq!(s, PollState::Succeeded);
        let again = transition(&s, Observation::CheckFailed, Duration::from_secs(99), &policy());
        assert_eq!(again, PollState::Succeeded);
    }

    #[test]
    fn running_keeps_waiting_until_deadline() {
        let p = policy();
        let s = transition(&PollState::Submitted, Observation::Status(JobStatus::Running), Duration::from_secs(9), &p);
        assert_eq!(s, waiting(0));
        let s = transition(&s, Observation::Status(JobStatus::Running), Duration::from_secs(10), &p);
        assert_eq!(s, PollState::TimedOut);
    }

    #[test]
    fn failures_escalate_after_budget() {
        let p = policy();
        let s = transition(&waiting(0), Observation::CheckFailed, Duration::ZERO, &p);
        assert_eq!(s, waiting(1));
        let s = transition(&s, Observation::CheckFailed, Duration::ZERO, &p);
        assert_eq!(s, waiting(2));
        let s = transition(&s, Observation::CheckFailed, Duration::ZERO, &p);
        assert_eq!(s, PollState::StatusUnavailable);
    }

    #[test]
    fn successful_check_resets_failures() {
        let s = transition(&waiting(2), Observation::Status(JobStatus::Pending), Duration::ZERO, &policy());
        assert_eq!(s, PollState::Waiting { last: JobStatus::Pending, failures: 0 });
    }

    #[test]
    fn success_at_deadline_still_counts() {
        let s = transition(&waiting(0), Observation::Status(JobStatus::Succeeded), Duration::from_secs(60), &policy());
        assert_eq!(s, PollState::Succeeded);
    }

    /// Engine that replays a fixed list of status answers, then repeats the last one.
    struct ScriptedEngine {
        reject: bool,
        offline: bool,
        pings: Mutex<u32>,
        script: Mutex<VecDeque<Result<JobStatus, ()>>>,
        last: Mutex<Option<Result<JobStatus, ()>>>,
        polls: Mutex<u32>,
    }

    impl ScriptedEngine {
        fn new(script: Vec<Result<JobStatus, ()>>) -> Self {
            ScriptedEngine {
                reject: false,
                offline: false,
                pings: Mutex::new(0),
                script: Mutex::new(script.into()),
                last: Mutex::new(None),
                polls: Mutex::new(0),
            }
        }

        fn polls(&self) -> u32 {
            *self.polls.lock().unwrap()
        }
    }

    #[async_trait]
    impl ExecutionEngine for ScriptedEngine {
        async fn submit(&self, _graph: &Value) -> Result<String, EngineError> {
            if self.reject {
                return Err(EngineError::Api { status: 400, body: "bad graph".into() });
            }
            Ok("job-1".into())
        }

        async fn status(&self, _job_id: &str) -> Result<JobStatus, EngineError> {
            *self.polls.lock().unwrap() += 1;
            let next = self.script.lock().unwrap().pop_front();
            let answer = match next {
                Some(a) => {
                    *self.last.lock().unwrap() = Some(a.clone());
                    a
                }
                None => self.last.lock().unwrap().clone().unwrap_or(Ok(JobStatus::Pending)),
            };
            answer.map_err(|_| EngineError::Payload("connection reset".into()))
        }

        async fn outputs(&self, _job_id: &str) -> Result<Vec<PathBuf>, EngineError> {
            Ok(vec![PathBuf::from("/out/video.mp4")])
        }

        async fn ping(&self) -> Result<(), EngineError> {
            *self.pings.lock().unwrap() += 1;
            if self.offline {
                return Err(EngineError::Payload("connection refused".into()));
            }
            Ok(())
        }
    }

    fn graph() -> WorkflowGraph {
        WorkflowGraph { kind: TemplateKind::NoLora, graph: json!({}) }
    }

    fn runner(engine: Arc<ScriptedEngine>, clock: Arc<ManualClock>) -> JobRunner {
        JobRunner::new(engine, clock, policy(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn succeeds_after_observing_success() {
        let engine = Arc::new(ScriptedEngine::new(vec![
            Ok(JobStatus::Pending),
            Ok(JobStatus::Running),
            Ok(JobStatus::Succeeded),
        ]));
        let clock = Arc::new(ManualClock::new());
        let done = runner(engine.clone(), clock.clone()).run(&graph()).await.unwrap();

        assert_eq!(done.job_id, "job-1");
        assert_eq!(done.outputs, vec![PathBuf::from("/out/video.mp4")]);
        assert_eq!(engine.polls(), 3);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(1); 2]);
    }

    #[tokio::test]
    async fn engine_failure_detail_is_surfaced() {
        let engine = Arc::new(ScriptedEngine::new(vec![
            Ok(JobStatus::Running),
            Ok(JobStatus::Running),
            Ok(JobStatus::Failed { detail: "CUDA out of memory".into() }),
        ]));
        let err = runner(engine, Arc::new(ManualClock::new())).run(&graph()).await.unwrap_err();
        match err {
            GenerationError::Job(msg) => assert!(msg.contains("CUDA out of memory")),
            other => panic!("expected job error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn never_finishing_job_times_out() {
        let engine = Arc::new(ScriptedEngine::new(vec![Ok(JobStatus::Running)]));
        let clock = Arc::new(ManualClock::new());
        let err = runner(engine, clock.clone()).run(&graph()).await.unwrap_err();

        assert_eq!(err, GenerationError::job(TIMED_OUT));
        assert!(err.is_timeout());
        assert_eq!(clock.now(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let engine = Arc::new(ScriptedEngine::new(vec![Err(()), Err(()), Ok(JobStatus::Succeeded)]));
        let done = runner(engine.clone(), Arc::new(ManualClock::new())).run(&graph()).await;
        assert!(done.is_ok());
        assert_eq!(engine.polls(), 3);
    }

    #[tokio::test]
    async fn persistent_failures_escalate() {
        let engine = Arc::new(ScriptedEngine::new(vec![Err(())]));
        let err = runner(engine.clone(), Arc::new(ManualClock::new())).run(&graph()).await.unwrap_err();
        assert_eq!(err, GenerationError::job(STATUS_CHECK_FAILED));
        assert_eq!(engine.polls(), 3);
    }

    #[tokio::test]
    async fn rejected_submission_is_not_retried() {
        let mut engine = ScriptedEngine::new(vec![]);
        engine.reject = true;
        let engine = Arc::new(engine);
        let err = runner(engine.clone(), Arc::new(ManualClock::new())).run(&graph()).await.unwrap_err();
        assert_eq!(err, GenerationError::job(SUBMISSION_REJECTED));
        assert_eq!(engine.polls(), 0);
    }

    #[tokio::test]
    async fn reachable_engine_is_ready_at_once() {
        let engine = Arc::new(ScriptedEngine::new(vec![]));
        let clock = Arc::new(ManualClock::new());
        runner(engine.clone(), clock.clone()).wait_for_engine().await.unwrap();
        assert_eq!(*engine.pings.lock().unwrap(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn unreachable_engine_exhausts_readiness_budget() {
        let mut engine = ScriptedEngine::new(vec![]);
        engine.offline = true;
        let engine = Arc::new(engine);
        let clock = Arc::new(ManualClock::new());
        let err = runner(engine.clone(), clock.clone()).wait_for_engine().await.unwrap_err();

        assert_eq!(err, GenerationError::job(ENGINE_UNAVAILABLE));
        assert_eq!(clock.now(), Duration::from_secs(5));
        assert_eq!(clock.sleeps(), vec![READY_PROBE_INTERVAL; 5]);
        assert_eq!(*engine.pings.lock().unwrap(), 6);
        assert_eq!(engine.polls(), 0);
    }
}
