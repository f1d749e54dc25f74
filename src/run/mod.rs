//! Step sequencer.
//!
//! Runs a scenario's steps strictly in order on the calling thread. A step
//! runs only when every predecessor is recorded as a success; otherwise it is
//! recorded as blocked and nothing is built or sent for it. Outcomes live in
//! one arena (`Run::steps`) indexed by step name.
mod expect;
mod settle;

pub use expect::{check, check_all, Verdict};
pub use settle::{spawn_deadline, CancelToken, Cancelled, Clock, SystemClock};

use crate::api::{
    build_request, Bindings, OperationId, RequestError, Response, Transport, TransportError,
};
use crate::scenarios::{
    splice_artifacts, substitute, substitute_value, validate_scenario_spec, ArtifactError,
    ArtifactRoots, Expectation, ScenarioSpec, StepSpec, VarError,
};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

/// What happens after a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortPolicy {
    /// Keep going; dependants of the failed step are still blocked.
    #[default]
    Continue,
    /// Block every remaining step.
    StopOnFirstFailure,
}

/// Why an attempted step failed.
#[derive(Debug)]
pub enum FailureKind {
    /// The step definition could not be turned into a request.
    Request(RequestError),
    Artifact(ArtifactError),
    Transport(TransportError),
    /// The response decoded but did not meet the step's expectations.
    AssertionMismatch(Vec<String>),
}

impl FailureKind {
    pub fn label(&self) -> &'static str {
        match self {
            FailureKind::Request(_) => "request",
            FailureKind::Artifact(_) => "artifact",
            FailureKind::Transport(_) => "transport",
            FailureKind::AssertionMismatch(_) => "assertion_mismatch",
        }
    }

    pub fn details(&self) -> Vec<String> {
        match self {
            FailureKind::Request(err) => vec![err.to_string()],
            FailureKind::Artifact(err) => vec![err.to_string()],
            FailureKind::Transport(err) => vec![err.to_string()],
            FailureKind::AssertionMismatch(failures) => failures.clone(),
        }
    }
}

/// Why a step was never attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cause", content = "step", rename_all = "snake_case")]
pub enum BlockReason {
    /// The named predecessor did not succeed.
    Prerequisite(String),
    /// An earlier failure stopped the run.
    Aborted,
    Cancelled,
}

#[derive(Debug)]
pub enum StepOutcome {
    Success(Response),
    Failed {
        kind: FailureKind,
        /// Response that failed its expectations, when there was one.
        response: Option<Response>,
    },
    Blocked(BlockReason),
}

impl StepOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, StepOutcome::Success(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed { .. })
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, StepOutcome::Blocked(_))
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            StepOutcome::Success(response) => Some(response),
            StepOutcome::Failed { response, .. } => response.as_ref(),
            StepOutcome::Blocked(_) => None,
        }
    }
}

#[derive(Debug)]
pub struct StepRecord {
    pub name: String,
    pub operation: OperationId,
    pub outcome: StepOutcome,
    pub duration_ms: u64,
}

/// One execution of a scenario.
#[derive(Debug)]
pub struct Run {
    pub scenario: String,
    pub steps: Vec<StepRecord>,
    index: BTreeMap<String, usize>,
    pub aborted: bool,
    pub cancelled: bool,
}

impl Run {
    fn new(scenario: &str) -> Self {
        Self {
            scenario: scenario.to_string(),
            steps: Vec::new(),
            index: BTreeMap::new(),
            aborted: false,
            cancelled: false,
        }
    }

    fn record(&mut self, record: StepRecord) {
        self.index.insert(record.name.clone(), self.steps.len());
        self.steps.push(record);
    }

    pub fn outcome(&self, name: &str) -> Option<&StepOutcome> {
        self.index.get(name).map(|idx| &self.steps[*idx].outcome)
    }

    pub fn success_count(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_success()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_failed()).count()
    }

    pub fn blocked_count(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_blocked()).count()
    }

    /// True when nothing failed and the run was not cancelled.
    pub fn passed(&self) -> bool {
        self.failed_count() == 0 && !self.cancelled
    }

    /// First predecessor of `step` that is not recorded as a success.
    fn unsatisfied_predecessor<'s>(&self, step: &'s StepSpec) -> Option<&'s str> {
        step.after
            .iter()
            .find(|name| !matches!(self.outcome(name), Some(outcome) if outcome.is_success()))
            .map(String::as_str)
    }
}

/// Executes scenarios against a transport.
pub struct Sequencer<'a> {
    transport: &'a dyn Transport,
    clock: &'a dyn Clock,
    artifacts: ArtifactRoots,
    policy: AbortPolicy,
    cancel: CancelToken,
}

impl<'a> Sequencer<'a> {
    pub fn new(transport: &'a dyn Transport, clock: &'a dyn Clock, artifacts: ArtifactRoots) -> Self {
        Self {
            transport,
            clock,
            artifacts,
            policy: AbortPolicy::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_policy(mut self, policy: AbortPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Validate and run `scenario`. Validation errors return before any request.
    pub fn run(&self, scenario: &ScenarioSpec) -> Result<Run> {
        validate_scenario_spec(scenario)
            .with_context(|| format!("validate scenario {}", scenario.id))?;
        tracing::info!(scenario = %scenario.id, steps = scenario.steps.len(), "starting run");

        let mut run = Run::new(&scenario.id);
        let mut vars = scenario.vars.clone();
        for step in &scenario.steps {
            if !run.cancelled && self.cancel.is_cancelled() {
                tracing::warn!(scenario = %scenario.id, "run cancelled");
                run.cancelled = true;
            }
            let halted = if run.cancelled {
                Some(BlockReason::Cancelled)
            } else if run.aborted {
                Some(BlockReason::Aborted)
            } else {
                run.unsatisfied_predecessor(step)
                    .map(|name| BlockReason::Prerequisite(name.to_string()))
            };
            if let Some(reason) = halted {
                tracing::warn!(step = %step.name, reason = ?reason, "step blocked");
                run.record(StepRecord {
                    name: step.name.clone(),
                    operation: step.operation,
                    outcome: StepOutcome::Blocked(reason),
                    duration_ms: 0,
                });
                continue;
            }

            tracing::info!(step = %step.name, operation = %step.operation, "running step");
            let started = Instant::now();
            let outcome = self.attempt(step, &mut vars);
            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            match &outcome {
                StepOutcome::Success(response) => {
                    tracing::info!(step = %step.name, status = response.status, duration_ms, "step succeeded");
                }
                StepOutcome::Failed { kind, .. } => {
                    tracing::warn!(step = %step.name, failure = kind.label(), details = ?kind.details(), "step failed");
                }
                StepOutcome::Blocked(_) => {}
            }
            let succeeded = outcome.is_success();
            let failed = outcome.is_failed();
            run.record(StepRecord {
                name: step.name.clone(),
                operation: step.operation,
                outcome,
                duration_ms,
            });

            if failed && self.policy == AbortPolicy::StopOnFirstFailure {
                tracing::warn!(step = %step.name, "stopping run after failure");
                run.aborted = true;
            }
            if succeeded {
                if let Some(settle) = step.settle.as_ref() {
                    tracing::debug!(
                        step = %step.name,
                        seconds = settle.seconds,
                        reason = %settle.reason,
                        "settling"
                    );
                    if self.clock.sleep(settle.duration(), &self.cancel).is_err() {
                        tracing::warn!(step = %step.name, "run cancelled while settling");
                        run.cancelled = true;
                    }
                }
            }
        }

        tracing::info!(
            scenario = %scenario.id,
            succeeded = run.success_count(),
            failed = run.failed_count(),
            blocked = run.blocked_count(),
            "run finished"
        );
        Ok(run)
    }

    fn attempt(&self, step: &StepSpec, vars: &mut BTreeMap<String, String>) -> StepOutcome {
        let failed = |kind: FailureKind| StepOutcome::Failed {
            kind,
            response: None,
        };
        let bindings = match self.bind(step, vars) {
            Ok(bindings) => bindings,
            Err(kind) => return failed(kind),
        };
        let request = match build_request(step.operation.operation(), &bindings) {
            Ok(request) => request,
            Err(err) => return failed(FailureKind::Request(err)),
        };
        let response = match self.transport.execute(&request) {
            Ok(response) => response,
            Err(err) => return failed(FailureKind::Transport(err)),
        };

        let expectations = match bind_expectations(&step.expect, vars) {
            Ok(expectations) => expectations,
            Err(err) => return failed(var_failure(step, err)),
        };
        let mut failures = check_all(&expectations, &response);
        if failures.is_empty() {
            failures = capture(step, &response, vars);
        }
        if !failures.is_empty() {
            return StepOutcome::Failed {
                kind: FailureKind::AssertionMismatch(failures),
                response: Some(response),
            };
        }
        StepOutcome::Success(response)
    }

    fn bind(
        &self,
        step: &StepSpec,
        vars: &BTreeMap<String, String>,
    ) -> Result<Bindings, FailureKind> {
        let substitute_map = |values: &BTreeMap<String, String>| {
            values
                .iter()
                .map(|(name, value)| Ok((name.clone(), substitute(value, vars)?)))
                .collect::<Result<BTreeMap<_, _>, VarError>>()
        };
        let path = substitute_map(&step.path).map_err(|err| var_failure(step, err))?;
        let query = substitute_map(&step.query).map_err(|err| var_failure(step, err))?;
        let body = step
            .body
            .as_ref()
            .map(|body| substitute_value(body, vars))
            .transpose()
            .map_err(|err| var_failure(step, err))?;
        let body =
            splice_artifacts(&self.artifacts, body, &step.artifacts).map_err(FailureKind::Artifact)?;
        Ok(Bindings { path, query, body })
    }
}

fn var_failure(step: &StepSpec, err: VarError) -> FailureKind {
    FailureKind::Request(RequestError::MalformedParameters {
        operation: step.operation,
        detail: err.to_string(),
    })
}

fn bind_expectations(
    expectations: &[Expectation],
    vars: &BTreeMap<String, String>,
) -> Result<Vec<Expectation>, VarError> {
    expectations
        .iter()
        .map(|expectation| match expectation {
            Expectation::Equals { path, value } => Ok(Expectation::Equals {
                path: path.clone(),
                value: substitute_value(value, vars)?,
            }),
            other => Ok(other.clone()),
        })
        .collect()
}

fn capture(step: &StepSpec, response: &Response, vars: &mut BTreeMap<String, String>) -> Vec<String> {
    let mut failures = Vec::new();
    for (name, pointer) in &step.capture {
        match response.body.pointer(pointer) {
            Some(serde_json::Value::String(text)) => {
                vars.insert(name.clone(), text.clone());
            }
            Some(value) if !value.is_null() => {
                vars.insert(name.clone(), value.to_string());
            }
            _ => failures.push(format!("capture {name}: nothing at {pointer}")),
        }
    }
    failures
}

#[cfg(test)]
#[path = "tests.rs"]
mod tests;
