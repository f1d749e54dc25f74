//! Final run report.
//!
//! Every step appears with its outcome kind. Failures carry their detail and
//! blocked steps name what blocked them, so a dependency problem never reads
//! like a backend problem.
use crate::api::OperationId;
use crate::run::{BlockReason, Run, StepOutcome};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Failed,
    Blocked,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub name: String,
    pub operation: OperationId,
    pub outcome: OutcomeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<BlockReason>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub scenario: String,
    pub passed: bool,
    pub aborted: bool,
    pub cancelled: bool,
    pub succeeded: usize,
    pub failed: usize,
    pub blocked: usize,
    pub steps: Vec<StepReport>,
}

impl RunReport {
    pub fn from_run(run: &Run) -> Self {
        let steps = run
            .steps
            .iter()
            .map(|record| {
                let mut step = StepReport {
                    name: record.name.clone(),
                    operation: record.operation,
                    outcome: OutcomeKind::Success,
                    status: record.outcome.response().map(|response| response.status),
                    failure: None,
                    blocked_by: None,
                    details: Vec::new(),
                    duration_ms: record.duration_ms,
                };
                match &record.outcome {
                    StepOutcome::Success(_) => {}
                    StepOutcome::Failed { kind, .. } => {
                        step.outcome = OutcomeKind::Failed;
                        step.failure = Some(kind.label());
                        step.details = kind.details();
                    }
                    StepOutcome::Blocked(reason) => {
                        step.outcome = OutcomeKind::Blocked;
                        step.blocked_by = Some(reason.clone());
                    }
                }
                step
            })
            .collect();
        Self {
            scenario: run.scenario.clone(),
            passed: run.passed(),
            aborted: run.aborted,
            cancelled: run.cancelled,
            succeeded: run.success_count(),
            failed: run.failed_count(),
            blocked: run.blocked_count(),
            steps,
        }
    }
}

/// Reports for every scenario executed by one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct HarnessReport {
    pub passed: bool,
    pub runs: Vec<RunReport>,
}

impl HarnessReport {
    pub fn new(runs: Vec<RunReport>) -> Self {
        let passed = runs.iter().all(|run| run.passed);
        Self { passed, runs }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serialize run report")
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for run in &self.runs {
            render_run(&mut out, run);
        }
        let verdict = if self.passed { "PASSED" } else { "FAILED" };
        let _ = writeln!(out, "overall: {verdict}");
        out
    }
}

fn render_run(out: &mut String, run: &RunReport) {
    let verdict = if run.passed { "passed" } else { "FAILED" };
    let _ = write!(
        out,
        "scenario {}: {verdict} ({} succeeded, {} failed, {} blocked",
        run.scenario, run.succeeded, run.failed, run.blocked
    );
    if run.aborted {
        out.push_str(", aborted");
    }
    if run.cancelled {
        out.push_str(", cancelled");
    }
    out.push_str(")\n");

    for step in &run.steps {
        let label = match step.outcome {
            OutcomeKind::Success => "ok",
            OutcomeKind::Failed => "FAILED",
            OutcomeKind::Blocked => "BLOCKED",
        };
        let _ = write!(out, "  {label:<8} {} [{}]", step.name, step.operation);
        if let Some(status) = step.status {
            let _ = write!(out, " status={status}");
        }
        if let Some(failure) = step.failure {
            let _ = write!(out, " {failure}");
        }
        match &step.blocked_by {
            Some(BlockReason::Prerequisite(name)) => {
                let _ = write!(out, " (needs {name})");
            }
            Some(BlockReason::Aborted) => out.push_str(" (run aborted)"),
            Some(BlockReason::Cancelled) => out.push_str(" (run cancelled)"),
            None => {}
        }
        if step.outcome != OutcomeKind::Blocked {
            let _ = write!(out, " {}ms", step.duration_ms);
        }
        out.push('\n');
        for detail in &step.details {
            let _ = writeln!(out, "           {detail}");
        }
    }
}
