//! Structural validation of scenarios.
//!
//! Everything that can be checked without the network is checked here, so a
//! broken scenario is rejected before its first request.
use super::artifacts::is_relative_artifact_path;
use super::vars::{referenced_value_vars, referenced_vars};
use super::{Expectation, ScenarioSpec, StepSpec, MAX_SETTLE_SECS};
use crate::api::BodyKind;
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// Validate a scenario whose variables are already merged with plan vars.
pub fn validate_scenario_spec(scenario: &ScenarioSpec) -> Result<()> {
    if scenario.id.trim().is_empty() {
        return Err(anyhow!("scenario id must not be empty"));
    }
    if scenario.steps.is_empty() {
        return Err(anyhow!("scenario {} has no steps", scenario.id));
    }
    let mut known_vars: BTreeSet<String> = scenario.vars.keys().cloned().collect();
    let mut seen = BTreeSet::new();
    // Transitive predecessors of each step seen so far.
    let mut ancestors: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    // Variable name -> latest earlier step capturing it.
    let mut captured_by: BTreeMap<&str, &str> = BTreeMap::new();
    for (idx, step) in scenario.steps.iter().enumerate() {
        let context = || format!("steps[{idx}] {:?}", step.name);
        validate_step(step, &seen, &known_vars).with_context(context)?;

        let mut reach = BTreeSet::new();
        for predecessor in &step.after {
            reach.insert(predecessor.as_str());
            if let Some(upstream) = ancestors.get(predecessor.as_str()) {
                reach.extend(upstream.iter().copied());
            }
        }
        for name in step_vars(step)? {
            if let Some(owner) = captured_by.get(name.as_str()) {
                if !reach.contains(owner) {
                    return Err(anyhow!(
                        "uses ${{{name}}} captured by {owner:?}, which is not among its predecessors"
                    )
                    .context(context()));
                }
            }
        }

        seen.insert(step.name.clone());
        known_vars.extend(step.capture.keys().cloned());
        ancestors.insert(step.name.as_str(), reach);
        for name in step.capture.keys() {
            captured_by.insert(name.as_str(), step.name.as_str());
        }
    }
    Ok(())
}

/// Variables referenced by a step's bindings and expectations.
fn step_vars(step: &StepSpec) -> Result<Vec<String>> {
    let mut referenced = Vec::new();
    for value in step.path.values().chain(step.query.values()) {
        referenced.extend(referenced_vars(value)?);
    }
    if let Some(body) = step.body.as_ref() {
        referenced.extend(referenced_value_vars(body)?);
    }
    for expectation in &step.expect {
        if let Expectation::Equals { value, .. } = expectation {
            referenced.extend(referenced_value_vars(value)?);
        }
    }
    Ok(referenced)
}

fn validate_step(
    step: &StepSpec,
    earlier: &BTreeSet<String>,
    known_vars: &BTreeSet<String>,
) -> Result<()> {
    if step.name.trim().is_empty() {
        return Err(anyhow!("step name must not be empty"));
    }
    if earlier.contains(&step.name) {
        return Err(anyhow!("duplicate step name"));
    }
    for predecessor in &step.after {
        if predecessor == &step.name {
            return Err(anyhow!("step lists itself in after"));
        }
        if !earlier.contains(predecessor) {
            return Err(anyhow!(
                "after references {predecessor:?}, which is not an earlier step"
            ));
        }
    }

    let operation = step.operation.operation();
    let path_params = operation.path_params();
    for name in step.path.keys() {
        if !path_params.contains(&name.as_str()) {
            return Err(anyhow!(
                "{} has no path parameter {name:?}",
                operation.name
            ));
        }
    }
    for name in &path_params {
        match step.path.get(*name) {
            Some(value) if !value.trim().is_empty() => {}
            _ => {
                return Err(anyhow!(
                    "{} requires path parameter {name:?}",
                    operation.name
                ))
            }
        }
    }
    for name in step.query.keys() {
        if !operation.query_params.contains(&name.as_str()) {
            return Err(anyhow!(
                "{} does not declare query parameter {name:?} (declared: {:?})",
                operation.name,
                operation.query_params
            ));
        }
    }

    let has_body = step.body.is_some() || !step.artifacts.is_empty();
    match operation.body {
        BodyKind::None if has_body => {
            return Err(anyhow!("{} does not accept a body", operation.name));
        }
        BodyKind::None | BodyKind::Json => {}
        _ if !has_body => {
            return Err(anyhow!("{} requires a body", operation.name));
        }
        _ => {}
    }
    if let Some(body) = step.body.as_ref() {
        if !body.is_object() {
            return Err(anyhow!("body must be a JSON object"));
        }
    }
    for (pointer, artifact) in &step.artifacts {
        validate_pointer(pointer, "artifact pointer")?;
        if pointer.is_empty() {
            return Err(anyhow!("artifact pointer must name a field"));
        }
        if !is_relative_artifact_path(&artifact.path) {
            return Err(anyhow!(
                "artifact paths must be relative without '..' (got {:?})",
                artifact.path
            ));
        }
    }

    if let Some(settle) = step.settle.as_ref() {
        if !settle.seconds.is_finite() || settle.seconds < 0.0 {
            return Err(anyhow!(
                "settle.seconds must be a finite, non-negative number"
            ));
        }
        if settle.seconds > f64::from(MAX_SETTLE_SECS) {
            return Err(anyhow!(
                "settle.seconds {} exceeds the {MAX_SETTLE_SECS}s limit",
                settle.seconds
            ));
        }
        if settle.reason.trim().is_empty() {
            return Err(anyhow!("settle.reason must explain the wait"));
        }
    }

    for expectation in &step.expect {
        validate_expectation(expectation)?;
    }
    for (name, pointer) in &step.capture {
        if name.trim().is_empty() {
            return Err(anyhow!("capture variable names must not be empty"));
        }
        validate_pointer(pointer, "capture pointer")?;
    }

    for name in step_vars(step)? {
        if !known_vars.contains(&name) {
            return Err(anyhow!("unknown variable ${{{name}}}"));
        }
    }
    Ok(())
}

fn validate_expectation(expectation: &Expectation) -> Result<()> {
    match expectation {
        Expectation::Equals { path, .. } | Expectation::Present { path } => {
            validate_pointer(path, "expect path")
        }
        Expectation::Matches { path, pattern } => {
            validate_pointer(path, "expect path")?;
            Regex::new(pattern).with_context(|| format!("invalid regex {pattern:?}"))?;
            Ok(())
        }
        Expectation::ErrorStatus { status } | Expectation::HttpStatus { status } => {
            if !(100..=599).contains(status) {
                return Err(anyhow!("status {status} is not an HTTP status code"));
            }
            Ok(())
        }
    }
}

fn validate_pointer(pointer: &str, label: &str) -> Result<()> {
    if !pointer.is_empty() && !pointer.starts_with('/') {
        return Err(anyhow!(
            "{label} must be a JSON pointer starting with '/' (got {pointer:?})"
        ));
    }
    Ok(())
}
