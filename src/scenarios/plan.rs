//! Scenario plan loading and validation.
//!
//! Plans are strictly validated so every scenario is known to be runnable
//! before any request is sent.
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use super::validate::validate_scenario_spec;
use super::{ScenarioPlan, ScenarioSpec, SCENARIO_PLAN_SCHEMA_VERSION};

/// Built-in plan covering channel bootstrap and the fabcar sample checks.
pub const BUILTIN_PLAN: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/scenarios/plan.json"
));

/// Load and validate a scenario plan from disk.
pub fn load_plan(path: &Path) -> Result<ScenarioPlan> {
    let bytes =
        fs::read(path).with_context(|| format!("read scenarios plan {}", path.display()))?;
    let plan: ScenarioPlan = serde_json::from_slice(&bytes).context("parse scenarios plan JSON")?;
    validate_plan(&plan)?;
    Ok(plan)
}

/// Parse and validate the plan compiled into the binary.
pub fn builtin_plan() -> Result<ScenarioPlan> {
    let plan: ScenarioPlan =
        serde_json::from_str(BUILTIN_PLAN).context("parse built-in scenarios plan")?;
    validate_plan(&plan)?;
    Ok(plan)
}

/// Load `path` when given, otherwise the built-in plan.
pub fn resolve_plan(path: Option<&Path>) -> Result<ScenarioPlan> {
    match path {
        Some(path) => load_plan(path),
        None => builtin_plan(),
    }
}

/// Pretty JSON of the built-in plan, used as a starting point for edits.
pub fn plan_stub() -> String {
    BUILTIN_PLAN.to_string()
}

/// Validate a scenario plan against the schema.
pub fn validate_plan(plan: &ScenarioPlan) -> Result<()> {
    if plan.schema_version != SCENARIO_PLAN_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported scenarios plan schema_version {}",
            plan.schema_version
        ));
    }
    if plan.scenarios.is_empty() {
        return Err(anyhow!("scenarios plan contains no scenarios"));
    }
    let mut scenario_ids = BTreeSet::new();
    for scenario in &plan.scenarios {
        let effective = effective_scenario(plan, scenario);
        validate_scenario_spec(&effective)
            .with_context(|| format!("validate scenario {}", scenario.id))?;
        if !scenario_ids.insert(scenario.id.clone()) {
            return Err(anyhow!("duplicate scenario id {}", scenario.id));
        }
    }
    Ok(())
}

/// Scenario with plan-level vars merged underneath its own.
pub fn effective_scenario(plan: &ScenarioPlan, scenario: &ScenarioSpec) -> ScenarioSpec {
    let mut effective = scenario.clone();
    let mut vars = plan.vars.clone();
    vars.extend(scenario.vars.clone());
    effective.vars = vars;
    effective
}

/// Pick scenarios by id, in the order requested; all of them when `ids` is empty.
pub fn select_scenarios(plan: &ScenarioPlan, ids: &[String]) -> Result<Vec<ScenarioSpec>> {
    if ids.is_empty() {
        return Ok(plan
            .scenarios
            .iter()
            .map(|scenario| effective_scenario(plan, scenario))
            .collect());
    }
    ids.iter()
        .map(|id| {
            let scenario = plan.scenario(id).ok_or_else(|| {
                let known: Vec<&str> = plan.scenarios.iter().map(|s| s.id.as_str()).collect();
                anyhow!("unknown scenario {id:?} (known: {})", known.join(", "))
            })?;
            Ok(effective_scenario(plan, scenario))
        })
        .collect()
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
