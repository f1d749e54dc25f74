//! JSON schema types for scenario plans.
//!
//! A plan is pure data: scenario variants differ only in the steps they list,
//! never in code.
use crate::api::OperationId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Scenario plan file (`scenarios/plan.json`).
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScenarioPlan {
    pub schema_version: u32,
    /// Variables visible to every scenario; scenario vars take precedence.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, String>,
    #[serde(default)]
    pub scenarios: Vec<ScenarioSpec>,
}

impl ScenarioPlan {
    pub fn scenario(&self, id: &str) -> Option<&ScenarioSpec> {
        self.scenarios.iter().find(|scenario| scenario.id == id)
    }
}

/// Named, ordered list of steps.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ScenarioSpec {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, String>,
    pub steps: Vec<StepSpec>,
}

/// One API call with its prerequisites and expectations.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StepSpec {
    pub name: String,
    pub operation: OperationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Steps that must have succeeded before this one runs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle: Option<SettleSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub path: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub query: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    /// Files spliced into the body, keyed by JSON pointer.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub artifacts: BTreeMap<String, ArtifactRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expect: Vec<Expectation>,
    /// Run variables set from the response, keyed by variable name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub capture: BTreeMap<String, String>,
}

/// Longest settle a plan may ask for.
pub const MAX_SETTLE_SECS: u32 = 3600;

/// Wait applied after a step succeeds.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SettleSpec {
    pub seconds: f64,
    pub reason: String,
}

impl SettleSpec {
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.seconds)
            .unwrap_or(Duration::ZERO)
            .min(Duration::from_secs(u64::from(MAX_SETTLE_SECS)))
    }
}

/// Directory an artifact path is resolved against.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactRoot {
    /// Fabric samples checkout (channel configs, crypto material).
    Samples,
    /// Local input directory (chaincode archives).
    Inputs,
}

/// How file bytes are turned into a JSON string.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactEncoding {
    Base64,
    /// UTF-8 text with line breaks removed.
    PemSingleLine,
}

/// Reference to an on-disk artifact, passed through unmodified.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ArtifactRef {
    pub root: ArtifactRoot,
    pub path: String,
    pub encoding: ArtifactEncoding,
}

/// Check applied to a decoded response. Paths are JSON pointers.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expectation {
    Equals { path: String, value: Value },
    Present { path: String },
    /// Compares `/error/statusCode` in a structured error body.
    ErrorStatus { status: u16 },
    HttpStatus { status: u16 },
    Matches { path: String, pattern: String },
}
