//! Scenario plans: declarative, ordered lists of API steps.
//!
//! Plans describe what to call and what to expect; the sequencer in
//! [`crate::run`] decides whether and when each step executes.
const SCENARIO_PLAN_SCHEMA_VERSION: u32 = 1;

mod artifacts;
mod plan;
mod types;
mod validate;
mod vars;

pub use artifacts::{
    load_artifact, place_at_pointer, splice_artifacts, ArtifactError, ArtifactRoots,
};
pub use plan::{
    builtin_plan, effective_scenario, load_plan, plan_stub, resolve_plan, select_scenarios,
    validate_plan, BUILTIN_PLAN,
};
pub use types::*;
pub use validate::validate_scenario_spec;
pub use vars::{substitute, substitute_value, VarError};
