//! CLI argument parsing for the harness.
//!
//! The CLI only wires flags into [`crate::config`] and the sequencer; all
//! ordering and assertion policy lives in the scenario plan.
use crate::api::DEFAULT_API_ROOT;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "fabric-harness",
    version,
    about = "Sequenced bootstrap and verification harness for the Fabric REST API",
    after_help = "Examples:\n  fabric-harness list\n  fabric-harness run --scenario channel-setup --scenario fabcar\n  fabric-harness run --hostname rest.example --port 3000 --tls --fail-fast\n  fabric-harness init --out plan.json",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    /// Log debug detail (request lines, settle waits) to stderr
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    List(ListArgs),
    Init(InitArgs),
}

/// Run command inputs.
#[derive(Parser, Debug, Clone)]
#[command(about = "Run scenarios against a REST server")]
pub struct RunArgs {
    /// Server hostname
    #[arg(long, default_value = "localhost")]
    pub hostname: String,

    /// Server port
    #[arg(long, default_value_t = 3000)]
    pub port: u16,

    /// Connect over https
    #[arg(long)]
    pub tls: bool,

    /// Mount point of the REST API on the server
    #[arg(long, value_name = "PATH", default_value = DEFAULT_API_ROOT)]
    pub api_root: String,

    /// Scenario to run (repeatable; defaults to every scenario in plan order)
    #[arg(long = "scenario", value_name = "NAME")]
    pub scenarios: Vec<String>,

    /// Scenario plan JSON (defaults to the built-in plan)
    #[arg(long, value_name = "FILE")]
    pub plan: Option<PathBuf>,

    /// Directory holding chaincode archives referenced as `inputs`
    #[arg(long, value_name = "DIR", default_value = "input")]
    pub input_dir: PathBuf,

    /// JSON file with `username` and `password` for basic auth
    #[arg(long, value_name = "FILE")]
    pub credentials: Option<PathBuf>,

    /// Block every remaining step after the first failure
    #[arg(long)]
    pub fail_fast: bool,

    /// Emit the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Cancel the run after this many seconds
    #[arg(long, value_name = "SECS")]
    pub deadline_secs: Option<u64>,

    /// Per-request timeout
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout_secs: u64,
}

/// List command inputs.
#[derive(Parser, Debug, Clone)]
#[command(about = "List scenarios and their steps")]
pub struct ListArgs {
    /// Scenario plan JSON (defaults to the built-in plan)
    #[arg(long, value_name = "FILE")]
    pub plan: Option<PathBuf>,
}

/// Init command inputs.
#[derive(Parser, Debug, Clone)]
#[command(about = "Write the built-in scenario plan to a file for editing")]
pub struct InitArgs {
    /// Output path for the plan JSON
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}
