use anyhow::{anyhow, Context, Result};
use clap::Parser;
use fabric_rest_harness::api::HttpClient;
use fabric_rest_harness::cli::{Command, InitArgs, ListArgs, RootArgs, RunArgs};
use fabric_rest_harness::config::resolve_config;
use fabric_rest_harness::report::{HarnessReport, RunReport};
use fabric_rest_harness::run::{spawn_deadline, AbortPolicy, CancelToken, Sequencer, SystemClock};
use fabric_rest_harness::scenarios::{plan_stub, resolve_plan, select_scenarios};
use std::fs;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_tracing(args.verbose);

    let result = match args.command {
        Command::Run(args) => run_command(&args),
        Command::List(args) => list_command(&args).map(|()| true),
        Command::Init(args) => init_command(&args).map(|()| true),
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

/// Logs go to stderr; stdout carries only the report.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_command(args: &RunArgs) -> Result<bool> {
    let config = resolve_config(args)?;
    let plan = resolve_plan(args.plan.as_deref())?;
    let scenarios = select_scenarios(&plan, &args.scenarios)?;

    let client = HttpClient::new(config.client.clone());
    let cancel = CancelToken::new();
    if let Some(deadline) = config.deadline {
        let _watchdog = spawn_deadline(cancel.clone(), deadline);
    }
    let clock = SystemClock;
    let sequencer = Sequencer::new(&client, &clock, config.artifacts.clone())
        .with_policy(config.policy)
        .with_cancel(cancel);

    let mut reports = Vec::new();
    for (idx, scenario) in scenarios.iter().enumerate() {
        let run = sequencer.run(scenario)?;
        let stop = !run.passed() && config.policy == AbortPolicy::StopOnFirstFailure;
        reports.push(RunReport::from_run(&run));
        if stop && idx + 1 < scenarios.len() {
            let skipped: Vec<&str> = scenarios[idx + 1..].iter().map(|s| s.id.as_str()).collect();
            tracing::warn!(skipped = ?skipped, "skipping remaining scenarios after failure");
            break;
        }
    }

    let report = HarnessReport::new(reports);
    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.to_text());
    }
    Ok(report.passed)
}

fn list_command(args: &ListArgs) -> Result<()> {
    let plan = resolve_plan(args.plan.as_deref())?;
    for scenario in &plan.scenarios {
        match scenario.description.as_deref() {
            Some(description) => println!("{}: {description}", scenario.id),
            None => println!("{}", scenario.id),
        }
        for step in &scenario.steps {
            let mut line = format!("  {} [{}]", step.name, step.operation);
            if !step.after.is_empty() {
                line.push_str(&format!(" after {}", step.after.join(", ")));
            }
            if let Some(settle) = step.settle.as_ref() {
                line.push_str(&format!(" settle {}s", settle.seconds));
            }
            println!("{line}");
        }
    }
    Ok(())
}

fn init_command(args: &InitArgs) -> Result<()> {
    if args.out.exists() && !args.force {
        return Err(anyhow!(
            "plan already exists at {} (use --force to overwrite)",
            args.out.display()
        ));
    }
    if let Some(parent) = args.out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(&args.out, plan_stub())
        .with_context(|| format!("write {}", args.out.display()))?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}
