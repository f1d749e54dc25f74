//! Runner configuration.
//!
//! Resolves CLI flags plus environment into everything a run needs. The
//! environment is read through a lookup function so resolution stays
//! deterministic under test.
use crate::api::{Credentials, HttpClientConfig};
use crate::cli::RunArgs;
use crate::run::AbortPolicy;
use crate::scenarios::ArtifactRoots;
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root of the fabric-samples checkout holding channel and crypto material.
pub const SAMPLES_DIR_ENV: &str = "FABRIC_SAMPLES_DIR";
pub const DEFAULT_SAMPLES_DIR: &str = "../../fabric-samples";
pub const USER_ENV: &str = "FABRIC_REST_USER";
pub const PASSWORD_ENV: &str = "FABRIC_REST_PASSWORD";

/// Everything needed to execute scenarios against one server.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub client: HttpClientConfig,
    pub artifacts: ArtifactRoots,
    pub policy: AbortPolicy,
    pub deadline: Option<Duration>,
}

/// Resolve config from CLI args and the process environment.
pub fn resolve_config(args: &RunArgs) -> Result<RunnerConfig> {
    resolve_config_with(args, |name| std::env::var(name).ok())
}

/// Resolve config from CLI args and an injected environment lookup.
pub fn resolve_config_with<F>(args: &RunArgs, env: F) -> Result<RunnerConfig>
where
    F: Fn(&str) -> Option<String>,
{
    if args.hostname.trim().is_empty() {
        return Err(anyhow!("--hostname must not be empty"));
    }
    if args.port == 0 {
        return Err(anyhow!("--port must be between 1 and 65535"));
    }
    if args.timeout_secs == 0 {
        return Err(anyhow!("--timeout-secs must be positive"));
    }
    if !args.api_root.starts_with('/') {
        return Err(anyhow!(
            "--api-root must start with '/' (got {:?})",
            args.api_root
        ));
    }

    let mut client = HttpClientConfig::new(&args.hostname, args.port, args.tls, &args.api_root);
    client.timeout = Duration::from_secs(args.timeout_secs);
    client.credentials = resolve_credentials(args.credentials.as_deref(), &env)?;

    let samples = env(SAMPLES_DIR_ENV)
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SAMPLES_DIR));
    tracing::debug!(
        samples = %samples.display(),
        inputs = %args.input_dir.display(),
        base_url = %client.base_url,
        "resolved runner config"
    );

    Ok(RunnerConfig {
        client,
        artifacts: ArtifactRoots::new(samples, args.input_dir.clone()),
        policy: if args.fail_fast {
            AbortPolicy::StopOnFirstFailure
        } else {
            AbortPolicy::Continue
        },
        deadline: args.deadline_secs.map(Duration::from_secs),
    })
}

/// Load a `{"username": ..., "password": ...}` credentials file.
pub fn load_credentials(path: &Path) -> Result<Credentials> {
    let bytes =
        fs::read(path).with_context(|| format!("read credentials {}", path.display()))?;
    let credentials: Credentials = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse credentials {}", path.display()))?;
    Ok(credentials)
}

fn resolve_credentials<F>(file: Option<&Path>, env: &F) -> Result<Option<Credentials>>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = file {
        return load_credentials(path).map(Some);
    }
    match (env(USER_ENV), env(PASSWORD_ENV)) {
        (Some(username), Some(password)) => Ok(Some(Credentials::new(username, password))),
        (None, None) => {
            tracing::warn!(
                "no credentials configured ({USER_ENV}/{PASSWORD_ENV} or --credentials); requests are unauthenticated"
            );
            Ok(None)
        }
        _ => Err(anyhow!(
            "{USER_ENV} and {PASSWORD_ENV} must be set together"
        )),
    }
}
