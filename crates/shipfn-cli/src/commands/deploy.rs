//! `shipfn deploy`: one publisher run per config file, concurrently.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use shipfn_core::{DeployConfig, ErrorKind};
use shipfn_platform::LocalPlatform;
use shipfn_rollout::PublishError;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

use super::{Overrides, load_config, open_platform, publisher};
use crate::output::{self, DeployOutcome, Failure, Outcome, OutputFormat};

pub async fn deploy(
    paths: &[PathBuf],
    overrides: &Overrides,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    // Config errors abort before anything runs.
    let configs = paths
        .iter()
        .map(|path| load_config(path, overrides))
        .collect::<anyhow::Result<Vec<_>>>()?;

    // Functions sharing a platform state file share one handle.
    let mut platforms: HashMap<PathBuf, Arc<LocalPlatform>> = HashMap::new();
    for config in &configs {
        if !platforms.contains_key(&config.platform_state) {
            platforms.insert(config.platform_state.clone(), open_platform(config)?);
        }
    }
    let platforms = Arc::new(platforms);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping at the next step boundary");
            let _ = cancel_tx.send(true);
        }
    });

    let jobs = paths
        .iter()
        .map(|p| p.display().to_string())
        .zip(configs)
        .collect();
    let results = run_concurrently(jobs, cancel_rx, move |config, cancel| {
        let platform = platforms
            .get(&config.platform_state)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no platform opened for {}", config.function))?;
        Ok(publisher(&config, platform, Some(cancel)).run(&config)?)
    })
    .await;

    let mut codes = Vec::new();
    let mut outcomes = Vec::with_capacity(results.len());
    for (config, result) in results {
        let result = match result {
            Ok(report) => Outcome::Deployed { report },
            Err(err) => {
                codes.push(failure_code(&err));
                Outcome::Failed {
                    error: Failure::from_error(&err),
                }
            }
        };
        outcomes.push(DeployOutcome { config, result });
    }

    match format {
        OutputFormat::Json => output::print_json(&outcomes)?,
        OutputFormat::Text => {
            for outcome in &outcomes {
                match &outcome.result {
                    Outcome::Deployed { .. } => print!("{}", output::outcome_text(outcome)),
                    Outcome::Failed { .. } => eprint!("{}", output::outcome_text(outcome)),
                }
            }
        }
    }

    info!(
        functions = outcomes.len(),
        failed = outcomes
            .iter()
            .filter(|o| matches!(o.result, Outcome::Failed { .. }))
            .count(),
        "deploy finished"
    );
    Ok(ExitCode::from(overall_exit(codes)))
}

/// Exit status for the whole deploy: a partial deployment anywhere wins,
/// since a published version is waiting for its alias; otherwise the first
/// failure's code.
fn overall_exit(codes: impl IntoIterator<Item = u8>) -> u8 {
    let partial = ErrorKind::PartialDeployment.exit_code().clamp(1, 255) as u8;
    let mut first = 0;
    for code in codes {
        if code == partial {
            return partial;
        }
        if first == 0 {
            first = code;
        }
    }
    first
}

fn failure_code(err: &anyhow::Error) -> u8 {
    let kind = err
        .downcast_ref::<PublishError>()
        .map(|e| e.kind)
        .unwrap_or(ErrorKind::PlatformUnavailable);
    kind.exit_code().clamp(1, 255) as u8
}

/// Run `job` for every config on the blocking pool and collect the results
/// in input order.
///
/// Each run gets its own clone of `cancel`, so one interrupt stops every run
/// at its next step boundary.
pub async fn run_concurrently<T, F>(
    jobs: Vec<(String, DeployConfig)>,
    cancel: watch::Receiver<bool>,
    job: F,
) -> Vec<(String, anyhow::Result<T>)>
where
    T: Send + 'static,
    F: Fn(DeployConfig, watch::Receiver<bool>) -> anyhow::Result<T> + Send + Sync + 'static,
{
    let job = Arc::new(job);
    let mut set = JoinSet::new();
    let mut labels = Vec::with_capacity(jobs.len());

    for (idx, (label, config)) in jobs.into_iter().enumerate() {
        labels.push(label);
        let job = Arc::clone(&job);
        let cancel = cancel.clone();
        set.spawn_blocking(move || (idx, job(config, cancel)));
    }

    let mut slots: Vec<Option<anyhow::Result<T>>> = labels.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((idx, result)) => slots[idx] = Some(result),
            Err(e) => warn!(error = %e, "deploy task did not complete"),
        }
    }

    labels
        .into_iter()
        .zip(slots)
        .map(|(label, slot)| {
            let result =
                slot.unwrap_or_else(|| Err(anyhow::anyhow!("deploy task for {label} panicked")));
            (label, result)
        })
        .collect()
}
