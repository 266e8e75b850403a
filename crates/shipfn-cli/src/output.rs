//! Rendering of run, plan and status results as text or JSON.

use std::fmt::Write;

use clap::ValueEnum;
use serde::Serialize;
use shipfn_core::{ErrorKind, RunReport};
use shipfn_rollout::{Phase, PlanReport, PublishError, StatusReport};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Result of deploying one config file.
#[derive(Debug, Serialize)]
pub struct DeployOutcome {
    pub config: String,
    #[serde(flatten)]
    pub result: Outcome,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Deployed { report: RunReport },
    Failed { error: Failure },
}

#[derive(Debug, Serialize)]
pub struct Failure {
    pub kind: Option<ErrorKind>,
    pub phase: Option<Phase>,
    pub message: String,
}

impl Failure {
    pub fn from_error(err: &anyhow::Error) -> Self {
        let publish = err.downcast_ref::<PublishError>();
        Self {
            kind: publish.map(|e| e.kind),
            phase: publish.map(|e| e.phase),
            message: format!("{err:#}"),
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn outcome_text(outcome: &DeployOutcome) -> String {
    match &outcome.result {
        Outcome::Deployed { report } => report_text(report),
        Outcome::Failed { error } => format!("✗ {}: {}\n", outcome.config, error.message),
    }
}

pub fn report_text(report: &RunReport) -> String {
    let mut out = String::new();
    if report.is_noop() {
        let _ = writeln!(out, "✓ {}: no changes detected", report.function);
    } else {
        let _ = writeln!(out, "✓ {}: published {}", report.function, report.change_set);
    }
    let _ = writeln!(
        out,
        "  Function version: {} ({})",
        report.function_version.as_deref().unwrap_or("-"),
        report.code.as_str()
    );
    let _ = writeln!(
        out,
        "  Layer version:    {} ({})",
        report
            .layer
            .as_ref()
            .map(|l| l.version.to_string())
            .unwrap_or_else(|| "-".to_string()),
        report.dependencies.as_str()
    );
    let _ = writeln!(out, "  Code artifact:    {}", report.code_key);
    let _ = writeln!(out, "  Deps artifact:    {}", report.deps_key);
    let _ = writeln!(
        out,
        "  Alias:            {} -> {}",
        report.alias,
        report.alias_target.as_deref().unwrap_or("-")
    );
    if !report.is_noop() {
        let _ = writeln!(out, "  Version label:    {}", report.version_label);
    }
    out
}

pub fn plan_text(plan: &PlanReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}: {}", plan.function, plan.change_set);
    let _ = writeln!(out, "  Source fingerprint:     {}", plan.fingerprints.source);
    let _ = writeln!(out, "  Dependency fingerprint: {}", plan.fingerprints.dependencies);
    let _ = writeln!(out, "  Runtime:                {}", plan.fingerprints.runtime);
    match &plan.last {
        Some(last) => {
            let _ = writeln!(
                out,
                "  Last deployment:        version {} (layer {})",
                last.function_version, last.layer.version
            );
        }
        None => {
            let _ = writeln!(out, "  Last deployment:        none");
        }
    }
    if plan.change_set.code_changed() {
        let _ = writeln!(out, "  Code:  {} ({})", plan.code_key, cached(plan.code_cached));
    }
    if plan.change_set.deps_changed() {
        let _ = writeln!(out, "  Deps:  {} ({})", plan.deps_key, cached(plan.deps_cached));
    }
    out
}

fn cached(hit: bool) -> &'static str {
    if hit { "cached" } else { "build" }
}

pub fn status_text(status: &StatusReport) -> String {
    let mut out = String::new();
    if !status.exists {
        let _ = writeln!(out, "{}: not deployed", status.function);
        return out;
    }
    let _ = writeln!(out, "{}", status.function);
    if let Some(runtime) = &status.runtime {
        let _ = writeln!(out, "  Runtime:  {runtime}");
    }
    for layer in &status.layers {
        let _ = writeln!(out, "  Layer:    {layer}");
    }
    let _ = writeln!(
        out,
        "  Alias:    {} -> {}",
        status.alias,
        status.alias_target.as_deref().unwrap_or("-")
    );
    match &status.record {
        Some(record) => {
            let _ = writeln!(
                out,
                "  Record:   version {} label {} (source {}, deps {})",
                record.function_version,
                record.version_label,
                record.source.short(),
                record.dependencies.short()
            );
            if !status.in_sync() {
                let _ = writeln!(
                    out,
                    "  Warning:  alias does not serve the recorded version and layer"
                );
            }
        }
        None => {
            let _ = writeln!(out, "  Record:   none");
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipfn_core::{
        ArtifactState, ChangeSet, DependencyFingerprint, Fingerprints, LayerRef, Runtime,
        SourceFingerprint,
    };

    fn report(change_set: ChangeSet) -> RunReport {
        RunReport {
            function: "orders".into(),
            change_set,
            code: ArtifactState::from_changed(change_set.code_changed()),
            dependencies: ArtifactState::from_changed(change_set.deps_changed()),
            fingerprints: Fingerprints {
                source: SourceFingerprint("a".repeat(64)),
                dependencies: DependencyFingerprint("b".repeat(64)),
                runtime: Runtime::parse("python3.9").unwrap(),
            },
            code_key: "lambda-ci/orders/code/aaa.zip".into(),
            deps_key: "lambda-ci/orders/deps/python3.9/bbb.zip".into(),
            function_version: Some("8".into()),
            layer: Some(LayerRef {
                version: 3,
                arn: "arn:shipfn:local:layer:orders-deps:3".into(),
            }),
            alias: "latest".into(),
            alias_target: Some("8".into()),
            version_label: "9F2C".into(),
            profile: None,
        }
    }

    #[test]
    fn text_report_lists_versions_and_states() {
        let text = report_text(&report(ChangeSet::CodeOnly));
        assert!(text.contains("published code"));
        assert!(text.contains("Function version: 8 (PUBLISHED)"));
        assert!(text.contains("Layer version:    3 (INTACT)"));
        assert!(text.contains("latest -> 8"));
        assert!(text.contains("9F2C"));
    }

    #[test]
    fn noop_report_says_so() {
        let text = report_text(&report(ChangeSet::Unchanged));
        assert!(text.contains("no changes detected"));
        assert!(!text.contains("Version label"));
    }

    #[test]
    fn status_text_warns_when_alias_drifted() {
        let report = report(ChangeSet::Both);
        let record = shipfn_core::DeploymentRecord {
            source: report.fingerprints.source.clone(),
            dependencies: report.fingerprints.dependencies.clone(),
            runtime: report.fingerprints.runtime.clone(),
            function_version: "8".into(),
            layer: report.layer.clone().unwrap(),
            version_label: "9F2C".into(),
            deployed_at: 1_700_000_000,
        };
        let mut status = StatusReport {
            function: "orders".into(),
            exists: true,
            runtime: Some(report.fingerprints.runtime.clone()),
            layers: vec![record.layer.arn.clone()],
            record: Some(record.clone()),
            alias: "latest".into(),
            alias_target: Some("8".into()),
            served_layers: vec![record.layer.arn.clone()],
        };
        let text = status_text(&status);
        assert!(text.contains("source aaaaaaaaaaaa, deps bbbbbbbbbbbb"), "{text}");
        assert!(!text.contains("Warning"));

        status.served_layers = vec!["arn:shipfn:local:layer:orders-deps:4".into()];
        assert!(status_text(&status).contains("Warning"));
    }

    #[test]
    fn json_outcome_is_tagged() {
        let outcome = DeployOutcome {
            config: "shipfn.toml".into(),
            result: Outcome::Failed {
                error: Failure {
                    kind: Some(ErrorKind::PartialDeployment),
                    phase: Some(Phase::ShiftAlias),
                    message: "alias not moved".into(),
                },
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["kind"], "partial_deployment");
        assert_eq!(json["error"]["phase"], "shift_alias");
    }
}
