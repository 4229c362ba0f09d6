//! CLI commands implementation

use anyhow::{Context, Result};
use homelab_core::LabConfig;
use homelab_network::{HttpProbe, StaticProbe};
use homelab_runtime::{CommandRunner, CommandSpec, LocalRunner, ScriptedRunner, SshRunner};
use homelab_scheduler::{RunReport, Scheduler, Step, StepOutcome};
use homelab_steps::{build_pipeline, lab_outputs, LabOutputs, Runners};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::OutputFormat;

/// Per-request timeout for the Ollama readiness probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Programs the pipeline shells out to
const REQUIRED_TOOLS: [&str; 7] = [
    "brew", "ssh", "colima", "docker", "k3d", "kubectl", "ollama",
];

/// Runners for a real run, plus the recorder when dry-running
struct Backend {
    runners: Runners,
    recorder: Option<Arc<ScriptedRunner>>,
}

impl Backend {
    fn live(config: &LabConfig) -> Result<Self> {
        let local: Arc<dyn CommandRunner> = Arc::new(LocalRunner::default());
        let remote = Arc::new(SshRunner::new(
            config.nas.host.as_str(),
            config.nas.user.as_str(),
            local.clone(),
        ));
        let probe = Arc::new(HttpProbe::ollama_tags(&config.ollama.endpoint, PROBE_TIMEOUT)?);
        Ok(Self {
            runners: Runners::new(local, remote, probe),
            recorder: None,
        })
    }

    /// Remote commands are still wrapped in ssh so the recording shows them as executed
    fn dry_run(config: &LabConfig) -> Self {
        let recorder = Arc::new(ScriptedRunner::dry_run());
        let local: Arc<dyn CommandRunner> = recorder.clone();
        let remote = Arc::new(SshRunner::new(
            config.nas.host.as_str(),
            config.nas.user.as_str(),
            local.clone(),
        ));
        Self {
            runners: Runners::new(local, remote, Arc::new(StaticProbe(true))),
            recorder: Some(recorder),
        }
    }

    fn new(config: &LabConfig, dry_run: bool) -> Result<Self> {
        if dry_run {
            Ok(Self::dry_run(config))
        } else {
            Self::live(config)
        }
    }

    fn print_recorded(&self) {
        if let Some(recorder) = &self.recorder {
            println!("\nCommands (dry run):");
            for (i, call) in recorder.calls().iter().enumerate() {
                println!("  {:>3}. {}", i + 1, call);
            }
        }
    }
}

/// JSON result of `up`
#[derive(Serialize)]
struct UpSummary<'a> {
    success: bool,
    outputs: &'a LabOutputs,
    report: &'a RunReport,
}

/// Run the provisioning pipeline
pub async fn up(config: &LabConfig, dry_run: bool, output: OutputFormat) -> Result<()> {
    let backend = Backend::new(config, dry_run)?;
    let graph = build_pipeline(config, &backend.runners)?;
    let report = Scheduler::new().run(&graph).await?;
    let outputs = lab_outputs(&report);

    match output {
        OutputFormat::Json => {
            let summary = UpSummary {
                success: report.is_success(),
                outputs: &outputs,
                report: &report,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Text => {
            print_steps(&report);
            if !outputs.entries().is_empty() {
                println!("\nOutputs:");
                for (name, value) in outputs.entries() {
                    println!("  {:<18} {}", name, value);
                }
            }
            backend.print_recorded();
        }
    }

    if let Some(failed) = report.first_failure() {
        anyhow::bail!("Step '{}' failed", failed.id);
    }
    Ok(())
}

/// Tear the environment down in reverse order
pub async fn down(config: &LabConfig, dry_run: bool) -> Result<()> {
    let backend = Backend::new(config, dry_run)?;
    let graph = build_pipeline(config, &backend.runners)?;
    let report = Scheduler::new().teardown(&graph).await?;

    print_steps(&report);
    backend.print_recorded();

    let failed: Vec<&str> = report
        .steps
        .iter()
        .filter(|s| s.is_failed())
        .map(|s| s.id.as_str())
        .collect();
    if !failed.is_empty() {
        anyhow::bail!("Teardown failed for: {}", failed.join(", "));
    }
    Ok(())
}

/// Show the resolved configuration and execution order
pub fn plan(config: &LabConfig) -> Result<()> {
    // Nothing is executed while building the graph
    let backend = Backend::dry_run(config);
    let graph = build_pipeline(config, &backend.runners)?;

    println!("# Resolved configuration");
    println!("{}", config.to_toml()?);

    println!("# Execution order");
    for (i, step) in graph.execution_order()?.iter().enumerate() {
        let deps = graph.dependencies(step.id())?;
        let after = if deps.is_empty() {
            String::new()
        } else {
            format!(" (after {})", deps.join(", "))
        };
        println!("{}. {:<11} {}{}", i + 1, step.id(), step.describe(), after);
    }
    Ok(())
}

/// Check NAS connectivity and required tools
pub async fn check(config: &LabConfig) -> Result<()> {
    let local: Arc<dyn CommandRunner> = Arc::new(LocalRunner::default());

    println!("Configuration: ok");

    let mut missing = Vec::new();
    println!("\nTools:");
    for tool in REQUIRED_TOOLS {
        let found = local.program_exists(tool).await;
        println!("  {:<8} {}", tool, if found { "found" } else { "missing" });
        if !found {
            missing.push(tool);
        }
    }

    let ssh = SshRunner::new(config.nas.host.as_str(), config.nas.user.as_str(), local);
    let target = ssh.target();
    let reachable = ssh
        .run(&CommandSpec::new("echo").arg("ok"))
        .await
        .with_context(|| format!("Cannot connect to {}", target));

    println!("\nNAS:");
    match &reachable {
        Ok(_) => println!("  {:<8} reachable", target),
        Err(e) => println!("  {:<8} unreachable ({:#})", target, e),
    }

    // brew installs the rest during `up`
    if missing.contains(&"brew") || missing.contains(&"ssh") {
        anyhow::bail!("Required tools missing: {}", missing.join(", "));
    }
    reachable.map(|_| ())
}

fn print_steps(report: &RunReport) {
    println!("Run {}", report.run_id);
    for step in &report.steps {
        let (state, detail) = match &step.outcome {
            StepOutcome::Applied { .. } => ("applied", String::new()),
            StepOutcome::Removed => ("removed", String::new()),
            StepOutcome::Failed { error } => ("failed", error.clone()),
            StepOutcome::Skipped { reason } => ("skipped", reason.clone()),
        };
        println!("  {:<11} {:<8} {}", step.id, state, detail);
    }
}
