//! Main scheduler logic

use chrono::Utc;
use homelab_core::LabResult;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

use crate::graph::StepGraph;
use crate::report::{RunReport, StepOutcome, StepRecord};
use crate::step::Step;

/// Executes a step graph one step at a time in dependency order.
///
/// A step only starts after all of its predecessors applied successfully.
/// The first failure stops the run; remaining steps are recorded as skipped
/// and nothing already applied is undone.
#[derive(Debug, Default)]
pub struct Scheduler;

impl Scheduler {
    /// Create a new scheduler
    pub fn new() -> Self {
        Self
    }

    /// Apply every step in topological order
    pub async fn run(&self, graph: &StepGraph) -> LabResult<RunReport> {
        let order = graph.execution_order()?;
        let mut report = RunReport::new();
        let span = info_span!("run", run_id = %report.run_id);

        async {
            info!(steps = order.len(), "Starting provisioning run");

            let mut failed: Option<String> = None;
            for step in &order {
                if let Some(failed_id) = &failed {
                    report.steps.push(StepRecord::skipped(
                        step.id(),
                        format!("blocked by failed step '{}'", failed_id),
                    ));
                    continue;
                }

                let record = Self::apply_step(step).await;
                if record.is_failed() {
                    failed = Some(record.id.clone());
                }
                report.steps.push(record);
            }

            report.finished_at = Some(Utc::now());
            match &failed {
                Some(id) => error!(step = %id, "Provisioning run aborted"),
                None => info!("Provisioning run complete"),
            }
        }
        .instrument(span)
        .await;

        Ok(report)
    }

    async fn apply_step(step: &Arc<dyn Step>) -> StepRecord {
        let started_at = Utc::now();
        info!(step = %step.id(), description = %step.describe(), "Applying step");

        let outcome = match step.apply().await {
            Ok(outputs) => {
                info!(step = %step.id(), "Step applied");
                StepOutcome::Applied { outputs }
            }
            Err(e) => {
                error!(step = %step.id(), error = %e, "Step failed");
                StepOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        StepRecord {
            id: step.id().to_string(),
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
            outcome,
        }
    }

    /// Tear steps down in reverse topological order.
    ///
    /// Teardown failures are recorded and logged but do not stop the
    /// remaining teardowns.
    pub async fn teardown(&self, graph: &StepGraph) -> LabResult<RunReport> {
        let mut order = graph.execution_order()?;
        order.reverse();
        let mut report = RunReport::new();
        let span = info_span!("teardown", run_id = %report.run_id);

        async {
            for step in &order {
                if !step.has_teardown() {
                    report
                        .steps
                        .push(StepRecord::skipped(step.id(), "no teardown"));
                    continue;
                }

                let started_at = Utc::now();
                info!(step = %step.id(), "Tearing down step");
                let outcome = match step.teardown().await {
                    Ok(()) => StepOutcome::Removed,
                    Err(e) => {
                        warn!(step = %step.id(), error = %e, "Teardown failed; continuing");
                        StepOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                };
                report.steps.push(StepRecord {
                    id: step.id().to_string(),
                    started_at: Some(started_at),
                    finished_at: Some(Utc::now()),
                    outcome,
                });
            }
            report.finished_at = Some(Utc::now());
        }
        .instrument(span)
        .await;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use homelab_core::{LabError, StepOutputs};
    use std::sync::Mutex;

    /// Step that logs its lifecycle into a shared journal
    struct JournalStep {
        id: &'static str,
        fail: bool,
        journal: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Step for JournalStep {
        fn id(&self) -> &str {
            self.id
        }

        fn describe(&self) -> String {
            self.id.to_string()
        }

        async fn apply(&self) -> LabResult<StepOutputs> {
            self.journal.lock().unwrap().push(format!("apply {}", self.id));
            if self.fail {
                return Err(LabError::Mutation(format!("{} exploded", self.id)));
            }
            Ok(StepOutputs::new().with("status", "ok"))
        }

        fn has_teardown(&self) -> bool {
            self.id != "export"
        }

        async fn teardown(&self) -> LabResult<()> {
            self.journal.lock().unwrap().push(format!("teardown {}", self.id));
            if self.fail {
                return Err(LabError::Mutation("cannot undo".to_string()));
            }
            Ok(())
        }
    }

    fn build(failing: &str, journal: &Arc<Mutex<Vec<String>>>) -> StepGraph {
        let make = |id: &'static str| -> Arc<dyn Step> {
            Arc::new(JournalStep {
                id,
                fail: id == failing,
                journal: journal.clone(),
            })
        };
        let mut graph = StepGraph::new();
        graph.add_step(make("export")).unwrap();
        graph.add_step_after(make("mount"), &["export"]).unwrap();
        graph.add_step_after(make("runtime"), &["mount"]).unwrap();
        graph.add_step_after(make("cluster"), &["runtime"]).unwrap();
        graph.add_step_after(make("model"), &["runtime"]).unwrap();
        graph
    }

    #[tokio::test]
    async fn test_run_applies_in_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let graph = build("", &journal);

        let report = Scheduler::new().run(&graph).await.unwrap();

        assert!(report.is_success());
        assert!(report.finished_at.is_some());
        assert_eq!(report.output("model", "status"), Some("ok"));
        assert_eq!(
            *journal.lock().unwrap(),
            vec![
                "apply export",
                "apply mount",
                "apply runtime",
                "apply cluster",
                "apply model"
            ]
        );
    }

    #[tokio::test]
    async fn test_failure_skips_remaining_steps() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let graph = build("mount", &journal);

        let report = Scheduler::new().run(&graph).await.unwrap();

        assert!(!report.is_success());
        let failure = report.first_failure().unwrap();
        assert_eq!(failure.id, "mount");
        assert_eq!(
            failure.outcome,
            StepOutcome::Failed {
                error: "Mutation failed: mount exploded".to_string()
            }
        );
        assert_eq!(report.output("export", "status"), Some("ok"));
        for id in ["runtime", "cluster", "model"] {
            let record = report.steps.iter().find(|s| s.id == id).unwrap();
            assert!(matches!(record.outcome, StepOutcome::Skipped { .. }));
        }
        assert_eq!(*journal.lock().unwrap(), vec!["apply export", "apply mount"]);
    }

    #[tokio::test]
    async fn test_teardown_runs_in_reverse_and_continues() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let graph = build("cluster", &journal);

        let report = Scheduler::new().teardown(&graph).await.unwrap();

        assert_eq!(
            *journal.lock().unwrap(),
            vec![
                "teardown model",
                "teardown cluster",
                "teardown runtime",
                "teardown mount"
            ]
        );
        let ids: Vec<&str> = report.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["model", "cluster", "runtime", "mount", "export"]);
        assert!(report.steps[1].is_failed());
        assert!(matches!(report.steps[4].outcome, StepOutcome::Skipped { .. }));
    }
}
