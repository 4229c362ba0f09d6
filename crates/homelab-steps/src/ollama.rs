//! Ollama model serving

use async_trait::async_trait;
use homelab_core::{LabError, LabResult, ModelRef, ModelStatus, StepOutputs};
use homelab_network::{wait_until_ready, PollPolicy, ReadinessProbe};
use homelab_runtime::{CommandRunner, CommandSpec};
use homelab_scheduler::Step;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{ensure_installed, parse};

/// Installs Ollama, starts its service and pulls the model if missing
pub struct OllamaStep {
    id: String,
    model: ModelRef,
    local: Arc<dyn CommandRunner>,
    probe: Arc<dyn ReadinessProbe>,
    poll: PollPolicy,
}

impl OllamaStep {
    pub fn new(
        id: impl Into<String>,
        model: ModelRef,
        local: Arc<dyn CommandRunner>,
        probe: Arc<dyn ReadinessProbe>,
        poll: PollPolicy,
    ) -> Self {
        Self {
            id: id.into(),
            model,
            local,
            probe,
            poll,
        }
    }

    /// `ollama list` check; a failed listing counts as not present
    async fn model_present(&self) -> bool {
        let listing = self
            .local
            .run_best_effort(&CommandSpec::new("ollama").arg("list"))
            .await
            .unwrap_or_default();
        parse::model_listed(&listing, &self.model)
    }
}

#[async_trait]
impl Step for OllamaStep {
    fn id(&self) -> &str {
        &self.id
    }

    fn describe(&self) -> String {
        format!("ollama serving model {}", self.model)
    }

    async fn apply(&self) -> LabResult<StepOutputs> {
        ensure_installed(self.local.as_ref(), "ollama").await?;

        // An already running service makes this fail
        self.local
            .run_best_effort(&CommandSpec::new("brew").args(["services", "start", "ollama"]))
            .await;

        if !wait_until_ready(self.probe.as_ref(), &self.poll).await {
            warn!(endpoint = %self.probe.target(), "Proceeding without a ready ollama endpoint");
        }

        if self.model_present().await {
            info!(model = %self.model, "Model already present");
        } else {
            info!(model = %self.model, "Pulling model");
            self.local
                .run(&CommandSpec::new("ollama").arg("pull").arg(self.model.to_string()))
                .await
                .map_err(|e| {
                    LabError::Mutation(format!("failed to pull model {}: {}", self.model, e))
                })?;
        }

        let status = if self.model_present().await {
            ModelStatus::Ready
        } else {
            warn!(model = %self.model, "Model not listed after pull");
            ModelStatus::NotFound
        };

        Ok(StepOutputs::new()
            .with("model", &self.model)
            .with("status", status))
    }

    fn has_teardown(&self) -> bool {
        true
    }

    async fn teardown(&self) -> LabResult<()> {
        self.local
            .run_best_effort(&CommandSpec::new("brew").args(["services", "stop", "ollama"]))
            .await;
        Ok(())
    }
}
