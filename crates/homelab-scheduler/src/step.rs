//! Step trait definitions

use async_trait::async_trait;
use homelab_core::{LabResult, StepOutputs};

/// A single idempotent provisioning action.
///
/// `apply` runs the idempotency check, the mutation when needed, and the
/// verification read-back, returning the step's named outputs. Any error
/// aborts the step; there is no rollback.
#[async_trait]
pub trait Step: Send + Sync {
    /// Unique step id within a graph
    fn id(&self) -> &str;

    /// One-line description for plans and logs
    fn describe(&self) -> String;

    /// Bring the external system to the desired state
    async fn apply(&self) -> LabResult<StepOutputs>;

    /// Whether `teardown` does anything
    fn has_teardown(&self) -> bool {
        false
    }

    /// Run the inverse commands of `apply`
    async fn teardown(&self) -> LabResult<()> {
        Ok(())
    }
}
