//! Reconciliation errors

use bolt_client::ClusterError;
use bolt_core::CompileError;
use thiserror::Error;

/// No plan owned by the task exists
///
/// A distinguished outcome of the plan lookup: the controller creates the
/// plan when it sees this, anything else is propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no workflow owned by task '{task}'")]
pub struct PlanNotFoundError {
    pub task: String,
}

/// No scheduled plan carries the recurring task's label
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no cron workflow labelled for recurring task '{recurring_task}'")]
pub struct ScheduledPlanNotFoundError {
    pub recurring_task: String,
}

/// Errors ending one reconciliation attempt
///
/// The manager retries every one of them with backoff. Compile errors keep
/// failing until the declaration is edited.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    PlanNotFound(#[from] PlanNotFoundError),

    #[error(transparent)]
    ScheduledPlanNotFound(#[from] ScheduledPlanNotFoundError),

    /// More than one derived object claims the same declaration
    #[error("{count} objects claim '{name}', expected one")]
    AmbiguousOwnership { name: String, count: usize },

    /// The declaration was read back without a server-assigned uid
    #[error("'{0}' has no uid")]
    MissingUid(String),

    #[error("compilation failed: {0}")]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

impl ReconcileError {
    /// Check if this error means the derived object does not exist yet
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::PlanNotFound(_) | Self::ScheduledPlanNotFound(_) => true,
            Self::Cluster(e) => e.is_not_found(),
            _ => false,
        }
    }
}
