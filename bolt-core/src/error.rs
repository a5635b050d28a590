//! Compilation errors

use thiserror::Error;

use crate::quantity::QuantityError;

/// Errors returned while compiling a declaration into a plan
///
/// All of them are caused by the declaration itself, so retrying without
/// editing the declaration yields the same error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("invalid quantity for resource '{resource}': {source}")]
    InvalidQuantity {
        resource: String,
        #[source]
        source: QuantityError,
    },

    #[error("pipeline step {index} has an empty task name")]
    EmptyStepName { index: usize },

    #[error("pipeline step name '{0}' is used more than once")]
    DuplicateStepName(String),

    #[error("stage '{0}' has no run command")]
    MissingRunCommand(String),

    #[error("invalid cron schedule '{0}'")]
    InvalidSchedule(String),
}
