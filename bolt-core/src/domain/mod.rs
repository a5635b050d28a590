//! Domain types
//!
//! Declarations written by users (Task, RecurringTask), plan objects derived
//! from them (Workflow, CronWorkflow) and the pods the plans start.

pub mod meta;
pub mod pod;
pub mod recurring;
pub mod task;
pub mod workflow;

pub use meta::{ObjectMeta, OwnerReference, RECURRING_TASK_LABEL, Resource, ResourceKind, TASK_LABEL};
pub use pod::Pod;
pub use recurring::{RecurringTask, RecurringTaskSpec};
pub use task::{
    PipelineStep, StageSpec, Task, TaskEnvVar, TaskPhase, TaskSecret, TaskSource, TaskSpec,
    TaskStatus,
};
pub use workflow::{
    CronWorkflow, CronWorkflowSpec, Parameter, Template, Workflow, WorkflowPhase, WorkflowSpec,
    WorkflowStatus,
};
