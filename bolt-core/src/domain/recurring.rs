//! Recurring task domain types

use serde::{Deserialize, Serialize};

use super::meta::{ObjectMeta, Resource, ResourceKind};
use super::task::TaskSpec;

pub const RECURRING_TASK_KIND: ResourceKind = ResourceKind {
    group: "bolt.dev",
    version: "v1alpha1",
    kind: "RecurringTask",
    plural: "recurringtasks",
};

/// A task template bound to a cron schedule
///
/// Owns exactly one scheduled plan, found through the `recurring-task`
/// label. The plan also carries an owner reference so it is removed with
/// the recurring task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecurringTask {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: RecurringTaskSpec,
}

impl RecurringTask {
    /// Creates a recurring task whose name the server generates from `name_prefix`
    pub fn new(name_prefix: impl Into<String>, task_spec: TaskSpec, schedule: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::generated(name_prefix),
            spec: RecurringTaskSpec {
                task_spec,
                schedule: schedule.into(),
            },
        }
    }
}

impl Resource for RecurringTask {
    const KIND: ResourceKind = RECURRING_TASK_KIND;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringTaskSpec {
    pub task_spec: TaskSpec,
    /// Cron expression, e.g. "0 3 * * *"
    pub schedule: String,
}
