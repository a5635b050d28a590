//! Pod domain types
//!
//! Only the fields needed to observe pods started for a task.

use serde::{Deserialize, Serialize};

use super::meta::{ObjectMeta, Resource, ResourceKind, TASK_LABEL};

pub const POD_KIND: ResourceKind = ResourceKind {
    group: "",
    version: "v1",
    kind: "Pod",
    plural: "pods",
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PodStatus>,
}

impl Pod {
    pub fn phase(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.phase.as_deref())
    }

    /// Name of the task this pod runs for, if it carries the task label
    pub fn task_name(&self) -> Option<&str> {
        self.metadata.labels.get(TASK_LABEL).map(String::as_str)
    }
}

impl Resource for Pod {
    const KIND: ResourceKind = POD_KIND;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}
