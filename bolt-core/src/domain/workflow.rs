//! Execution plan types
//!
//! These mirror the objects consumed by the external workflow engine. A
//! `Workflow` is the compiled plan of a Task, a `CronWorkflow` the scheduled
//! plan of a RecurringTask. Both are derived and never edited by hand.
//!
//! Every optional field deserializes to the same value it was serialized
//! from, so a plan read back from the cluster compares equal to the plan
//! that was written.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::meta::{ObjectMeta, Resource, ResourceKind};

/// Name of the entrypoint template of every compiled plan
pub const MAIN_TEMPLATE: &str = "main";

pub const WORKFLOW_KIND: ResourceKind = ResourceKind {
    group: "argoproj.io",
    version: "v1alpha1",
    kind: "Workflow",
    plural: "workflows",
};

pub const CRON_WORKFLOW_KIND: ResourceKind = ResourceKind {
    group: "argoproj.io",
    version: "v1alpha1",
    kind: "CronWorkflow",
    plural: "cronworkflows",
};

// =============================================================================
// Workflow
// =============================================================================

/// Compiled plan of a single Task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: WorkflowSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkflowStatus>,
}

impl Workflow {
    /// Looks up a top-level parameter by name
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.spec
            .arguments
            .parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }

    /// The task id the plan was compiled for (single-step plans only)
    pub fn task_id(&self) -> Option<&str> {
        self.parameter(TASK_ID_PARAM)
    }

    /// The project the plan runs (single-step plans only)
    pub fn project_id(&self) -> Option<&str> {
        self.parameter(PROJECT_ID_PARAM)
    }

    /// The command the plan runs (single-step plans only)
    pub fn run_command(&self) -> Option<&str> {
        self.parameter(RUN_COMMAND_PARAM)
    }

    /// Phase reported by the workflow engine, if any
    pub fn phase(&self) -> Option<WorkflowPhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }
}

impl Resource for Workflow {
    const KIND: ResourceKind = WORKFLOW_KIND;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

pub const TASK_ID_PARAM: &str = "task-id";
pub const PROJECT_ID_PARAM: &str = "project-id";
pub const RUN_COMMAND_PARAM: &str = "run-command";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    pub entrypoint: String,
    #[serde(default, skip_serializing_if = "Arguments::is_empty")]
    pub arguments: Arguments,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub templates: Vec<Template>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_claim_templates: Vec<PersistentVolumeClaim>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_metadata: Option<PodMetadata>,
}

impl WorkflowSpec {
    /// Finds a top-level template by name
    pub fn template(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arguments {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

impl Arguments {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

/// A named plan parameter
///
/// Parameter order is significant: drift detection compares lists
/// positionally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

impl Parameter {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PodMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// A named stage of a plan
///
/// Either a script stage (one container) or a sequence of step groups.
/// Every inner `Vec` of `steps` is a group whose members run in parallel;
/// groups run one after another.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<ScriptTemplate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Vec<WorkflowStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_spec_patch: Option<String>,
}

impl Template {
    /// A template that runs step groups in order
    pub fn with_steps(name: impl Into<String>, steps: Vec<Vec<WorkflowStep>>) -> Self {
        Self {
            name: name.into(),
            steps,
            ..Self::default()
        }
    }
}

/// A script executed by `container.command`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptTemplate {
    #[serde(flatten)]
    pub container: Container,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline: Option<Box<Template>>,
}

impl WorkflowStep {
    /// A step running an inline template
    pub fn inline(name: impl Into<String>, template: Template) -> Self {
        Self {
            name: name.into(),
            inline: Some(Box::new(template)),
        }
    }
}

// =============================================================================
// Container
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

/// Container environment variable, given literally or by reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<EnvVarSource>,
}

impl EnvVar {
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            value_from: None,
        }
    }

    pub fn from_source(name: impl Into<String>, source: EnvVarSource) -> Self {
        Self {
            name: name.into(),
            value: None,
            value_from: Some(source),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key_ref: Option<SecretKeySelector>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersistentVolumeClaim {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: PersistentVolumeClaimSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,
    #[serde(default)]
    pub resources: VolumeResourceRequirements,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolumeResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

// =============================================================================
// Status
// =============================================================================

/// Status written back by the workflow engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<WorkflowPhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WorkflowStatus {
    pub fn with_phase(phase: WorkflowPhase) -> Self {
        Self {
            phase: Some(phase),
            message: None,
        }
    }
}

/// Run phase reported by the workflow engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Error,
    /// Any phase this engine does not know about
    #[serde(other)]
    Unknown,
}

impl fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            WorkflowPhase::Pending => "Pending",
            WorkflowPhase::Running => "Running",
            WorkflowPhase::Succeeded => "Succeeded",
            WorkflowPhase::Failed => "Failed",
            WorkflowPhase::Error => "Error",
            WorkflowPhase::Unknown => "Unknown",
        };
        write!(f, "{}", phase)
    }
}

// =============================================================================
// CronWorkflow
// =============================================================================

/// Scheduled plan of a RecurringTask
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CronWorkflow {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: CronWorkflowSpec,
}

impl Resource for CronWorkflow {
    const KIND: ResourceKind = CRON_WORKFLOW_KIND;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronWorkflowSpec {
    pub schedule: String,
    pub workflow_spec: WorkflowSpec,
}
