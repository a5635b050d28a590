//! Task domain types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::meta::{ObjectMeta, Resource, ResourceKind};
use super::workflow::{WorkflowPhase, WorkflowStatus};

pub const TASK_KIND: ResourceKind = ResourceKind {
    group: "bolt.dev",
    version: "v1alpha1",
    kind: "Task",
    plural: "tasks",
};

/// A declared unit of work
///
/// Either a single command or, when `spec.pipeline` is non-empty, an ordered
/// sequence of steps sharing one volume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: TaskSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl Task {
    /// Creates a task whose name the server generates from the project id
    pub fn new(run_command: impl Into<String>, project_id: impl Into<String>) -> Self {
        let project_id = project_id.into();
        Self {
            metadata: ObjectMeta::generated(format!("{}-", project_id)),
            spec: TaskSpec {
                run_command: run_command.into(),
                project_id,
                ..TaskSpec::default()
            },
            status: None,
        }
    }

    /// Creates a task that fetches its code from `source` before running
    pub fn with_source(
        run_command: impl Into<String>,
        project_id: impl Into<String>,
        source: TaskSource,
    ) -> Self {
        let mut task = Self::new(run_command, project_id);
        task.spec.source = Some(source);
        task
    }

    /// Creates a task with a fixed name from an existing spec
    pub fn named(name: impl Into<String>, namespace: impl Into<String>, spec: TaskSpec) -> Self {
        Self {
            metadata: ObjectMeta::named(name, namespace),
            spec,
            status: None,
        }
    }

    /// Current phase, `None` until the controller has observed the task
    pub fn phase(&self) -> Option<TaskPhase> {
        self.status.as_ref().and_then(|s| s.phase)
    }
}

impl Resource for Task {
    const KIND: ResourceKind = TASK_KIND;

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    /// Required unless `pipeline` is non-empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_command: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<TaskEnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<TaskSecret>,
    /// When non-empty, the task's own run command, env and secrets are ignored
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pipeline: Vec<PipelineStep>,
    /// Resource limits by name (cpu, memory, nvidia.com/gpu, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<TaskSource>,
}

impl TaskSpec {
    pub fn is_pipeline(&self) -> bool {
        !self.pipeline.is_empty()
    }

    /// The effective stage of a single-step task
    pub fn stage(&self) -> StageSpec {
        StageSpec {
            run_command: self.run_command.clone(),
            project_id: self.project_id.clone(),
            env: self.env.clone(),
            secrets: self.secrets.clone(),
            resources: self.resources.clone(),
            source: self.source.clone(),
        }
    }

    /// The effective stage of one pipeline step
    ///
    /// Run command, env and secrets come from the step; project and source
    /// are inherited from this spec. Resource limits are not inherited.
    pub fn stage_for_step(&self, step: &PipelineStep) -> StageSpec {
        StageSpec {
            run_command: step.run_command.clone(),
            project_id: self.project_id.clone(),
            env: step.env.clone(),
            secrets: step.secrets.clone(),
            resources: BTreeMap::new(),
            source: self.source.clone(),
        }
    }
}

/// Effective declaration of one compiled stage
///
/// Has no pipeline field, so a stage can never expand into another pipeline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageSpec {
    pub run_command: String,
    pub project_id: String,
    pub env: Vec<TaskEnvVar>,
    pub secrets: Vec<TaskSecret>,
    pub resources: BTreeMap<String, String>,
    pub source: Option<TaskSource>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEnvVar {
    pub name: String,
    pub value: String,
}

impl TaskEnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Reference to externally stored secret material
///
/// The secret called `name` is exposed to the stage as `env_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSecret {
    pub name: String,
    pub env_key: String,
}

impl TaskSecret {
    pub fn new(name: impl Into<String>, env_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env_key: env_key.into(),
        }
    }
}

/// One stage of a pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    /// Unique within the pipeline; names the compiled stage
    pub task_name: String,
    #[serde(default)]
    pub run_command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<TaskEnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<TaskSecret>,
}

impl PipelineStep {
    pub fn new(task_name: impl Into<String>, run_command: impl Into<String>) -> Self {
        Self {
            task_name: task_name.into(),
            run_command: run_command.into(),
            ..Self::default()
        }
    }
}

/// Git location to fetch code from before execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSource {
    pub git_repository: String,
    pub git_reference: String,
}

impl TaskSource {
    pub fn git(repository: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            git_repository: repository.into(),
            git_reference: reference.into(),
        }
    }
}

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<TaskPhase>,
    /// Diagnostic copied from the plan when the task fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TaskStatus {
    pub fn pending() -> Self {
        Self {
            phase: Some(TaskPhase::Pending),
            reason: None,
        }
    }

    /// Projects the observed status of a compiled plan onto a task status
    ///
    /// A plan without status, or with a phase this engine does not know,
    /// counts as pending. The reason is only carried for failures.
    pub fn from_workflow(status: Option<&WorkflowStatus>) -> Self {
        let Some(status) = status else {
            return Self::pending();
        };

        let phase = status.phase.map(TaskPhase::from).unwrap_or(TaskPhase::Pending);
        let reason = if phase == TaskPhase::Failed {
            Some(
                status
                    .message
                    .clone()
                    .unwrap_or_else(|| "workflow failed without a message".to_string()),
            )
        } else {
            None
        };

        Self {
            phase: Some(phase),
            reason,
        }
    }
}

/// Coarse lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl From<WorkflowPhase> for TaskPhase {
    fn from(phase: WorkflowPhase) -> Self {
        match phase {
            WorkflowPhase::Pending | WorkflowPhase::Unknown => TaskPhase::Pending,
            WorkflowPhase::Running => TaskPhase::Running,
            WorkflowPhase::Succeeded => TaskPhase::Succeeded,
            WorkflowPhase::Failed | WorkflowPhase::Error => TaskPhase::Failed,
        }
    }
}

impl fmt::Display for TaskPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            TaskPhase::Pending => "Pending",
            TaskPhase::Running => "Running",
            TaskPhase::Succeeded => "Succeeded",
            TaskPhase::Failed => "Failed",
        };
        write!(f, "{}", phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_generates_name_from_project() {
        let task = Task::new("python train.py", "myproject");
        assert_eq!(task.metadata.generate_name.as_deref(), Some("myproject-"));
        assert_eq!(task.name(), "");
        assert!(task.owner_reference().is_none());
    }

    #[test]
    fn test_stage_for_step_inherits_project_not_command() {
        let mut spec = TaskSpec {
            run_command: "python parent.py".to_string(),
            project_id: "myproject".to_string(),
            env: vec![TaskEnvVar::new("PARENT", "1")],
            source: Some(TaskSource::git("https://example.com/repo.git", "main")),
            ..TaskSpec::default()
        };
        spec.resources.insert("cpu".to_string(), "2".to_string());

        let mut step = PipelineStep::new("train", "python train.py");
        step.env.push(TaskEnvVar::new("STEP", "1"));

        let stage = spec.stage_for_step(&step);
        assert_eq!(stage.run_command, "python train.py");
        assert_eq!(stage.project_id, "myproject");
        assert_eq!(stage.env, vec![TaskEnvVar::new("STEP", "1")]);
        assert_eq!(stage.source, spec.source);
        assert!(stage.resources.is_empty());
    }

    #[test]
    fn test_phase_projection() {
        let cases = [
            (WorkflowPhase::Pending, TaskPhase::Pending),
            (WorkflowPhase::Running, TaskPhase::Running),
            (WorkflowPhase::Succeeded, TaskPhase::Succeeded),
            (WorkflowPhase::Failed, TaskPhase::Failed),
            (WorkflowPhase::Error, TaskPhase::Failed),
            (WorkflowPhase::Unknown, TaskPhase::Pending),
        ];

        for (workflow_phase, task_phase) in cases {
            let status = TaskStatus::from_workflow(Some(&WorkflowStatus::with_phase(workflow_phase)));
            assert_eq!(status.phase, Some(task_phase), "{}", workflow_phase);
        }
    }

    #[test]
    fn test_failure_reason_copied() {
        let status = WorkflowStatus {
            phase: Some(WorkflowPhase::Error),
            message: Some("OOMKilled".to_string()),
        };

        let projected = TaskStatus::from_workflow(Some(&status));
        assert_eq!(projected.phase, Some(TaskPhase::Failed));
        assert_eq!(projected.reason.as_deref(), Some("OOMKilled"));

        let running = WorkflowStatus {
            phase: Some(WorkflowPhase::Running),
            message: Some("step 1 of 2".to_string()),
        };
        assert_eq!(TaskStatus::from_workflow(Some(&running)).reason, None);
    }

    #[test]
    fn test_missing_status_is_pending() {
        assert_eq!(TaskStatus::from_workflow(None), TaskStatus::pending());
    }
}
