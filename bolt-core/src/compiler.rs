//! Plan compiler
//!
//! Translates a Task (or the task template of a RecurringTask) into the
//! plan the workflow engine executes.
//!
//! - A single-step task becomes one script template named "main" plus the
//!   parameters `task-id`, `project-id` and `run-command`, in that order.
//! - A pipeline becomes one stage per step, each wrapped in its own step
//!   group so stages run strictly one after another, all sharing a volume.
//!
//! Compilation is pure: the same declaration always produces a structurally
//! identical plan, and nothing here talks to the cluster.

use serde_json::json;
use std::collections::{BTreeMap, HashSet};

use crate::domain::meta::{ObjectMeta, RECURRING_TASK_LABEL, Resource, TASK_LABEL};
use crate::domain::recurring::RecurringTask;
use crate::domain::task::{StageSpec, Task};
use crate::domain::workflow::{
    Arguments, Container, CronWorkflow, CronWorkflowSpec, EnvVar, MAIN_TEMPLATE,
    PROJECT_ID_PARAM, Parameter, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodMetadata,
    RUN_COMMAND_PARAM, ScriptTemplate, TASK_ID_PARAM, Template, VolumeMount,
    VolumeResourceRequirements, Workflow, WorkflowSpec, WorkflowStep,
};
use crate::error::CompileError;
use crate::quantity::Quantity;
use crate::secrets::secret_env_source;

/// Name of the executor container inside every stage
pub const EXECUTOR_CONTAINER: &str = "main";

const CRON_MACROS: [&str; 7] = [
    "@yearly",
    "@annually",
    "@monthly",
    "@weekly",
    "@daily",
    "@midnight",
    "@hourly",
];

/// Compiler configuration
///
/// Everything the compiled stages need to know about the environment they
/// run in. Injected at construction instead of read from globals.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerConfig {
    /// Image of the executor container running every stage
    pub executor_image: String,

    /// Object storage holding uploaded projects and artifacts
    pub object_storage: ObjectStorageConfig,

    /// Storage requested for the volume shared by pipeline stages
    pub volume_size: String,

    /// Mount path of the shared pipeline volume
    pub project_mount_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectStorageConfig {
    pub url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            executor_image: "bolt-executor:latest".to_string(),
            object_storage: ObjectStorageConfig {
                url: "http://bolt-storage.bolt-system.svc.cluster.local:9000".to_string(),
                access_key_id: "bolt".to_string(),
                secret_access_key: "bolt-storage-secret".to_string(),
                bucket: "boltprojects".to_string(),
            },
            volume_size: "5Gi".to_string(),
            project_mount_path: "/project".to_string(),
        }
    }
}

/// Compiles declarations into execution plans
#[derive(Debug, Clone, Default)]
pub struct PlanCompiler {
    config: CompilerConfig,
}

impl PlanCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compiles a task into a plan specification
    ///
    /// # Errors
    /// Malformed resource quantities, empty or duplicate pipeline step names
    /// and stages without a run command.
    pub fn compile(&self, task: &Task) -> Result<WorkflowSpec, CompileError> {
        if task.spec.is_pipeline() {
            self.compile_pipeline(task)
        } else {
            self.compile_single(task)
        }
    }

    /// Compiles a task into a complete plan object
    ///
    /// The plan lives in the task's namespace, carries the task label and a
    /// generated name derived from the task name. Once the task has a uid
    /// the plan also gets an owner reference to it, so deleting the task
    /// deletes the plan.
    pub fn compile_workflow(&self, task: &Task) -> Result<Workflow, CompileError> {
        let spec = self.compile(task)?;

        let mut metadata = ObjectMeta::generated(workflow_name_prefix(task.name()))
            .with_label(TASK_LABEL, task.name());
        metadata.namespace = task.metadata.namespace.clone();
        metadata.owner_references.extend(task.owner_reference());

        Ok(Workflow {
            metadata,
            spec,
            status: None,
        })
    }

    /// Compiles a recurring task into its scheduled plan object
    ///
    /// The embedded plan is compiled as if the task template were a task
    /// named after the recurring task. Like plans, scheduled plans are owned
    /// by their recurring task once it has a uid.
    pub fn compile_cron_workflow(
        &self,
        recurring: &RecurringTask,
    ) -> Result<CronWorkflow, CompileError> {
        validate_schedule(&recurring.spec.schedule)?;

        let name = recurring.name();
        let namespace = recurring.namespace().unwrap_or_default();
        let task = Task::named(name, namespace, recurring.spec.task_spec.clone());
        let workflow_spec = self.compile(&task)?;

        let mut metadata =
            ObjectMeta::generated(format!("{}-", name)).with_label(RECURRING_TASK_LABEL, name);
        metadata.namespace = recurring.metadata.namespace.clone();
        metadata.owner_references.extend(recurring.owner_reference());

        Ok(CronWorkflow {
            metadata,
            spec: CronWorkflowSpec {
                schedule: recurring.spec.schedule.clone(),
                workflow_spec,
            },
        })
    }

    // =============================================================================
    // Plan shapes
    // =============================================================================

    fn compile_single(&self, task: &Task) -> Result<WorkflowSpec, CompileError> {
        let stage = task.spec.stage();
        let main = self.stage_template(MAIN_TEMPLATE, task.name(), &stage, None)?;

        Ok(WorkflowSpec {
            entrypoint: MAIN_TEMPLATE.to_string(),
            arguments: Arguments {
                parameters: parameters(task),
            },
            templates: vec![main],
            volume_claim_templates: Vec::new(),
            pod_metadata: Some(pod_metadata(task.name())),
        })
    }

    fn compile_pipeline(&self, task: &Task) -> Result<WorkflowSpec, CompileError> {
        let volume = volume_name(task.name());
        let mut seen = HashSet::new();
        let mut groups = Vec::with_capacity(task.spec.pipeline.len());

        for (index, step) in task.spec.pipeline.iter().enumerate() {
            if step.task_name.trim().is_empty() {
                return Err(CompileError::EmptyStepName { index });
            }
            if !seen.insert(step.task_name.as_str()) {
                return Err(CompileError::DuplicateStepName(step.task_name.clone()));
            }

            let stage = task.spec.stage_for_step(step);
            // Task name and step name are joined without a separator
            let stage_id = format!("{}{}", task.name(), step.task_name);
            let template = self.stage_template(&step.task_name, &stage_id, &stage, Some(&volume))?;

            // One stage per group keeps the pipeline sequential
            groups.push(vec![WorkflowStep::inline(step.task_name.clone(), template)]);
        }

        Ok(WorkflowSpec {
            entrypoint: MAIN_TEMPLATE.to_string(),
            arguments: Arguments::default(),
            templates: vec![Template::with_steps(MAIN_TEMPLATE, groups)],
            volume_claim_templates: vec![self.volume_claim(&volume)],
            pod_metadata: Some(pod_metadata(task.name())),
        })
    }

    // =============================================================================
    // Stages
    // =============================================================================

    fn stage_template(
        &self,
        name: &str,
        task_id: &str,
        stage: &StageSpec,
        volume: Option<&str>,
    ) -> Result<Template, CompileError> {
        if stage.run_command.trim().is_empty() {
            return Err(CompileError::MissingRunCommand(name.to_string()));
        }

        let volume_mounts = volume
            .map(|volume| {
                vec![VolumeMount {
                    name: volume.to_string(),
                    mount_path: self.config.project_mount_path.clone(),
                }]
            })
            .unwrap_or_default();
        let workdir = volume.map(|_| self.config.project_mount_path.as_str());

        Ok(Template {
            name: name.to_string(),
            script: Some(ScriptTemplate {
                container: Container {
                    name: EXECUTOR_CONTAINER.to_string(),
                    image: self.config.executor_image.clone(),
                    command: vec!["bash".to_string()],
                    env: self.container_env(stage),
                    volume_mounts,
                },
                source: self.stage_script(task_id, stage, workdir),
            }),
            steps: Vec::new(),
            pod_spec_patch: resource_patch(&stage.resources)?,
        })
    }

    /// Builds the shell script run by a stage
    ///
    /// The stage fetches its project (from git when a source is declared,
    /// otherwise from object storage), runs the command and uploads the
    /// artifacts under the task id. `set -e` makes any failing step fail
    /// the stage, which the engine reports as a failed phase.
    fn stage_script(&self, task_id: &str, stage: &StageSpec, workdir: Option<&str>) -> String {
        let bucket = &self.config.object_storage.bucket;
        let project = escape(&stage.project_id);

        let mut script = String::from("set -e\n\n");

        if let Some(workdir) = workdir {
            script.push_str(&format!("cd \"{}\"\n\n", escape(workdir)));
        }

        match &stage.source {
            Some(source) => {
                script.push_str(&format!(
                    "git clone \"{}\" \"./{}\"\ncd \"./{}\"\ngit checkout \"{}\"\n\n",
                    escape(&source.git_repository),
                    project,
                    project,
                    escape(&source.git_reference)
                ));
            }
            None => {
                script.push_str(&format!(
                    "export PROJECT_DIRECTORY=\"{}/{}\"\n\
                     s3cmd --no-ssl --host=\"$OBJECT_STORAGE_URL\" --host-bucket=\"$OBJECT_STORAGE_URL\" get --recursive \"s3://$PROJECT_DIRECTORY\" ./\n\
                     cd \"./{}\"\n\n",
                    bucket, project, project
                ));
            }
        }

        script.push_str(&format!("execute \"{}\"\n\n", escape(&stage.run_command)));
        script.push_str(&format!(
            "save_artifacts \"{}/{}/artifacts/\"\n",
            bucket,
            escape(task_id)
        ));

        script
    }

    /// Base environment, then declared variables, then secret references
    fn container_env(&self, stage: &StageSpec) -> Vec<EnvVar> {
        let storage = &self.config.object_storage;

        let mut env = vec![
            EnvVar::literal("AWS_ACCESS_KEY_ID", &storage.access_key_id),
            EnvVar::literal("AWS_SECRET_ACCESS_KEY", &storage.secret_access_key),
            EnvVar::literal("OBJECT_STORAGE_URL", &storage.url),
            EnvVar::literal("PIPENV_YES", "1"),
        ];

        env.extend(
            stage
                .env
                .iter()
                .map(|var| EnvVar::literal(&var.name, &var.value)),
        );
        env.extend(
            stage
                .secrets
                .iter()
                .map(|secret| EnvVar::from_source(&secret.env_key, secret_env_source(&secret.name))),
        );

        env
    }

    fn volume_claim(&self, name: &str) -> PersistentVolumeClaim {
        let mut requests = BTreeMap::new();
        requests.insert("storage".to_string(), self.config.volume_size.clone());

        PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            spec: PersistentVolumeClaimSpec {
                access_modes: vec!["ReadWriteOnce".to_string()],
                resources: VolumeResourceRequirements { requests },
            },
        }
    }
}

/// Name of the volume shared by the stages of a pipeline
pub fn volume_name(task_name: &str) -> String {
    format!("{}-volume", task_name)
}

/// Prefix from which the server generates plan names
pub fn workflow_name_prefix(task_name: &str) -> String {
    format!("{}-wf-", task_name)
}

fn parameters(task: &Task) -> Vec<Parameter> {
    vec![
        Parameter::new(TASK_ID_PARAM, task.name()),
        Parameter::new(PROJECT_ID_PARAM, &task.spec.project_id),
        Parameter::new(RUN_COMMAND_PARAM, &task.spec.run_command),
    ]
}

fn pod_metadata(task_name: &str) -> PodMetadata {
    let mut labels = BTreeMap::new();
    labels.insert(TASK_LABEL.to_string(), task_name.to_string());
    PodMetadata { labels }
}

/// Pod spec patch overriding the executor container's resource limits
fn resource_patch(resources: &BTreeMap<String, String>) -> Result<Option<String>, CompileError> {
    if resources.is_empty() {
        return Ok(None);
    }

    let mut limits = serde_json::Map::new();
    for (resource, value) in resources {
        let quantity = Quantity::parse_limit(value).map_err(|source| CompileError::InvalidQuantity {
            resource: resource.clone(),
            source,
        })?;
        limits.insert(resource.clone(), json!(quantity.as_str()));
    }

    let patch = json!({
        "containers": [{
            "name": EXECUTOR_CONTAINER,
            "resources": { "limits": limits },
        }]
    });

    Ok(Some(patch.to_string()))
}

/// Accepts five-field cron expressions and the common @-macros
fn validate_schedule(schedule: &str) -> Result<(), CompileError> {
    let schedule = schedule.trim();
    let invalid = || CompileError::InvalidSchedule(schedule.to_string());

    if schedule.starts_with('@') {
        let is_every = schedule
            .strip_prefix("@every ")
            .is_some_and(|interval| !interval.trim().is_empty());
        return if CRON_MACROS.contains(&schedule) || is_every {
            Ok(())
        } else {
            Err(invalid())
        };
    }

    let fields: Vec<&str> = schedule.split_whitespace().collect();
    let valid_field = |field: &&str| {
        field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '/' | ',' | '-' | '?' | '#'))
    };

    if fields.len() == 5 && fields.iter().all(valid_field) {
        Ok(())
    } else {
        Err(invalid())
    }
}

/// Escapes text embedded in a double-quoted shell string
fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '"' | '$' | '`') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::task::{PipelineStep, TaskEnvVar, TaskSecret, TaskSource, TaskSpec};
    use crate::quantity::QuantityError;

    fn train_task() -> Task {
        Task::named(
            "train",
            "default",
            TaskSpec {
                run_command: "python train.py".to_string(),
                project_id: "myproject".to_string(),
                env: vec![TaskEnvVar::new("VAR", "val")],
                ..TaskSpec::default()
            },
        )
    }

    fn pipeline_task() -> Task {
        let mut prepare = PipelineStep::new("prepare", "python prepare.py");
        prepare.env.push(TaskEnvVar::new("STAGE", "prepare"));
        let mut train = PipelineStep::new("train", "python train.py");
        train.secrets.push(TaskSecret::new("hf-token", "HF_TOKEN"));
        let save = PipelineStep::new("save", "python save.py");

        Task::named(
            "pipe",
            "default",
            TaskSpec {
                run_command: "python parent.py".to_string(),
                project_id: "myproject".to_string(),
                env: vec![TaskEnvVar::new("PARENT", "1")],
                pipeline: vec![prepare, train, save],
                ..TaskSpec::default()
            },
        )
    }

    fn script_of(template: &Template) -> &ScriptTemplate {
        template.script.as_ref().expect("script template")
    }

    #[test]
    fn test_single_step_parameters_in_order() {
        let spec = PlanCompiler::default().compile(&train_task()).unwrap();

        assert_eq!(
            spec.arguments.parameters,
            vec![
                Parameter::new("task-id", "train"),
                Parameter::new("project-id", "myproject"),
                Parameter::new("run-command", "python train.py"),
            ]
        );
        assert_eq!(spec.entrypoint, "main");
        assert_eq!(spec.templates.len(), 1);
        assert_eq!(spec.templates[0].name, "main");
        assert!(spec.volume_claim_templates.is_empty());
    }

    #[test]
    fn test_single_step_env_extends_base_env() {
        let compiler = PlanCompiler::default();
        let spec = compiler.compile(&train_task()).unwrap();
        let env = &script_of(&spec.templates[0]).container.env;

        let names: Vec<&str> = env.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "AWS_ACCESS_KEY_ID",
                "AWS_SECRET_ACCESS_KEY",
                "OBJECT_STORAGE_URL",
                "PIPENV_YES",
                "VAR"
            ]
        );
        assert_eq!(env.last().unwrap(), &EnvVar::literal("VAR", "val"));
    }

    #[test]
    fn test_single_step_script_embeds_identifiers() {
        let spec = PlanCompiler::default().compile(&train_task()).unwrap();
        let script = &script_of(&spec.templates[0]).source;

        assert!(script.contains("execute \"python train.py\""));
        assert!(script.contains("boltprojects/myproject"));
        assert!(script.contains("boltprojects/train/artifacts/"));
    }

    #[test]
    fn test_secrets_become_references() {
        let mut task = train_task();
        task.spec.secrets.push(TaskSecret::new("hf-token", "HF_TOKEN"));

        let spec = PlanCompiler::default().compile(&task).unwrap();
        let env = &script_of(&spec.templates[0]).container.env;
        let secret = env.last().unwrap();

        assert_eq!(secret.name, "HF_TOKEN");
        assert_eq!(secret.value, None);
        assert_eq!(secret.value_from, Some(secret_env_source("hf-token")));
    }

    #[test]
    fn test_compilation_is_idempotent() {
        let compiler = PlanCompiler::default();
        for task in [train_task(), pipeline_task()] {
            assert_eq!(compiler.compile(&task).unwrap(), compiler.compile(&task).unwrap());
        }
    }

    #[test]
    fn test_git_source_clones_and_checks_out() {
        let mut task = train_task();
        task.spec.source = Some(TaskSource::git("https://github.com/acme/models.git", "v1.2"));

        let spec = PlanCompiler::default().compile(&task).unwrap();
        let script = &script_of(&spec.templates[0]).source;

        assert!(script.contains("git clone \"https://github.com/acme/models.git\" \"./myproject\""));
        assert!(script.contains("git checkout \"v1.2\""));
        assert!(!script.contains("s3cmd"));
    }

    #[test]
    fn test_git_source_is_quoted() {
        let mut task = train_task();
        task.spec.source = Some(TaskSource::git("https://x/r.git; touch /tmp/x", "main && echo $HOME"));

        let spec = PlanCompiler::default().compile(&task).unwrap();
        let script = &script_of(&spec.templates[0]).source;

        assert!(script.contains("git clone \"https://x/r.git; touch /tmp/x\" \"./myproject\""));
        assert!(script.contains("git checkout \"main && echo \\$HOME\""));
        assert!(!script.contains("git clone https://x/r.git;"));
    }

    #[test]
    fn test_negative_resource_limit_fails() {
        let mut task = train_task();
        task.spec.resources.insert("cpu".to_string(), "-4".to_string());

        let err = PlanCompiler::default().compile(&task).unwrap_err();
        assert!(matches!(
            err,
            CompileError::InvalidQuantity { source: QuantityError::Negative(_), .. }
        ));
    }

    #[test]
    fn test_resources_patch_main_container() {
        let mut task = train_task();
        task.spec.resources.insert("cpu".to_string(), "4".to_string());
        task.spec.resources.insert("memory".to_string(), "8Gi".to_string());
        task.spec.resources.insert("nvidia.com/gpu".to_string(), "1".to_string());

        let spec = PlanCompiler::default().compile(&task).unwrap();
        let patch = spec.templates[0].pod_spec_patch.as_ref().unwrap();
        let patch: serde_json::Value = serde_json::from_str(patch).unwrap();

        assert_eq!(patch["containers"][0]["name"], "main");
        assert_eq!(patch["containers"][0]["resources"]["limits"]["cpu"], "4");
        assert_eq!(patch["containers"][0]["resources"]["limits"]["memory"], "8Gi");
        assert_eq!(patch["containers"][0]["resources"]["limits"]["nvidia.com/gpu"], "1");
    }

    #[test]
    fn test_no_resources_no_patch() {
        let spec = PlanCompiler::default().compile(&train_task()).unwrap();
        assert_eq!(spec.templates[0].pod_spec_patch, None);
    }

    #[test]
    fn test_malformed_quantity_fails() {
        let mut task = train_task();
        task.spec.resources.insert("memory".to_string(), "lots".to_string());

        let err = PlanCompiler::default().compile(&task).unwrap_err();
        assert!(matches!(err, CompileError::InvalidQuantity { ref resource, .. } if resource == "memory"));
    }

    #[test]
    fn test_missing_run_command_fails() {
        let mut task = train_task();
        task.spec.run_command.clear();

        assert_eq!(
            PlanCompiler::default().compile(&task),
            Err(CompileError::MissingRunCommand("main".to_string()))
        );
    }

    #[test]
    fn test_pipeline_is_sequential() {
        let task = pipeline_task();
        let spec = PlanCompiler::default().compile(&task).unwrap();

        assert!(spec.arguments.parameters.is_empty());
        assert_eq!(spec.entrypoint, "main");
        assert_eq!(spec.templates.len(), 1);

        let groups = &spec.templates[0].steps;
        assert_eq!(groups.len(), 3);
        for (group, step) in groups.iter().zip(&task.spec.pipeline) {
            assert_eq!(group.len(), 1);
            assert_eq!(group[0].name, step.task_name);
            assert_eq!(group[0].inline.as_ref().unwrap().name, step.task_name);
        }
    }

    #[test]
    fn test_pipeline_shares_one_volume() {
        let spec = PlanCompiler::default().compile(&pipeline_task()).unwrap();

        assert_eq!(spec.volume_claim_templates.len(), 1);
        assert_eq!(spec.volume_claim_templates[0].metadata.name.as_deref(), Some("pipe-volume"));

        for group in &spec.templates[0].steps {
            let stage = group[0].inline.as_ref().unwrap();
            let mounts = &script_of(stage).container.volume_mounts;
            assert_eq!(
                mounts,
                &vec![VolumeMount {
                    name: "pipe-volume".to_string(),
                    mount_path: "/project".to_string(),
                }]
            );
        }
    }

    #[test]
    fn test_pipeline_stage_uses_step_fields() {
        let spec = PlanCompiler::default().compile(&pipeline_task()).unwrap();
        let groups = &spec.templates[0].steps;

        let prepare = script_of(groups[0][0].inline.as_ref().unwrap());
        assert!(prepare.source.contains("execute \"python prepare.py\""));
        assert!(prepare.source.contains("boltprojects/myproject"));
        assert!(!prepare.source.contains("python parent.py"));
        assert!(prepare.container.env.contains(&EnvVar::literal("STAGE", "prepare")));
        assert!(!prepare.container.env.contains(&EnvVar::literal("PARENT", "1")));

        let train = script_of(groups[1][0].inline.as_ref().unwrap());
        assert_eq!(train.container.env.last().unwrap().name, "HF_TOKEN");
    }

    #[test]
    fn test_pipeline_stage_artifacts_keyed_by_task_and_step() {
        let spec = PlanCompiler::default().compile(&pipeline_task()).unwrap();
        let groups = &spec.templates[0].steps;

        let prepare = script_of(groups[0][0].inline.as_ref().unwrap());
        assert!(prepare.source.contains("save_artifacts \"boltprojects/pipeprepare/artifacts/\""));
        let save = script_of(groups[2][0].inline.as_ref().unwrap());
        assert!(save.source.contains("save_artifacts \"boltprojects/pipesave/artifacts/\""));
    }

    #[test]
    fn test_pipeline_stages_do_not_inherit_resources() {
        let mut task = pipeline_task();
        task.spec.resources.insert("memory".to_string(), "8Gi".to_string());

        let spec = PlanCompiler::default().compile(&task).unwrap();
        for group in &spec.templates[0].steps {
            assert_eq!(group[0].inline.as_ref().unwrap().pod_spec_patch, None);
        }
    }

    #[test]
    fn test_pipeline_step_name_errors() {
        let mut task = pipeline_task();
        task.spec.pipeline[1].task_name = " ".to_string();
        assert_eq!(
            PlanCompiler::default().compile(&task),
            Err(CompileError::EmptyStepName { index: 1 })
        );

        let mut task = pipeline_task();
        task.spec.pipeline[2].task_name = "prepare".to_string();
        assert_eq!(
            PlanCompiler::default().compile(&task),
            Err(CompileError::DuplicateStepName("prepare".to_string()))
        );
    }

    #[test]
    fn test_compile_workflow_metadata() {
        let workflow = PlanCompiler::default().compile_workflow(&train_task()).unwrap();

        assert_eq!(workflow.metadata.generate_name.as_deref(), Some("train-wf-"));
        assert_eq!(workflow.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(workflow.metadata.labels.get(TASK_LABEL).map(String::as_str), Some("train"));
        assert!(workflow.metadata.owner_references.is_empty());
        assert_eq!(workflow.run_command(), Some("python train.py"));
    }

    #[test]
    fn test_compile_workflow_owned_by_persisted_task() {
        let mut task = train_task();
        task.metadata.uid = Some("uid-1".to_string());

        let workflow = PlanCompiler::default().compile_workflow(&task).unwrap();
        assert!(workflow.is_owned_by("uid-1"));
        assert_eq!(workflow.metadata.owner_references[0].kind, "Task");
    }

    #[test]
    fn test_compile_cron_workflow() {
        let mut recurring = RecurringTask::new("nightly-", train_task().spec, "0 3 * * *");
        recurring.metadata.name = Some("nightly".to_string());
        recurring.metadata.namespace = Some("default".to_string());

        let cron = PlanCompiler::default().compile_cron_workflow(&recurring).unwrap();

        assert_eq!(cron.spec.schedule, "0 3 * * *");
        assert_eq!(
            cron.metadata.labels.get(RECURRING_TASK_LABEL).map(String::as_str),
            Some("nightly")
        );
        assert_eq!(
            cron.spec.workflow_spec.arguments.parameters[0],
            Parameter::new("task-id", "nightly")
        );
    }

    #[test]
    fn test_schedule_validation() {
        for schedule in ["0 3 * * *", "*/5 * * * MON-FRI", "@hourly", "@every 10m"] {
            assert!(validate_schedule(schedule).is_ok(), "{}", schedule);
        }
        for schedule in ["", "* * *", "@sometimes", "0 3 * * * *", "0 3 * * $"] {
            assert!(validate_schedule(schedule).is_err(), "{}", schedule);
        }
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape(r#"echo "$HOME""#), r#"echo \"\$HOME\""#);
    }
}
