//! Task controller
//!
//! Keeps exactly one Workflow per Task:
//! - no plan → compile one, owned by the task, and create it
//! - plan present → correct parameter drift in place, keeping its uid
//! - project the plan's run phase onto the task status

use async_trait::async_trait;
use bolt_client::{Api, ListParams};
use bolt_core::PlanCompiler;
use bolt_core::domain::meta::{Resource, TASK_LABEL};
use bolt_core::domain::task::{TASK_KIND, Task, TaskStatus};
use bolt_core::domain::workflow::Workflow;
use bolt_core::drift::{self, Correction};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Context, Reconciler};
use crate::error::{PlanNotFoundError, ReconcileError};

pub struct TaskController {
    tasks: Api<Task>,
    workflows: Api<Workflow>,
    compiler: Arc<PlanCompiler>,
}

impl TaskController {
    pub fn new(context: &Context) -> Self {
        Self {
            tasks: Api::namespaced(context.client.clone(), &context.namespace),
            workflows: Api::namespaced(context.client.clone(), &context.namespace),
            compiler: Arc::clone(&context.compiler),
        }
    }

    /// Finds the plan owned by `task`
    ///
    /// Plans are matched by owner uid: a plan left behind by an earlier task
    /// of the same name is not this task's plan. The `task` label narrows
    /// the first query; if no labelled plan is owned, every plan in the
    /// namespace is scanned, so a plan whose label was edited is still found.
    ///
    /// # Returns
    /// The owned plan, or [`ReconcileError::PlanNotFound`] if there is none.
    pub async fn find_task_plan(&self, task: &Task) -> Result<Workflow, ReconcileError> {
        let uid = task
            .uid()
            .ok_or_else(|| ReconcileError::MissingUid(task.name().to_string()))?;

        let labelled = ListParams::default().labels(TASK_LABEL, task.name());
        let mut owned = self.owned_plans(&labelled, uid).await?;

        if owned.is_empty() {
            owned = self.owned_plans(&ListParams::default(), uid).await?;
            if !owned.is_empty() {
                warn!(
                    "Workflow {} of task {} lost its {} label",
                    owned[0].name(),
                    task.name(),
                    TASK_LABEL
                );
            }
        }

        if owned.len() > 1 {
            warn!(
                "Task {} owns {} workflows, using the oldest",
                task.name(),
                owned.len()
            );
            owned.sort_by_key(|workflow| workflow.metadata.creation_timestamp);
        }

        owned.into_iter().next().ok_or_else(|| {
            PlanNotFoundError {
                task: task.name().to_string(),
            }
            .into()
        })
    }

    async fn owned_plans(&self, params: &ListParams, uid: &str) -> Result<Vec<Workflow>, ReconcileError> {
        Ok(self
            .workflows
            .list(params)
            .await?
            .into_iter()
            .filter(|workflow| workflow.is_owned_by(uid))
            .collect())
    }

    async fn create_plan(&self, task: &Task) -> Result<(), ReconcileError> {
        let workflow = self.compiler.compile_workflow(task)?;
        let created = self.workflows.create(&workflow).await?;
        info!("Created workflow {} for task {}", created.name(), task.name());

        if task.status.is_none() {
            self.tasks
                .patch_status(task.name(), &TaskStatus::pending())
                .await?;
        }

        Ok(())
    }

    /// Patches the plan's spec in place if it drifted
    async fn correct_plan(&self, task: &Task, workflow: Workflow) -> Result<Workflow, ReconcileError> {
        match drift::reconcile_spec(&self.compiler, task, &workflow)? {
            Correction::InSync => Ok(workflow),
            Correction::Update(spec) => {
                warn!(
                    "Workflow {} drifted from task {}, restoring its spec",
                    workflow.name(),
                    task.name()
                );
                Ok(self.workflows.patch_spec(workflow.name(), &spec).await?)
            }
        }
    }

    async fn project_status(&self, task: &Task, workflow: &Workflow) -> Result<(), ReconcileError> {
        let status = TaskStatus::from_workflow(workflow.status.as_ref());
        if task.status.as_ref() == Some(&status) {
            return Ok(());
        }

        if let Some(phase) = status.phase {
            info!("Task {} is now {}", task.name(), phase);
        }
        self.tasks.patch_status(task.name(), &status).await?;
        Ok(())
    }
}

#[async_trait]
impl Reconciler for TaskController {
    type Primary = Task;
    type Secondary = Workflow;

    const NAME: &'static str = "task";

    async fn reconcile(&self, name: &str) -> Result<(), ReconcileError> {
        let Some(task) = self.tasks.get_opt(name).await? else {
            debug!("Task {} is gone, nothing to reconcile", name);
            return Ok(());
        };

        if task.metadata.deletion_timestamp.is_some() {
            debug!("Task {} is being deleted", name);
            return Ok(());
        }

        let workflow = match self.find_task_plan(&task).await {
            Ok(workflow) => workflow,
            Err(ReconcileError::PlanNotFound(_)) => return self.create_plan(&task).await,
            Err(e) => return Err(e),
        };

        let workflow = self.correct_plan(&task, workflow).await?;
        self.project_status(&task, &workflow).await
    }

    fn primaries_for(&self, workflow: &Workflow) -> Vec<String> {
        workflow
            .metadata
            .owner_references
            .iter()
            .filter(|owner| owner.kind == TASK_KIND.kind)
            .map(|owner| owner.name.clone())
            .collect()
    }
}
