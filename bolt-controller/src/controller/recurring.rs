//! RecurringTask controller
//!
//! Keeps exactly one CronWorkflow per RecurringTask. The scheduled plan is
//! found through its `recurring-task` label and corrected whenever any part
//! of its spec (schedule or embedded plan) differs from the declaration.

use async_trait::async_trait;
use bolt_client::{Api, ListParams};
use bolt_core::PlanCompiler;
use bolt_core::domain::meta::{RECURRING_TASK_LABEL, Resource};
use bolt_core::domain::recurring::RecurringTask;
use bolt_core::domain::workflow::CronWorkflow;
use bolt_core::drift::{self, Correction};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Context, Reconciler};
use crate::error::{ReconcileError, ScheduledPlanNotFoundError};

pub struct RecurringTaskController {
    recurring_tasks: Api<RecurringTask>,
    cron_workflows: Api<CronWorkflow>,
    compiler: Arc<PlanCompiler>,
}

impl RecurringTaskController {
    pub fn new(context: &Context) -> Self {
        Self {
            recurring_tasks: Api::namespaced(context.client.clone(), &context.namespace),
            cron_workflows: Api::namespaced(context.client.clone(), &context.namespace),
            compiler: Arc::clone(&context.compiler),
        }
    }

    fn selector(name: &str) -> ListParams {
        ListParams::default().labels(RECURRING_TASK_LABEL, name)
    }

    /// Finds the scheduled plan labelled for the recurring task `name`
    ///
    /// # Returns
    /// The single labelled plan, [`ReconcileError::ScheduledPlanNotFound`] if
    /// there is none, [`ReconcileError::AmbiguousOwnership`] if there are
    /// several.
    pub async fn find_scheduled_plan(&self, name: &str) -> Result<CronWorkflow, ReconcileError> {
        let mut plans = self.cron_workflows.list(&Self::selector(name)).await?;

        match plans.len() {
            0 => Err(ScheduledPlanNotFoundError {
                recurring_task: name.to_string(),
            }
            .into()),
            1 => Ok(plans.remove(0)),
            count => Err(ReconcileError::AmbiguousOwnership {
                name: name.to_string(),
                count,
            }),
        }
    }

    /// Deletes every scheduled plan labelled for the recurring task `name`
    ///
    /// # Returns
    /// The number of plans deleted
    pub async fn delete_scheduled_plan(&self, name: &str) -> Result<usize, ReconcileError> {
        let plans = self.cron_workflows.list(&Self::selector(name)).await?;

        let mut deleted = 0;
        for plan in &plans {
            match self.cron_workflows.delete(plan.name()).await {
                Ok(()) => deleted += 1,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        if deleted > 0 {
            info!("Deleted {} cron workflow(s) of recurring task {}", deleted, name);
        }
        Ok(deleted)
    }

    async fn create_plan(&self, recurring: &RecurringTask) -> Result<(), ReconcileError> {
        let plan = self.compiler.compile_cron_workflow(recurring)?;
        let created = self.cron_workflows.create(&plan).await?;
        info!(
            "Created cron workflow {} for recurring task {}",
            created.name(),
            recurring.name()
        );
        Ok(())
    }
}

#[async_trait]
impl Reconciler for RecurringTaskController {
    type Primary = RecurringTask;
    type Secondary = CronWorkflow;

    const NAME: &'static str = "recurring-task";

    async fn reconcile(&self, name: &str) -> Result<(), ReconcileError> {
        let Some(recurring) = self.recurring_tasks.get_opt(name).await? else {
            debug!("Recurring task {} is gone, nothing to reconcile", name);
            return Ok(());
        };

        if recurring.metadata.deletion_timestamp.is_some() {
            debug!("Recurring task {} is being deleted", name);
            return Ok(());
        }

        let plan = match self.find_scheduled_plan(name).await {
            Ok(plan) => plan,
            Err(ReconcileError::ScheduledPlanNotFound(_)) => {
                return self.create_plan(&recurring).await;
            }
            Err(e) => return Err(e),
        };

        if let Correction::Update(spec) = drift::reconcile_cron_spec(&self.compiler, &recurring, &plan)? {
            warn!(
                "Cron workflow {} drifted from recurring task {}, restoring its spec",
                plan.name(),
                name
            );
            self.cron_workflows.patch_spec(plan.name(), &spec).await?;
        }

        Ok(())
    }

    fn primaries_for(&self, plan: &CronWorkflow) -> Vec<String> {
        plan.metadata
            .labels
            .get(RECURRING_TASK_LABEL)
            .cloned()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolt_client::Client;
    use bolt_core::domain::task::TaskSpec;

    fn setup() -> (RecurringTaskController, Api<RecurringTask>, Api<CronWorkflow>) {
        let client = Client::memory();
        let context = Context::new(client.clone(), PlanCompiler::default(), "default");
        (
            RecurringTaskController::new(&context),
            Api::namespaced(client.clone(), "default"),
            Api::namespaced(client, "default"),
        )
    }

    fn nightly() -> RecurringTask {
        let spec = TaskSpec {
            run_command: "python retrain.py".to_string(),
            project_id: "myproject".to_string(),
            ..TaskSpec::default()
        };
        let mut recurring = RecurringTask::new("nightly-", spec, "0 3 * * *");
        recurring.metadata.name = Some("nightly".to_string());
        recurring.metadata.generate_name = None;
        recurring
    }

    #[tokio::test]
    async fn test_creates_labelled_plan() {
        let (controller, recurring_tasks, cron_workflows) = setup();
        let recurring = recurring_tasks.create(&nightly()).await.unwrap();

        controller.reconcile("nightly").await.unwrap();

        let plan = controller.find_scheduled_plan("nightly").await.unwrap();
        assert_eq!(plan.spec.schedule, "0 3 * * *");
        assert!(plan.is_owned_by(recurring.uid().unwrap()));
        assert_eq!(controller.primaries_for(&plan), vec!["nightly".to_string()]);

        // Converged: nothing to do on the next pass
        controller.reconcile("nightly").await.unwrap();
        let plans = cron_workflows.list(&ListParams::default()).await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].metadata.resource_version, plan.metadata.resource_version);
    }

    #[tokio::test]
    async fn test_restores_schedule_in_place() {
        let (controller, recurring_tasks, cron_workflows) = setup();
        recurring_tasks.create(&nightly()).await.unwrap();
        controller.reconcile("nightly").await.unwrap();
        let plan = controller.find_scheduled_plan("nightly").await.unwrap();

        let mut tampered = plan.spec.clone();
        tampered.schedule = "* * * * *".to_string();
        cron_workflows.patch_spec(plan.name(), &tampered).await.unwrap();

        controller.reconcile("nightly").await.unwrap();

        let healed = controller.find_scheduled_plan("nightly").await.unwrap();
        assert_eq!(healed.spec.schedule, "0 3 * * *");
        assert_eq!(healed.spec, plan.spec);
        assert_eq!(healed.uid(), plan.uid());
    }

    #[tokio::test]
    async fn test_ambiguous_ownership() {
        let (controller, recurring_tasks, cron_workflows) = setup();
        let recurring = recurring_tasks.create(&nightly()).await.unwrap();

        let plan = PlanCompiler::default().compile_cron_workflow(&recurring).unwrap();
        cron_workflows.create(&plan).await.unwrap();
        cron_workflows.create(&plan).await.unwrap();

        let err = controller.reconcile("nightly").await.unwrap_err();
        assert!(matches!(err, ReconcileError::AmbiguousOwnership { count: 2, .. }));
    }

    #[tokio::test]
    async fn test_invalid_schedule_fails() {
        let (controller, recurring_tasks, cron_workflows) = setup();
        let mut recurring = nightly();
        recurring.spec.schedule = "whenever".to_string();
        recurring_tasks.create(&recurring).await.unwrap();

        let err = controller.reconcile("nightly").await.unwrap_err();
        assert!(matches!(err, ReconcileError::Compile(_)));
        assert!(cron_workflows.list(&ListParams::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_scheduled_plan() {
        let (controller, recurring_tasks, _) = setup();
        recurring_tasks.create(&nightly()).await.unwrap();
        controller.reconcile("nightly").await.unwrap();

        assert_eq!(controller.delete_scheduled_plan("nightly").await.unwrap(), 1);
        assert!(
            controller
                .find_scheduled_plan("nightly")
                .await
                .unwrap_err()
                .is_not_found()
        );
        assert_eq!(controller.delete_scheduled_plan("nightly").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deleting_recurring_task_cascades() {
        let (controller, recurring_tasks, cron_workflows) = setup();
        recurring_tasks.create(&nightly()).await.unwrap();
        controller.reconcile("nightly").await.unwrap();

        recurring_tasks.delete("nightly").await.unwrap();
        controller.reconcile("nightly").await.unwrap();

        assert!(cron_workflows.list(&ListParams::default()).await.unwrap().is_empty());
    }
}
