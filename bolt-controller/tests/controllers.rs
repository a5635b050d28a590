//! End-to-end runs of both controllers against the in-memory cluster

use bolt_client::{Api, Client, ListParams};
use bolt_controller::controller::{Context, RecurringTaskController, TaskController};
use bolt_controller::manager::{Manager, ManagerSettings};
use bolt_core::PlanCompiler;
use bolt_core::domain::meta::{RECURRING_TASK_LABEL, Resource, TASK_LABEL};
use bolt_core::domain::recurring::RecurringTask;
use bolt_core::domain::task::{Task, TaskPhase, TaskSpec};
use bolt_core::domain::workflow::{CronWorkflow, Workflow, WorkflowPhase, WorkflowStatus};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const NAMESPACE: &str = "default";
const WAIT: Duration = Duration::from_secs(10);

struct Harness {
    client: Client,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Harness {
    fn start() -> Self {
        let client = Client::memory();
        let context = Context::new(client.clone(), PlanCompiler::default(), NAMESPACE);
        let settings = ManagerSettings {
            max_concurrent_reconciles: 4,
            resync_interval: Duration::from_secs(300),
            retry_base_delay: Duration::from_millis(50),
            retry_max_delay: Duration::from_secs(1),
        };
        let cancel = CancellationToken::new();

        let tasks = Manager::new(TaskController::new(&context), &context, settings.clone());
        let recurring = Manager::new(RecurringTaskController::new(&context), &context, settings);

        let handles = vec![
            {
                let cancel = cancel.clone();
                tokio::spawn(async move { tasks.run(cancel).await })
            },
            {
                let cancel = cancel.clone();
                tokio::spawn(async move { recurring.run(cancel).await })
            },
        ];

        Self {
            client,
            cancel,
            handles,
        }
    }

    fn api<K: Resource>(&self) -> Api<K> {
        Api::namespaced(self.client.clone(), NAMESPACE)
    }

    async fn plan_of(&self, task: &str) -> Workflow {
        let workflows: Api<Workflow> = self.api();
        for _ in 0..100 {
            let plans = workflows
                .list(&ListParams::default().labels(TASK_LABEL, task))
                .await
                .unwrap();
            if let Some(plan) = plans.into_iter().next() {
                return plan;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("no workflow created for task {}", task);
    }

    async fn stop(self) {
        self.cancel.cancel();
        for handle in self.handles {
            handle.await.unwrap();
        }
    }
}

fn train() -> Task {
    Task::named(
        "train",
        NAMESPACE,
        TaskSpec {
            run_command: "python train.py".to_string(),
            project_id: "myproject".to_string(),
            ..TaskSpec::default()
        },
    )
}

#[tokio::test]
async fn test_task_gets_plan_and_pending_status() {
    let harness = Harness::start();
    let tasks: Api<Task> = harness.api();
    let task = tasks.create(&train()).await.unwrap();

    let pending = tasks
        .wait_for_condition_with_timeout(
            &harness.cancel,
            "train",
            |t: &Task| t.phase() == Some(TaskPhase::Pending),
            WAIT,
        )
        .await
        .unwrap();
    assert_eq!(pending.uid(), task.uid());

    let plan = harness.plan_of("train").await;
    assert!(plan.is_owned_by(task.uid().unwrap()));
    assert_eq!(plan.run_command(), Some("python train.py"));

    harness.stop().await;
}

#[tokio::test]
async fn test_status_follows_workflow() {
    let harness = Harness::start();
    let tasks: Api<Task> = harness.api();
    let workflows: Api<Workflow> = harness.api();
    tasks.create(&train()).await.unwrap();

    let plan = harness.plan_of("train").await;
    workflows
        .patch_status(plan.name(), &WorkflowStatus::with_phase(WorkflowPhase::Running))
        .await
        .unwrap();

    tasks
        .wait_for_condition_with_timeout(
            &harness.cancel,
            "train",
            |t: &Task| t.phase() == Some(TaskPhase::Running),
            WAIT,
        )
        .await
        .unwrap();

    workflows
        .patch_status(
            plan.name(),
            &WorkflowStatus {
                phase: Some(WorkflowPhase::Failed),
                message: Some("OOMKilled".to_string()),
            },
        )
        .await
        .unwrap();

    let failed = tasks
        .wait_for_condition_with_timeout(
            &harness.cancel,
            "train",
            |t: &Task| t.phase() == Some(TaskPhase::Failed),
            WAIT,
        )
        .await
        .unwrap();
    assert_eq!(
        failed.status.and_then(|s| s.reason).as_deref(),
        Some("OOMKilled")
    );

    harness.stop().await;
}

#[tokio::test]
async fn test_tampered_plan_is_healed_in_place() {
    let harness = Harness::start();
    let tasks: Api<Task> = harness.api();
    let workflows: Api<Workflow> = harness.api();
    tasks.create(&train()).await.unwrap();

    let plan = harness.plan_of("train").await;
    let mut tampered = plan.spec.clone();
    tampered.arguments.parameters[1].value = "other-project".to_string();
    workflows.patch_spec(plan.name(), &tampered).await.unwrap();

    let healed = workflows
        .wait_for_condition_with_timeout(
            &harness.cancel,
            plan.name(),
            |w: &Workflow| w.project_id() == Some("myproject"),
            WAIT,
        )
        .await
        .unwrap();
    assert_eq!(healed.uid(), plan.uid());
    assert_eq!(healed.spec.arguments, plan.spec.arguments);

    harness.stop().await;
}

#[tokio::test]
async fn test_deleted_plan_is_recreated() {
    let harness = Harness::start();
    let tasks: Api<Task> = harness.api();
    let workflows: Api<Workflow> = harness.api();
    tasks.create(&train()).await.unwrap();

    let plan = harness.plan_of("train").await;
    workflows.delete(plan.name()).await.unwrap();

    let mut replacement = None;
    for _ in 0..100 {
        let plans = workflows
            .list(&ListParams::default().labels(TASK_LABEL, "train"))
            .await
            .unwrap();
        if let Some(found) = plans.into_iter().find(|p| p.uid() != plan.uid()) {
            replacement = Some(found);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let replacement = replacement.expect("plan was not recreated");
    assert_eq!(replacement.spec, plan.spec);

    harness.stop().await;
}

#[tokio::test]
async fn test_recurring_task_gets_scheduled_plan() {
    let harness = Harness::start();
    let recurring_tasks: Api<RecurringTask> = harness.api();
    let cron_workflows: Api<CronWorkflow> = harness.api();

    let mut nightly = RecurringTask::new(
        "nightly-",
        TaskSpec {
            run_command: "python retrain.py".to_string(),
            project_id: "myproject".to_string(),
            ..TaskSpec::default()
        },
        "0 3 * * *",
    );
    nightly.metadata.namespace = Some(NAMESPACE.to_string());
    let created = recurring_tasks.create(&nightly).await.unwrap();

    let mut plan = None;
    for _ in 0..100 {
        let plans = cron_workflows
            .list(&ListParams::default().labels(RECURRING_TASK_LABEL, created.name()))
            .await
            .unwrap();
        if let Some(found) = plans.into_iter().next() {
            plan = Some(found);
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    let plan = plan.expect("no cron workflow created");
    assert_eq!(plan.spec.schedule, "0 3 * * *");

    // Schedule drift is reverted
    let mut tampered = plan.spec.clone();
    tampered.schedule = "*/5 * * * *".to_string();
    cron_workflows.patch_spec(plan.name(), &tampered).await.unwrap();

    let healed = cron_workflows
        .wait_for_condition_with_timeout(
            &harness.cancel,
            plan.name(),
            |c: &CronWorkflow| c.spec.schedule == "0 3 * * *",
            WAIT,
        )
        .await
        .unwrap();
    assert_eq!(healed.uid(), plan.uid());

    // Let the reconciliations triggered by the heal settle
    tokio::time::sleep(Duration::from_millis(200)).await;

    // Deleting the recurring task removes its scheduled plan
    recurring_tasks.delete(created.name()).await.unwrap();
    assert!(cron_workflows.list(&ListParams::default()).await.unwrap().is_empty());

    harness.stop().await;
}
