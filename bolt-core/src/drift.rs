//! Drift detection
//!
//! Compares a freshly compiled plan against the plan observed in the
//! cluster and decides whether the observed one must be corrected.
//! Both checks are synchronous and never touch the cluster; applying a
//! correction (an in-place spec patch) is the controller's job.

use crate::compiler::PlanCompiler;
use crate::domain::recurring::RecurringTask;
use crate::domain::task::Task;
use crate::domain::workflow::{CronWorkflow, CronWorkflowSpec, Parameter, Workflow, WorkflowSpec};
use crate::error::CompileError;

/// Outcome of a drift check
#[derive(Debug, Clone, PartialEq)]
pub enum Correction<S> {
    /// The observed plan matches the declaration
    InSync,
    /// The observed plan drifted; carries the canonical spec to patch in
    Update(S),
}

impl<S> Correction<S> {
    pub fn needs_update(&self) -> bool {
        matches!(self, Correction::Update(_))
    }

    pub fn into_update(self) -> Option<S> {
        match self {
            Correction::InSync => None,
            Correction::Update(spec) => Some(spec),
        }
    }
}

/// Checks a task's plan for drift
///
/// Only the top-level parameter list is compared, positionally: a length
/// mismatch or any differing name or value at the same index is drift.
/// Parameter order is part of the contract, so a reordered list drifts too.
pub fn reconcile_spec(
    compiler: &PlanCompiler,
    task: &Task,
    observed: &Workflow,
) -> Result<Correction<WorkflowSpec>, CompileError> {
    let canonical = compiler.compile(task)?;

    if parameters_match(
        &canonical.arguments.parameters,
        &observed.spec.arguments.parameters,
    ) {
        Ok(Correction::InSync)
    } else {
        Ok(Correction::Update(canonical))
    }
}

/// Checks a recurring task's scheduled plan for drift
///
/// The whole spec (schedule and embedded plan) is authoritative, so any
/// structural difference is drift.
pub fn reconcile_cron_spec(
    compiler: &PlanCompiler,
    recurring: &RecurringTask,
    observed: &CronWorkflow,
) -> Result<Correction<CronWorkflowSpec>, CompileError> {
    let canonical = compiler.compile_cron_workflow(recurring)?.spec;

    if canonical == observed.spec {
        Ok(Correction::InSync)
    } else {
        Ok(Correction::Update(canonical))
    }
}

fn parameters_match(canonical: &[Parameter], observed: &[Parameter]) -> bool {
    canonical.len() == observed.len()
        && canonical
            .iter()
            .zip(observed)
            .all(|(c, o)| c.name == o.name && c.value == o.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::meta::ObjectMeta;
    use crate::domain::task::{TaskEnvVar, TaskSpec};

    fn task() -> Task {
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

    fn observed(compiler: &PlanCompiler, task: &Task) -> Workflow {
        let mut workflow = compiler.compile_workflow(task).unwrap();
        workflow.metadata.name = Some("train-wf-abcde".to_string());
        workflow.metadata.uid = Some("uid-1".to_string());
        workflow
    }

    #[test]
    fn test_own_output_is_in_sync() {
        let compiler = PlanCompiler::default();
        let task = task();
        let workflow = observed(&compiler, &task);

        let correction = reconcile_spec(&compiler, &task, &workflow).unwrap();
        assert_eq!(correction, Correction::InSync);
        assert!(!correction.needs_update());
    }

    #[test]
    fn test_parameter_mutations_are_drift() {
        let compiler = PlanCompiler::default();
        let task = task();
        let canonical = compiler.compile(&task).unwrap();

        let mutations: Vec<fn(&mut Vec<Parameter>)> = vec![
            |params| params.swap(1, 2),
            |params| params[2].value = "python evil.py".to_string(),
            |params| params.push(Parameter::new("extra", "1")),
            |params| {
                params.pop();
            },
            |params| params.clear(),
            |params| params[0].name = "task".to_string(),
        ];

        for mutate in mutations {
            let mut workflow = observed(&compiler, &task);
            mutate(&mut workflow.spec.arguments.parameters);

            let correction = reconcile_spec(&compiler, &task, &workflow).unwrap();
            assert_eq!(correction.into_update(), Some(canonical.clone()));
        }
    }

    #[test]
    fn test_declaration_edit_is_drift() {
        let compiler = PlanCompiler::default();
        let mut task = task();
        let workflow = observed(&compiler, &task);

        task.spec.run_command = "python train.py --epochs 10".to_string();
        let spec = reconcile_spec(&compiler, &task, &workflow)
            .unwrap()
            .into_update()
            .unwrap();
        assert_eq!(
            spec.arguments.parameters[2],
            Parameter::new("run-command", "python train.py --epochs 10")
        );
    }

    #[test]
    fn test_compile_error_propagates() {
        let compiler = PlanCompiler::default();
        let mut task = task();
        let workflow = observed(&compiler, &task);
        task.spec.resources.insert("cpu".to_string(), "two".to_string());

        assert!(matches!(
            reconcile_spec(&compiler, &task, &workflow),
            Err(CompileError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_cron_drift_compares_whole_spec() {
        let compiler = PlanCompiler::default();
        let mut recurring = RecurringTask::new("nightly-", task().spec, "0 3 * * *");
        recurring.metadata = ObjectMeta::named("nightly", "default");

        let mut cron = compiler.compile_cron_workflow(&recurring).unwrap();
        assert_eq!(
            reconcile_cron_spec(&compiler, &recurring, &cron).unwrap(),
            Correction::InSync
        );

        cron.spec.schedule = "* * * * *".to_string();
        let restored = reconcile_cron_spec(&compiler, &recurring, &cron)
            .unwrap()
            .into_update()
            .unwrap();
        assert_eq!(restored.schedule, "0 3 * * *");

        // Parameters intact, but a template changed
        let mut cron = compiler.compile_cron_workflow(&recurring).unwrap();
        cron.spec.workflow_spec.templates[0].pod_spec_patch = Some("{}".to_string());
        assert!(
            reconcile_cron_spec(&compiler, &recurring, &cron)
                .unwrap()
                .needs_update()
        );
    }
}
