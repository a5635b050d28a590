//! Reconciliation controllers
//!
//! A controller owns one primary kind (the declaration) and one secondary
//! kind (the object derived from it). Reconciling a primary recomputes the
//! desired secondary from scratch and corrects whatever is observed, so a
//! missed or coalesced event is harmless.

pub mod recurring;
pub mod task;

use async_trait::async_trait;
use bolt_client::Client;
use bolt_core::PlanCompiler;
use bolt_core::domain::meta::Resource;
use std::sync::Arc;

use crate::error::ReconcileError;

pub use recurring::RecurringTaskController;
pub use task::TaskController;

/// Dependencies shared by the controllers
///
/// Passed to controller constructors instead of living in globals.
#[derive(Clone)]
pub struct Context {
    pub client: Client,
    pub compiler: Arc<PlanCompiler>,
    pub namespace: String,
}

impl Context {
    pub fn new(client: Client, compiler: PlanCompiler, namespace: impl Into<String>) -> Self {
        Self {
            client,
            compiler: Arc::new(compiler),
            namespace: namespace.into(),
        }
    }
}

/// A level-triggered reconciler for one declaration kind
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Declaration kind, reconciled by name
    type Primary: Resource;

    /// Derived kind whose changes re-trigger reconciliation of its primary
    type Secondary: Resource;

    /// Name used in logs
    const NAME: &'static str;

    /// Brings the derived objects of the primary called `name` in line with it
    ///
    /// A primary that no longer exists reconciles successfully.
    async fn reconcile(&self, name: &str) -> Result<(), ReconcileError>;

    /// Names of the primaries a secondary object belongs to
    fn primaries_for(&self, secondary: &Self::Secondary) -> Vec<String>;
}
