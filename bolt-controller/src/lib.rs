//! Bolt Controller
//!
//! Reconciles Task and RecurringTask declarations into the Workflow and
//! CronWorkflow objects a workflow engine executes, and keeps the derived
//! objects and the declarations' status in line with each other.
//!
//! Architecture:
//! - Configuration: Load settings from environment or defaults
//! - Controllers: One reconciler per declaration kind
//! - Manager: Watches, work queue, bounded workers and retries
//! - API: Liveness and readiness probes

pub mod api;
pub mod config;
pub mod controller;
pub mod error;
pub mod manager;
