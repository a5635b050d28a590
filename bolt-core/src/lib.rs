//! Bolt Core
//!
//! Core types and plan compilation for the Bolt task engine.
//!
//! This crate contains:
//! - Domain types: declarations (Task, RecurringTask) and the plan objects
//!   derived from them (Workflow, CronWorkflow)
//! - Compiler: pure translation of a declaration into an execution plan
//! - Drift: comparison of a freshly compiled plan against an observed one
//!
//! Nothing in this crate performs cluster I/O.

pub mod compiler;
pub mod domain;
pub mod drift;
pub mod error;
pub mod quantity;
pub mod secrets;

pub use compiler::{CompilerConfig, PlanCompiler};
pub use error::CompileError;
