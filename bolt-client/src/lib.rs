//! Bolt Cluster Client
//!
//! Typed, namespaced access to the cluster objects the engine consumes
//! (Task, RecurringTask, Workflow, CronWorkflow, Pod), on top of a
//! pluggable [`Backend`]:
//! - [`HttpBackend`] talks to a cluster API server over REST
//! - [`MemoryBackend`] is an in-process cluster for tests and local runs
//!
//! # Example
//!
//! ```no_run
//! use bolt_client::{Api, Client};
//! use bolt_core::domain::task::{Task, TaskPhase};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::http("https://cluster.local:6443", None);
//! let tasks: Api<Task> = Api::namespaced(client, "default");
//!
//! let task = tasks.create(&Task::new("python train.py", "myproject")).await?;
//! let done = tasks
//!     .wait_for_condition_with_timeout(
//!         &CancellationToken::new(),
//!         task.metadata.name.as_deref().unwrap_or_default(),
//!         |t| t.phase() == Some(TaskPhase::Succeeded),
//!         Duration::from_secs(600),
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod backend;
pub mod error;
pub mod params;
pub mod watch;

// Re-export commonly used types
pub use api::{Api, Client, WatchEvent};
pub use backend::{Backend, HttpBackend, MemoryBackend, Patch};
pub use error::{ClusterError, Result, WaitError};
pub use params::ListParams;
