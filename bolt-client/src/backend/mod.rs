//! Cluster backends
//!
//! A backend is the raw capability set of the cluster API server: namespaced
//! get/list/create/patch/delete/watch over JSON objects of a given kind.
//! Typed access lives in [`crate::api`].

use async_trait::async_trait;
use bolt_core::domain::meta::ResourceKind;
use futures::stream::BoxStream;
use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::params::ListParams;

pub mod http;
pub mod memory;

pub use http::HttpBackend;
pub use memory::MemoryBackend;

/// In-place modification of one top-level field of an object
///
/// Spec patches are written by the controller, status patches go to the
/// status subresource. Neither changes the object's uid.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    Spec(Value),
    Status(Value),
}

impl Patch {
    /// Top-level field the patch replaces
    pub fn field(&self) -> &'static str {
        match self {
            Patch::Spec(_) => "spec",
            Patch::Status(_) => "status",
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            Patch::Spec(value) | Patch::Status(value) => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    Added,
    Modified,
    Deleted,
    Bookmark,
    Error,
}

/// One undecoded event of a watch stream
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawEvent {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub object: Value,
}

impl RawEvent {
    pub fn new(event_type: EventType, object: Value) -> Self {
        Self { event_type, object }
    }
}

/// Raw cluster API
///
/// Implementations must be safe to share between concurrently running
/// reconciliations.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<Value>;

    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        params: &ListParams,
    ) -> Result<Vec<Value>>;

    /// Creates an object, assigning uid, resource version and, when only
    /// `metadata.generateName` is set, a name
    async fn create(&self, kind: &ResourceKind, namespace: &str, object: Value) -> Result<Value>;

    async fn patch(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        patch: Patch,
    ) -> Result<Value>;

    async fn delete(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<()>;

    /// Opens a watch stream
    ///
    /// Without a resource version the stream starts with an `Added` event
    /// per existing matching object. The stream ends when the server closes
    /// it; dropping it releases the subscription.
    async fn watch(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        params: &ListParams,
        resource_version: Option<&str>,
    ) -> Result<BoxStream<'static, Result<RawEvent>>>;
}
