//! Object metadata and kind descriptors shared by every cluster object

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label attached to plans and pods derived from a Task
pub const TASK_LABEL: &str = "task";

/// Label attached to scheduled plans derived from a RecurringTask
pub const RECURRING_TASK_LABEL: &str = "recurring-task";

/// Standard object metadata
///
/// Mirrors the subset of cluster metadata the engine reads and writes.
/// `uid`, `resource_version` and the timestamps are assigned by the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Metadata for an object with a fixed name
    pub fn named(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            namespace: Some(namespace.into()),
            ..Self::default()
        }
    }

    /// Metadata for an object whose name the server generates from `prefix`
    pub fn generated(prefix: impl Into<String>) -> Self {
        Self {
            generate_name: Some(prefix.into()),
            ..Self::default()
        }
    }

    /// Adds a label, replacing any previous value for `key`
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Back-link from a derived object to the object that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_owner_deletion: Option<bool>,
}

/// Static description of a cluster object kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceKind {
    /// API group, empty for the core group
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
    /// Lowercase plural used in REST paths
    pub plural: &'static str,
}

impl ResourceKind {
    /// The `apiVersion` string for this kind (e.g. "bolt.dev/v1alpha1")
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.to_string()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

/// A namespaced cluster object of a statically known kind
///
/// Implemented by the closed set of kinds the engine consumes, so typed
/// access to the cluster is resolved at compile time.
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: ResourceKind;

    fn metadata(&self) -> &ObjectMeta;

    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    /// Object name, empty until the server has assigned one
    fn name(&self) -> &str {
        self.metadata().name.as_deref().unwrap_or_default()
    }

    fn namespace(&self) -> Option<&str> {
        self.metadata().namespace.as_deref()
    }

    fn uid(&self) -> Option<&str> {
        self.metadata().uid.as_deref()
    }

    /// Builds an owner reference pointing at this object
    ///
    /// Returns `None` when the object has not been persisted yet, since an
    /// owner reference without a uid is meaningless.
    fn owner_reference(&self) -> Option<OwnerReference> {
        let uid = self.uid()?;
        Some(OwnerReference {
            api_version: Self::KIND.api_version(),
            kind: Self::KIND.kind.to_string(),
            name: self.name().to_string(),
            uid: uid.to_string(),
            controller: Some(false),
            block_owner_deletion: None,
        })
    }

    /// Whether any owner reference of this object points at `uid`
    fn is_owned_by(&self, uid: &str) -> bool {
        self.metadata()
            .owner_references
            .iter()
            .any(|owner| owner.uid == uid)
    }
}
