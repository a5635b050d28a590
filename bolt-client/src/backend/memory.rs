//! In-memory cluster
//!
//! Implements the same object semantics as the API server for the parts the
//! engine relies on: server-assigned uids and names, monotonically
//! increasing resource versions, equality selectors, watch streams and
//! owner-reference garbage collection. Used by tests and by local runs
//! without a cluster.

use async_trait::async_trait;
use bolt_core::domain::meta::ResourceKind;
use chrono::{SecondsFormat, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Backend, EventType, Patch, RawEvent};
use crate::error::{ClusterError, Result};
use crate::params::ListParams;

const WATCH_CAPACITY: usize = 1024;
const GENERATED_SUFFIX_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ObjectKey {
    kind: String,
    namespace: String,
    name: String,
}

impl ObjectKey {
    fn new(kind: &ResourceKind, namespace: &str, name: &str) -> Self {
        Self {
            kind: kind_key(kind),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

fn kind_key(kind: &ResourceKind) -> String {
    format!("{}/{}", kind.group, kind.plural)
}

/// An event together with the collection it belongs to
#[derive(Debug, Clone)]
struct StoredEvent {
    kind: String,
    namespace: String,
    event: RawEvent,
}

struct State {
    objects: BTreeMap<ObjectKey, Value>,
    resource_version: u64,
    events: broadcast::Sender<StoredEvent>,
}

impl State {
    fn next_resource_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn emit(&self, key: &ObjectKey, event_type: EventType, object: &Value) {
        // No subscribers is not an error
        let _ = self.events.send(StoredEvent {
            kind: key.kind.clone(),
            namespace: key.namespace.clone(),
            event: RawEvent::new(event_type, object.clone()),
        });
    }
}

/// In-process cluster backend
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                resource_version: 0,
                events,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ends every open watch stream, as an API server does on timeout
    ///
    /// Watches opened afterwards work normally.
    pub fn close_watches(&self) {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        self.state().events = events;
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn metadata_mut(object: &mut Value) -> Result<&mut serde_json::Map<String, Value>> {
    let map = object
        .as_object_mut()
        .ok_or_else(|| ClusterError::InvalidRequest("object must be a JSON map".to_string()))?;
    map.entry("metadata")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .ok_or_else(|| ClusterError::InvalidRequest("metadata must be a JSON map".to_string()))
}

fn owned_by(object: &Value, uid: &str) -> bool {
    object["metadata"]["ownerReferences"]
        .as_array()
        .is_some_and(|owners| owners.iter().any(|owner| owner["uid"] == uid))
}

fn generated_name(prefix: &str) -> String {
    let suffix: String = Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(GENERATED_SUFFIX_LEN)
        .collect();
    format!("{}{}", prefix, suffix)
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<Value> {
        self.state()
            .objects
            .get(&ObjectKey::new(kind, namespace, name))
            .cloned()
            .ok_or_else(|| ClusterError::not_found(kind.kind, name))
    }

    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        params: &ListParams,
    ) -> Result<Vec<Value>> {
        let kind = kind_key(kind);
        let state = self.state();

        let mut items = Vec::new();
        for (key, object) in &state.objects {
            if key.kind == kind && key.namespace == namespace && params.matches(object)? {
                items.push(object.clone());
            }
        }
        Ok(items)
    }

    async fn create(&self, kind: &ResourceKind, namespace: &str, mut object: Value) -> Result<Value> {
        let mut state = self.state();

        let metadata = metadata_mut(&mut object)?;
        let name = match (metadata.get("name"), metadata.get("generateName")) {
            (Some(Value::String(name)), _) if !name.is_empty() => name.clone(),
            (_, Some(Value::String(prefix))) => generated_name(prefix),
            _ => {
                return Err(ClusterError::InvalidRequest(format!(
                    "{} needs a name or generateName",
                    kind.kind
                )));
            }
        };

        let key = ObjectKey::new(kind, namespace, &name);
        if state.objects.contains_key(&key) {
            return Err(ClusterError::AlreadyExists {
                kind: kind.kind.to_string(),
                name,
            });
        }

        let resource_version = state.next_resource_version();
        metadata.insert("name".to_string(), json!(name));
        metadata.insert("namespace".to_string(), json!(namespace));
        metadata.insert("uid".to_string(), json!(Uuid::new_v4().to_string()));
        metadata.insert("resourceVersion".to_string(), json!(resource_version));
        metadata.insert(
            "creationTimestamp".to_string(),
            json!(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        );

        if let Some(map) = object.as_object_mut() {
            map.insert("apiVersion".to_string(), json!(kind.api_version()));
            map.insert("kind".to_string(), json!(kind.kind));
        }

        debug!("Created {} {}/{}", kind.kind, namespace, name);
        state.emit(&key, EventType::Added, &object);
        state.objects.insert(key, object.clone());
        Ok(object)
    }

    async fn patch(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        patch: Patch,
    ) -> Result<Value> {
        let mut state = self.state();
        let key = ObjectKey::new(kind, namespace, name);
        if !state.objects.contains_key(&key) {
            return Err(ClusterError::not_found(kind.kind, name));
        }
        let resource_version = state.next_resource_version();

        let object = state
            .objects
            .get_mut(&key)
            .ok_or_else(|| ClusterError::not_found(kind.kind, name))?;

        if let Some(map) = object.as_object_mut() {
            map.insert(patch.field().to_string(), patch.value().clone());
        }
        metadata_mut(object)?.insert("resourceVersion".to_string(), json!(resource_version));

        let object = object.clone();
        state.emit(&key, EventType::Modified, &object);
        Ok(object)
    }

    /// Deletes an object and, transitively, everything it owns
    async fn delete(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<()> {
        let mut state = self.state();
        let key = ObjectKey::new(kind, namespace, name);

        if !state.objects.contains_key(&key) {
            return Err(ClusterError::not_found(kind.kind, name));
        }

        let mut pending = vec![key];
        while let Some(key) = pending.pop() {
            let Some(object) = state.objects.remove(&key) else {
                continue;
            };
            state.emit(&key, EventType::Deleted, &object);

            if let Some(uid) = object["metadata"]["uid"].as_str() {
                pending.extend(
                    state
                        .objects
                        .iter()
                        .filter(|(dependent, value)| {
                            dependent.namespace == key.namespace && owned_by(value, uid)
                        })
                        .map(|(dependent, _)| dependent.clone()),
                );
            }
            debug!("Deleted {}/{}", key.namespace, key.name);
        }

        Ok(())
    }

    async fn watch(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        params: &ListParams,
        resource_version: Option<&str>,
    ) -> Result<BoxStream<'static, Result<RawEvent>>> {
        // Reject malformed selectors up front rather than mid-stream
        params.matches(&json!({}))?;

        let kind = kind_key(kind);
        let namespace = namespace.to_string();
        let params = params.clone();

        // Subscribing and snapshotting under one lock means no event falls
        // between the initial state and the live stream
        let (mut receiver, initial) = {
            let state = self.state();
            let receiver = state.events.subscribe();
            let initial: Vec<RawEvent> = match resource_version {
                Some(_) => Vec::new(),
                None => state
                    .objects
                    .iter()
                    .filter(|(key, object)| {
                        key.kind == kind
                            && key.namespace == namespace
                            && params.matches(object).unwrap_or(false)
                    })
                    .map(|(_, object)| RawEvent::new(EventType::Added, object.clone()))
                    .collect(),
            };
            (receiver, initial)
        };

        let events = async_stream::stream! {
            for event in initial {
                yield Ok(event);
            }

            loop {
                match receiver.recv().await {
                    Ok(stored) => {
                        if stored.kind != kind || stored.namespace != namespace {
                            continue;
                        }
                        if params.matches(&stored.event.object).unwrap_or(false) {
                            yield Ok(stored.event);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Watch on {} lagged, {} events missed", kind, missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Ok(events.boxed())
    }
}
