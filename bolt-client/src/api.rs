//! Typed access to namespaced objects

use bolt_core::domain::meta::Resource;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::{Value, json};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use crate::backend::{Backend, EventType, HttpBackend, MemoryBackend, Patch, RawEvent};
use crate::error::{ClusterError, Result};
use crate::params::ListParams;

/// Shared handle to the cluster
///
/// Cheap to clone; every clone talks to the same backend.
#[derive(Clone)]
pub struct Client {
    backend: Arc<dyn Backend>,
}

impl Client {
    pub fn new(backend: impl Backend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Client for an in-process cluster
    pub fn memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Client for the API server at `base_url`
    ///
    /// # Arguments
    /// * `base_url` - API server URL (e.g., "https://cluster.local:6443")
    /// * `token` - Bearer token, if the server requires one
    pub fn http(base_url: impl Into<String>, token: Option<String>) -> Self {
        let backend = HttpBackend::new(base_url);
        match token {
            Some(token) => Self::new(backend.with_token(token)),
            None => Self::new(backend),
        }
    }

    pub fn from_backend(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }
}

/// A change observed on a watched object
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K> {
    Added(K),
    Modified(K),
    Deleted(K),
    /// Progress marker carrying the latest resource version
    Bookmark(Option<String>),
}

impl<K> WatchEvent<K> {
    pub fn object(&self) -> Option<&K> {
        match self {
            WatchEvent::Added(object) | WatchEvent::Modified(object) | WatchEvent::Deleted(object) => {
                Some(object)
            }
            WatchEvent::Bookmark(_) => None,
        }
    }

    pub fn into_object(self) -> Option<K> {
        match self {
            WatchEvent::Added(object) | WatchEvent::Modified(object) | WatchEvent::Deleted(object) => {
                Some(object)
            }
            WatchEvent::Bookmark(_) => None,
        }
    }
}

/// Typed handle for objects of kind `K` in one namespace
pub struct Api<K> {
    client: Client,
    namespace: String,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Clone for Api<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            namespace: self.namespace.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K: Resource> Api<K> {
    pub fn namespaced(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            _kind: PhantomData,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn backend(&self) -> &dyn Backend {
        self.client.backend.as_ref()
    }

    pub async fn get(&self, name: &str) -> Result<K> {
        let object = self.backend().get(&K::KIND, &self.namespace, name).await?;
        decode(object)
    }

    /// Like [`Api::get`], with not-found mapped to `None`
    pub async fn get_opt(&self, name: &str) -> Result<Option<K>> {
        match self.get(name).await {
            Ok(object) => Ok(Some(object)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list(&self, params: &ListParams) -> Result<Vec<K>> {
        self.backend()
            .list(&K::KIND, &self.namespace, params)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Creates `object` in this namespace and returns it as stored
    pub async fn create(&self, object: &K) -> Result<K> {
        let mut value = serde_json::to_value(object)?;
        if let Some(map) = value.as_object_mut() {
            map.insert("apiVersion".to_string(), json!(K::KIND.api_version()));
            map.insert("kind".to_string(), json!(K::KIND.kind));
        }

        let created = self.backend().create(&K::KIND, &self.namespace, value).await?;
        decode(created)
    }

    /// Replaces the spec of an existing object in place
    pub async fn patch_spec<S: Serialize>(&self, name: &str, spec: &S) -> Result<K> {
        let patch = Patch::Spec(serde_json::to_value(spec)?);
        let patched = self.backend().patch(&K::KIND, &self.namespace, name, patch).await?;
        decode(patched)
    }

    /// Replaces the status of an existing object
    pub async fn patch_status<S: Serialize>(&self, name: &str, status: &S) -> Result<K> {
        let patch = Patch::Status(serde_json::to_value(status)?);
        let patched = self.backend().patch(&K::KIND, &self.namespace, name, patch).await?;
        decode(patched)
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.backend().delete(&K::KIND, &self.namespace, name).await
    }

    /// Opens a typed watch stream
    ///
    /// Events whose payload is not a `K` are dropped: a watch stream may
    /// carry objects this engine does not model.
    pub async fn watch_events(
        &self,
        params: &ListParams,
        resource_version: Option<&str>,
    ) -> Result<BoxStream<'static, Result<WatchEvent<K>>>> {
        let raw = self
            .backend()
            .watch(&K::KIND, &self.namespace, params, resource_version)
            .await?;

        let events = raw.filter_map(|event| async move {
            match event {
                Ok(event) => typed_event(event).map(Ok),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(events.boxed())
    }
}

fn decode<K: Resource>(object: Value) -> Result<K> {
    serde_json::from_value(object).map_err(|e| {
        ClusterError::ParseError(format!("not a valid {}: {}", K::KIND.kind, e))
    })
}

fn typed_event<K: Resource>(event: RawEvent) -> Option<WatchEvent<K>> {
    if event.event_type == EventType::Bookmark {
        let version = event.object["metadata"]["resourceVersion"]
            .as_str()
            .map(str::to_string);
        return Some(WatchEvent::Bookmark(version));
    }

    if let Some(kind) = event.object.get("kind").and_then(Value::as_str) {
        if kind != K::KIND.kind {
            debug!("Dropping {} event on a {} watch", kind, K::KIND.kind);
            return None;
        }
    }

    let object: K = match serde_json::from_value(event.object) {
        Ok(object) => object,
        Err(e) => {
            debug!("Dropping undecodable {} event: {}", K::KIND.kind, e);
            return None;
        }
    };

    match event.event_type {
        EventType::Added => Some(WatchEvent::Added(object)),
        EventType::Modified => Some(WatchEvent::Modified(object)),
        EventType::Deleted => Some(WatchEvent::Deleted(object)),
        EventType::Bookmark | EventType::Error => None,
    }
}
