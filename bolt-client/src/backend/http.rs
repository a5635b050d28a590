//! HTTP backend talking to a cluster API server

use async_trait::async_trait;
use bolt_core::domain::meta::ResourceKind;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};
use tracing::debug;

use super::{Backend, EventType, Patch, RawEvent};
use crate::error::{ClusterError, Result};
use crate::params::ListParams;

/// Backend for a cluster REST API
///
/// Objects of the core group live under `/api/{version}`, every other group
/// under `/apis/{group}/{version}`. Patches are sent as JSON patches; status
/// patches go to the `status` subresource.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    /// Base URL of the API server (e.g., "https://cluster.local:6443")
    base_url: String,
    /// Bearer token, if the server requires one
    token: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl HttpBackend {
    /// Create a backend for the API server at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a backend with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            client,
        }
    }

    /// Authenticate every request with `token`
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, kind: &ResourceKind, namespace: &str) -> String {
        let prefix = if kind.group.is_empty() {
            format!("{}/api/{}", self.base_url, kind.version)
        } else {
            format!("{}/apis/{}/{}", self.base_url, kind.group, kind.version)
        };
        format!("{}/namespaces/{}/{}", prefix, namespace, kind.plural)
    }

    fn object_url(&self, kind: &ResourceKind, namespace: &str, name: &str) -> String {
        format!("{}/{}", self.collection_url(kind, namespace), name)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Maps error statuses onto [`ClusterError`] and returns the response otherwise
    async fn check_status(response: Response, kind: &ResourceKind, name: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Err(match status {
            StatusCode::NOT_FOUND => ClusterError::not_found(kind.kind, name),
            StatusCode::CONFLICT => ClusterError::AlreadyExists {
                kind: kind.kind.to_string(),
                name: name.to_string(),
            },
            _ => ClusterError::api_error(status.as_u16(), error_text),
        })
    }

    async fn handle_response(response: Response, kind: &ResourceKind, name: &str) -> Result<Value> {
        Self::check_status(response, kind, name)
            .await?
            .json()
            .await
            .map_err(|e| ClusterError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn get(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<Value> {
        let url = self.object_url(kind, namespace, name);
        let response = self.request(Method::GET, &url).send().await?;

        Self::handle_response(response, kind, name).await
    }

    async fn list(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        params: &ListParams,
    ) -> Result<Vec<Value>> {
        let url = self.collection_url(kind, namespace);
        let response = self
            .request(Method::GET, &url)
            .query(&params.query())
            .send()
            .await?;

        let mut list = Self::handle_response(response, kind, "").await?;
        match list.get_mut("items").map(Value::take) {
            Some(Value::Array(items)) => Ok(items),
            Some(Value::Null) | None => Ok(Vec::new()),
            Some(other) => Err(ClusterError::ParseError(format!(
                "expected an item array, got {}",
                other
            ))),
        }
    }

    async fn create(&self, kind: &ResourceKind, namespace: &str, object: Value) -> Result<Value> {
        let url = self.collection_url(kind, namespace);
        let name = object["metadata"]["name"]
            .as_str()
            .or_else(|| object["metadata"]["generateName"].as_str())
            .unwrap_or_default()
            .to_string();
        let response = self.request(Method::POST, &url).json(&object).send().await?;

        Self::handle_response(response, kind, &name).await
    }

    async fn patch(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        name: &str,
        patch: Patch,
    ) -> Result<Value> {
        let mut url = self.object_url(kind, namespace, name);
        if matches!(patch, Patch::Status(_)) {
            url.push_str("/status");
        }

        // "add" replaces an existing member and creates a missing one
        let body = json!([{
            "op": "add",
            "path": format!("/{}", patch.field()),
            "value": patch.value(),
        }]);
        let response = self
            .request(Method::PATCH, &url)
            .header(reqwest::header::CONTENT_TYPE, "application/json-patch+json")
            .body(body.to_string())
            .send()
            .await?;

        Self::handle_response(response, kind, name).await
    }

    async fn delete(&self, kind: &ResourceKind, namespace: &str, name: &str) -> Result<()> {
        let url = self.object_url(kind, namespace, name);
        let response = self
            .request(Method::DELETE, &url)
            .json(&json!({ "propagationPolicy": "Background" }))
            .send()
            .await?;

        Self::check_status(response, kind, name).await?;
        Ok(())
    }

    async fn watch(
        &self,
        kind: &ResourceKind,
        namespace: &str,
        params: &ListParams,
        resource_version: Option<&str>,
    ) -> Result<BoxStream<'static, Result<RawEvent>>> {
        let url = self.collection_url(kind, namespace);
        let mut query = params.query();
        query.push(("watch", "true".to_string()));
        if let Some(version) = resource_version {
            query.push(("resourceVersion", version.to_string()));
        }

        debug!("Opening watch on {} with {:?}", url, query);
        let response = self.request(Method::GET, &url).query(&query).send().await?;
        let response = Self::check_status(response, kind, "").await?;
        let mut bytes = Box::pin(response.bytes_stream());

        // The server sends one JSON event per line
        let events = async_stream::stream! {
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk) = bytes.next().await {
                match chunk {
                    Ok(chunk) => {
                        buffer.extend_from_slice(&chunk);
                        while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
                            let line: Vec<u8> = buffer.drain(..=end).collect();
                            if let Some(event) = decode_line(&line) {
                                yield event;
                            }
                        }
                    }
                    Err(e) => {
                        yield Err(ClusterError::from(e));
                        return;
                    }
                }
            }

            if let Some(event) = decode_line(&buffer) {
                yield event;
            }
        };

        Ok(events.boxed())
    }
}

fn decode_line(line: &[u8]) -> Option<Result<RawEvent>> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }

    let event: RawEvent = match serde_json::from_slice(line) {
        Ok(event) => event,
        Err(e) => return Some(Err(ClusterError::WatchError(format!("undecodable event: {}", e)))),
    };

    if event.event_type == EventType::Error {
        let message = event.object["message"]
            .as_str()
            .unwrap_or("watch error without a message")
            .to_string();
        return Some(Err(ClusterError::WatchError(message)));
    }

    Some(Ok(event))
}
