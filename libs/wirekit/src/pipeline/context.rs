use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde_json::Value;

use crate::container::{Container, RequestScope};
use crate::errors::ResolutionError;
use crate::graph::ModuleId;
use crate::metadata::{MetaTarget, MetadataRegistry};
use crate::token::{Token, TypeKey};

/// Transport-neutral inbound request built by an adapter.
#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: HashMap::new(),
            query: HashMap::new(),
            headers: HeaderMap::new(),
            body: Value::Null,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::POST, path).with_body(body)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Invalid header names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Outbound response handed back to the adapter for encoding.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Response {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }
}

/// Identifies the handler a request was routed to.
#[derive(Clone, Copy, Debug)]
pub struct HandlerInfo {
    pub class: TypeKey,
    pub method: &'static str,
}

/// Reads handler metadata first, then class metadata.
pub struct Reflector<'a> {
    metadata: &'a MetadataRegistry,
    targets: [MetaTarget; 2],
}

impl Reflector<'_> {
    pub fn handler<V: Any + Send + Sync>(&self, key: &str) -> Option<Arc<V>> {
        self.metadata.get(self.targets[0], key)
    }

    pub fn class<V: Any + Send + Sync>(&self, key: &str) -> Option<Arc<V>> {
        self.metadata.get(self.targets[1], key)
    }

    pub fn get_all_and_override<V: Any + Send + Sync>(&self, key: &str) -> Option<Arc<V>> {
        self.metadata.get_all_and_override(key, &self.targets)
    }

    pub fn get_all_and_merge<V: Any + Send + Sync + Clone>(&self, key: &str) -> Vec<V> {
        self.metadata.get_all_and_merge(key, &self.targets)
    }
}

/// Per-request state shared by guards, interceptors, the handler and filters.
pub struct ExecutionContext {
    scope: RequestScope,
    state: Extensions,
    started_at: Instant,
    container: Arc<Container>,
    module: ModuleId,
    handler: HandlerInfo,
    status: StatusCode,
    headers: HeaderMap,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("request_id", &self.scope.id())
            .field("method", &self.request().method)
            .field("path", &self.request().path)
            .field("handler", &self.handler)
            .field("status", &self.status)
            .finish()
    }
}

impl ExecutionContext {
    pub(crate) fn new(
        request: Arc<Request>,
        container: Arc<Container>,
        module: ModuleId,
        handler: HandlerInfo,
        status: StatusCode,
    ) -> Self {
        Self {
            scope: RequestScope::new(request),
            state: Extensions::new(),
            started_at: Instant::now(),
            container,
            module,
            handler,
            status,
            headers: HeaderMap::new(),
        }
    }

    pub fn request(&self) -> &Request {
        self.scope.request()
    }

    pub fn scope(&self) -> &RequestScope {
        &self.scope
    }

    /// Mutable state bag shared along the pipeline.
    pub fn state(&self) -> &Extensions {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut Extensions {
        &mut self.state
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn handler(&self) -> HandlerInfo {
        self.handler
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn reflector(&self) -> Reflector<'_> {
        Reflector {
            metadata: self.container.metadata(),
            targets: [
                MetaTarget::Method(self.handler.class, self.handler.method),
                MetaTarget::Class(self.handler.class),
            ],
        }
    }

    /// Resolve a provider visible to the handling controller's module, within
    /// this request's scope.
    pub async fn resolve<T: Any + Send + Sync>(
        &self,
        token: impl Into<Token>,
    ) -> Result<Arc<T>, ResolutionError> {
        let token = token.into();
        self.container
            .get::<T>(self.module, &token, Some(&self.scope))
            .await
    }

    pub(crate) fn into_response(self, body: Value) -> Response {
        Response {
            status: self.status,
            headers: self.headers,
            body,
        }
    }
}
