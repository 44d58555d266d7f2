//! Controllers and their routes.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use http::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::errors::ResolutionError;
use crate::lifecycle::Lifecycle;
use crate::metadata::{
    MetaKey, MetaTarget, MetaValue, MetaWrite, FILTERS_METADATA, GUARDS_METADATA,
    INTERCEPTORS_METADATA,
};
use crate::provider::{Injectable, Instance, Provider, Scope};
use crate::token::{Token, TypeKey};

use super::enhancer::{FilterBinding, GuardBinding, InterceptorBinding};
use super::extract::{ParamExtractor, Params};

pub(crate) type HandlerFn =
    Arc<dyn Fn(Instance, Params) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// One handler of a controller.
pub struct Route {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) name: &'static str,
    pub(crate) status: Option<StatusCode>,
    pub(crate) extractors: Vec<Arc<dyn ParamExtractor>>,
    pub(crate) handler: HandlerFn,
    guards: Vec<GuardBinding>,
    interceptors: Vec<InterceptorBinding>,
    filters: Vec<FilterBinding>,
    metadata: Vec<(MetaKey, MetaValue)>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("name", &self.name)
            .field("params", &self.extractors.len())
            .finish()
    }
}

impl Route {
    /// `name` identifies the handler in metadata (`MetaTarget::Method`).
    /// The handler receives the controller instance and the extracted
    /// parameters; its result is serialized into the response body.
    pub fn new<C, F, Fut, R>(method: Method, path: &str, name: &'static str, handler: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(Arc<C>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        let handler: HandlerFn = Arc::new(move |instance: Instance, params: Params| {
            match instance.downcast::<C>() {
                Ok(controller) => {
                    let fut = handler(controller, params);
                    async move {
                        let value = fut.await?;
                        Ok::<_, anyhow::Error>(serde_json::to_value(value)?)
                    }
                    .boxed()
                }
                Err(_) => {
                    let err = ResolutionError::TypeMismatch {
                        token: Token::of::<C>(),
                        expected: std::any::type_name::<C>(),
                    };
                    async move { Err::<Value, _>(anyhow::Error::from(err)) }.boxed()
                }
            }
        });

        Self {
            method,
            path: path.to_string(),
            name,
            status: None,
            extractors: Vec::new(),
            handler,
            guards: Vec::new(),
            interceptors: Vec::new(),
            filters: Vec::new(),
            metadata: Vec::new(),
        }
    }

    pub fn get<C, F, Fut, R>(path: &str, name: &'static str, handler: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(Arc<C>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        Self::new(Method::GET, path, name, handler)
    }

    pub fn post<C, F, Fut, R>(path: &str, name: &'static str, handler: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(Arc<C>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        Self::new(Method::POST, path, name, handler)
    }

    pub fn put<C, F, Fut, R>(path: &str, name: &'static str, handler: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(Arc<C>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        Self::new(Method::PUT, path, name, handler)
    }

    pub fn delete<C, F, Fut, R>(path: &str, name: &'static str, handler: F) -> Self
    where
        C: Any + Send + Sync,
        F: Fn(Arc<C>, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Serialize + Send + 'static,
    {
        Self::new(Method::DELETE, path, name, handler)
    }

    /// Extractor for the next handler parameter.
    pub fn param(mut self, extractor: Arc<dyn ParamExtractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    /// Success status; POST defaults to 201, everything else to 200.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn guard(mut self, binding: GuardBinding) -> Self {
        self.guards.push(binding);
        self
    }

    pub fn interceptor(mut self, binding: InterceptorBinding) -> Self {
        self.interceptors.push(binding);
        self
    }

    pub fn filter(mut self, binding: FilterBinding) -> Self {
        self.filters.push(binding);
        self
    }

    /// Handler-level metadata, read by guards through the reflector.
    pub fn metadata<V: Any + Send + Sync>(mut self, key: impl Into<MetaKey>, value: V) -> Self {
        self.metadata.push((key.into(), Arc::new(value)));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn default_status(&self) -> StatusCode {
        self.status.unwrap_or(if self.method == Method::POST {
            StatusCode::CREATED
        } else {
            StatusCode::OK
        })
    }
}

/// A controller: an injectable class plus the routes it serves.
///
/// The class is registered as a provider of the declaring module. Bindings
/// declared by injectable type are registered there too.
pub struct Controller {
    class: TypeKey,
    prefix: String,
    provider: Provider,
    routes: Vec<Route>,
    writes: Vec<MetaWrite>,
    enhancers: Vec<Provider>,
}

pub(crate) struct ControllerParts {
    pub(crate) class: TypeKey,
    pub(crate) prefix: String,
    pub(crate) provider: Provider,
    pub(crate) routes: Vec<Route>,
    pub(crate) writes: Vec<MetaWrite>,
    pub(crate) enhancers: Vec<Provider>,
}

impl Controller {
    pub fn new<T: Injectable>(prefix: impl Into<String>) -> Self {
        Self {
            class: TypeKey::of::<T>(),
            prefix: prefix.into(),
            provider: Provider::class::<T>(),
            routes: Vec::new(),
            writes: Vec::new(),
            enhancers: Vec::new(),
        }
    }

    pub fn route(mut self, mut route: Route) -> Self {
        let target = MetaTarget::Method(self.class, route.name);
        for guard in std::mem::take(&mut route.guards) {
            let provider = guard.provider().cloned();
            self.bind(target, GUARDS_METADATA, provider, Arc::new(guard));
        }
        for interceptor in std::mem::take(&mut route.interceptors) {
            let provider = interceptor.provider().cloned();
            self.bind(target, INTERCEPTORS_METADATA, provider, Arc::new(interceptor));
        }
        for filter in std::mem::take(&mut route.filters) {
            let provider = filter.binding().provider().cloned();
            self.bind(target, FILTERS_METADATA, provider, Arc::new(filter));
        }
        for (key, value) in std::mem::take(&mut route.metadata) {
            self.writes.push(MetaWrite::Set(target, key, value));
        }
        self.routes.push(route);
        self
    }

    pub fn guard(mut self, binding: GuardBinding) -> Self {
        let target = MetaTarget::Class(self.class);
        let provider = binding.provider().cloned();
        self.bind(target, GUARDS_METADATA, provider, Arc::new(binding));
        self
    }

    pub fn interceptor(mut self, binding: InterceptorBinding) -> Self {
        let target = MetaTarget::Class(self.class);
        let provider = binding.provider().cloned();
        self.bind(target, INTERCEPTORS_METADATA, provider, Arc::new(binding));
        self
    }

    pub fn filter(mut self, binding: FilterBinding) -> Self {
        let target = MetaTarget::Class(self.class);
        let provider = binding.binding().provider().cloned();
        self.bind(target, FILTERS_METADATA, provider, Arc::new(binding));
        self
    }

    /// Class-level metadata.
    pub fn metadata<V: Any + Send + Sync>(mut self, key: impl Into<MetaKey>, value: V) -> Self {
        self.writes.push(MetaWrite::Set(
            MetaTarget::Class(self.class),
            key.into(),
            Arc::new(value),
        ));
        self
    }

    /// Inherit class and handler metadata from `Parent`.
    pub fn extends<Parent: 'static>(mut self) -> Self {
        self.writes
            .push(MetaWrite::Extend(self.class, TypeKey::of::<Parent>()));
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.provider = self.provider.scope(scope);
        self
    }

    pub fn with_lifecycle<L: Lifecycle + Any + Send + Sync>(mut self) -> Self {
        self.provider = self.provider.with_lifecycle::<L>();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn bind(
        &mut self,
        target: MetaTarget,
        key: &'static str,
        provider: Option<Provider>,
        value: MetaValue,
    ) {
        if let Some(provider) = provider {
            self.enhancers.push(provider);
        }
        self.writes
            .push(MetaWrite::Append(target, MetaKey::Borrowed(key), value));
    }

    pub(crate) fn into_parts(self) -> ControllerParts {
        ControllerParts {
            class: self.class,
            prefix: self.prefix,
            provider: self.provider,
            routes: self.routes,
            writes: self.writes,
            enhancers: self.enhancers,
        }
    }
}

/// Joins path segments into `/a/b/c`, dropping empty segments.
pub(crate) fn join_paths(parts: &[&str]) -> String {
    let joined = parts
        .iter()
        .flat_map(|p| p.split('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{joined}")
}
