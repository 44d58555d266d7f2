use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use serde_json::Value;

use crate::container::Container;
use crate::errors::PipelineError;
use crate::graph::ModuleId;
use crate::metadata::{MetaTarget, FILTERS_METADATA, GUARDS_METADATA, INTERCEPTORS_METADATA};
use crate::provider::Instance;
use crate::token::{Token, TypeKey};

use super::context::{ExecutionContext, HandlerInfo, Request, Response};
use super::enhancer::{FilterBinding, GuardBinding, InterceptorBinding};
use super::exception::{DefaultExceptionFilter, HttpException};
use super::extract::Params;
use super::filter::ExceptionFilter;
use super::interceptor::{Endpoint, Next};
use super::route::Route;

/// Application-wide bindings, applied to every route before controller and
/// handler bindings.
#[derive(Clone, Default)]
pub(crate) struct GlobalEnhancers {
    pub(crate) guards: Vec<GuardBinding>,
    pub(crate) interceptors: Vec<InterceptorBinding>,
    pub(crate) filters: Vec<FilterBinding>,
}

struct Inner {
    container: Arc<Container>,
    module: ModuleId,
    class: TypeKey,
    route: Arc<Route>,
    path: String,
    /// global, controller, handler
    guards: Vec<(ModuleId, GuardBinding)>,
    /// global, controller, handler
    interceptors: Vec<(ModuleId, InterceptorBinding)>,
    /// handler, controller, global
    filters: Vec<(ModuleId, FilterBinding)>,
}

/// The executable pipeline of one route, handed to the transport adapter.
#[derive(Clone)]
pub struct RoutePipeline {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RoutePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutePipeline")
            .field("method", self.method())
            .field("path", &self.inner.path)
            .field("handler", &self.inner.route.name)
            .field("guards", &self.inner.guards.len())
            .field("interceptors", &self.inner.interceptors.len())
            .field("filters", &self.inner.filters.len())
            .finish()
    }
}

impl RoutePipeline {
    pub(crate) fn new(
        container: Arc<Container>,
        module: ModuleId,
        class: TypeKey,
        route: Arc<Route>,
        path: String,
        globals: &GlobalEnhancers,
    ) -> Self {
        let root = container.graph().root();
        let metadata = container.metadata();
        let class_target = MetaTarget::Class(class);
        let method_target = MetaTarget::Method(class, route.name);

        let mut guards: Vec<_> = globals.guards.iter().map(|g| (root, g.clone())).collect();
        for target in [class_target, method_target] {
            guards.extend(
                metadata
                    .get_list::<GuardBinding>(target, GUARDS_METADATA)
                    .iter()
                    .map(|g| (module, g.as_ref().clone())),
            );
        }

        let mut interceptors: Vec<_> = globals
            .interceptors
            .iter()
            .map(|i| (root, i.clone()))
            .collect();
        for target in [class_target, method_target] {
            interceptors.extend(
                metadata
                    .get_list::<InterceptorBinding>(target, INTERCEPTORS_METADATA)
                    .iter()
                    .map(|i| (module, i.as_ref().clone())),
            );
        }

        let mut filters = Vec::new();
        for target in [method_target, class_target] {
            filters.extend(
                metadata
                    .get_list::<FilterBinding>(target, FILTERS_METADATA)
                    .iter()
                    .map(|f| (module, f.as_ref().clone())),
            );
        }
        filters.extend(globals.filters.iter().map(|f| (root, f.clone())));

        Self {
            inner: Arc::new(Inner {
                container,
                module,
                class,
                route,
                path,
                guards,
                interceptors,
                filters,
            }),
        }
    }

    pub fn method(&self) -> &Method {
        &self.inner.route.method
    }

    /// Full route path, including global and controller prefixes.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    /// Handler name, as used for handler metadata.
    pub fn handler(&self) -> &'static str {
        self.inner.route.name
    }

    /// Runs one request through guards, interceptors, the handler and, on
    /// error, the exception filters.
    pub async fn handle(&self, request: Request) -> Result<Response, PipelineError> {
        let inner = &*self.inner;
        let handler = HandlerInfo {
            class: inner.class,
            method: inner.route.name,
        };
        let mut ctx = ExecutionContext::new(
            Arc::new(request),
            inner.container.clone(),
            inner.module,
            handler,
            inner.route.default_status(),
        );

        let result = match self.execute(&mut ctx).await {
            Ok(body) => Ok(ctx.into_response(body)),
            Err(error) => self.recover(error, ctx).await,
        };

        if let Ok(response) = &result {
            tracing::debug!(
                method = %inner.route.method,
                path = %inner.path,
                status = response.status.as_u16(),
                "Request handled"
            );
        }
        result
    }

    async fn execute(&self, ctx: &mut ExecutionContext) -> anyhow::Result<Value> {
        let inner = &*self.inner;
        let controller = inner
            .container
            .resolve(inner.module, &Token::Type(inner.class), Some(ctx.scope()))
            .await?;

        for (module, binding) in &inner.guards {
            let guard = binding
                .instance(&inner.container, *module, ctx.scope())
                .await?;
            if !guard.can_activate(ctx).await? {
                tracing::debug!(handler = inner.route.name, "Guard rejected request");
                return Err(HttpException::forbidden("Forbidden resource").into());
            }
        }

        let mut interceptors = Vec::with_capacity(inner.interceptors.len());
        for (module, binding) in &inner.interceptors {
            interceptors.push(
                binding
                    .instance(&inner.container, *module, ctx.scope())
                    .await?,
            );
        }

        let endpoint = HandlerEndpoint {
            route: &inner.route,
            controller,
        };
        Next::new(&interceptors, &endpoint).run(ctx).await
    }

    /// Typed filters first (handler, controller, global), then catch-all
    /// filters in the same order, then the default filter.
    async fn recover(
        &self,
        error: anyhow::Error,
        mut ctx: ExecutionContext,
    ) -> Result<Response, PipelineError> {
        let inner = &*self.inner;
        let selected = inner
            .filters
            .iter()
            .find(|(_, f)| f.matches(&error))
            .or_else(|| inner.filters.iter().find(|(_, f)| f.is_catch_all()));

        let original = error.to_string();
        let filter: Arc<dyn ExceptionFilter> = match selected {
            Some((module, binding)) => binding
                .binding()
                .instance(&inner.container, *module, ctx.scope())
                .await
                .map_err(|source| PipelineError::FilterFailure {
                    original: original.clone(),
                    source: source.into(),
                })?,
            None => Arc::new(DefaultExceptionFilter),
        };

        filter.catch(error, &mut ctx).await.map_err(|source| {
            tracing::error!(
                handler = inner.route.name,
                error = %source,
                "Exception filter failed"
            );
            PipelineError::FilterFailure { original, source }
        })
    }
}

struct HandlerEndpoint<'a> {
    route: &'a Route,
    controller: Instance,
}

#[async_trait]
impl Endpoint for HandlerEndpoint<'_> {
    async fn call(&self, ctx: &mut ExecutionContext) -> anyhow::Result<Value> {
        let mut values = Vec::with_capacity(self.route.extractors.len());
        for extractor in &self.route.extractors {
            values.push(extractor.extract(ctx).await?);
        }
        (self.route.handler)(self.controller.clone(), Params::new(values)).await
    }
}
