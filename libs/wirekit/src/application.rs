//! Application - owns the container and drives the lifecycle
//!
//! Startup: graph → instantiate → on_module_init → on_application_bootstrap.
//! Shutdown: before_application_shutdown → on_module_destroy →
//! on_application_shutdown, in reverse initialization order.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::adapter::HttpAdapter;
use crate::container::{Container, RequestScope};
use crate::errors::{BootstrapError, ResolutionError};
use crate::graph::{GraphBuilder, ModuleGraph, ModuleId};
use crate::lifecycle::Phase;
use crate::metadata::MetadataRegistry;
use crate::module::ModuleRef;
use crate::pipeline::{
    join_paths, FilterBinding, GlobalEnhancers, GuardBinding, InterceptorBinding, Request,
    RoutePipeline,
};
use crate::provider::Instance;
use crate::token::Token;

/// Configures and boots an [`Application`].
pub struct ApplicationBuilder {
    root: ModuleRef,
    metadata: Arc<MetadataRegistry>,
    globals: GlobalEnhancers,
    global_prefix: String,
}

impl ApplicationBuilder {
    pub fn new(root: impl Into<ModuleRef>) -> Self {
        Self {
            root: root.into(),
            metadata: Arc::new(MetadataRegistry::new()),
            globals: GlobalEnhancers::default(),
            global_prefix: String::new(),
        }
    }

    /// Use a pre-populated metadata registry.
    pub fn metadata(mut self, metadata: Arc<MetadataRegistry>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn global_guard(mut self, binding: GuardBinding) -> Self {
        self.globals.guards.push(binding);
        self
    }

    pub fn global_interceptor(mut self, binding: InterceptorBinding) -> Self {
        self.globals.interceptors.push(binding);
        self
    }

    pub fn global_filter(mut self, binding: FilterBinding) -> Self {
        self.globals.filters.push(binding);
        self
    }

    /// Prefix prepended to every route path, e.g. `api`.
    pub fn global_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.global_prefix = prefix.into();
        self
    }

    /// Builds the graph, instantiates every singleton and runs the startup
    /// hooks. Any failure aborts startup.
    pub async fn build(self) -> Result<Application, BootstrapError> {
        tracing::info!("Phase: graph");
        let root_providers = self
            .globals
            .guards
            .iter()
            .filter_map(|b| b.provider().cloned())
            .chain(self.globals.interceptors.iter().filter_map(|b| b.provider().cloned()))
            .chain(
                self.globals
                    .filters
                    .iter()
                    .filter_map(|f| f.binding().provider().cloned()),
            )
            .collect();

        let graph = GraphBuilder::new(&self.metadata)
            .root_providers(root_providers)
            .build(self.root)
            .await?;

        let app = Application {
            container: Arc::new(Container::new(graph, self.metadata)),
            globals: self.globals,
            global_prefix: self.global_prefix,
            closed: AtomicBool::new(false),
        };

        app.instantiate().await?;
        app.run_startup_phase(Phase::ModuleInit).await?;
        app.run_startup_phase(Phase::ApplicationBootstrap).await?;

        tracing::info!(
            modules = app.graph().modules().len(),
            "Application started"
        );
        Ok(app)
    }
}

/// A booted application.
pub struct Application {
    container: Arc<Container>,
    globals: GlobalEnhancers,
    global_prefix: String,
    closed: AtomicBool,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("container", &self.container)
            .field("global_prefix", &self.global_prefix)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl Application {
    pub fn builder(root: impl Into<ModuleRef>) -> ApplicationBuilder {
        ApplicationBuilder::new(root)
    }

    /// Boots `root` with no global bindings.
    pub async fn create(root: impl Into<ModuleRef>) -> Result<Self, BootstrapError> {
        ApplicationBuilder::new(root).build().await
    }

    pub fn container(&self) -> &Arc<Container> {
        &self.container
    }

    pub fn graph(&self) -> &ModuleGraph {
        self.container.graph()
    }

    /// Resolve `token` from the root module, falling back to the module that
    /// owns it when the root cannot see it.
    pub async fn resolve(&self, token: impl Into<Token>) -> Result<Instance, ResolutionError> {
        let token = token.into();
        let module = self.owner_of(&token);
        self.container.resolve(module, &token, None).await
    }

    /// Typed [`resolve`](Self::resolve).
    pub async fn get<T: Any + Send + Sync>(
        &self,
        token: impl Into<Token>,
    ) -> Result<Arc<T>, ResolutionError> {
        let token = token.into();
        let module = self.owner_of(&token);
        self.container.get::<T>(module, &token, None).await
    }

    /// Fresh request scope for programmatic resolution outside the pipeline.
    pub fn create_request_scope(&self, request: Request) -> RequestScope {
        RequestScope::new(Arc::new(request))
    }

    pub async fn resolve_in_request<T: Any + Send + Sync>(
        &self,
        token: impl Into<Token>,
        scope: &RequestScope,
    ) -> Result<Arc<T>, ResolutionError> {
        let token = token.into();
        let module = self.owner_of(&token);
        self.container.get::<T>(module, &token, Some(scope)).await
    }

    fn owner_of(&self, token: &Token) -> ModuleId {
        let graph = self.graph();
        if graph.module(graph.root()).can_see(token) {
            return graph.root();
        }
        graph
            .modules()
            .iter()
            .find(|m| m.providers.contains_key(token))
            .map(|m| m.id())
            .unwrap_or_else(|| graph.root())
    }

    /// Hands every controller route to the adapter, in module order.
    pub fn attach_routes(&self, adapter: &mut dyn HttpAdapter) {
        for node in self.graph().modules() {
            for controller in &node.controllers {
                for route in &controller.routes {
                    let path = join_paths(&[
                        self.global_prefix.as_str(),
                        controller.prefix.as_str(),
                        route.path.as_str(),
                    ]);
                    tracing::info!(
                        module = %node.name(),
                        method = %route.method,
                        path = %path,
                        "Mapped route"
                    );
                    let pipeline = RoutePipeline::new(
                        self.container.clone(),
                        node.id(),
                        controller.class,
                        route.clone(),
                        path.clone(),
                        &self.globals,
                    );
                    adapter.attach(route.method.clone(), &path, pipeline);
                }
            }
        }
    }

    /// Runs the shutdown hooks once; later calls are no-ops. Hook failures are
    /// logged and do not stop the remaining hooks.
    pub async fn close(&self, signal: Option<&str>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(signal = signal.unwrap_or("none"), "Application shutting down");
        for phase in [
            Phase::BeforeApplicationShutdown,
            Phase::ModuleDestroy,
            Phase::ApplicationShutdown,
        ] {
            self.run_shutdown_phase(phase, signal).await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// INSTANTIATE phase: eager singletons, imports before importers.
    async fn instantiate(&self) -> Result<(), BootstrapError> {
        tracing::info!("Phase: instantiate");
        for node in self.graph().modules() {
            self.container.instantiate_module(node.id()).await?;
        }
        Ok(())
    }

    async fn run_startup_phase(&self, phase: Phase) -> Result<(), BootstrapError> {
        tracing::info!("Phase: {}", phase.as_str());
        for node in self.graph().modules() {
            for target in self.container.hook_targets(node.id()) {
                phase
                    .invoke(target.as_ref(), None)
                    .await
                    .map_err(|source| BootstrapError::Hook {
                        module: node.name().to_string(),
                        hook: phase.as_str(),
                        source,
                    })?;
            }
        }
        Ok(())
    }

    async fn run_shutdown_phase(&self, phase: Phase, signal: Option<&str>) {
        tracing::info!("Phase: {}", phase.as_str());
        for node in self.graph().modules().iter().rev() {
            for target in self.container.hook_targets(node.id()).iter().rev() {
                if let Err(err) = phase.invoke(target.as_ref(), signal).await {
                    tracing::warn!(
                        module = %node.name(),
                        hook = phase.as_str(),
                        error = %err,
                        "Lifecycle hook failed"
                    );
                }
            }
        }
    }
}
