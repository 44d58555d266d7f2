//! # Wirekit - Module Composition Runtime
//!
//! Wirekit assembles an application from a declarative graph of modules,
//! resolves provider dependencies with per-scope caching, drives lifecycle
//! hooks and executes a per-request pipeline of guards, interceptors,
//! handlers and exception filters.
//!
//! ## Features
//!
//! - **Modules**: static (`StaticModule`) and dynamic (`DynamicModule`)
//!   modules with imports, exports, re-exports and global visibility
//! - **Providers**: values, classes, async factories and aliases in
//!   `Singleton`, `Request` or `Transient` scope
//! - **Lifecycle**: `on_module_init` → `on_application_bootstrap` on startup,
//!   the reverse on shutdown
//! - **Pipeline**: transport-neutral request execution handed to an
//!   `HttpAdapter`
//!
//! ## Example
//!
//! ```rust,ignore
//! use wirekit::{Args, Application, Injectable, ModuleDescriptor, StaticModule};
//!
//! struct Greeter;
//!
//! impl Injectable for Greeter {
//!     fn construct(_: &mut Args) -> anyhow::Result<Self> {
//!         Ok(Greeter)
//!     }
//! }
//!
//! struct AppModule;
//!
//! impl StaticModule for AppModule {
//!     fn define() -> ModuleDescriptor {
//!         ModuleDescriptor::new().class::<Greeter>()
//!     }
//! }
//!
//! let app = Application::create(wirekit::ModuleRef::of::<AppModule>()).await?;
//! let greeter = app.get::<Greeter>(wirekit::Token::of::<Greeter>()).await?;
//! ```

pub use anyhow::Result;
pub use async_trait::async_trait;

pub mod adapter;
pub mod application;
pub mod config;
pub mod container;
pub mod errors;
pub mod graph;
pub mod lifecycle;
pub mod metadata;
pub mod module;
pub mod pipeline;
pub mod provider;
pub mod runtime;
pub mod token;

pub use adapter::{HttpAdapter, InMemoryAdapter};
pub use application::{Application, ApplicationBuilder};
pub use config::{
    module_config_typed, ConfigError, ConfigModule, ConfigProvider, ConfigService, ModuleConfig,
};
pub use container::{Container, RequestScope};
pub use errors::{BootstrapError, GraphError, PipelineError, ResolutionError};
pub use graph::{GraphBuilder, ModuleGraph, ModuleId, ModuleNode};
pub use lifecycle::{Lifecycle, Phase};
pub use metadata::{MetaKey, MetaTarget, MetadataRegistry};
pub use module::{DynamicModule, Export, ModuleDescriptor, ModuleKey, ModuleRef, StaticModule};
pub use pipeline::{
    Controller, ExceptionFilter, ExecutionContext, FilterBinding, FnGuard, Guard, GuardBinding,
    HttpException, Interceptor, InterceptorBinding, Next, Params, Reflector, Request, Response,
    Route, RoutePipeline,
};
pub use provider::{Args, Dependency, Injectable, Inquirer, Instance, Provider, Scope};
pub use token::{Symbol, Token, TypeKey, REQUEST};
