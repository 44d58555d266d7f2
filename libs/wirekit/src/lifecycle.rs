//! Lifecycle hook contracts.
//!
//! Hooks are optional on any provider, controller or module. A provider opts
//! in by registering its concrete type with
//! [`Provider::with_lifecycle`](crate::provider::Provider::with_lifecycle);
//! a module passes a hook object to
//! [`ModuleDescriptor::lifecycle`](crate::module::ModuleDescriptor::lifecycle).
//! Only singleton instances receive hooks.
//!
//! Startup order: `on_module_init` for every module in initialization order,
//! then `on_application_bootstrap` for the whole graph. Shutdown runs
//! `before_application_shutdown`, `on_module_destroy` and
//! `on_application_shutdown` in reverse initialization order.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::provider::Instance;

#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn on_module_init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_application_bootstrap(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn before_application_shutdown(&self, _signal: Option<&str>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_module_destroy(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_application_shutdown(&self, _signal: Option<&str>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Recovers the hook interface from a type-erased instance.
pub(crate) type LifecycleCast = fn(&Instance) -> Option<Arc<dyn Lifecycle>>;

pub(crate) fn cast_lifecycle<T: Lifecycle + Any + Send + Sync>(
    instance: &Instance,
) -> Option<Arc<dyn Lifecycle>> {
    instance
        .clone()
        .downcast::<T>()
        .ok()
        .map(|hooks| hooks as Arc<dyn Lifecycle>)
}

/// Hook phases, named the way they appear in logs and errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    ModuleInit,
    ApplicationBootstrap,
    BeforeApplicationShutdown,
    ModuleDestroy,
    ApplicationShutdown,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::ModuleInit => "on_module_init",
            Phase::ApplicationBootstrap => "on_application_bootstrap",
            Phase::BeforeApplicationShutdown => "before_application_shutdown",
            Phase::ModuleDestroy => "on_module_destroy",
            Phase::ApplicationShutdown => "on_application_shutdown",
        }
    }

    pub(crate) async fn invoke(
        &self,
        target: &dyn Lifecycle,
        signal: Option<&str>,
    ) -> anyhow::Result<()> {
        match self {
            Phase::ModuleInit => target.on_module_init().await,
            Phase::ApplicationBootstrap => target.on_application_bootstrap().await,
            Phase::BeforeApplicationShutdown => target.before_application_shutdown(signal).await,
            Phase::ModuleDestroy => target.on_module_destroy().await,
            Phase::ApplicationShutdown => target.on_application_shutdown(signal).await,
        }
    }
}
