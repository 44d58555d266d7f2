//! Bindings for guards, interceptors and exception filters.
//!
//! A binding either carries a ready instance or names an injectable type;
//! injectable bindings are registered as providers in the declaring module
//! (the root module for global bindings) and resolved per request, so they
//! honour the provider's scope.

use std::sync::Arc;

use crate::container::{Container, RequestScope};
use crate::errors::ResolutionError;
use crate::graph::ModuleId;
use crate::provider::{Injectable, Instance, Provider};

use super::filter::ExceptionFilter;
use super::guard::Guard;
use super::interceptor::Interceptor;

pub enum Binding<E: ?Sized> {
    Instance(Arc<E>),
    Injected {
        provider: Provider,
        cast: fn(Instance) -> Option<Arc<E>>,
    },
}

impl<E: ?Sized> Clone for Binding<E> {
    fn clone(&self) -> Self {
        match self {
            Binding::Instance(e) => Binding::Instance(e.clone()),
            Binding::Injected { provider, cast } => Binding::Injected {
                provider: provider.clone(),
                cast: *cast,
            },
        }
    }
}

impl<E: ?Sized> std::fmt::Debug for Binding<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Instance(_) => f.write_str("Binding::Instance"),
            Binding::Injected { provider, .. } => {
                write!(f, "Binding::Injected({})", provider.token())
            }
        }
    }
}

impl<E: ?Sized + 'static> Binding<E> {
    /// Provider to auto-register for injected bindings.
    pub(crate) fn provider(&self) -> Option<&Provider> {
        match self {
            Binding::Instance(_) => None,
            Binding::Injected { provider, .. } => Some(provider),
        }
    }

    pub(crate) async fn instance(
        &self,
        container: &Container,
        module: ModuleId,
        scope: &RequestScope,
    ) -> Result<Arc<E>, ResolutionError> {
        match self {
            Binding::Instance(e) => Ok(e.clone()),
            Binding::Injected { provider, cast } => {
                let instance = container
                    .resolve(module, provider.token(), Some(scope))
                    .await?;
                cast(instance).ok_or_else(|| ResolutionError::TypeMismatch {
                    token: provider.token().clone(),
                    expected: std::any::type_name::<E>(),
                })
            }
        }
    }
}

pub type GuardBinding = Binding<dyn Guard>;
pub type InterceptorBinding = Binding<dyn Interceptor>;

impl Binding<dyn Guard> {
    pub fn guard<G: Guard + 'static>(guard: G) -> Self {
        Binding::Instance(Arc::new(guard))
    }

    pub fn injected_guard<G: Guard + Injectable>() -> Self {
        Binding::Injected {
            provider: Provider::class::<G>(),
            cast: |i: Instance| i.downcast::<G>().ok().map(|g| g as Arc<dyn Guard>),
        }
    }
}

impl Binding<dyn Interceptor> {
    pub fn interceptor<I: Interceptor + 'static>(interceptor: I) -> Self {
        Binding::Instance(Arc::new(interceptor))
    }

    pub fn injected_interceptor<I: Interceptor + Injectable>() -> Self {
        Binding::Injected {
            provider: Provider::class::<I>(),
            cast: |i: Instance| i.downcast::<I>().ok().map(|x| x as Arc<dyn Interceptor>),
        }
    }
}

/// Which errors a filter claims.
#[derive(Clone, Copy)]
struct Catches {
    name: &'static str,
    matches: fn(&anyhow::Error) -> bool,
}

fn error_is<T: std::error::Error + Send + Sync + 'static>(error: &anyhow::Error) -> bool {
    error.chain().any(|e| e.is::<T>())
}

/// An exception filter binding, optionally restricted to one error type.
#[derive(Clone)]
pub struct FilterBinding {
    binding: Binding<dyn ExceptionFilter>,
    catches: Option<Catches>,
}

impl std::fmt::Debug for FilterBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterBinding")
            .field("binding", &self.binding)
            .field("catches", &self.catches.map(|c| c.name).unwrap_or("*"))
            .finish()
    }
}

impl FilterBinding {
    /// A filter for every error.
    pub fn catch_all<F: ExceptionFilter + 'static>(filter: F) -> Self {
        Self {
            binding: Binding::Instance(Arc::new(filter)),
            catches: None,
        }
    }

    /// A filter for errors of type `T` (anywhere in the error chain).
    pub fn catching<T, F>(filter: F) -> Self
    where
        T: std::error::Error + Send + Sync + 'static,
        F: ExceptionFilter + 'static,
    {
        Self::catch_all(filter).only::<T>()
    }

    pub fn injected<F: ExceptionFilter + Injectable>() -> Self {
        Self {
            binding: Binding::Injected {
                provider: Provider::class::<F>(),
                cast: |i: Instance| i.downcast::<F>().ok().map(|x| x as Arc<dyn ExceptionFilter>),
            },
            catches: None,
        }
    }

    /// Restrict the filter to errors of type `T`.
    pub fn only<T: std::error::Error + Send + Sync + 'static>(mut self) -> Self {
        self.catches = Some(Catches {
            name: std::any::type_name::<T>(),
            matches: error_is::<T>,
        });
        self
    }

    pub fn is_catch_all(&self) -> bool {
        self.catches.is_none()
    }

    pub(crate) fn matches(&self, error: &anyhow::Error) -> bool {
        self.catches.is_some_and(|c| (c.matches)(error))
    }

    pub(crate) fn binding(&self) -> &Binding<dyn ExceptionFilter> {
        &self.binding
    }
}
