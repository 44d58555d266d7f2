//! Provider descriptors: recipes for producing the instance behind a token.

use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::errors::ResolutionError;
use crate::lifecycle::{cast_lifecycle, Lifecycle, LifecycleCast};
use crate::token::{Token, TypeKey};

/// A resolved, type-erased instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

pub(crate) type ConstructFn =
    Arc<dyn Fn(Args) -> BoxFuture<'static, anyhow::Result<Instance>> + Send + Sync>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scope {
    /// One instance per container.
    #[default]
    Singleton,
    /// One instance per inbound request.
    Request,
    /// A new instance for every resolution.
    Transient,
}

/// One constructor or factory parameter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dependency {
    Required(Token),
    /// Resolves to nothing when the token is not visible.
    Optional(Token),
    /// The type of the consumer this resolution is performed for. Only class
    /// providers have a type; top-level resolutions and factory consumers
    /// see `None`.
    Inquirer,
}

impl Dependency {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Dependency::Required(Token::of::<T>())
    }

    pub fn token(token: impl Into<Token>) -> Self {
        Dependency::Required(token.into())
    }

    pub fn optional(token: impl Into<Token>) -> Self {
        Dependency::Optional(token.into())
    }
}

impl From<Token> for Dependency {
    fn from(token: Token) -> Self {
        Dependency::Required(token)
    }
}

impl From<&'static str> for Dependency {
    fn from(name: &'static str) -> Self {
        Dependency::Required(Token::from(name))
    }
}

/// Injected for [`Dependency::Inquirer`]: who asked for this instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Inquirer(pub(crate) Option<TypeKey>);

impl Inquirer {
    pub fn type_key(&self) -> Option<TypeKey> {
        self.0
    }

    /// Short type name of the consumer, or `None` for a top-level resolution
    /// or a factory consumer.
    pub fn name(&self) -> Option<&'static str> {
        self.0.map(|key| key.short_name())
    }
}

/// A type constructed by the container ("class" provider).
///
/// Dependencies are declared explicitly and handed to [`construct`] in the
/// same order through [`Args`].
///
/// [`construct`]: Injectable::construct
pub trait Injectable: Sized + Send + Sync + 'static {
    fn dependencies() -> Vec<Dependency> {
        Vec::new()
    }

    fn scope() -> Scope {
        Scope::Singleton
    }

    fn construct(args: &mut Args) -> anyhow::Result<Self>;
}

/// Resolved constructor/factory arguments, consumed front to back.
pub struct Args {
    owner: Token,
    values: VecDeque<(Dependency, Option<Instance>)>,
}

impl Args {
    pub(crate) fn new(owner: Token, values: Vec<(Dependency, Option<Instance>)>) -> Self {
        Self {
            owner,
            values: values.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }

    /// Next required argument.
    pub fn next<T: Any + Send + Sync>(&mut self) -> anyhow::Result<Arc<T>> {
        match self.next_optional::<T>()? {
            Some(value) => Ok(value),
            None => Err(anyhow::anyhow!(
                "{}: missing argument of type {}",
                self.owner,
                std::any::type_name::<T>()
            )),
        }
    }

    /// Next argument declared as [`Dependency::Optional`].
    pub fn next_optional<T: Any + Send + Sync>(&mut self) -> anyhow::Result<Option<Arc<T>>> {
        let (dep, value) = self.values.pop_front().ok_or_else(|| {
            anyhow::anyhow!("{}: constructor asked for more arguments than declared", self.owner)
        })?;
        let Some(value) = value else {
            return Ok(None);
        };
        let token = match dep {
            Dependency::Required(t) | Dependency::Optional(t) => t,
            Dependency::Inquirer => Token::of::<Inquirer>(),
        };
        value
            .downcast::<T>()
            .map(Some)
            .map_err(|_| {
                ResolutionError::TypeMismatch {
                    token,
                    expected: std::any::type_name::<T>(),
                }
                .into()
            })
    }

    /// Next argument declared as [`Dependency::Inquirer`].
    pub fn inquirer(&mut self) -> anyhow::Result<Inquirer> {
        Ok(*self.next::<Inquirer>()?)
    }
}

#[derive(Clone)]
pub(crate) enum Recipe {
    Value(Instance),
    Class {
        class: TypeKey,
        deps: Vec<Dependency>,
        construct: ConstructFn,
    },
    Factory {
        inject: Vec<Dependency>,
        construct: ConstructFn,
    },
    Existing(Token),
}

impl Recipe {
    pub(crate) fn dependencies(&self) -> &[Dependency] {
        match self {
            Recipe::Class { deps, .. } => deps,
            Recipe::Factory { inject, .. } => inject,
            Recipe::Value(_) | Recipe::Existing(_) => &[],
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Recipe::Value(_) => "value",
            Recipe::Class { .. } => "class",
            Recipe::Factory { .. } => "factory",
            Recipe::Existing(_) => "existing",
        }
    }
}

/// A provider descriptor: a token plus the recipe that produces its instance.
#[derive(Clone)]
pub struct Provider {
    pub(crate) token: Token,
    pub(crate) recipe: Recipe,
    pub(crate) scope: Scope,
    pub(crate) lifecycle: Option<LifecycleCast>,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("token", &self.token)
            .field("kind", &self.recipe.kind())
            .field("scope", &self.scope)
            .field("has_lifecycle", &self.lifecycle.is_some())
            .finish()
    }
}

impl Provider {
    /// `{ token, useValue }`.
    pub fn value<V: Any + Send + Sync>(token: impl Into<Token>, value: V) -> Self {
        Self {
            token: token.into(),
            recipe: Recipe::Value(Arc::new(value)),
            scope: Scope::Singleton,
            lifecycle: None,
        }
    }

    /// Bare class shorthand: `{ token: T, useClass: T }`.
    pub fn class<T: Injectable>() -> Self {
        Self::use_class::<T>(Token::of::<T>())
    }

    /// `{ token, useClass: T }`.
    pub fn use_class<T: Injectable>(token: impl Into<Token>) -> Self {
        let construct: ConstructFn = Arc::new(|mut args: Args| {
            async move { T::construct(&mut args).map(|v| Arc::new(v) as Instance) }.boxed()
        });
        Self {
            token: token.into(),
            recipe: Recipe::Class {
                class: TypeKey::of::<T>(),
                deps: T::dependencies(),
                construct,
            },
            scope: T::scope(),
            lifecycle: None,
        }
    }

    /// `{ token, useFactory, inject }`. The factory may be asynchronous; its
    /// result is awaited before it is cached.
    pub fn factory<F, Fut, V>(
        token: impl Into<Token>,
        inject: impl IntoIterator<Item = Dependency>,
        factory: F,
    ) -> Self
    where
        F: Fn(Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
        V: Any + Send + Sync,
    {
        let factory = Arc::new(factory);
        let construct: ConstructFn = Arc::new(move |args: Args| {
            let fut = factory(args);
            async move { fut.await.map(|v| Arc::new(v) as Instance) }.boxed()
        });
        Self {
            token: token.into(),
            recipe: Recipe::Factory {
                inject: inject.into_iter().collect(),
                construct,
            },
            scope: Scope::Singleton,
            lifecycle: None,
        }
    }

    /// `{ token, useExisting: target }`.
    pub fn existing(token: impl Into<Token>, target: impl Into<Token>) -> Self {
        Self {
            token: token.into(),
            recipe: Recipe::Existing(target.into()),
            scope: Scope::Singleton,
            lifecycle: None,
        }
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Register lifecycle hooks implemented by the concrete instance type `T`.
    pub fn with_lifecycle<T: Lifecycle + Any + Send + Sync>(mut self) -> Self {
        self.lifecycle = Some(cast_lifecycle::<T>);
        self
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn declared_scope(&self) -> Scope {
        self.scope
    }

    pub(crate) fn class_key(&self) -> Option<TypeKey> {
        match &self.recipe {
            Recipe::Class { class, .. } => Some(*class),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Repo {
        url: Arc<String>,
    }

    impl Injectable for Repo {
        fn dependencies() -> Vec<Dependency> {
            vec![Dependency::token("URL")]
        }

        fn construct(args: &mut Args) -> anyhow::Result<Self> {
            Ok(Self { url: args.next()? })
        }
    }

    #[test]
    fn class_provider_takes_declared_dependencies() {
        let p = Provider::class::<Repo>();
        assert_eq!(p.token(), &Token::of::<Repo>());
        assert_eq!(p.recipe.dependencies(), &[Dependency::token("URL")]);
        assert_eq!(p.declared_scope(), Scope::Singleton);
    }

    #[test]
    fn args_report_type_mismatch() {
        let mut args = Args::new(
            Token::of::<Repo>(),
            vec![(Dependency::token("URL"), Some(Arc::new(42u32) as Instance))],
        );
        let err = args.next::<String>().unwrap_err();
        match err.downcast_ref::<ResolutionError>() {
            Some(ResolutionError::TypeMismatch { token, .. }) => {
                assert_eq!(token, &Token::from("URL"))
            }
            other => panic!("expected TypeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn args_hand_out_values_in_order() {
        let mut args = Args::new(
            Token::of::<Repo>(),
            vec![
                (Dependency::token("URL"), Some(Arc::new("db://".to_string()) as Instance)),
                (Dependency::optional("CACHE"), None),
                (Dependency::Inquirer, Some(Arc::new(Inquirer(None)) as Instance)),
            ],
        );
        let repo = Repo { url: args.next().unwrap() };
        assert_eq!(repo.url.as_str(), "db://");
        assert!(args.next_optional::<String>().unwrap().is_none());
        assert_eq!(args.inquirer().unwrap().name(), None);
        assert_eq!(args.remaining(), 0);
    }
}
