//! Module descriptors, static module references and dynamic modules.

use std::borrow::Cow;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::lifecycle::Lifecycle;
use crate::metadata::{MetaKey, MetaTarget, MetaWrite, INJECT_METADATA};
use crate::pipeline::route::Controller;
use crate::provider::{Injectable, Provider};
use crate::token::{Token, TypeKey};

/// A statically declared module. The implementing type is the module's
/// identity: importing it from several places yields a single node.
pub trait StaticModule: 'static {
    fn define() -> ModuleDescriptor;
}

/// Identity used to deduplicate module references.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModuleKey {
    Static(TypeKey),
    Dynamic(u64),
}

type DynamicFactory =
    Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<ModuleDescriptor>> + Send + Sync>;

static NEXT_DYNAMIC: AtomicU64 = AtomicU64::new(1);

/// A module produced by a registration function invoked with caller options.
///
/// Every `register*` call creates a distinct module; clones of the returned
/// value refer to the same one. The factory runs once, while the graph is
/// built.
#[derive(Clone)]
pub struct DynamicModule {
    id: u64,
    name: Cow<'static, str>,
    factory: DynamicFactory,
}

impl std::fmt::Debug for DynamicModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicModule")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl DynamicModule {
    pub fn register<O, F>(name: impl Into<Cow<'static, str>>, options: O, factory: F) -> Self
    where
        O: Clone + Send + Sync + 'static,
        F: Fn(O) -> ModuleDescriptor + Send + Sync + 'static,
    {
        let make: DynamicFactory = Arc::new(move || {
            let descriptor = factory(options.clone());
            async move { Ok::<_, anyhow::Error>(descriptor) }.boxed()
        });
        Self::from_factory(name.into(), make)
    }

    pub fn register_async<O, F, Fut>(
        name: impl Into<Cow<'static, str>>,
        options: O,
        factory: F,
    ) -> Self
    where
        O: Clone + Send + Sync + 'static,
        F: Fn(O) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<ModuleDescriptor>> + Send + 'static,
    {
        let make: DynamicFactory = Arc::new(move || factory(options.clone()).boxed());
        Self::from_factory(name.into(), make)
    }

    fn from_factory(name: Cow<'static, str>, factory: DynamicFactory) -> Self {
        Self {
            id: NEXT_DYNAMIC.fetch_add(1, Ordering::Relaxed),
            name,
            factory,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) async fn materialize(&self) -> anyhow::Result<ModuleDescriptor> {
        (self.factory)().await
    }
}

/// A reference to a module, as it appears in `imports`.
#[derive(Clone)]
pub enum ModuleRef {
    Static {
        key: TypeKey,
        define: fn() -> ModuleDescriptor,
    },
    Dynamic(DynamicModule),
}

impl ModuleRef {
    pub fn of<M: StaticModule>() -> Self {
        ModuleRef::Static {
            key: TypeKey::of::<M>(),
            define: M::define,
        }
    }

    pub fn key(&self) -> ModuleKey {
        match self {
            ModuleRef::Static { key, .. } => ModuleKey::Static(*key),
            ModuleRef::Dynamic(d) => ModuleKey::Dynamic(d.id),
        }
    }

    pub fn display_name(&self) -> String {
        match self {
            ModuleRef::Static { key, .. } => key.short_name().to_string(),
            ModuleRef::Dynamic(d) => d.name.to_string(),
        }
    }
}

impl std::fmt::Debug for ModuleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ModuleRef").field(&self.display_name()).finish()
    }
}

impl From<DynamicModule> for ModuleRef {
    fn from(d: DynamicModule) -> Self {
        ModuleRef::Dynamic(d)
    }
}

#[derive(Clone, Debug)]
pub enum Export {
    Token(Token),
    /// Re-export everything an imported module exports.
    Module(ModuleKey),
}

/// `{ imports, providers, controllers, exports, global }`.
pub struct ModuleDescriptor {
    pub(crate) name: Option<Cow<'static, str>>,
    pub(crate) imports: Vec<ModuleRef>,
    pub(crate) providers: Vec<Provider>,
    pub(crate) controllers: Vec<Controller>,
    pub(crate) exports: Vec<Export>,
    pub(crate) global: bool,
    pub(crate) lifecycle: Option<Arc<dyn Lifecycle>>,
    pub(crate) metadata: Vec<MetaWrite>,
}

impl Default for ModuleDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleDescriptor {
    pub fn new() -> Self {
        Self {
            name: None,
            imports: Vec::new(),
            providers: Vec::new(),
            controllers: Vec::new(),
            exports: Vec::new(),
            global: false,
            lifecycle: None,
            metadata: Vec::new(),
        }
    }

    /// Display name; defaults to the module type or registration name.
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn import(mut self, module: impl Into<ModuleRef>) -> Self {
        self.imports.push(module.into());
        self
    }

    pub fn import_static<M: StaticModule>(self) -> Self {
        self.import(ModuleRef::of::<M>())
    }

    pub fn provider(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }

    /// Bare class shorthand.
    pub fn class<T: Injectable>(self) -> Self {
        self.provider(Provider::class::<T>())
    }

    pub fn controller(mut self, controller: Controller) -> Self {
        self.controllers.push(controller);
        self
    }

    pub fn export(mut self, token: impl Into<Token>) -> Self {
        self.exports.push(Export::Token(token.into()));
        self
    }

    pub fn export_module(mut self, module: impl Into<ModuleRef>) -> Self {
        self.exports.push(Export::Module(module.into().key()));
        self
    }

    pub fn global(mut self) -> Self {
        self.global = true;
        self
    }

    pub fn lifecycle(mut self, hooks: Arc<dyn Lifecycle>) -> Self {
        self.lifecycle = Some(hooks);
        self
    }

    /// Override the token injected at constructor position `index` of `T`.
    pub fn inject_param<T: 'static>(mut self, index: usize, token: impl Into<Token>) -> Self {
        let token: Token = token.into();
        self.metadata.push(MetaWrite::Param(
            MetaTarget::Class(TypeKey::of::<T>()),
            index,
            MetaKey::Borrowed(INJECT_METADATA),
            Arc::new(token),
        ));
        self
    }

    /// Let `Child` inherit class metadata from `Parent`.
    pub fn extends<Child: 'static, Parent: 'static>(mut self) -> Self {
        self.metadata
            .push(MetaWrite::Extend(TypeKey::of::<Child>(), TypeKey::of::<Parent>()));
        self
    }

    /// Attach class-level metadata to `T`.
    pub fn set_metadata<T: 'static, V: std::any::Any + Send + Sync>(
        mut self,
        key: impl Into<MetaKey>,
        value: V,
    ) -> Self {
        self.metadata.push(MetaWrite::Set(
            MetaTarget::Class(TypeKey::of::<T>()),
            key.into(),
            Arc::new(value),
        ));
        self
    }
}
