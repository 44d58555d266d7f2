//! Provider resolution and instance caches.
//!
//! Singletons live in the [`Container`], request-scoped instances in a
//! [`RequestScope`], transients are never cached. Every cache slot is a
//! `tokio::sync::OnceCell` installed before construction starts, so
//! concurrent first resolutions of the same provider construct it once while
//! other tokens proceed unblocked.

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::errors::ResolutionError;
use crate::graph::{effective_dependencies, ModuleGraph, ModuleId, ProviderKey, ProviderRecord};
use crate::lifecycle::Lifecycle;
use crate::metadata::MetadataRegistry;
use crate::pipeline::Request;
use crate::provider::{Args, ConstructFn, Dependency, Inquirer, Instance, Recipe, Scope};
use crate::token::{Token, TypeKey, REQUEST};

type Slot = Arc<OnceCell<Instance>>;

/// Per-request instance cache. Dropped with the request.
pub struct RequestScope {
    id: Uuid,
    request: Arc<Request>,
    cache: DashMap<ProviderKey, Slot>,
}

impl std::fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScope")
            .field("id", &self.id)
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl RequestScope {
    pub fn new(request: Arc<Request>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            cache: DashMap::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    /// Number of request-scoped instances created so far.
    pub fn cached(&self) -> usize {
        self.cache.iter().filter(|slot| slot.value().initialized()).count()
    }
}

/// Owns the module graph, the metadata registry and the singleton cache.
pub struct Container {
    graph: ModuleGraph,
    metadata: Arc<MetadataRegistry>,
    singletons: DashMap<ProviderKey, Slot>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("modules", &self.graph.modules().len())
            .field("singletons", &self.singletons.len())
            .finish()
    }
}

impl Container {
    pub fn new(graph: ModuleGraph, metadata: Arc<MetadataRegistry>) -> Self {
        Self {
            graph,
            metadata,
            singletons: DashMap::new(),
        }
    }

    pub fn graph(&self) -> &ModuleGraph {
        &self.graph
    }

    pub fn metadata(&self) -> &Arc<MetadataRegistry> {
        &self.metadata
    }

    /// Resolve `token` as seen from `module`.
    pub async fn resolve(
        &self,
        module: ModuleId,
        token: &Token,
        scope: Option<&RequestScope>,
    ) -> Result<Instance, ResolutionError> {
        self.resolve_inner(module, token.clone(), scope, None, Vec::new())
            .await
    }

    /// Like [`resolve`](Self::resolve), on behalf of the consumer type `inquirer`.
    pub async fn resolve_for(
        &self,
        module: ModuleId,
        token: &Token,
        scope: Option<&RequestScope>,
        inquirer: Option<TypeKey>,
    ) -> Result<Instance, ResolutionError> {
        self.resolve_inner(module, token.clone(), scope, inquirer, Vec::new())
            .await
    }

    /// Resolve and downcast.
    pub async fn get<T: Any + Send + Sync>(
        &self,
        module: ModuleId,
        token: &Token,
        scope: Option<&RequestScope>,
    ) -> Result<Arc<T>, ResolutionError> {
        let instance = self.resolve(module, token, scope).await?;
        instance
            .downcast::<T>()
            .map_err(|_| ResolutionError::TypeMismatch {
                token: token.clone(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Eagerly constructs the singletons owned by `module`, in declaration order.
    pub(crate) async fn instantiate_module(&self, module: ModuleId) -> Result<(), ResolutionError> {
        let node = self.graph.module(module);
        for token in &node.order {
            let record = &node.providers[token];
            let constructs = matches!(
                record.provider.recipe,
                Recipe::Class { .. } | Recipe::Factory { .. }
            );
            if constructs && record.effective == Scope::Singleton {
                let key = ProviderKey {
                    module,
                    token: token.clone(),
                };
                self.instantiate(key, None, None, Vec::new()).await?;
            }
        }
        tracing::debug!(module = %node.name(), "Singletons instantiated");
        Ok(())
    }

    /// Hook targets of `module`: singleton instances that registered lifecycle
    /// hooks, in declaration order, followed by the module's own hooks.
    pub(crate) fn hook_targets(&self, module: ModuleId) -> Vec<Arc<dyn Lifecycle>> {
        let node = self.graph.module(module);
        let mut targets: Vec<Arc<dyn Lifecycle>> = node
            .order
            .iter()
            .filter_map(|token| {
                let record = &node.providers[token];
                let cast = record.provider.lifecycle?;
                if record.effective != Scope::Singleton {
                    return None;
                }
                let key = ProviderKey {
                    module,
                    token: token.clone(),
                };
                let instance = self.singletons.get(&key)?.value().get()?.clone();
                cast(&instance)
            })
            .collect();
        if let Some(hooks) = &node.lifecycle {
            targets.push(hooks.clone());
        }
        targets
    }

    fn resolve_inner<'a>(
        &'a self,
        module: ModuleId,
        token: Token,
        scope: Option<&'a RequestScope>,
        inquirer: Option<TypeKey>,
        chain: Vec<ProviderKey>,
    ) -> BoxFuture<'a, Result<Instance, ResolutionError>> {
        async move {
            if token == REQUEST {
                return match scope {
                    Some(scope) => Ok(scope.request.clone() as Instance),
                    None => Err(ResolutionError::RequestScopeRequired { token }),
                };
            }
            let Some(owner) = self.graph.lookup(module, &token) else {
                return Err(ResolutionError::UnknownToken {
                    token,
                    module: self.graph.module(module).name().to_string(),
                });
            };
            let key = ProviderKey {
                module: owner,
                token,
            };
            self.instantiate(key, scope, inquirer, chain).await
        }
        .boxed()
    }

    fn instantiate<'a>(
        &'a self,
        key: ProviderKey,
        scope: Option<&'a RequestScope>,
        inquirer: Option<TypeKey>,
        mut chain: Vec<ProviderKey>,
    ) -> BoxFuture<'a, Result<Instance, ResolutionError>> {
        async move {
            let Some(record) = self.graph.record(&key) else {
                return Err(ResolutionError::UnknownToken {
                    module: self.graph.module(key.module).name().to_string(),
                    token: key.token,
                });
            };

            let construct = match &record.provider.recipe {
                Recipe::Value(value) => return Ok(value.clone()),
                Recipe::Existing(target) => {
                    if chain.contains(&key) {
                        let mut path: Vec<Token> = chain.into_iter().map(|k| k.token).collect();
                        path.push(key.token);
                        return Err(ResolutionError::AliasCycle { path });
                    }
                    let target = target.clone();
                    let module = key.module;
                    chain.push(key);
                    return self
                        .resolve_inner(module, target, scope, inquirer, chain)
                        .await;
                }
                Recipe::Class { construct, .. } | Recipe::Factory { construct, .. } => construct,
            };

            match record.effective {
                Scope::Transient => self.construct(&key, record, construct, scope, inquirer).await,
                Scope::Singleton => {
                    let slot = self.singletons.entry(key.clone()).or_default().clone();
                    slot.get_or_try_init(|| self.construct(&key, record, construct, None, inquirer))
                        .await
                        .cloned()
                }
                Scope::Request => {
                    let Some(scope) = scope else {
                        return Err(ResolutionError::RequestScopeRequired { token: key.token });
                    };
                    let slot = scope.cache.entry(key.clone()).or_default().clone();
                    slot.get_or_try_init(|| {
                        self.construct(&key, record, construct, Some(scope), inquirer)
                    })
                    .await
                    .cloned()
                }
            }
        }
        .boxed()
    }

    async fn construct(
        &self,
        key: &ProviderKey,
        record: &ProviderRecord,
        construct: &ConstructFn,
        scope: Option<&RequestScope>,
        inquirer: Option<TypeKey>,
    ) -> Result<Instance, ResolutionError> {
        let consumer = record.provider.class_key();
        let deps = effective_dependencies(&self.metadata, &record.provider);
        let mut values = Vec::with_capacity(deps.len());

        for dep in deps {
            let value = match &dep {
                Dependency::Required(token) => Some(
                    self.resolve_inner(key.module, token.clone(), scope, consumer, Vec::new())
                        .await?,
                ),
                Dependency::Optional(token) => {
                    let available = if *token == REQUEST {
                        scope.is_some()
                    } else {
                        self.graph.lookup(key.module, token).is_some()
                    };
                    if available {
                        Some(
                            self.resolve_inner(key.module, token.clone(), scope, consumer, Vec::new())
                                .await?,
                        )
                    } else {
                        None
                    }
                }
                Dependency::Inquirer => Some(Arc::new(Inquirer(inquirer)) as Instance),
            };
            values.push((dep, value));
        }

        let args = Args::new(key.token.clone(), values);
        let instance = construct(args)
            .await
            .map_err(|source| ResolutionError::ConstructorFailure {
                token: key.token.clone(),
                source,
            })?;

        tracing::debug!(
            token = %key.token,
            module = %self.graph.module(key.module).name(),
            scope = ?record.effective,
            "Provider instantiated"
        );
        Ok(instance)
    }
}
