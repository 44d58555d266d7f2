//! Module graph: the expanded, deduplicated set of modules with each
//! module's provider registry and visibility map.
//!
//! Nodes are stored in initialization order (imports before importers), so
//! `ModuleId` order is also the order lifecycle hooks run in.

mod analysis;
mod builder;
mod topo;

use std::collections::HashMap;
use std::sync::Arc;

pub use builder::GraphBuilder;

use crate::lifecycle::Lifecycle;
use crate::metadata::{MetaTarget, MetadataRegistry, INJECT_METADATA};
use crate::module::ModuleKey;
use crate::pipeline::route::Route;
use crate::provider::{Dependency, Provider, Recipe, Scope};
use crate::token::{Token, TypeKey};

/// Position of a module in initialization order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) usize);

impl ModuleId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A registered provider and the scope it effectively runs in after
/// scope bubbling.
#[derive(Clone, Debug)]
pub(crate) struct ProviderRecord {
    pub(crate) provider: Provider,
    pub(crate) effective: Scope,
}

/// Address of a provider: the module that owns it plus its token.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct ProviderKey {
    pub(crate) module: ModuleId,
    pub(crate) token: Token,
}

/// A controller registered in a module, with its routes.
pub(crate) struct ControllerEntry {
    pub(crate) class: TypeKey,
    pub(crate) prefix: String,
    pub(crate) routes: Vec<Arc<Route>>,
}

pub struct ModuleNode {
    pub(crate) id: ModuleId,
    pub(crate) key: ModuleKey,
    pub(crate) name: String,
    pub(crate) global: bool,
    pub(crate) imports: Vec<ModuleId>,
    /// Own provider tokens in declaration order.
    pub(crate) order: Vec<Token>,
    pub(crate) providers: HashMap<Token, ProviderRecord>,
    pub(crate) exported: HashMap<Token, ModuleId>,
    pub(crate) visible: HashMap<Token, ModuleId>,
    pub(crate) controllers: Vec<ControllerEntry>,
    pub(crate) lifecycle: Option<Arc<dyn Lifecycle>>,
}

impl std::fmt::Debug for ModuleNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleNode")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("global", &self.global)
            .field("imports", &self.imports)
            .field("providers", &self.order)
            .field("controllers", &self.controllers.len())
            .finish()
    }
}

impl ModuleNode {
    pub fn id(&self) -> ModuleId {
        self.id
    }

    pub fn key(&self) -> ModuleKey {
        self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn imports(&self) -> &[ModuleId] {
        &self.imports
    }

    /// Own provider tokens in declaration order.
    pub fn provider_tokens(&self) -> &[Token] {
        &self.order
    }

    pub fn exports(&self, token: &Token) -> bool {
        self.exported.contains_key(token)
    }

    /// Whether `token` resolves from this module (own, imported export or global).
    pub fn can_see(&self, token: &Token) -> bool {
        self.visible.contains_key(token)
    }

    /// Effective scope of an own provider.
    pub fn scope_of(&self, token: &Token) -> Option<Scope> {
        self.providers.get(token).map(|r| r.effective)
    }

    pub fn controller_count(&self) -> usize {
        self.controllers.len()
    }
}

#[derive(Debug)]
pub struct ModuleGraph {
    nodes: Vec<ModuleNode>,
    root: ModuleId,
}

impl ModuleGraph {
    /// Modules in initialization order.
    pub fn modules(&self) -> &[ModuleNode] {
        &self.nodes
    }

    pub fn root(&self) -> ModuleId {
        self.root
    }

    pub fn module(&self, id: ModuleId) -> &ModuleNode {
        &self.nodes[id.0]
    }

    pub fn find(&self, name: &str) -> Option<&ModuleNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn find_by_key(&self, key: ModuleKey) -> Option<&ModuleNode> {
        self.nodes.iter().find(|n| n.key == key)
    }

    /// The module owning the provider `token` resolves to from `from`.
    pub(crate) fn lookup(&self, from: ModuleId, token: &Token) -> Option<ModuleId> {
        self.nodes[from.0].visible.get(token).copied()
    }

    pub(crate) fn record(&self, key: &ProviderKey) -> Option<&ProviderRecord> {
        self.nodes[key.module.0].providers.get(&key.token)
    }
}

/// Constructor parameters of a provider, with per-parameter `inject`
/// overrides applied to class providers.
pub(crate) fn effective_dependencies(
    metadata: &MetadataRegistry,
    provider: &Provider,
) -> Vec<Dependency> {
    match &provider.recipe {
        Recipe::Class { class, deps, .. } => deps
            .iter()
            .enumerate()
            .map(|(index, dep)| {
                match metadata.get_param::<Token>(MetaTarget::Class(*class), index, INJECT_METADATA)
                {
                    Some(token) => match dep {
                        Dependency::Optional(_) => Dependency::Optional(token.as_ref().clone()),
                        _ => Dependency::Required(token.as_ref().clone()),
                    },
                    None => dep.clone(),
                }
            })
            .collect(),
        other => other.dependencies().to_vec(),
    }
}
