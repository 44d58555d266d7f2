//! Metadata registry: key/value annotations attached to classes, handler
//! methods and constructor parameters.
//!
//! Values are written while the module graph is assembled and read many times
//! afterwards (by the resolver, guards, interceptors). Lookups on a class or
//! method climb the inheritance chain registered with
//! [`MetadataRegistry::extend`] until a value is found.

use std::any::Any;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::token::TypeKey;

pub type MetaKey = Cow<'static, str>;
pub type MetaValue = Arc<dyn Any + Send + Sync>;

/// Ordered guard bindings (accumulating list).
pub const GUARDS_METADATA: &str = "__guards__";
/// Ordered interceptor bindings (accumulating list).
pub const INTERCEPTORS_METADATA: &str = "__interceptors__";
/// Ordered exception filter bindings (accumulating list).
pub const FILTERS_METADATA: &str = "__filters__";
/// Per-parameter injection token override for class constructors.
pub const INJECT_METADATA: &str = "__inject__";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MetaTarget {
    Class(TypeKey),
    Method(TypeKey, &'static str),
}

impl MetaTarget {
    pub fn owner(&self) -> TypeKey {
        match self {
            MetaTarget::Class(t) | MetaTarget::Method(t, _) => *t,
        }
    }

    fn with_owner(&self, owner: TypeKey) -> Self {
        match self {
            MetaTarget::Class(_) => MetaTarget::Class(owner),
            MetaTarget::Method(_, m) => MetaTarget::Method(owner, m),
        }
    }
}

/// A deferred metadata write carried by descriptors until the graph is built.
#[derive(Clone)]
pub(crate) enum MetaWrite {
    Set(MetaTarget, MetaKey, MetaValue),
    Append(MetaTarget, MetaKey, MetaValue),
    Param(MetaTarget, usize, MetaKey, MetaValue),
    Extend(TypeKey, TypeKey),
}

#[derive(Default)]
struct Store {
    values: HashMap<(MetaTarget, MetaKey), MetaValue>,
    lists: HashMap<(MetaTarget, MetaKey), Vec<MetaValue>>,
    params: HashMap<(MetaTarget, usize, MetaKey), MetaValue>,
    parents: HashMap<TypeKey, TypeKey>,
}

impl Store {
    /// `target` followed by the same target on each ancestor. Stops at the
    /// first repeated owner, so cyclic `extend` calls cannot loop.
    fn lineage(&self, target: MetaTarget) -> Vec<MetaTarget> {
        let mut seen = HashSet::new();
        let mut chain = Vec::new();
        let mut current = Some(target);
        while let Some(t) = current {
            if !seen.insert(t.owner()) {
                break;
            }
            chain.push(t);
            current = self.parents.get(&t.owner()).map(|p| t.with_owner(*p));
        }
        chain
    }
}

#[derive(Default)]
pub struct MetadataRegistry {
    store: RwLock<Store>,
}

impl std::fmt::Debug for MetadataRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.store.read();
        f.debug_struct("MetadataRegistry")
            .field("values", &store.values.len())
            .field("lists", &store.lists.len())
            .field("params", &store.params.len())
            .field("parents", &store.parents.len())
            .finish()
    }
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `child` as inheriting metadata from `parent`.
    pub fn extend(&self, child: TypeKey, parent: TypeKey) {
        self.store.write().parents.insert(child, parent);
    }

    /// Write (or overwrite) a value.
    pub fn set<V: Any + Send + Sync>(&self, target: MetaTarget, key: impl Into<MetaKey>, value: V) {
        self.set_raw(target, key.into(), Arc::new(value));
    }

    /// Append to the ordered list stored under `key`; repeated calls accumulate.
    pub fn append<V: Any + Send + Sync>(
        &self,
        target: MetaTarget,
        key: impl Into<MetaKey>,
        value: V,
    ) {
        self.append_raw(target, key.into(), Arc::new(value));
    }

    pub fn set_param<V: Any + Send + Sync>(
        &self,
        target: MetaTarget,
        index: usize,
        key: impl Into<MetaKey>,
        value: V,
    ) {
        self.store
            .write()
            .params
            .insert((target, index, key.into()), Arc::new(value));
    }

    /// Read a value, climbing the inheritance chain.
    pub fn get<V: Any + Send + Sync>(&self, target: MetaTarget, key: &str) -> Option<Arc<V>> {
        let store = self.store.read();
        let key: MetaKey = Cow::Owned(key.to_owned());
        store
            .lineage(target)
            .into_iter()
            .find_map(|t| store.values.get(&(t, key.clone())))
            .and_then(|v| v.clone().downcast::<V>().ok())
    }

    /// Read a value declared on `target` itself, ignoring parents.
    pub fn get_own<V: Any + Send + Sync>(&self, target: MetaTarget, key: &str) -> Option<Arc<V>> {
        let store = self.store.read();
        store
            .values
            .get(&(target, Cow::Owned(key.to_owned())))
            .and_then(|v| v.clone().downcast::<V>().ok())
    }

    /// Read an accumulated list, climbing the inheritance chain to the first
    /// target that declares one. Entries of another type are skipped.
    pub fn get_list<V: Any + Send + Sync>(&self, target: MetaTarget, key: &str) -> Vec<Arc<V>> {
        let store = self.store.read();
        let key: MetaKey = Cow::Owned(key.to_owned());
        store
            .lineage(target)
            .into_iter()
            .find_map(|t| store.lists.get(&(t, key.clone())))
            .map(|list| {
                list.iter()
                    .filter_map(|v| v.clone().downcast::<V>().ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_param<V: Any + Send + Sync>(
        &self,
        target: MetaTarget,
        index: usize,
        key: &str,
    ) -> Option<Arc<V>> {
        let store = self.store.read();
        store
            .params
            .get(&(target, index, Cow::Owned(key.to_owned())))
            .and_then(|v| v.clone().downcast::<V>().ok())
    }

    /// First value found across `targets` (most specific first).
    pub fn get_all_and_override<V: Any + Send + Sync>(
        &self,
        key: &str,
        targets: &[MetaTarget],
    ) -> Option<Arc<V>> {
        targets.iter().find_map(|t| self.get::<V>(*t, key))
    }

    /// Concatenation of `Vec<V>` values found across `targets`.
    pub fn get_all_and_merge<V: Any + Send + Sync + Clone>(
        &self,
        key: &str,
        targets: &[MetaTarget],
    ) -> Vec<V> {
        targets
            .iter()
            .filter_map(|t| self.get::<Vec<V>>(*t, key))
            .flat_map(|list| list.as_ref().clone())
            .collect()
    }

    pub(crate) fn set_raw(&self, target: MetaTarget, key: MetaKey, value: MetaValue) {
        self.store.write().values.insert((target, key), value);
    }

    pub(crate) fn append_raw(&self, target: MetaTarget, key: MetaKey, value: MetaValue) {
        self.store
            .write()
            .lists
            .entry((target, key))
            .or_default()
            .push(value);
    }

    pub(crate) fn apply(&self, write: MetaWrite) {
        match write {
            MetaWrite::Set(target, key, value) => self.set_raw(target, key, value),
            MetaWrite::Append(target, key, value) => self.append_raw(target, key, value),
            MetaWrite::Param(target, index, key, value) => {
                self.store.write().params.insert((target, index, key), value);
            }
            MetaWrite::Extend(child, parent) => self.extend(child, parent),
        }
    }
}
