//! Static checks over a registered graph: unresolvable dependencies,
//! constructor cycles, and scope bubbling.

use std::collections::{HashMap, HashSet};

use super::topo::detect_cycle_with_path;
use super::{effective_dependencies, ModuleGraph, ProviderKey};
use crate::errors::{GraphError, ResolutionError};
use crate::metadata::MetadataRegistry;
use crate::provider::{Dependency, Recipe, Scope};
use crate::token::{Token, REQUEST};

/// Reports dependencies that can never resolve and constructor dependency
/// cycles, before anything is instantiated.
pub(crate) fn validate(graph: &ModuleGraph, metadata: &MetadataRegistry) -> Result<(), GraphError> {
    for node in graph.modules() {
        for token in &node.order {
            let record = &node.providers[token];
            let mut missing = effective_dependencies(metadata, &record.provider)
                .into_iter()
                .filter_map(|dep| match dep {
                    Dependency::Required(t) => Some(t),
                    _ => None,
                });
            if let Recipe::Existing(target) = &record.provider.recipe {
                if *target != REQUEST && !node.can_see(target) {
                    return Err(unresolved(node.name(), token, target));
                }
            }
            if let Some(t) = missing.find(|t| *t != REQUEST && !node.can_see(t)) {
                return Err(unresolved(node.name(), token, &t));
            }
        }
    }

    let (keys, adj) = constructor_edges(graph, metadata);
    if let Some(cycle) = detect_cycle_with_path(&adj) {
        let path = cycle
            .into_iter()
            .map(|i| {
                let key = &keys[i];
                format!("{}@{}", key.token, graph.module(key.module).name())
            })
            .collect();
        return Err(GraphError::DependencyCycle { path });
    }
    Ok(())
}

fn unresolved(module: &str, provider: &Token, missing: &Token) -> GraphError {
    GraphError::UnresolvedDependency {
        module: module.to_string(),
        provider: provider.clone(),
        source: ResolutionError::UnknownToken {
            token: missing.clone(),
            module: module.to_string(),
        },
    }
}

/// Follows aliases from `(module, token)` to the provider that actually
/// constructs something. `None` for values, `REQUEST`, unknown tokens and
/// alias cycles (the latter surface at resolution time).
fn constructing_target(graph: &ModuleGraph, module: super::ModuleId, token: &Token) -> Option<ProviderKey> {
    let mut seen = HashSet::new();
    let mut key = ProviderKey {
        module: graph.lookup(module, token)?,
        token: token.clone(),
    };
    loop {
        let record = graph.record(&key)?;
        match &record.provider.recipe {
            Recipe::Existing(target) => {
                if !seen.insert(key.clone()) {
                    return None;
                }
                key = ProviderKey {
                    module: graph.lookup(key.module, target)?,
                    token: target.clone(),
                };
            }
            Recipe::Value(_) => return None,
            Recipe::Class { .. } | Recipe::Factory { .. } => return Some(key),
        }
    }
}

/// Constructing providers and their "depends on" edges.
fn constructor_edges(
    graph: &ModuleGraph,
    metadata: &MetadataRegistry,
) -> (Vec<ProviderKey>, Vec<Vec<usize>>) {
    let mut keys = Vec::new();
    let mut index = HashMap::new();
    for node in graph.modules() {
        for token in &node.order {
            if matches!(
                node.providers[token].provider.recipe,
                Recipe::Class { .. } | Recipe::Factory { .. }
            ) {
                let key = ProviderKey {
                    module: node.id,
                    token: token.clone(),
                };
                index.insert(key.clone(), keys.len());
                keys.push(key);
            }
        }
    }

    let adj = keys
        .iter()
        .map(|key| {
            let record = &graph.module(key.module).providers[&key.token];
            effective_dependencies(metadata, &record.provider)
                .iter()
                .filter_map(|dep| match dep {
                    Dependency::Required(t) | Dependency::Optional(t) => {
                        constructing_target(graph, key.module, t)
                    }
                    Dependency::Inquirer => None,
                })
                .filter_map(|target| index.get(&target).copied())
                .collect()
        })
        .collect();

    (keys, adj)
}

/// A singleton that (transitively) depends on a request-scoped provider or on
/// `REQUEST` becomes request-scoped. Transient providers stay transient and
/// values are always singletons.
pub(crate) fn bubble_scopes(graph: &mut ModuleGraph, metadata: &MetadataRegistry) {
    let mut memo: HashMap<ProviderKey, bool> = HashMap::new();
    let mut updates = Vec::new();

    for node in graph.modules() {
        for token in &node.order {
            let key = ProviderKey {
                module: node.id,
                token: token.clone(),
            };
            let record = &node.providers[token];
            let effective = match (&record.provider.recipe, record.provider.scope) {
                (Recipe::Value(_), _) => Scope::Singleton,
                (_, Scope::Singleton) if request_bound(graph, metadata, &key, &mut memo) => {
                    tracing::debug!(
                        module = %node.name,
                        token = %token,
                        "Provider depends on request scope; resolving per request"
                    );
                    Scope::Request
                }
                (_, scope) => scope,
            };
            updates.push((key, effective));
        }
    }

    for (key, effective) in updates {
        if let Some(record) = graph.nodes[key.module.0].providers.get_mut(&key.token) {
            record.effective = effective;
        }
    }
}

fn request_bound(
    graph: &ModuleGraph,
    metadata: &MetadataRegistry,
    key: &ProviderKey,
    memo: &mut HashMap<ProviderKey, bool>,
) -> bool {
    if let Some(bound) = memo.get(key) {
        return *bound;
    }
    // Provisional entry guards against alias cycles.
    memo.insert(key.clone(), false);

    let bound = match graph.record(key) {
        None => false,
        Some(record) => match &record.provider.recipe {
            Recipe::Value(_) => false,
            Recipe::Existing(target) => {
                *target == REQUEST
                    || graph.lookup(key.module, target).is_some_and(|owner| {
                        request_bound(
                            graph,
                            metadata,
                            &ProviderKey {
                                module: owner,
                                token: target.clone(),
                            },
                            memo,
                        )
                    })
            }
            Recipe::Class { .. } | Recipe::Factory { .. } => {
                record.provider.scope == Scope::Request
                    || effective_dependencies(metadata, &record.provider)
                        .iter()
                        .any(|dep| match dep {
                            Dependency::Required(t) | Dependency::Optional(t) => {
                                *t == REQUEST
                                    || graph.lookup(key.module, t).is_some_and(|owner| {
                                        request_bound(
                                            graph,
                                            metadata,
                                            &ProviderKey {
                                                module: owner,
                                                token: t.clone(),
                                            },
                                            memo,
                                        )
                                    })
                            }
                            Dependency::Inquirer => false,
                        })
            }
        },
    };

    memo.insert(key.clone(), bound);
    bound
}
