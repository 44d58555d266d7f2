use std::collections::HashMap;
use std::sync::Arc;

use super::analysis;
use super::topo::{detect_cycle_with_path, topo_sort};
use super::{ControllerEntry, ModuleGraph, ModuleId, ModuleNode, ProviderRecord};
use crate::errors::GraphError;
use crate::metadata::MetadataRegistry;
use crate::module::{Export, ModuleDescriptor, ModuleKey, ModuleRef};
use crate::provider::Provider;

/// A module reached during expansion, before it gets its final id.
struct Expanded {
    key: ModuleKey,
    name: String,
    imports: Vec<ModuleKey>,
    descriptor: ModuleDescriptor,
}

/// Assembles a [`ModuleGraph`] from a root module.
///
/// Expansion is depth-first in declaration order. Each distinct module
/// reference becomes one node; dynamic modules are materialized the first
/// time they are reached.
pub struct GraphBuilder<'a> {
    metadata: &'a MetadataRegistry,
    root_providers: Vec<Provider>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(metadata: &'a MetadataRegistry) -> Self {
        Self {
            metadata,
            root_providers: Vec::new(),
        }
    }

    /// Extra providers registered in the root module (used for injected
    /// global enhancers). Own root providers with the same token win.
    pub fn root_providers(mut self, providers: Vec<Provider>) -> Self {
        self.root_providers = providers;
        self
    }

    pub async fn build(mut self, root: ModuleRef) -> Result<ModuleGraph, GraphError> {
        let root_key = root.key();
        let (mut expanded, index) = expand(root).await?;

        // importer -> import
        let adj: Vec<Vec<usize>> = expanded
            .iter()
            .map(|e| e.imports.iter().map(|k| index[k]).collect())
            .collect();

        if let Some(cycle) = detect_cycle_with_path(&adj) {
            let path = cycle.into_iter().map(|i| expanded[i].name.clone()).collect();
            return Err(GraphError::CyclicModuleImport { path });
        }

        // import -> importer, so imports come first
        let mut reversed = vec![Vec::new(); adj.len()];
        for (importer, imports) in adj.iter().enumerate() {
            for &import in imports {
                reversed[import].push(importer);
            }
        }
        let globals: Vec<bool> = expanded.iter().map(|e| e.descriptor.global).collect();
        let order = topo_sort(&with_global_edges(&reversed, &adj, &globals));

        let mut position = vec![0usize; order.len()];
        for (new, &old) in order.iter().enumerate() {
            position[old] = new;
        }
        let id_of = |key: &ModuleKey| ModuleId(position[index[key]]);

        let mut slots: Vec<Option<Expanded>> = expanded.drain(..).map(Some).collect();
        let mut nodes = Vec::with_capacity(order.len());
        let mut exports = Vec::with_capacity(order.len());
        let root_id = id_of(&root_key);
        let mut root_providers = Some(std::mem::take(&mut self.root_providers));

        for (new, &old) in order.iter().enumerate() {
            let Some(module) = slots[old].take() else {
                continue;
            };
            let id = ModuleId(new);
            let imports = module.imports.iter().map(&id_of).collect();
            let extra = if id == root_id {
                root_providers.take().unwrap_or_default()
            } else {
                Vec::new()
            };
            let (node, module_exports) = self.register(id, module, imports, extra);
            nodes.push(node);
            exports.push(module_exports);
        }

        resolve_exports(&mut nodes, &exports, &id_of, &index)?;
        resolve_visibility(&mut nodes);

        let mut graph = ModuleGraph {
            nodes,
            root: root_id,
        };
        analysis::validate(&graph, self.metadata)?;
        analysis::bubble_scopes(&mut graph, self.metadata);

        tracing::debug!(modules = graph.nodes.len(), "Module graph built");
        Ok(graph)
    }

    /// Registers providers, controllers and metadata of one module.
    fn register(
        &self,
        id: ModuleId,
        module: Expanded,
        imports: Vec<ModuleId>,
        extra: Vec<Provider>,
    ) -> (ModuleNode, Vec<Export>) {
        let Expanded {
            key,
            name,
            descriptor,
            ..
        } = module;

        for write in descriptor.metadata {
            self.metadata.apply(write);
        }

        let mut node = ModuleNode {
            id,
            key,
            name,
            global: descriptor.global,
            imports,
            order: Vec::new(),
            providers: HashMap::new(),
            exported: HashMap::new(),
            visible: HashMap::new(),
            controllers: Vec::new(),
            lifecycle: descriptor.lifecycle,
        };

        for provider in descriptor.providers {
            insert_provider(&mut node, provider, true);
        }
        for provider in extra {
            insert_provider(&mut node, provider, false);
        }

        for controller in descriptor.controllers {
            let parts = controller.into_parts();
            for write in parts.writes {
                self.metadata.apply(write);
            }
            insert_provider(&mut node, parts.provider, true);
            for enhancer in parts.enhancers {
                insert_provider(&mut node, enhancer, false);
            }
            node.controllers.push(ControllerEntry {
                class: parts.class,
                prefix: parts.prefix,
                routes: parts.routes.into_iter().map(Arc::new).collect(),
            });
        }

        tracing::debug!(
            module = %node.name,
            providers = node.order.len(),
            controllers = node.controllers.len(),
            global = node.global,
            "Module registered"
        );

        (node, descriptor.exports)
    }
}

/// Depth-first expansion with deduplication by module key.
async fn expand(
    root: ModuleRef,
) -> Result<(Vec<Expanded>, HashMap<ModuleKey, usize>), GraphError> {
    let mut index = HashMap::new();
    let mut expanded = Vec::new();
    let mut stack = vec![root];

    while let Some(module) = stack.pop() {
        let key = module.key();
        if index.contains_key(&key) {
            continue;
        }

        let mut descriptor = match &module {
            ModuleRef::Static { define, .. } => define(),
            ModuleRef::Dynamic(dynamic) => {
                dynamic
                    .materialize()
                    .await
                    .map_err(|source| GraphError::DynamicModule {
                        module: dynamic.name().to_string(),
                        source,
                    })?
            }
        };

        let name = descriptor
            .name
            .as_ref()
            .map(|n| n.to_string())
            .unwrap_or_else(|| module.display_name());
        let imports = std::mem::take(&mut descriptor.imports);
        let mut import_keys: Vec<ModuleKey> = Vec::with_capacity(imports.len());
        for import in &imports {
            let k = import.key();
            if !import_keys.contains(&k) {
                import_keys.push(k);
            }
        }

        tracing::debug!(module = %name, imports = import_keys.len(), "Module expanded");
        index.insert(key, expanded.len());
        expanded.push(Expanded {
            key,
            name,
            imports: import_keys,
            descriptor,
        });

        // First import is expanded next.
        stack.extend(imports.into_iter().rev());
    }

    Ok((expanded, index))
}

/// Adds an edge from every global module to each non-global module outside
/// its own import closure, so globals initialize before the modules that may
/// consume their exports without importing them. Falls back to import edges
/// alone when the extra edges would close a cycle.
fn with_global_edges(
    reversed: &[Vec<usize>],
    adj: &[Vec<usize>],
    globals: &[bool],
) -> Vec<Vec<usize>> {
    let mut extended = reversed.to_vec();
    for (global, _) in globals.iter().enumerate().filter(|(_, g)| **g) {
        let closure = import_closure(adj, global);
        for (module, _) in globals.iter().enumerate().filter(|(_, g)| !**g) {
            if !closure[module] && !extended[global].contains(&module) {
                extended[global].push(module);
            }
        }
    }

    if detect_cycle_with_path(&extended).is_some() {
        tracing::debug!("Global modules ordered by imports only");
        return reversed.to_vec();
    }
    extended
}

/// Modules reachable from `start` through imports, `start` included.
fn import_closure(adj: &[Vec<usize>], start: usize) -> Vec<bool> {
    let mut seen = vec![false; adj.len()];
    let mut stack = vec![start];
    while let Some(node) = stack.pop() {
        if std::mem::replace(&mut seen[node], true) {
            continue;
        }
        stack.extend(adj[node].iter().copied());
    }
    seen
}

fn insert_provider(node: &mut ModuleNode, provider: Provider, replace: bool) {
    let token = provider.token.clone();
    if node.providers.contains_key(&token) {
        if !replace {
            return;
        }
        tracing::debug!(module = %node.name, token = %token, "Provider overridden");
    } else {
        node.order.push(token.clone());
    }
    let effective = provider.scope;
    node.providers.insert(token, ProviderRecord { provider, effective });
}

/// Computes each module's exported map. Runs in initialization order, so
/// imports are always resolved before their importers.
fn resolve_exports(
    nodes: &mut [ModuleNode],
    exports: &[Vec<Export>],
    id_of: &dyn Fn(&ModuleKey) -> ModuleId,
    index: &HashMap<ModuleKey, usize>,
) -> Result<(), GraphError> {
    for id in 0..nodes.len() {
        let mut exported = HashMap::new();
        let node = &nodes[id];

        for export in &exports[id] {
            match export {
                Export::Token(token) => {
                    if node.providers.contains_key(token) {
                        exported.insert(token.clone(), node.id);
                        continue;
                    }
                    let owner = node
                        .imports
                        .iter()
                        .find_map(|i| nodes[i.0].exported.get(token).copied());
                    match owner {
                        Some(owner) => {
                            exported.insert(token.clone(), owner);
                        }
                        None => {
                            return Err(GraphError::UnknownExport {
                                module: node.name.clone(),
                                export: token.to_string(),
                            })
                        }
                    }
                }
                Export::Module(key) => {
                    let imported = index
                        .contains_key(key)
                        .then(|| id_of(key))
                        .filter(|m| node.imports.contains(m));
                    let Some(imported) = imported else {
                        return Err(GraphError::UnknownExport {
                            module: node.name.clone(),
                            export: format!("{key:?}"),
                        });
                    };
                    for (token, owner) in &nodes[imported.0].exported {
                        exported.entry(token.clone()).or_insert(*owner);
                    }
                }
            }
        }

        nodes[id].exported = exported;
    }
    Ok(())
}

/// own providers, then imported exports in import order, then global exports.
fn resolve_visibility(nodes: &mut [ModuleNode]) {
    let globals: Vec<usize> = nodes
        .iter()
        .filter(|n| n.global)
        .map(|n| n.id.0)
        .collect();

    for id in 0..nodes.len() {
        let node = &nodes[id];
        let mut visible: HashMap<_, _> = node
            .order
            .iter()
            .map(|t| (t.clone(), node.id))
            .collect();

        let sources = node
            .imports
            .iter()
            .map(|i| i.0)
            .chain(globals.iter().copied().filter(|&g| g != id));
        for source in sources {
            for (token, owner) in &nodes[source].exported {
                visible.entry(token.clone()).or_insert(*owner);
            }
        }

        nodes[id].visible = visible;
    }
}
