use std::sync::Arc;

use tracing::debug;

use crate::inject::Core;
use crate::*;

/// A validated graph fragment, shareable by many injectors.
///
/// Injectors created from the same normalized component skip its validation and share the
/// instances it prebuilt. Installing more bindings never modifies the component.
pub struct NormalizedComponent {
    graph: Arc<ResolvedGraph>,
    prebuilt: Vec<(TypeKey, Instance)>,
}

impl NormalizedComponent {
    pub fn new(specs: impl IntoIterator<Item = BindingSpec>) -> Result<Self> {
        Ok(Self {
            graph: Arc::new(GraphBuilder::build(specs)?),
            prebuilt: Vec::new(),
        })
    }

    /// Validate the specs and construct the listed keys right away.
    ///
    /// Each listed key must have its whole value closure bound inside this component, without
    /// reaching any provider.
    pub fn with_prebuilt(
        specs: impl IntoIterator<Item = BindingSpec>,
        keys: impl IntoIterator<Item = TypeKey>,
    ) -> Result<Self> {
        let graph = Arc::new(GraphBuilder::build(specs)?);
        let keys: Vec<TypeKey> = keys.into_iter().collect();
        for key in &keys {
            check_prebuildable(&graph, *key)?;
        }
        if keys.is_empty() {
            return Ok(Self {
                graph,
                prebuilt: Vec::new(),
            });
        }

        let core = Core::new(graph.clone(), Vec::new());
        for key in &keys {
            core.resolve(*key)?;
        }
        let prebuilt = core.ready_instances();
        debug!(count = prebuilt.len(), "Prebuilt shared instances");
        Ok(Self { graph, prebuilt })
    }

    pub fn graph(&self) -> &Arc<ResolvedGraph> {
        &self.graph
    }

    pub fn prebuilt(&self) -> &[(TypeKey, Instance)] {
        &self.prebuilt
    }

    /// Merge additional specs on top of the cached graph
    pub fn install(&self, specs: impl IntoIterator<Item = BindingSpec>) -> Result<ResolvedGraph> {
        GraphBuilder::merge(Some(&self.graph), specs)
    }

    /// Create an injector on the cached graph completed by additional specs
    pub fn injector(&self, specs: impl IntoIterator<Item = BindingSpec>) -> Result<Injector> {
        Injector::builder().normalized(self).install(specs).build()
    }
}

fn check_prebuildable(graph: &ResolvedGraph, key: TypeKey) -> Result<()> {
    for k in graph.value_closure(key) {
        let deps = graph
            .dependencies_of(&k)
            .ok_or_else(|| WiringError::NotPrebuildable {
                key: key.to_string(),
                reason: format!("{} is not bound in this component", k),
            })?;
        if let Some(dep) = deps.iter().find(|d| d.is_deferred()) {
            return Err(WiringError::NotPrebuildable {
                key: key.to_string(),
                reason: format!("{} depends on a provider of {}", k, dep.key),
            });
        }
    }
    Ok(())
}
