//! Validation and merging of binding specs into a resolved graph
//!
//! A [ResolvedGraph] is an immutable stack of [BindingRegistry] layers. Merging new specs into an
//! existing graph never touches it: the result is a new layer sharing the previous graph as its
//! parent. Lookups walk the layers from the top, multibinding contributions are collected from the
//! bottom to keep their registration order.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::binding::FactoryFn;
use crate::*;

/// A factory with its normalized dependencies
#[derive(Clone)]
pub(crate) struct Recipe {
    pub(crate) dependencies: Vec<Dependency>,
    pub(crate) call: FactoryFn,
}

/// Validated form of a binding, as used by the injector
#[derive(Clone)]
pub(crate) enum Binding {
    Construct(Recipe),
    Forward { target: TypeKey, upcast: Upcast },
    Instance(Instance),
}

impl Binding {
    /// Dependencies of this binding, forwarding counts as a value dependency
    pub(crate) fn dependencies(&self) -> Vec<Dependency> {
        match self {
            Binding::Construct(recipe) => recipe.dependencies.clone(),
            Binding::Forward { target, .. } => vec![Dependency::value(*target)],
            Binding::Instance(_) => Vec::new(),
        }
    }

    fn value_edges(&self) -> impl Iterator<Item = TypeKey> {
        self.dependencies()
            .into_iter()
            .filter(|d| !d.is_deferred())
            .map(|d| d.key)
    }
}

/// Bindings registered by a single merge step
#[derive(Default)]
pub struct BindingRegistry {
    bindings: HashMap<TypeKey, (BindingSpec, Binding)>,
    multibindings: HashMap<TypeKey, Vec<Binding>>,
    specs: Vec<BindingSpec>,
}

impl BindingRegistry {
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty() && self.multibindings.is_empty()
    }

    /// Accepted specs, in registration order
    pub fn specs(&self) -> &[BindingSpec] {
        &self.specs
    }
}

/// Immutable, validated mapping from keys to bindings
#[derive(Default)]
pub struct ResolvedGraph {
    parent: Option<Arc<ResolvedGraph>>,
    registry: BindingRegistry,
}

impl ResolvedGraph {
    pub fn parent(&self) -> Option<&Arc<ResolvedGraph>> {
        self.parent.as_ref()
    }

    /// Bindings added by the topmost layer
    pub fn registry(&self) -> &BindingRegistry {
        &self.registry
    }

    fn layers(&self) -> Vec<&ResolvedGraph> {
        let mut layers = vec![self];
        let mut current = self;
        while let Some(parent) = &current.parent {
            layers.push(parent);
            current = parent;
        }
        layers
    }

    fn entry(&self, key: &TypeKey) -> Option<&(BindingSpec, Binding)> {
        self.layers()
            .into_iter()
            .find_map(|layer| layer.registry.bindings.get(key))
    }

    pub(crate) fn binding(&self, key: &TypeKey) -> Option<&Binding> {
        self.entry(key).map(|(_, binding)| binding)
    }

    /// Check if a regular binding exists for this key
    pub fn contains(&self, key: &TypeKey) -> bool {
        self.entry(key).is_some()
    }

    /// The [BindingSpec] registered for a key, if any
    pub fn spec(&self, key: &TypeKey) -> Option<&BindingSpec> {
        self.entry(key).map(|(spec, _)| spec)
    }

    /// Multibinding contributions for a key, in registration order
    pub(crate) fn contributions(&self, key: &TypeKey) -> Vec<&Binding> {
        self.layers()
            .into_iter()
            .rev()
            .filter_map(|layer| layer.registry.multibindings.get(key))
            .flatten()
            .collect()
    }

    /// All keys with a regular binding, in key order
    pub fn keys(&self) -> Vec<TypeKey> {
        self.bound_keys().into_iter().collect()
    }

    fn bound_keys(&self) -> BTreeSet<TypeKey> {
        self.layers()
            .into_iter()
            .flat_map(|layer| layer.registry.bindings.keys().copied())
            .collect()
    }

    /// All keys with multibinding contributions, in key order
    pub fn multibinding_keys(&self) -> Vec<TypeKey> {
        let keys: BTreeSet<TypeKey> = self
            .layers()
            .into_iter()
            .flat_map(|layer| layer.registry.multibindings.keys().copied())
            .collect();
        keys.into_iter().collect()
    }

    /// Dependencies declared by the binding of a key
    pub fn dependencies_of(&self, key: &TypeKey) -> Option<Vec<Dependency>> {
        self.binding(key).map(Binding::dependencies)
    }

    /// Every accepted spec, from the bottom layer to the top one
    pub fn specs(&self) -> Vec<BindingSpec> {
        self.layers()
            .into_iter()
            .rev()
            .flat_map(|layer| layer.registry.specs.iter().cloned())
            .collect()
    }

    /// Identity of every layer, used to recognize shared parents
    pub(crate) fn layer_ids(&self) -> Vec<*const ResolvedGraph> {
        self.layers()
            .into_iter()
            .map(|layer| layer as *const ResolvedGraph)
            .collect()
    }

    /// Specs of the layers missing from `seen`, from the bottom layer to the top one.
    ///
    /// The layers are added to `seen`, so that a layer shared by several graphs is only
    /// collected once.
    pub(crate) fn specs_excluding(&self, seen: &mut Vec<*const ResolvedGraph>) -> Vec<BindingSpec> {
        let fresh: Vec<&ResolvedGraph> = self
            .layers()
            .into_iter()
            .filter(|layer| !seen.contains(&(*layer as *const ResolvedGraph)))
            .collect();
        seen.extend(fresh.iter().map(|layer| *layer as *const ResolvedGraph));
        fresh
            .into_iter()
            .rev()
            .flat_map(|layer| layer.registry.specs.iter().cloned())
            .collect()
    }

    /// Check that every declared dependency has a binding.
    ///
    /// Missing bindings are tolerated while merging, this check is applied once the graph is
    /// used to create an injector.
    pub fn check_complete(&self) -> Result<()> {
        let multi = self.multibinding_keys();
        let owners = self
            .keys()
            .into_iter()
            .filter_map(|k| self.binding(&k).map(|b| (k, vec![b])))
            .chain(multi.into_iter().map(|k| (k, self.contributions(&k))));

        for (owner, bindings) in owners {
            for dep in bindings.iter().flat_map(|b| b.dependencies()) {
                if !self.contains(&dep.key) {
                    return Err(WiringError::TypeNotProvided {
                        requested: dep.key.to_string(),
                        required_by: Some(owner.to_string()),
                    });
                }
            }
        }
        Ok(())
    }

    /// Value dependencies of a key in construction order: dependencies first, the key last.
    ///
    /// Provider edges are not followed. Unbound keys are listed as leaves.
    pub fn value_closure(&self, root: TypeKey) -> Vec<TypeKey> {
        let mut order = Vec::new();
        let mut seen = BTreeSet::new();
        self.post_order(root, &mut seen, &mut order);
        order
    }

    fn post_order(&self, key: TypeKey, seen: &mut BTreeSet<TypeKey>, order: &mut Vec<TypeKey>) {
        if !seen.insert(key) {
            return;
        }
        if let Some(binding) = self.binding(&key) {
            for next in binding.value_edges() {
                self.post_order(next, seen, order);
            }
        }
        order.push(key);
    }

    /// Tri-color depth-first search over value edges, starting from the given keys
    fn check_acyclic(&self, roots: impl IntoIterator<Item = TypeKey>) -> Result<()> {
        let mut marks = HashMap::new();
        let mut path = Vec::new();
        for root in roots {
            self.visit(root, &mut marks, &mut path)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        key: TypeKey,
        marks: &mut HashMap<TypeKey, Mark>,
        path: &mut Vec<TypeKey>,
    ) -> Result<()> {
        match marks.get(&key) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|k| *k == key).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(TypeKey::to_string).collect();
                cycle.push(key.to_string());
                return Err(WiringError::DependencyCycle(cycle));
            }
            None => {}
        }

        marks.insert(key, Mark::Visiting);
        path.push(key);
        if let Some(binding) = self.binding(&key) {
            for next in binding.value_edges() {
                self.visit(next, marks, path)?;
            }
        }
        path.pop();
        marks.insert(key, Mark::Done);
        Ok(())
    }
}

/// Unvisited nodes are absent from the marking map
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Merge binding specs into validated graphs
pub struct GraphBuilder;

impl GraphBuilder {
    /// Validate a list of specs into a standalone graph
    pub fn build(specs: impl IntoIterator<Item = BindingSpec>) -> Result<ResolvedGraph> {
        Self::merge(None, specs)
    }

    /// Validate new specs on top of an existing graph.
    ///
    /// The existing graph is shared, not modified. Keys referenced as dependencies but not bound
    /// yet are accepted: they may be supplied by a later merge.
    pub fn merge(
        existing: Option<&Arc<ResolvedGraph>>,
        specs: impl IntoIterator<Item = BindingSpec>,
    ) -> Result<ResolvedGraph> {
        let mut graph = ResolvedGraph {
            parent: existing.cloned(),
            registry: BindingRegistry::default(),
        };

        for spec in specs {
            let key = spec.key();
            let binding = match &spec {
                BindingSpec::Constructor { factory, .. }
                | BindingSpec::ProviderFunction { factory, .. } => normalize_factory(key, factory)?,
                BindingSpec::Interface {
                    interface,
                    implementation,
                    upcast,
                } => normalize_interface(*interface, *implementation, upcast.as_ref())?,
                BindingSpec::Instance { instance, .. } => normalize_instance(key, instance)?,
                BindingSpec::Multi { contributions, .. } => {
                    let mut normalized = Vec::with_capacity(contributions.len());
                    for c in contributions {
                        normalized.push(normalize_contribution(key, c)?);
                    }
                    debug!(%key, count = normalized.len(), "Registered multibinding contributions");
                    graph
                        .registry
                        .multibindings
                        .entry(key)
                        .or_default()
                        .extend(normalized);
                    graph.registry.specs.push(spec.clone());
                    continue;
                }
            };

            if let Some((existing, _)) = graph.entry(&key) {
                if same_spec(existing, &spec) {
                    trace!(%key, "Skipping identical binding");
                    continue;
                }
                return Err(WiringError::DuplicateBinding(key.to_string()));
            }
            debug!(%key, kind = spec.kind(), "Registered binding");
            graph.registry.specs.push(spec.clone());
            graph.registry.bindings.insert(key, (spec, binding));
        }

        // A new cycle must go through one of the new bindings or contributions
        let mut roots: Vec<TypeKey> = graph.registry.bindings.keys().copied().collect();
        roots.extend(
            graph
                .registry
                .multibindings
                .values()
                .flatten()
                .flat_map(|b| b.value_edges().collect::<Vec<_>>()),
        );
        roots.sort();
        graph.check_acyclic(roots)?;

        debug!(
            bindings = graph.registry.bindings.len(),
            multibindings = graph.registry.multibindings.len(),
            layered = graph.parent.is_some(),
            "Validated binding graph"
        );
        Ok(graph)
    }
}

fn normalize_requests(factory: &Factory) -> Result<Vec<Dependency>> {
    factory.requests().iter().map(TypeExpr::normalize).collect()
}

fn normalize_factory(key: TypeKey, factory: &Factory) -> Result<Binding> {
    if !key.same_type(&factory.produces()) {
        return Err(WiringError::TypeMismatch {
            key: key.to_string(),
            expected: factory.produces().to_string(),
        });
    }
    Ok(Binding::Construct(Recipe {
        dependencies: normalize_requests(factory)?,
        call: factory.call().clone(),
    }))
}

fn normalize_instance(key: TypeKey, instance: &Instance) -> Result<Binding> {
    if !key.same_type(&instance.type_key()) {
        return Err(WiringError::TypeMismatch {
            key: key.to_string(),
            expected: instance.type_key().to_string(),
        });
    }
    Ok(Binding::Instance(instance.clone()))
}

fn normalize_interface(
    interface: TypeKey,
    implementation: TypeKey,
    upcast: Option<&Upcast>,
) -> Result<Binding> {
    if interface == implementation {
        return Err(WiringError::InterfaceBindingToSelf(interface.to_string()));
    }
    forward(interface, implementation, upcast)
}

fn forward(interface: TypeKey, implementation: TypeKey, upcast: Option<&Upcast>) -> Result<Binding> {
    match upcast {
        Some(upcast) if upcast.relates(&interface, &implementation) => Ok(Binding::Forward {
            target: implementation,
            upcast: upcast.clone(),
        }),
        _ => Err(WiringError::NotABaseClassOf {
            interface: interface.unannotated().to_string(),
            implementation: implementation.unannotated().to_string(),
        }),
    }
}

fn normalize_contribution(key: TypeKey, contribution: &Contribution) -> Result<Binding> {
    match contribution {
        Contribution::Constructed(factory) => normalize_factory(key, factory),
        Contribution::Instance(instance) => normalize_instance(key, instance),
        // the set of a key may contain the instance bound to that same key
        Contribution::Forwarded {
            implementation,
            upcast,
        } => forward(key, *implementation, Some(upcast)),
    }
}

/// Identical specs can be registered more than once, e.g. when a component is installed twice
fn same_spec(a: &BindingSpec, b: &BindingSpec) -> bool {
    match (a, b) {
        (
            BindingSpec::Constructor { factory: fa, .. },
            BindingSpec::Constructor { factory: fb, .. },
        )
        | (
            BindingSpec::ProviderFunction { factory: fa, .. },
            BindingSpec::ProviderFunction { factory: fb, .. },
        ) => fa.same_as(fb),
        (
            BindingSpec::Interface {
                implementation: ia, ..
            },
            BindingSpec::Interface {
                implementation: ib, ..
            },
        ) => ia == ib,
        (BindingSpec::Instance { instance: ia, .. }, BindingSpec::Instance { instance: ib, .. }) => {
            ia.same_object(ib)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::Injectable;

    struct A;
    struct B;
    struct C;

    impl Injectable for A {
        type Deps = (Arc<B>,);
        fn inject(_: Self::Deps) -> Self {
            A
        }
    }

    impl Injectable for B {
        type Deps = (Arc<C>,);
        fn inject(_: Self::Deps) -> Self {
            B
        }
    }

    impl Injectable for C {
        type Deps = (Arc<A>,);
        fn inject(_: Self::Deps) -> Self {
            C
        }
    }

    #[test]
    fn merge_tolerates_missing_bindings() -> Result<()> {
        let graph = GraphBuilder::build([BindingSpec::constructor::<A>()])?;
        assert!(graph.contains(&TypeKey::of::<A>()));
        assert!(!graph.contains(&TypeKey::of::<B>()));

        match graph.check_complete() {
            Err(WiringError::TypeNotProvided {
                requested,
                required_by,
            }) => {
                assert_eq!(requested, TypeKey::of::<B>().to_string());
                assert_eq!(required_by, Some(TypeKey::of::<A>().to_string()));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn cycle_across_layers_is_detected() -> Result<()> {
        let base = Arc::new(GraphBuilder::build([
            BindingSpec::constructor::<A>(),
            BindingSpec::constructor::<B>(),
        ])?);

        let err = GraphBuilder::merge(Some(&base), [BindingSpec::constructor::<C>()])
            .err()
            .expect("the cycle should be rejected");
        match err {
            WiringError::DependencyCycle(cycle) => {
                assert_eq!(cycle.len(), 4);
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("unexpected error: {}", other),
        }

        // the base graph is left untouched
        assert!(!base.contains(&TypeKey::of::<C>()));
        Ok(())
    }

    #[test]
    fn layered_lookup_and_closure() -> Result<()> {
        let base = Arc::new(GraphBuilder::build([BindingSpec::constructor::<B>()])?);
        let top = GraphBuilder::merge(Some(&base), [BindingSpec::instance(Arc::new(C))])?;

        assert!(top.contains(&TypeKey::of::<B>()));
        assert!(top.contains(&TypeKey::of::<C>()));
        assert_eq!(top.registry().len(), 1);
        assert_eq!(top.specs().len(), 2);
        assert_eq!(
            top.value_closure(TypeKey::of::<B>()),
            vec![TypeKey::of::<C>(), TypeKey::of::<B>()]
        );
        top.check_complete()
    }

    #[test]
    fn factory_output_must_match_its_key() {
        let provider = GraphBuilder::build([BindingSpec::ProviderFunction {
            key: TypeKey::of::<B>(),
            factory: Factory::function(|| Arc::new(C)),
        }]);
        match provider {
            Err(WiringError::TypeMismatch { key, expected }) => {
                assert_eq!(key, TypeKey::of::<B>().to_string());
                assert_eq!(expected, TypeKey::of::<C>().to_string());
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("the provider function should be rejected"),
        }

        let instance = GraphBuilder::build([BindingSpec::Instance {
            key: TypeKey::of::<B>(),
            instance: Instance::new(Arc::new(C)),
        }]);
        assert!(matches!(instance, Err(WiringError::TypeMismatch { .. })));

        let contribution = GraphBuilder::build([BindingSpec::multibinding(
            TypeKey::of::<B>(),
            vec![Contribution::instance(Arc::new(C))],
        )]);
        assert!(matches!(contribution, Err(WiringError::TypeMismatch { .. })));
    }

    #[test]
    fn contribution_may_forward_to_its_own_key() -> Result<()> {
        let graph = GraphBuilder::build([
            BindingSpec::instance(Arc::new(C)),
            BindingSpec::multibinding(TypeKey::of::<C>(), vec![Contribution::forward::<C, C>()]),
        ])?;
        assert_eq!(graph.contributions(&TypeKey::of::<C>()).len(), 1);
        graph.check_complete()?;

        // a regular interface binding to itself is still rejected
        let bound = GraphBuilder::build([BindingSpec::bind::<C, C>()]);
        assert!(matches!(bound, Err(WiringError::InterfaceBindingToSelf(_))));
        Ok(())
    }

    #[test]
    fn duplicates_conflict_unless_identical() -> Result<()> {
        let c = Arc::new(C);
        GraphBuilder::build([
            BindingSpec::constructor::<B>(),
            BindingSpec::constructor::<B>(),
            BindingSpec::instance(c.clone()),
            BindingSpec::instance(c),
        ])?;

        let err = GraphBuilder::build([
            BindingSpec::instance(Arc::new(C)),
            BindingSpec::instance(Arc::new(C)),
        ]);
        assert!(matches!(err, Err(WiringError::DuplicateBinding(_))));
        Ok(())
    }
}
