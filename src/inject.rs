use std::any::TypeId;
use std::collections::hash_map::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tracing::{debug, trace};

use crate::graph::Binding;
use crate::provider::ErasedProvider;
use crate::resolve::{Args, Resolved};
use crate::*;

/// State of a key in the instance store. Unresolved keys have no entry.
#[derive(Debug)]
enum Slot<V> {
    /// Under construction by the given thread
    Resolving(ThreadId),
    Ready(V),
}

/// Values owned by the store, in construction order
#[derive(Debug, Clone, Copy)]
enum Owned {
    Instance(TypeKey),
    Multibinding(TypeKey),
}

/// Memoized instances of an injector
#[derive(Default)]
struct Store {
    instances: HashMap<TypeKey, Slot<Instance>>,
    multibindings: HashMap<TypeKey, Slot<Vec<Instance>>>,
    owned: Vec<Owned>,
    /// Threads blocked on a slot, with the thread constructing it
    waiting: HashMap<ThreadId, ThreadId>,
}

impl Store {
    fn instances(&mut self) -> &mut HashMap<TypeKey, Slot<Instance>> {
        &mut self.instances
    }

    fn multibindings(&mut self) -> &mut HashMap<TypeKey, Slot<Vec<Instance>>> {
        &mut self.multibindings
    }

    /// Follow the chain of blocked threads from `owner`: waiting on it would deadlock if the
    /// chain leads back to `me`.
    fn waits_on(&self, owner: ThreadId, me: ThreadId) -> bool {
        let mut current = owner;
        for _ in 0..=self.waiting.len() {
            match self.waiting.get(&current) {
                Some(&next) if next == me => return true,
                Some(&next) => current = next,
                None => return false,
            }
        }
        false
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // dependents go before their dependencies
        while let Some(owned) = self.owned.pop() {
            match owned {
                Owned::Instance(key) => {
                    self.instances.remove(&key);
                }
                Owned::Multibinding(key) => {
                    self.multibindings.remove(&key);
                }
            }
        }
    }
}

/// Shared state of an injector, also reachable from its providers
pub(crate) struct Core {
    graph: Arc<ResolvedGraph>,
    store: Mutex<Store>,
    resolved: Condvar,
}

impl Core {
    pub(crate) fn new(
        graph: Arc<ResolvedGraph>,
        shared: impl IntoIterator<Item = (TypeKey, Instance)>,
    ) -> Arc<Self> {
        let mut store = Store::default();
        store
            .instances
            .extend(shared.into_iter().map(|(key, i)| (key, Slot::Ready(i))));
        Arc::new(Self {
            graph,
            store: Mutex::new(store),
            resolved: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Obtain the instance of a key, constructing it and its dependencies if needed
    pub(crate) fn resolve(self: &Arc<Self>, key: TypeKey) -> Result<Instance> {
        let binding = self
            .graph
            .binding(&key)
            .ok_or_else(|| WiringError::TypeNotProvided {
                requested: key.to_string(),
                required_by: None,
            })?;
        if let Binding::Instance(instance) = binding {
            return Ok(instance.clone());
        }
        self.memoize(Store::instances, key, Owned::Instance(key), || {
            self.build(key, binding)
        })
    }

    pub(crate) fn resolve_multibindings(self: &Arc<Self>, key: TypeKey) -> Result<Vec<Instance>> {
        let contributions = self.graph.contributions(&key);
        if contributions.is_empty() {
            return Ok(Vec::new());
        }
        self.memoize(Store::multibindings, key, Owned::Multibinding(key), || {
            contributions
                .iter()
                .map(|binding| self.build(key, binding))
                .collect()
        })
    }

    /// Run the state machine of a slot: build the value once, reject re-entry from the
    /// constructing thread and let other threads wait for the outcome, unless the constructing
    /// thread is itself blocked on the caller.
    fn memoize<V: Clone>(
        &self,
        table: fn(&mut Store) -> &mut HashMap<TypeKey, Slot<V>>,
        key: TypeKey,
        owned: Owned,
        build: impl FnOnce() -> Result<V>,
    ) -> Result<V> {
        let me = thread::current().id();
        let mut store = self.lock();
        loop {
            let owner = match table(&mut *store).get(&key) {
                Some(Slot::Ready(value)) => {
                    trace!(%key, "Reusing memoized value");
                    return Ok(value.clone());
                }
                Some(Slot::Resolving(owner)) => *owner,
                None => break,
            };
            if owner == me || store.waits_on(owner, me) {
                return Err(WiringError::CyclicResolution(key.to_string()));
            }
            trace!(%key, "Waiting for another thread");
            store.waiting.insert(me, owner);
            store = self
                .resolved
                .wait(store)
                .unwrap_or_else(PoisonError::into_inner);
            store.waiting.remove(&me);
        }
        table(&mut *store).insert(key, Slot::Resolving(me));
        drop(store);

        let outcome = build();

        let mut store = self.lock();
        match &outcome {
            Ok(value) => {
                table(&mut *store).insert(key, Slot::Ready(value.clone()));
                store.owned.push(owned);
            }
            Err(_) => {
                table(&mut *store).remove(&key);
            }
        }
        // woken threads register again if they still have to wait
        store.waiting.retain(|_, owner| *owner != me);
        drop(store);
        self.resolved.notify_all();
        outcome
    }

    fn build(self: &Arc<Self>, key: TypeKey, binding: &Binding) -> Result<Instance> {
        match binding {
            Binding::Construct(recipe) => {
                let values = recipe
                    .dependencies
                    .iter()
                    .map(|dep| self.resolve_dependency(dep))
                    .collect::<Result<Vec<_>>>()?;
                debug!(%key, "Constructing instance");
                (recipe.call)(&mut Args::new(key, values))
            }
            Binding::Forward { target, upcast } => {
                let instance = self.resolve(*target)?;
                upcast.apply(key, &instance)
            }
            Binding::Instance(instance) => Ok(instance.clone()),
        }
    }

    fn resolve_dependency(self: &Arc<Self>, dep: &Dependency) -> Result<Resolved> {
        match dep.indirection {
            Indirection::Provider => Ok(Resolved::Provider(self.provider(dep.key))),
            Indirection::Value | Indirection::Reference => self
                .resolve(dep.key)
                .map(|instance| Resolved::Instance(dep.key, instance)),
        }
    }

    fn provider(self: &Arc<Self>, key: TypeKey) -> ErasedProvider {
        ErasedProvider::new(Arc::downgrade(self), key)
    }

    fn is_ready(&self, key: &TypeKey) -> bool {
        matches!(self.graph.binding(key), Some(Binding::Instance(_)))
            || matches!(self.lock().instances.get(key), Some(Slot::Ready(_)))
    }

    /// Instances constructed so far
    pub(crate) fn ready_instances(&self) -> Vec<(TypeKey, Instance)> {
        self.lock()
            .instances
            .iter()
            .filter_map(|(key, slot)| match slot {
                Slot::Ready(instance) => Some((*key, instance.clone())),
                Slot::Resolving(_) => None,
            })
            .collect()
    }
}

/// Runtime owner of the instances of a resolved graph.
///
/// Every key is constructed at most once per injector, on first request. Constructed instances
/// are released in reverse construction order when the injector is dropped.
pub struct Injector {
    core: Arc<Core>,
}

impl Injector {
    /// Create an injector from raw binding specs
    pub fn new(specs: impl IntoIterator<Item = BindingSpec>) -> Result<Self> {
        Self::builder().install(specs).build()
    }

    pub fn builder() -> InjectorBuilder {
        InjectorBuilder::default()
    }

    /// Create an injector on a validated graph, which must bind all its dependencies
    pub fn from_graph(graph: Arc<ResolvedGraph>) -> Result<Self> {
        Injector::builder().graph(graph).build()
    }

    pub fn graph(&self) -> &Arc<ResolvedGraph> {
        &self.core.graph
    }

    /// Obtain the instance bound to ```T```
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.get_by_key(TypeKey::of::<T>())
    }

    /// Obtain the instance bound to ```T``` annotated with ```Tag```
    pub fn get_annotated<Tag: ?Sized + 'static, T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Arc<T>> {
        self.get_by_key(TypeKey::annotated::<Tag, T>())
    }

    pub fn get_by_key<T: ?Sized + Send + Sync + 'static>(&self, key: TypeKey) -> Result<Arc<T>> {
        check_type::<T>(key)?;
        let instance = self.core.resolve(key)?;
        instance.downcast::<T>().ok_or_else(|| WiringError::TypeMismatch {
            key: key.to_string(),
            expected: TypeKey::of::<T>().to_string(),
        })
    }

    /// Obtain a provider for ```T``` without constructing anything
    pub fn provider<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Provider<T>> {
        self.provider_for(TypeKey::of::<T>())
    }

    pub fn annotated_provider<Tag: ?Sized + 'static, T: ?Sized + Send + Sync + 'static>(
        &self,
    ) -> Result<Provider<T>> {
        self.provider_for(TypeKey::annotated::<Tag, T>())
    }

    pub fn provider_for<T: ?Sized + Send + Sync + 'static>(&self, key: TypeKey) -> Result<Provider<T>> {
        check_type::<T>(key)?;
        Ok(self.erased_provider(key)?.typed())
    }

    fn erased_provider(&self, key: TypeKey) -> Result<ErasedProvider> {
        if !self.core.graph.contains(&key) {
            return Err(WiringError::TypeNotProvided {
                requested: key.to_string(),
                required_by: None,
            });
        }
        Ok(self.core.provider(key))
    }

    /// Untyped lookup of a type expression, after validating its shape
    pub fn lookup(&self, expr: &TypeExpr) -> Result<Resolved> {
        let dep = expr.normalize()?;
        match dep.indirection {
            Indirection::Provider => self.erased_provider(dep.key).map(Resolved::Provider),
            Indirection::Value | Indirection::Reference => self
                .core
                .resolve(dep.key)
                .map(|instance| Resolved::Instance(dep.key, instance)),
        }
    }

    /// All contributions to the multibinding set of ```T```, in registration order
    pub fn multibindings<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        self.multibindings_for(TypeKey::of::<T>())
    }

    pub fn multibindings_for<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: TypeKey,
    ) -> Result<Vec<Arc<T>>> {
        check_type::<T>(key)?;
        self.core
            .resolve_multibindings(key)?
            .iter()
            .map(|instance| {
                instance.downcast::<T>().ok_or_else(|| WiringError::TypeMismatch {
                    key: key.to_string(),
                    expected: TypeKey::of::<T>().to_string(),
                })
            })
            .collect()
    }

    /// Construct every bound key and multibinding set now instead of on first use
    pub fn eager_init(&self) -> Result<()> {
        let graph = &self.core.graph;
        for key in graph.keys() {
            self.core.resolve(key)?;
        }
        for key in graph.multibinding_keys() {
            self.core.resolve_multibindings(key)?;
        }
        debug!("Eagerly constructed all bindings");
        Ok(())
    }

    /// Check if the instance of a key is available without construction: built, shared or bound
    /// as an instance
    pub fn is_constructed(&self, key: &TypeKey) -> bool {
        self.core.is_ready(key)
    }
}

fn check_type<T: ?Sized + 'static>(key: TypeKey) -> Result<()> {
    if key.type_id() != TypeId::of::<T>() {
        return Err(WiringError::TypeMismatch {
            key: key.to_string(),
            expected: TypeKey::of::<T>().to_string(),
        });
    }
    Ok(())
}

/// Assemble an injector from normalized components, validated graphs and extra bindings
#[derive(Default)]
pub struct InjectorBuilder {
    base: Option<Arc<ResolvedGraph>>,
    graphs: Vec<Arc<ResolvedGraph>>,
    shared: Vec<(TypeKey, Instance)>,
    specs: Vec<BindingSpec>,
}

impl InjectorBuilder {
    /// Reuse the graph and the prebuilt instances of a normalized component
    pub fn normalized(mut self, component: &NormalizedComponent) -> Self {
        self.shared.extend(component.prebuilt().iter().cloned());
        self.graph(component.graph().clone())
    }

    /// The first graph is shared as is, the next ones are merged on top of it
    pub fn graph(mut self, graph: Arc<ResolvedGraph>) -> Self {
        if self.base.is_none() {
            self.base = Some(graph);
        } else {
            self.graphs.push(graph);
        }
        self
    }

    pub fn install(mut self, specs: impl IntoIterator<Item = BindingSpec>) -> Self {
        self.specs.extend(specs);
        self
    }

    pub fn build(self) -> Result<Injector> {
        // layers shared with the base or an earlier graph are merged only once
        let mut seen = self
            .base
            .as_ref()
            .map(|base| base.layer_ids())
            .unwrap_or_default();
        let mut specs: Vec<BindingSpec> = Vec::new();
        for graph in &self.graphs {
            specs.extend(graph.specs_excluding(&mut seen));
        }
        specs.extend(self.specs);
        let graph = match self.base {
            Some(base) if specs.is_empty() => base,
            base => Arc::new(GraphBuilder::merge(base.as_ref(), specs)?),
        };
        graph.check_complete()?;
        debug!(
            bindings = graph.keys().len(),
            shared = self.shared.len(),
            "Created injector"
        );
        Ok(Injector {
            core: Core::new(graph, self.shared),
        })
    }
}
