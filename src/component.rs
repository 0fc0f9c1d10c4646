use std::sync::Arc;

use crate::resolve::{Callable, Injectable, Params};
use crate::*;

/// A named bundle of binding specs, kept in registration order
#[derive(Clone, Debug, Default)]
pub struct Component {
    name: String,
    specs: Vec<BindingSpec>,
}

impl Component {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            specs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn specs(&self) -> &[BindingSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn add(mut self, spec: BindingSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Bind ```T``` to its designated injection constructor
    pub fn register<T: Injectable>(self) -> Self {
        self.add(BindingSpec::constructor::<T>())
    }

    pub fn register_annotated<Tag: ?Sized + 'static, T: Injectable>(self) -> Self {
        self.add(BindingSpec::annotated_constructor::<Tag, T>())
    }

    pub fn bind<I, C>(self) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: ?Sized + Implements<I> + Send + Sync + 'static,
    {
        self.add(BindingSpec::bind::<I, C>())
    }

    pub fn bind_instance<T: ?Sized + Send + Sync + 'static>(self, value: Arc<T>) -> Self {
        self.add(BindingSpec::instance(value))
    }

    pub fn provider<T, A, F>(self, f: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        A: Params,
        F: Callable<A, Arc<T>> + Send + Sync + 'static,
    {
        self.add(BindingSpec::provider(f))
    }

    pub fn try_provider<T, A, E, F>(self, f: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        A: Params,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
        F: Callable<A, std::result::Result<Arc<T>, E>> + Send + Sync + 'static,
    {
        self.add(BindingSpec::try_provider(f))
    }

    /// Add the instance bound to ```C``` to the set of ```I```
    pub fn add_multibinding<I, C>(self) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: ?Sized + Implements<I> + Send + Sync + 'static,
    {
        self.add(BindingSpec::multibinding(
            TypeKey::of::<I>(),
            vec![Contribution::forward::<I, C>()],
        ))
    }

    pub fn add_instance_multibinding<T: ?Sized + Send + Sync + 'static>(self, value: Arc<T>) -> Self {
        self.add(BindingSpec::multibinding(
            TypeKey::of::<T>(),
            vec![Contribution::instance(value)],
        ))
    }

    pub fn add_multibinding_provider<T, A, F>(self, f: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        A: Params,
        F: Callable<A, Arc<T>> + Send + Sync + 'static,
    {
        self.add(BindingSpec::multibinding(
            TypeKey::of::<T>(),
            vec![Contribution::Constructed(Factory::function(f))],
        ))
    }

    /// Append all the specs of another component
    pub fn install(mut self, other: Component) -> Self {
        self.specs.extend(other.specs);
        self
    }
}

impl IntoIterator for Component {
    type Item = BindingSpec;
    type IntoIter = std::vec::IntoIter<BindingSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.specs.into_iter()
    }
}
