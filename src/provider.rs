use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use tracing::trace;

use crate::inject::Core;
use crate::*;

/// Untyped deferred handle on a key of an injector
#[derive(Clone)]
pub struct ErasedProvider {
    injector: Weak<Core>,
    key: TypeKey,
}

impl ErasedProvider {
    pub(crate) fn new(injector: Weak<Core>, key: TypeKey) -> Self {
        Self { injector, key }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Resolve the key through the owning injector
    pub fn get(&self) -> Result<Instance> {
        let core = self
            .injector
            .upgrade()
            .ok_or_else(|| WiringError::InjectorDropped(self.key.to_string()))?;
        trace!(key = %self.key, "Retrieving through provider");
        core.resolve(self.key)
    }

    pub fn typed<T: ?Sized + Send + Sync + 'static>(self) -> Provider<T> {
        Provider {
            inner: self,
            _target: PhantomData,
        }
    }
}

impl fmt::Debug for ErasedProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Provider<{}>", self.key)
    }
}

/// Deferred access to the instance bound to a key.
///
/// Obtaining a provider never constructs anything: the target is built by the first call to
/// [Provider::get], which goes through the same memoized path as [Injector::get]. The provider
/// owns neither its injector nor the target instance.
pub struct Provider<T: ?Sized> {
    inner: ErasedProvider,
    _target: PhantomData<fn() -> Arc<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> Provider<T> {
    pub fn key(&self) -> TypeKey {
        self.inner.key
    }

    /// Obtain the instance, constructing it on first use
    pub fn get(&self) -> Result<Arc<T>> {
        self.inner
            .get()?
            .downcast::<T>()
            .ok_or_else(|| WiringError::TypeMismatch {
                key: self.inner.key.to_string(),
                expected: TypeKey::of::<T>().to_string(),
            })
    }

    pub fn erased(&self) -> &ErasedProvider {
        &self.inner
    }
}

impl<T: ?Sized> Clone for Provider<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _target: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for Provider<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}
