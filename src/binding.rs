//! Binding descriptors consumed by the [crate::GraphBuilder]
//!
//! A [BindingSpec] tells how the value of a [TypeKey] is obtained: by calling a designated
//! constructor, by forwarding to an implementation, from an instance built by the caller,
//! through a provider function, or by accumulating a multibinding set.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::resolve::{Args, Callable, Injectable, Params};
use crate::*;

/// Type-erased handle on a shared `Arc<T>`, where `T` may be a trait object
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    addr: usize,
    ty: TypeKey,
}

impl Instance {
    pub fn new<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        let addr = Arc::as_ptr(&value) as *const () as usize;
        Self {
            value: Arc::new(value),
            addr,
            ty: TypeKey::of::<T>(),
        }
    }

    /// Recover the typed handle if this instance holds a `T`
    pub fn downcast<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.value.downcast_ref::<Arc<T>>().cloned()
    }

    /// Underlying type of the wrapped value
    pub fn type_key(&self) -> TypeKey {
        self.ty
    }

    /// Check if both handles point to the same object
    pub fn same_object(&self, other: &Instance) -> bool {
        self.addr == other.addr && self.ty == other.ty
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instance<{}>@{:#x}", self.ty, self.addr)
    }
}

/// Subtyping capability: a shared `Self` can be viewed as a shared `I`.
///
/// Every type implements it for itself; implementations for trait objects are
/// declared with the [implements!](crate::implements) macro.
pub trait Implements<I: ?Sized> {
    fn upcast(self: Arc<Self>) -> Arc<I>;
}

impl<T: ?Sized> Implements<T> for T {
    fn upcast(self: Arc<Self>) -> Arc<T> {
        self
    }
}

/// Declare that a concrete type can be bound to one or more trait objects.
///
/// ```
/// # use wiring::implements;
/// trait Greeter: Send + Sync {}
/// struct Hello;
/// impl Greeter for Hello {}
///
/// implements!(Hello => dyn Greeter);
/// ```
#[macro_export]
macro_rules! implements {
    ($Concrete:ty => $($Interface:ty),+ $(,)?) => {
        $(
        impl $crate::Implements<$Interface> for $Concrete {
            fn upcast(self: ::std::sync::Arc<Self>) -> ::std::sync::Arc<$Interface> {
                self
            }
        }
        )+
    };
}

type CastFn = Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>;

/// Proof that an implementation type can be forwarded to an interface type
#[derive(Clone)]
pub struct Upcast {
    from: TypeKey,
    to: TypeKey,
    cast: CastFn,
}

impl Upcast {
    pub fn of<I, C>() -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: ?Sized + Implements<I> + Send + Sync + 'static,
    {
        Self {
            from: TypeKey::of::<C>(),
            to: TypeKey::of::<I>(),
            cast: Arc::new(|instance: &Instance| {
                instance
                    .downcast::<C>()
                    .map(|concrete| Instance::new(<C as Implements<I>>::upcast(concrete)))
            }),
        }
    }

    /// Check that this proof relates the underlying types of both keys
    pub(crate) fn relates(&self, interface: &TypeKey, implementation: &TypeKey) -> bool {
        self.to.same_type(interface) && self.from.same_type(implementation)
    }

    pub(crate) fn apply(&self, key: TypeKey, instance: &Instance) -> Result<Instance> {
        (self.cast)(instance).ok_or_else(|| WiringError::TypeMismatch {
            key: key.to_string(),
            expected: self.from.to_string(),
        })
    }
}

impl fmt::Debug for Upcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Upcast<{} => {}>", self.from, self.to)
    }
}

pub(crate) type FactoryFn = Arc<dyn Fn(&mut Args) -> Result<Instance> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Origin {
    Constructor(TypeId),
    Function,
}

/// Type-erased factory: the parameters it requests and how to call it
#[derive(Clone)]
pub struct Factory {
    origin: Origin,
    produces: TypeKey,
    requests: Vec<TypeExpr>,
    call: FactoryFn,
}

impl Factory {
    /// Designated injection constructor of `T`
    pub fn constructor<T: Injectable>() -> Self {
        Self {
            origin: Origin::Constructor(TypeId::of::<T>()),
            produces: TypeKey::of::<T>(),
            requests: T::Deps::requests(),
            call: Arc::new(|args: &mut Args| {
                let deps = T::Deps::extract(args)?;
                Ok(Instance::new(Arc::new(T::inject(deps))))
            }),
        }
    }

    /// Provider function with injected parameters
    pub fn function<T, A, F>(f: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        A: Params,
        F: Callable<A, Arc<T>> + Send + Sync + 'static,
    {
        Self {
            origin: Origin::Function,
            produces: TypeKey::of::<T>(),
            requests: A::requests(),
            call: Arc::new(move |args: &mut Args| {
                let params = A::extract(args)?;
                Ok(Instance::new(f.call(params)))
            }),
        }
    }

    /// Provider function with injected parameters which may fail
    pub fn fallible<T, A, E, F>(f: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        A: Params,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
        F: Callable<A, std::result::Result<Arc<T>, E>> + Send + Sync + 'static,
    {
        Self {
            origin: Origin::Function,
            produces: TypeKey::of::<T>(),
            requests: A::requests(),
            call: Arc::new(move |args: &mut Args| {
                let key = args.key();
                let params = A::extract(args)?;
                f.call(params)
                    .map(Instance::new)
                    .map_err(|e| WiringError::Factory {
                        key: key.to_string(),
                        source: e.into(),
                    })
            }),
        }
    }

    pub fn requests(&self) -> &[TypeExpr] {
        &self.requests
    }

    pub fn produces(&self) -> TypeKey {
        self.produces
    }

    pub(crate) fn call(&self) -> &FactoryFn {
        &self.call
    }

    /// Two designated constructors of the same type, or two handles on the same function
    pub(crate) fn same_as(&self, other: &Factory) -> bool {
        match (self.origin, other.origin) {
            (Origin::Constructor(a), Origin::Constructor(b)) => a == b,
            (Origin::Function, Origin::Function) => Arc::ptr_eq(&self.call, &other.call),
            _ => false,
        }
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("origin", &self.origin)
            .field("produces", &self.produces)
            .field("requests", &self.requests)
            .finish()
    }
}

/// One element of a multibinding set
#[derive(Clone, Debug)]
pub enum Contribution {
    Constructed(Factory),
    Instance(Instance),
    Forwarded {
        implementation: TypeKey,
        upcast: Upcast,
    },
}

impl Contribution {
    pub fn constructor<T: Injectable>() -> Self {
        Contribution::Constructed(Factory::constructor::<T>())
    }

    pub fn instance<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        Contribution::Instance(Instance::new(value))
    }

    /// Reuse the instance bound to `C` as an element of a set of `I`
    pub fn forward<I, C>() -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: ?Sized + Implements<I> + Send + Sync + 'static,
    {
        Contribution::Forwarded {
            implementation: TypeKey::of::<C>(),
            upcast: Upcast::of::<I, C>(),
        }
    }
}

/// A rule describing how to produce the value of a key
#[derive(Clone, Debug)]
pub enum BindingSpec {
    Constructor {
        key: TypeKey,
        factory: Factory,
    },
    Interface {
        interface: TypeKey,
        implementation: TypeKey,
        upcast: Option<Upcast>,
    },
    /// Instance built by the caller: the injector shares it but never owns its lifetime
    Instance { key: TypeKey, instance: Instance },
    ProviderFunction {
        key: TypeKey,
        factory: Factory,
    },
    Multi {
        key: TypeKey,
        contributions: Vec<Contribution>,
    },
}

impl BindingSpec {
    pub fn constructor<T: Injectable>() -> Self {
        BindingSpec::Constructor {
            key: TypeKey::of::<T>(),
            factory: Factory::constructor::<T>(),
        }
    }

    pub fn annotated_constructor<Tag: ?Sized + 'static, T: Injectable>() -> Self {
        BindingSpec::Constructor {
            key: TypeKey::annotated::<Tag, T>(),
            factory: Factory::constructor::<T>(),
        }
    }

    /// Forward the interface `I` to the implementation `C`
    pub fn bind<I, C>() -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: ?Sized + Implements<I> + Send + Sync + 'static,
    {
        Self::bind_annotated::<I, C>(TypeKey::of::<I>(), TypeKey::of::<C>())
    }

    /// Forward between (possibly annotated) keys of `I` and `C`
    pub fn bind_annotated<I, C>(interface: TypeKey, implementation: TypeKey) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
        C: ?Sized + Implements<I> + Send + Sync + 'static,
    {
        BindingSpec::Interface {
            interface,
            implementation,
            upcast: Some(Upcast::of::<I, C>()),
        }
    }

    /// Forward between raw keys, without any subtyping proof
    pub fn bind_keys(interface: TypeKey, implementation: TypeKey) -> Self {
        BindingSpec::Interface {
            interface,
            implementation,
            upcast: None,
        }
    }

    pub fn instance<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> Self {
        BindingSpec::Instance {
            key: TypeKey::of::<T>(),
            instance: Instance::new(value),
        }
    }

    pub fn annotated_instance<Tag: ?Sized + 'static, T: ?Sized + Send + Sync + 'static>(
        value: Arc<T>,
    ) -> Self {
        BindingSpec::Instance {
            key: TypeKey::annotated::<Tag, T>(),
            instance: Instance::new(value),
        }
    }

    pub fn provider<T, A, F>(f: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        A: Params,
        F: Callable<A, Arc<T>> + Send + Sync + 'static,
    {
        BindingSpec::ProviderFunction {
            key: TypeKey::of::<T>(),
            factory: Factory::function(f),
        }
    }

    pub fn try_provider<T, A, E, F>(f: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        A: Params,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
        F: Callable<A, std::result::Result<Arc<T>, E>> + Send + Sync + 'static,
    {
        BindingSpec::ProviderFunction {
            key: TypeKey::of::<T>(),
            factory: Factory::fallible(f),
        }
    }

    pub fn multibinding(key: TypeKey, contributions: Vec<Contribution>) -> Self {
        BindingSpec::Multi { key, contributions }
    }

    /// The key this spec provides
    pub fn key(&self) -> TypeKey {
        match self {
            BindingSpec::Constructor { key, .. }
            | BindingSpec::Instance { key, .. }
            | BindingSpec::ProviderFunction { key, .. }
            | BindingSpec::Multi { key, .. } => *key,
            BindingSpec::Interface { interface, .. } => *interface,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BindingSpec::Constructor { .. } => "constructor",
            BindingSpec::Interface { .. } => "interface",
            BindingSpec::Instance { .. } => "instance",
            BindingSpec::ProviderFunction { .. } => "provider function",
            BindingSpec::Multi { .. } => "multibinding",
        }
    }
}
