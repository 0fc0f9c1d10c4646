//! Typed parameters of constructors and provider functions
//!
//! The dependencies of a factory are described by its parameter types:
//!
//! * ```Arc<T>``` requests the shared instance bound to ```T```;
//! * ```Provider<T>``` requests a deferred handle, nothing is constructed until it is used;
//! * ```Annotated<Tag, P>``` moves the request of ```P``` to the key annotated with ```Tag```.
//!
//! The [Params] trait is implemented for tuples of up to 10 parameters, and the [Callable]
//! trait for all functions taking such parameters, so that plain closures can be used as
//! provider functions.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use crate::provider::ErasedProvider;
use crate::*;

/// A dependency after resolution, ready to be handed to a factory
#[derive(Clone, Debug)]
pub enum Resolved {
    Instance(TypeKey, Instance),
    Provider(ErasedProvider),
}

impl Resolved {
    pub fn key(&self) -> TypeKey {
        match self {
            Resolved::Instance(key, _) => *key,
            Resolved::Provider(p) => p.key(),
        }
    }
}

/// Resolved dependencies of a factory, consumed in declaration order
pub struct Args {
    key: TypeKey,
    values: std::vec::IntoIter<Resolved>,
}

impl Args {
    pub(crate) fn new(key: TypeKey, values: Vec<Resolved>) -> Self {
        Self {
            key,
            values: values.into_iter(),
        }
    }

    /// Key of the value under construction
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Take the next resolved dependency as a typed parameter
    pub fn next<P: Param>(&mut self) -> Result<P> {
        match self.values.next() {
            Some(resolved) => P::extract(resolved),
            None => Err(WiringError::TypeMismatch {
                key: self.key.to_string(),
                expected: P::request().to_string(),
            }),
        }
    }
}

/// A single injectable parameter type
pub trait Param: Sized + 'static {
    /// The requested type, as seen by the graph builder
    fn request() -> TypeExpr;

    fn extract(resolved: Resolved) -> Result<Self>;
}

/// An ordered list of injectable parameters
pub trait Params: Sized + 'static {
    fn requests() -> Vec<TypeExpr>;

    fn extract(args: &mut Args) -> Result<Self>;
}

/// A type with a designated injection constructor
pub trait Injectable: Send + Sync + Sized + 'static {
    type Deps: Params;

    fn inject(deps: Self::Deps) -> Self;
}

fn mismatch<P: Param>(key: TypeKey) -> WiringError {
    WiringError::TypeMismatch {
        key: key.to_string(),
        expected: P::request().to_string(),
    }
}

impl<T: ?Sized + Send + Sync + 'static> Param for Arc<T> {
    fn request() -> TypeExpr {
        TypeExpr::of::<T>()
    }

    fn extract(resolved: Resolved) -> Result<Self> {
        match resolved {
            Resolved::Instance(key, instance) => {
                instance.downcast::<T>().ok_or_else(|| mismatch::<Self>(key))
            }
            Resolved::Provider(p) => Err(mismatch::<Self>(p.key())),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Param for Provider<T> {
    fn request() -> TypeExpr {
        TypeExpr::of::<T>().provider()
    }

    fn extract(resolved: Resolved) -> Result<Self> {
        match resolved {
            Resolved::Provider(p) => Ok(p.typed()),
            Resolved::Instance(key, _) => Err(mismatch::<Self>(key)),
        }
    }
}

/// A parameter resolved through the key annotated with ```Tag```
pub struct Annotated<Tag: ?Sized, P> {
    value: P,
    _tag: PhantomData<fn() -> Box<Tag>>,
}

impl<Tag: ?Sized, P> Annotated<Tag, P> {
    pub fn new(value: P) -> Self {
        Self {
            value,
            _tag: PhantomData,
        }
    }

    pub fn into_inner(self) -> P {
        self.value
    }
}

impl<Tag: ?Sized, P> Deref for Annotated<Tag, P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.value
    }
}

impl<Tag: ?Sized, P: Clone> Clone for Annotated<Tag, P> {
    fn clone(&self) -> Self {
        Self::new(self.value.clone())
    }
}

impl<Tag: ?Sized, P: fmt::Debug> fmt::Debug for Annotated<Tag, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Annotated").field(&self.value).finish()
    }
}

impl<Tag: ?Sized + 'static, P: Param> Param for Annotated<Tag, P> {
    fn request() -> TypeExpr {
        P::request().annotate(Annotation::of::<Tag>())
    }

    fn extract(resolved: Resolved) -> Result<Self> {
        P::extract(resolved).map(Self::new)
    }
}

/*
 * The following is used to inject up to 10 parameters into any function
 * inspired by https://nickbryan.co.uk/software/using-a-type-map-for-dependency-injection-in-rust/
 */

/// A Callable has a ```call``` function with a single argument and a single return type.
///
/// This trait is implemented for all functions with up to 10 arguments, using a tuple to
/// wrap them all in a single type.
pub trait Callable<In, Ret> {
    fn call(&self, args: In) -> Ret;
}

macro_rules! callable_tuple ({ $($param:ident)* } => {
    impl<Func, Ret, $($param,)*> Callable<($($param,)*), Ret> for Func
    where
        Func: Fn($($param),*) -> Ret,
    {
        #[inline]
        #[allow(non_snake_case)]
        fn call(&self, ($($param,)*): ($($param,)*)) -> Ret {
            (self)($($param,)*)
        }
    }

    // Requests and extraction for a tuple of parameter types
    #[allow(clippy::unused_unit)]
    impl<$($param: Param,)*> Params for ($($param,)*) {
        #[inline]
        fn requests() -> Vec<TypeExpr> {
            vec![$($param::request(),)*]
        }

        #[inline]
        fn extract(_args: &mut Args) -> Result<Self> {
            Ok(($(_args.next::<$param>()?,)*))
        }
    }
});

callable_tuple! {}
callable_tuple! { A }
callable_tuple! { A B }
callable_tuple! { A B C }
callable_tuple! { A B C D }
callable_tuple! { A B C D E }
callable_tuple! { A B C D E F }
callable_tuple! { A B C D E F G }
callable_tuple! { A B C D E F G H }
callable_tuple! { A B C D E F G H I }
callable_tuple! { A B C D E F G H I J }
