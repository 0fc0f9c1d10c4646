//! Dependency injection engine resolving graphs of bindings, with lazy construction through providers.
//!
//! # Simple use case
//!
//! ```
//! # use std::sync::Arc;
//! # use wiring::*;
//! // Define traits and implementors
//! trait MyTrait: Send + Sync {
//!     fn cheers(&self) -> String;
//! }
//!
//! struct MyImpl;
//!
//! impl MyTrait for MyImpl {
//!     fn cheers(&self) -> String {
//!         "Hello world".into()
//!     }
//! }
//!
//! impl Injectable for MyImpl {
//!     type Deps = ();
//!     fn inject(_: ()) -> Self {
//!         MyImpl
//!     }
//! }
//!
//! implements!(MyImpl => dyn MyTrait);
//!
//! # fn main() -> Result<(), WiringError> {
//! // Declare the bindings and create an injector using them
//! let component = Component::new("greetings")
//!     .register::<MyImpl>()
//!     .bind::<dyn MyTrait, MyImpl>();
//!
//! let injector = Injector::new(component)?;
//! let a: Arc<dyn MyTrait> = injector.get()?;
//! assert_eq!(a.cheers(), "Hello world");
//! # Ok(())
//! # }
//! ```
//!
//! # Mechanism
//!
//! Bindings are described by [BindingSpec] values, usually grouped in a [Component]. Each spec
//! provides the value of a [TypeKey], a type identity with an optional annotation tag.
//!
//! * The [GraphBuilder] validates specs and merges them into an immutable [ResolvedGraph]:
//!   duplicate keys, interfaces bound to themselves or to unrelated types and dependency cycles
//!   are rejected before anything gets constructed. Missing bindings are only reported when an
//!   injector is created, so that graphs can be completed incrementally.
//! * A [NormalizedComponent] caches a validated graph (and optionally some prebuilt instances)
//!   to share it between many injectors.
//! * The [Injector] owns the instances of a graph. Each key is constructed once, on first
//!   request, after its dependencies.
//! * A [Provider] is a deferred handle on a key. Factories taking a ```Provider<T>``` instead
//!   of an ```Arc<T>``` are constructed before ```T```, which is what makes cycles legal as
//!   long as one of their edges goes through a provider.
//!
//! The dependencies of a factory are derived from its parameter types: see [Param],
//! [Injectable] and [Annotated].

mod binding;
mod component;
mod error;
mod graph;
mod inject;
mod key;
mod normalized;
mod provider;
mod resolve;

pub use binding::{BindingSpec, Contribution, Factory, Implements, Instance, Upcast};
pub use component::Component;
pub use error::{Result, WiringError};
pub use graph::{BindingRegistry, GraphBuilder, ResolvedGraph};
pub use inject::{Injector, InjectorBuilder};
pub use key::{Annotation, Dependency, Indirection, TypeExpr, TypeKey};
pub use normalized::NormalizedComponent;
pub use provider::{ErasedProvider, Provider};
pub use resolve::{Annotated, Args, Callable, Injectable, Param, Params, Resolved};
