use thiserror::Error;

/// Errors triggered while validating a binding graph or resolving instances from it
#[derive(Error, Debug)]
pub enum WiringError {
    #[error("{interface} is not a base of {implementation}: the implementation cannot be bound to it")]
    NotABaseClassOf {
        interface: String,
        implementation: String,
    },
    #[error("the type {0} was bound to itself")]
    InterfaceBindingToSelf(String),
    #[error("conflicting bindings registered for {0}")]
    DuplicateBinding(String),
    #[error("dependency cycle not broken by a provider: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),
    #[error("trying to get an instance of {requested}, but it is not provided by this injector{}", required_by_suffix(.required_by))]
    TypeNotProvided {
        requested: String,
        required_by: Option<String>,
    },
    #[error("a non-class type {given} was specified, use {expected} instead")]
    NonClassType { given: String, expected: String },
    #[error("an annotated type {given} was specified where a non-annotated type was expected, use {expected} instead")]
    AnnotatedType { given: String, expected: String },
    #[error("cyclic resolution: {0} was requested while it is still being constructed")]
    CyclicResolution(String),
    #[error("the value bound to {key} is not an instance of {expected}")]
    TypeMismatch { key: String, expected: String },
    #[error("the injector providing {0} has already been dropped")]
    InjectorDropped(String),
    #[error("{key} cannot be constructed ahead of time: {reason}")]
    NotPrebuildable { key: String, reason: String },
    #[error("the provider function for {key} failed")]
    Factory {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

fn required_by_suffix(required_by: &Option<String>) -> String {
    match required_by {
        Some(dependent) => format!(" (required by {})", dependent),
        None => String::new(),
    }
}

pub type Result<T, E = WiringError> = std::result::Result<T, E>;
