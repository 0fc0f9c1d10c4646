//! Binding lookup keys and requested-type expressions.
//!
//! A [TypeKey] combines the identity of a type with an optional annotation tag. Two keys sharing
//! the same underlying type but carrying different annotations are unrelated for every graph
//! operation.
//!
//! A [TypeExpr] describes a type as written by the binding front end (possibly wrapped in a
//! pointer, a provider or an annotation). [TypeExpr::normalize] turns it into a [Dependency]:
//! the key to resolve and the way it is handed over.

use std::any::{type_name, TypeId};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::WiringError;

/// Nominal annotation tag, identified by the type used as tag
#[derive(Clone, Copy)]
pub struct Annotation {
    id: TypeId,
    name: &'static str,
}

impl Annotation {
    pub fn of<Tag: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<Tag>(),
            name: type_name::<Tag>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for Annotation {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Annotation {}

impl Hash for Annotation {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Annotation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Annotation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Debug for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Unit of binding lookup: a type identity and an optional annotation.
///
/// Equality, hashing and ordering ignore the type name, which is only kept for diagnostics.
#[derive(Clone, Copy)]
pub struct TypeKey {
    type_id: TypeId,
    type_name: &'static str,
    annotation: Option<Annotation>,
}

impl TypeKey {
    /// Key of the non-annotated type `T`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            annotation: None,
        }
    }

    /// Key of `T` annotated with `Tag`
    pub fn annotated<Tag: ?Sized + 'static, T: ?Sized + 'static>() -> Self {
        Self::of::<T>().with_annotation(Annotation::of::<Tag>())
    }

    pub fn with_annotation(self, annotation: Annotation) -> Self {
        Self {
            annotation: Some(annotation),
            ..self
        }
    }

    /// Same underlying type, annotation removed
    pub fn unannotated(self) -> Self {
        Self {
            annotation: None,
            ..self
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn annotation(&self) -> Option<Annotation> {
        self.annotation
    }

    pub fn is_annotated(&self) -> bool {
        self.annotation.is_some()
    }

    /// Check if both keys share the same underlying type, regardless of annotations
    pub fn same_type(&self, other: &TypeKey) -> bool {
        self.type_id == other.type_id
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.annotation == other.annotation
    }
}

impl Eq for TypeKey {}

impl Hash for TypeKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
        self.annotation.hash(state);
    }
}

impl PartialOrd for TypeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TypeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.type_id
            .cmp(&other.type_id)
            .then_with(|| self.annotation.cmp(&other.annotation))
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.annotation {
            None => f.write_str(self.type_name),
            Some(a) => write!(f, "Annotated<{}, {}>", a, self.type_name),
        }
    }
}

/// How a resolved dependency is handed to the factory needing it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indirection {
    /// The shared instance itself
    Value,
    /// A non-owning handle on the shared instance
    Reference,
    /// A deferred [crate::Provider], nothing is constructed upfront
    Provider,
}

/// A normalized dependency: the key to resolve and its indirection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub key: TypeKey,
    pub indirection: Indirection,
}

impl Dependency {
    pub fn value(key: TypeKey) -> Self {
        Self {
            key,
            indirection: Indirection::Value,
        }
    }

    pub fn provider(key: TypeKey) -> Self {
        Self {
            key,
            indirection: Indirection::Provider,
        }
    }

    /// Provider edges defer construction and never take part in value cycles
    pub fn is_deferred(&self) -> bool {
        self.indirection == Indirection::Provider
    }
}

/// A requested type, as spelled by the binding front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Type(TypeKey),
    Pointer(Box<TypeExpr>),
    Annotated(Annotation, Box<TypeExpr>),
    Provider(Box<TypeExpr>),
}

impl TypeExpr {
    pub fn of<T: ?Sized + 'static>() -> Self {
        TypeExpr::Type(TypeKey::of::<T>())
    }

    /// Spell out an existing key, moving its annotation to the outside
    pub fn key(key: TypeKey) -> Self {
        match key.annotation() {
            None => TypeExpr::Type(key),
            Some(a) => TypeExpr::Annotated(a, Box::new(TypeExpr::Type(key.unannotated()))),
        }
    }

    pub fn pointer(self) -> Self {
        TypeExpr::Pointer(Box::new(self))
    }

    pub fn provider(self) -> Self {
        TypeExpr::Provider(Box::new(self))
    }

    pub fn annotate(self, annotation: Annotation) -> Self {
        TypeExpr::Annotated(annotation, Box::new(self))
    }

    /// Innermost type, without wrappers or annotations
    pub fn underlying(&self) -> TypeKey {
        match self {
            TypeExpr::Type(k) => k.unannotated(),
            TypeExpr::Pointer(e) | TypeExpr::Annotated(_, e) | TypeExpr::Provider(e) => {
                e.underlying()
            }
        }
    }

    fn contains_annotation(&self) -> bool {
        match self {
            TypeExpr::Type(k) => k.is_annotated(),
            TypeExpr::Annotated(..) => true,
            TypeExpr::Pointer(e) | TypeExpr::Provider(e) => e.contains_annotation(),
        }
    }

    fn without_annotations(&self) -> TypeExpr {
        match self {
            TypeExpr::Type(k) => TypeExpr::Type(k.unannotated()),
            TypeExpr::Annotated(_, e) => e.without_annotations(),
            TypeExpr::Pointer(e) => e.without_annotations().pointer(),
            TypeExpr::Provider(e) => e.without_annotations().provider(),
        }
    }

    fn annotated_type_error(&self) -> WiringError {
        WiringError::AnnotatedType {
            given: self.to_string(),
            expected: self.without_annotations().to_string(),
        }
    }

    /// Validate the shape of this expression and extract the dependency it denotes.
    ///
    /// Annotations must wrap pointers and providers, not the other way around, and
    /// providers only accept a plain type.
    pub fn normalize(&self) -> Result<Dependency, WiringError> {
        match self {
            TypeExpr::Type(key) => Ok(Dependency::value(*key)),
            TypeExpr::Pointer(inner) => match inner.as_ref() {
                TypeExpr::Type(key) if !key.is_annotated() => Ok(Dependency {
                    key: *key,
                    indirection: Indirection::Reference,
                }),
                TypeExpr::Pointer(_) => Err(WiringError::TypeNotProvided {
                    requested: self.to_string(),
                    required_by: None,
                }),
                TypeExpr::Provider(_) => Err(WiringError::NonClassType {
                    given: self.to_string(),
                    expected: inner.to_string(),
                }),
                _ => Err(inner.annotated_type_error()),
            },
            TypeExpr::Annotated(annotation, inner) => {
                if inner.contains_annotation() {
                    return Err(inner.annotated_type_error());
                }
                let dep = inner.normalize()?;
                Ok(Dependency {
                    key: dep.key.with_annotation(*annotation),
                    ..dep
                })
            }
            TypeExpr::Provider(inner) => match inner.as_ref() {
                TypeExpr::Type(key) if !key.is_annotated() => Ok(Dependency::provider(*key)),
                TypeExpr::Pointer(target) | TypeExpr::Provider(target)
                    if !target.contains_annotation() =>
                {
                    Err(WiringError::NonClassType {
                        given: inner.to_string(),
                        expected: TypeExpr::Type(inner.underlying()).to_string(),
                    })
                }
                _ => Err(inner.annotated_type_error()),
            },
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Type(k) => write!(f, "{}", k),
            TypeExpr::Pointer(e) => write!(f, "{}*", e),
            TypeExpr::Annotated(a, e) => write!(f, "Annotated<{}, {}>", a, e),
            TypeExpr::Provider(e) => write!(f, "Provider<{}>", e),
        }
    }
}
