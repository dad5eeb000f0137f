//! Axon object model core
//!
//! A runtime type system for composing dynamic object graphs:
//! - Type registry with dynamic registration and lazy class resolution
//! - Single inheritance plus interface implementations per type
//! - Reference-counted instances with init/post-init/finalize hooks
//! - Ordered per-instance property tables with typed accessors
//! - Canonical-path object tree with child and link edges
//!
//! The registry is the entry point: register types, resolve classes,
//! instantiate objects, and resolve paths through it. Property values
//! cross the API boundary as [`serde_json::Value`], which management
//! layers can forward verbatim.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod class;
pub mod object;
pub mod path;
pub mod property;
pub mod registry;

pub use class::{
    class_dynamic_cast, class_dynamic_cast_assert, ClassData, ClassInitFn, ClassKind, ClassMethod,
    ObjectClass,
};
pub use object::{InstanceFn, Object};
pub use property::{
    LinkCheck, LinkPolicy, Property, PropertyGetter, PropertyInfo, PropertyRelease, PropertySetter,
};
pub use registry::{
    Registry, TypeImpl, TypeInfo, TypeListEntry, MAX_INTERFACES, TYPE_CONTAINER, TYPE_INTERFACE,
    TYPE_OBJECT,
};

/// Errors surfaced to management-layer callers.
///
/// Type-system misuse (duplicate type registration, instantiating an
/// abstract type, re-parenting an owned child) is a programmer error and
/// panics instead of returning one of these.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectError {
    /// No property with the given name on the object
    #[error("Property '{0}' not found")]
    PropertyNotFound(String),

    /// The property exists but does not support the requested access
    #[error("Property '{name}' is not {access}")]
    PermissionDenied {
        /// Property name
        name: String,
        /// The missing capability, `"readable"` or `"writable"`
        access: &'static str,
    },

    /// A wire value did not match the property's native representation
    #[error("Type mismatch for property '{name}': expected {expected}")]
    TypeMismatch {
        /// Property name
        name: String,
        /// Human-readable description of the expected representation
        expected: String,
    },

    /// A native value could not be encoded as a wire value
    #[error("Cannot encode property '{0}' as a wire value")]
    Encode(String),

    /// No object exists at the given path
    #[error("No object at path '{0}'")]
    PathNotFound(String),

    /// A partial path matched more than one object
    #[error("Path '{0}' is ambiguous")]
    AmbiguousPath(String),

    /// A property with this name already exists on the object
    #[error("Duplicate property name '{0}'")]
    DuplicateProperty(String),

    /// The type name is not registered
    #[error("Unknown type '{0}'")]
    UnknownType(String),

    /// The type is abstract and cannot be instantiated from the wire
    #[error("Type '{0}' is abstract")]
    AbstractType(String),

    /// A link target resolved to an object of the wrong type
    #[error("Object at '{path}' is not a '{expected}'")]
    WrongType {
        /// The path that resolved to the offending object
        path: String,
        /// The declared target type of the link
        expected: String,
    },

    /// No class method with the given name
    #[error("No method '{0}' on type '{1}'")]
    MethodNotFound(String, String),

    /// Operation rejected because a feature is compiled out or disabled
    #[error("Feature '{0}' is disabled")]
    FeatureDisabled(String),
}

/// Result alias used throughout the object model.
pub type ObjectResult<T> = Result<T, ObjectError>;
