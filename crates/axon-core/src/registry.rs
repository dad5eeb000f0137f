//! Type registry and descriptor table
//!
//! Types are registered once, up front, and never mutated or removed.
//! Registration is expected to happen single-threaded before concurrent
//! use begins; everything afterwards is read-only lookups plus lazy class
//! resolution (see [`crate::class`]).

use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::class::{self, class_dynamic_cast, ClassData, ClassInitFn, ObjectClass};
use crate::object::{InstanceFn, Object};
use crate::{ObjectError, ObjectResult};

/// Name of the abstract root type of the object hierarchy.
pub const TYPE_OBJECT: &str = "object";

/// Name of the abstract root type of the interface hierarchy.
pub const TYPE_INTERFACE: &str = "interface";

/// Name of the concrete type used for tree containers, including the root.
pub const TYPE_CONTAINER: &str = "container";

/// Upper bound on the interfaces one type may declare.
pub const MAX_INTERFACES: usize = 32;

/// Static description of one type, supplied at registration.
///
/// Hooks are shared across all instances of the type: class hooks run
/// against the class record while it is being resolved, instance hooks
/// run against each instance as it is built and torn down.
#[derive(Default)]
pub struct TypeInfo {
    /// Unique type name.
    pub name: String,
    /// Parent type name; `None` is only legal for the two bootstrap roots.
    pub parent: Option<String>,
    /// Abstract types cannot be instantiated.
    pub abstract_: bool,
    /// Names of the interface types this type implements.
    pub interfaces: Vec<String>,
    /// Runs on the class record after every ancestor initializer.
    pub class_init: Option<ClassInitFn>,
    /// Runs on every descendant's class record before that descendant's
    /// own `class_init`.
    pub class_base_init: Option<ClassInitFn>,
    /// Opaque payload forwarded to `class_init` and `class_base_init`.
    pub class_data: Option<ClassData>,
    /// Runs on a fresh instance, ancestors first.
    pub instance_init: Option<InstanceFn>,
    /// Runs after all `instance_init` hooks, most-derived type first.
    pub instance_post_init: Option<InstanceFn>,
    /// Runs at teardown, most-derived type first.
    pub instance_finalize: Option<InstanceFn>,
}

/// A registered type.
///
/// Immutable after registration; the resolved class record is memoized on
/// first use and lives as long as the type does.
pub struct TypeImpl {
    name: String,
    parent_name: Option<String>,
    abstract_: bool,
    interfaces: Vec<String>,
    class_init: Option<ClassInitFn>,
    class_base_init: Option<ClassInitFn>,
    class_data: Option<ClassData>,
    instance_init: Option<InstanceFn>,
    instance_post_init: Option<InstanceFn>,
    instance_finalize: Option<InstanceFn>,
    registry: Weak<Registry>,
    /// Parent type, cached during class resolution (`None` for roots).
    parent: OnceCell<Option<Arc<TypeImpl>>>,
    class: OnceCell<Arc<ObjectClass>>,
}

impl TypeImpl {
    /// The type's unique name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The declared parent type name.
    pub fn parent_name(&self) -> Option<&str> {
        self.parent_name.as_deref()
    }

    /// Whether the type is abstract.
    pub fn is_abstract(&self) -> bool {
        self.abstract_
    }

    /// Names of the interfaces this type declares directly.
    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    /// The registry this type was registered with.
    ///
    /// Panics if the registry has been dropped; types are not meant to
    /// outlive it.
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.upgrade().expect("type registry dropped")
    }

    /// The resolved class record, materializing it on first use.
    ///
    /// Resolution is idempotent and memoized: the first call recursively
    /// resolves the parent chain and runs the class initializers; later
    /// calls return the cached record in O(1).
    pub fn class(&self) -> Arc<ObjectClass> {
        self.class
            .get_or_init(|| {
                let registry = self.registry();
                let ty = registry
                    .lookup(&self.name)
                    .expect("type not present in its own registry");
                class::resolve(&ty)
            })
            .clone()
    }

    /// Whether `ancestor` names this type or one of its ancestors.
    ///
    /// Walks declared parent names, so it works before class resolution.
    pub fn is_descendant_of(&self, ancestor: &str) -> bool {
        if self.name == ancestor {
            return true;
        }
        let registry = self.registry();
        let mut parent = self.parent_name.clone();
        while let Some(name) = parent {
            if name == ancestor {
                return true;
            }
            parent = registry
                .lookup(&name)
                .and_then(|t| t.parent_name.clone());
        }
        false
    }

    /// Ancestor chain, root first, excluding this type.
    ///
    /// Only valid once the class record is resolved; resolution caches
    /// the parent pointers this walks.
    pub(crate) fn ancestors(&self) -> Vec<Arc<TypeImpl>> {
        let mut chain = Vec::new();
        let mut cur = self.parent_cached();
        while let Some(ty) = cur {
            cur = ty.parent_cached();
            chain.push(ty);
        }
        chain.reverse();
        chain
    }

    pub(crate) fn parent_cached(&self) -> Option<Arc<TypeImpl>> {
        self.parent
            .get()
            .expect("class record not resolved")
            .clone()
    }

    pub(crate) fn cache_parent(&self, parent: Option<Arc<TypeImpl>>) {
        let _ = self.parent.set(parent);
    }

    pub(crate) fn class_init(&self) -> Option<&ClassInitFn> {
        self.class_init.as_ref()
    }

    pub(crate) fn class_base_init(&self) -> Option<&ClassInitFn> {
        self.class_base_init.as_ref()
    }

    pub(crate) fn class_data(&self) -> Option<&ClassData> {
        self.class_data.as_ref()
    }

    pub(crate) fn instance_init(&self) -> Option<&InstanceFn> {
        self.instance_init.as_ref()
    }

    pub(crate) fn instance_post_init(&self) -> Option<&InstanceFn> {
        self.instance_post_init.as_ref()
    }

    pub(crate) fn instance_finalize(&self) -> Option<&InstanceFn> {
        self.instance_finalize.as_ref()
    }
}

impl std::fmt::Debug for TypeImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeImpl")
            .field("name", &self.name)
            .field("parent", &self.parent_name)
            .field("abstract", &self.abstract_)
            .field("interfaces", &self.interfaces)
            .finish()
    }
}

/// Type summary returned by [`Registry::enumerate_types`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TypeListEntry {
    /// Type name.
    pub name: String,
    /// Whether the type is abstract.
    #[serde(rename = "abstract")]
    pub abstract_: bool,
    /// Parent type name, if any.
    pub parent: Option<String>,
}

#[derive(Default)]
struct TypeTable {
    /// Registration order, for stable enumeration.
    entries: Vec<Arc<TypeImpl>>,
    by_name: FxHashMap<String, usize>,
}

/// The type table and the root of the object tree.
///
/// Shared by `Arc`; every registered type keeps a weak back-reference for
/// lookups during class resolution and path handling.
pub struct Registry {
    weak_self: Weak<Registry>,
    types: RwLock<TypeTable>,
    root: OnceCell<Arc<Object>>,
}

impl Registry {
    /// Create a registry with the bootstrap types pre-registered: the two
    /// abstract roots `"object"` and `"interface"`, and the concrete
    /// `"container"` type the tree root is made of.
    pub fn new() -> Arc<Registry> {
        let registry = Arc::new_cyclic(|weak| Registry {
            weak_self: weak.clone(),
            types: RwLock::new(TypeTable::default()),
            root: OnceCell::new(),
        });
        registry.register(TypeInfo {
            name: TYPE_OBJECT.to_string(),
            abstract_: true,
            ..TypeInfo::default()
        });
        registry.register(TypeInfo {
            name: TYPE_INTERFACE.to_string(),
            abstract_: true,
            ..TypeInfo::default()
        });
        registry.register(TypeInfo {
            name: TYPE_CONTAINER.to_string(),
            parent: Some(TYPE_OBJECT.to_string()),
            ..TypeInfo::default()
        });
        registry
    }

    /// Register a type.
    ///
    /// Panics if the name is already taken; duplicate registration is a
    /// programming error, not a runtime condition.
    pub fn register(&self, info: TypeInfo) -> Arc<TypeImpl> {
        assert!(!info.name.is_empty(), "type name must not be empty");
        assert!(
            info.interfaces.len() <= MAX_INTERFACES,
            "type '{}' declares more than {} interfaces",
            info.name,
            MAX_INTERFACES
        );
        let mut table = self.types.write();
        assert!(
            !table.by_name.contains_key(&info.name),
            "type '{}' is already registered",
            info.name
        );
        let ty = Arc::new(TypeImpl {
            name: info.name,
            parent_name: info.parent,
            abstract_: info.abstract_,
            interfaces: info.interfaces,
            class_init: info.class_init,
            class_base_init: info.class_base_init,
            class_data: info.class_data,
            instance_init: info.instance_init,
            instance_post_init: info.instance_post_init,
            instance_finalize: info.instance_finalize,
            registry: self.weak_self.clone(),
            parent: OnceCell::new(),
            class: OnceCell::new(),
        });
        let index = table.entries.len();
        table.by_name.insert(ty.name.clone(), index);
        table.entries.push(ty.clone());
        ty
    }

    /// Look up a type by name.
    pub fn lookup(&self, name: &str) -> Option<Arc<TypeImpl>> {
        let table = self.types.read();
        table
            .by_name
            .get(name)
            .map(|&index| table.entries[index].clone())
    }

    /// Snapshot of every registered type, in registration order.
    ///
    /// The snapshot makes it safe to resolve classes (or instantiate
    /// objects) while iterating; registering new types concurrently with
    /// enumeration is not supported.
    pub fn types(&self) -> Vec<Arc<TypeImpl>> {
        self.types.read().entries.clone()
    }

    /// List registered types, optionally filtered to those that cast to
    /// `implements` (an ancestor type or an implemented interface).
    pub fn enumerate_types(
        &self,
        implements: Option<&str>,
        include_abstract: bool,
    ) -> Vec<TypeListEntry> {
        let mut out = Vec::new();
        for ty in self.types() {
            if ty.is_abstract() && !include_abstract {
                continue;
            }
            if let Some(target) = implements {
                let class = ty.class();
                if class_dynamic_cast(&class, target).is_none() {
                    continue;
                }
            }
            out.push(TypeListEntry {
                name: ty.name().to_string(),
                abstract_: ty.is_abstract(),
                parent: ty.parent_name().map(str::to_string),
            });
        }
        out
    }

    /// The root of the object tree, created lazily on first access.
    pub fn root(&self) -> Arc<Object> {
        self.root
            .get_or_init(|| {
                let container = self
                    .lookup(TYPE_CONTAINER)
                    .expect("bootstrap container type");
                Object::with_type(&container)
            })
            .clone()
    }

    /// Instantiate a registered type by name.
    ///
    /// Panics on unknown or abstract type names; use [`Registry::create`]
    /// for the recoverable, wire-facing construction path.
    pub fn new_object(&self, type_name: &str) -> Arc<Object> {
        let ty = self
            .lookup(type_name)
            .unwrap_or_else(|| panic!("cannot instantiate unknown type '{type_name}'"));
        Object::with_type(&ty)
    }

    /// Construct an object from the wire: instantiate `type_name`, apply
    /// `props` in order, then attach it under the tree root as `id`.
    ///
    /// Creation is transactional: a failed property set, or a duplicate
    /// `id`, drops the half-built object before it ever reaches the tree.
    pub fn create(
        &self,
        type_name: &str,
        id: &str,
        props: &[(String, Value)],
    ) -> ObjectResult<Arc<Object>> {
        let ty = self
            .lookup(type_name)
            .ok_or_else(|| ObjectError::UnknownType(type_name.to_string()))?;
        if ty.is_abstract() {
            return Err(ObjectError::AbstractType(type_name.to_string()));
        }
        let obj = Object::with_type(&ty);
        for (name, value) in props {
            obj.set_property(name, value)?;
        }
        self.root().add_child(id, obj.clone())?;
        Ok(obj)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.types.read().entries.len())
            .finish()
    }
}
