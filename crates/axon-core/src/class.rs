//! Class records and lazy class resolution
//!
//! A class record is the inheritance-flattened method table for one type.
//! It is built on first use: the parent's resolved record is cloned,
//! interface shims are synthesized per concrete class, ancestor
//! `class_base_init` hooks run root first, and the type's own
//! `class_init` runs last.

use std::any::Any;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::object::Object;
use crate::registry::{TypeImpl, TYPE_INTERFACE, TYPE_OBJECT};
use crate::ObjectResult;

/// A method installed on a class record by a class initializer.
pub type ClassMethod = Arc<dyn Fn(&Object, &[Value]) -> ObjectResult<Value> + Send + Sync>;

/// Class-level initializer hook, run with the record under construction
/// and the registering type's opaque class payload.
pub type ClassInitFn = Arc<dyn Fn(&mut ObjectClass, Option<&ClassData>) + Send + Sync>;

/// Opaque payload forwarded to class initializers.
pub type ClassData = Arc<dyn Any + Send + Sync>;

/// Distinguishes concrete class records from synthesized interface shims.
#[derive(Clone)]
pub enum ClassKind {
    /// An ordinary class record for a registered type.
    Concrete,
    /// A per-class stand-in for one interface implementation.
    InterfaceShim {
        /// The interface type this shim instantiates.
        interface: Arc<TypeImpl>,
        /// Name of the concrete type the shim decorates.
        owner: String,
    },
}

/// Resolved class record: the method-table equivalent of a vtable.
///
/// Records are immutable once resolution finishes; mutation happens only
/// inside class initializers, which receive `&mut ObjectClass`.
pub struct ObjectClass {
    ty: Arc<TypeImpl>,
    kind: ClassKind,
    methods: FxHashMap<String, ClassMethod>,
    interfaces: Vec<Arc<ObjectClass>>,
}

impl ObjectClass {
    /// Name of the type this record belongs to (for shims, the interface).
    pub fn name(&self) -> &str {
        self.ty.name()
    }

    /// The type this record was resolved from.
    pub fn type_(&self) -> &Arc<TypeImpl> {
        &self.ty
    }

    /// Concrete record or interface shim.
    pub fn kind(&self) -> &ClassKind {
        &self.kind
    }

    /// Whether this record is an interface shim.
    pub fn is_interface_shim(&self) -> bool {
        matches!(self.kind, ClassKind::InterfaceShim { .. })
    }

    /// The parent type's resolved class record.
    pub fn parent(&self) -> Option<Arc<ObjectClass>> {
        self.ty.parent_cached().map(|ty| ty.class())
    }

    /// Look up a method by name.
    pub fn method(&self, name: &str) -> Option<ClassMethod> {
        self.methods.get(name).cloned()
    }

    /// Install or override a method. Only callable while the record is
    /// under construction, i.e. from class initializers.
    pub fn set_method(&mut self, name: &str, method: ClassMethod) {
        self.methods.insert(name.to_string(), method);
    }

    /// Names of all installed methods, in no particular order.
    pub fn method_names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    /// The interface shims attached to this record.
    pub fn interfaces(&self) -> &[Arc<ObjectClass>] {
        &self.interfaces
    }

    /// Mutable access to the shim for `interface`, for class initializers
    /// that install interface methods.
    pub fn interface_mut(&mut self, interface: &str) -> Option<&mut ObjectClass> {
        self.interfaces
            .iter_mut()
            .find(|shim| match &shim.kind {
                ClassKind::InterfaceShim { interface: ty, .. } => ty.name() == interface,
                ClassKind::Concrete => false,
            })
            .and_then(Arc::get_mut)
    }
}

impl std::fmt::Debug for ObjectClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("ObjectClass");
        d.field("type", &self.ty.name());
        if let ClassKind::InterfaceShim { interface, owner } = &self.kind {
            d.field("interface", &interface.name()).field("owner", owner);
        }
        d.finish()
    }
}

/// Materialize the class record for `ty`.
///
/// Called at most once per type, through the memoization in
/// [`TypeImpl::class`]. The passes run in a fixed order:
///
/// 1. resolve the parent recursively,
/// 2. start from a copy of the parent's method table,
/// 3. re-synthesize the parent's interface shims for this class
///    (interface identity is per concrete class, never shared),
/// 4. synthesize shims for newly declared interfaces, skipping one whose
///    interface is an ancestor of an already-present shim's interface
///    (the reverse direction is not checked),
/// 5. run ancestor `class_base_init` hooks, root ancestor first,
/// 6. run the type's own `class_init`.
pub(crate) fn resolve(ty: &Arc<TypeImpl>) -> Arc<ObjectClass> {
    let registry = ty.registry();

    let parent_class = match ty.parent_name() {
        Some(parent_name) => {
            let parent = registry.lookup(parent_name).unwrap_or_else(|| {
                panic!(
                    "type '{}' has unregistered parent '{}'",
                    ty.name(),
                    parent_name
                )
            });
            let class = parent.class();
            ty.cache_parent(Some(parent));
            Some(class)
        }
        None => {
            if ty.name() != TYPE_OBJECT && ty.name() != TYPE_INTERFACE {
                panic!(
                    "type '{}' has no parent and is not a bootstrap root",
                    ty.name()
                );
            }
            ty.cache_parent(None);
            None
        }
    };

    let mut class = ObjectClass {
        ty: ty.clone(),
        kind: ClassKind::Concrete,
        methods: parent_class
            .as_ref()
            .map(|p| p.methods.clone())
            .unwrap_or_default(),
        interfaces: Vec::new(),
    };

    if let Some(parent) = &parent_class {
        for shim in parent.interfaces() {
            if let ClassKind::InterfaceShim { interface, .. } = &shim.kind {
                class.interfaces.push(synthesize_shim(ty, interface));
            }
        }
    }

    for iface_name in ty.interfaces() {
        let iface = registry.lookup(iface_name).unwrap_or_else(|| {
            panic!(
                "type '{}' declares unregistered interface '{}'",
                ty.name(),
                iface_name
            )
        });
        let covered = class.interfaces.iter().any(|shim| match &shim.kind {
            ClassKind::InterfaceShim { interface, .. } => {
                interface.is_descendant_of(iface.name())
            }
            ClassKind::Concrete => false,
        });
        if covered {
            continue;
        }
        class.interfaces.push(synthesize_shim(ty, &iface));
    }

    for ancestor in ty.ancestors() {
        if let Some(hook) = ancestor.class_base_init() {
            hook(&mut class, ty.class_data());
        }
    }
    if let Some(hook) = ty.class_init() {
        hook(&mut class, ty.class_data());
    }

    Arc::new(class)
}

/// Build the shim representing `interface` on the concrete type `owner`:
/// an abstract, minimal record carrying the interface chain's methods and
/// a back-link to both sides.
fn synthesize_shim(owner: &Arc<TypeImpl>, interface: &Arc<TypeImpl>) -> Arc<ObjectClass> {
    let iface_class = interface.class();
    Arc::new(ObjectClass {
        ty: interface.clone(),
        kind: ClassKind::InterfaceShim {
            interface: interface.clone(),
            owner: owner.name().to_string(),
        },
        methods: iface_class.methods.clone(),
        interfaces: Vec::new(),
    })
}

/// Cast a class record to the named target type.
///
/// Name equality wins immediately. An interface-family target searches
/// the shim list and requires exactly one match; two implementations of
/// the same interface family make the cast ambiguous, which resolves to
/// no match. Any other target is a plain ancestor walk.
pub fn class_dynamic_cast(class: &Arc<ObjectClass>, target: &str) -> Option<Arc<ObjectClass>> {
    if class.ty.name() == target {
        return Some(class.clone());
    }
    let registry = class.ty.registry();
    let target_ty = registry.lookup(target)?;

    if !class.interfaces.is_empty() && target_ty.is_descendant_of(TYPE_INTERFACE) {
        let mut found: Option<Arc<ObjectClass>> = None;
        let mut matches = 0;
        for shim in class.interfaces() {
            if let ClassKind::InterfaceShim { interface, .. } = &shim.kind {
                if interface.is_descendant_of(target) {
                    found = Some(shim.clone());
                    matches += 1;
                }
            }
        }
        if matches == 1 {
            found
        } else {
            None
        }
    } else if class.ty.is_descendant_of(target) {
        Some(class.clone())
    } else {
        None
    }
}

/// Cast that must succeed.
///
/// Panics with a message naming the class and the expected type; use it
/// where the caller has already guaranteed the cast.
#[track_caller]
pub fn class_dynamic_cast_assert(class: &Arc<ObjectClass>, target: &str) -> Arc<ObjectClass> {
    class_dynamic_cast(class, target).unwrap_or_else(|| {
        panic!(
            "invalid cast of class '{}' to '{}'",
            class.name(),
            target
        )
    })
}
