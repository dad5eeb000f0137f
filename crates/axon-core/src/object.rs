//! Object instances and lifecycle
//!
//! Instances are shared through `Arc`: cloning the handle is a retain,
//! dropping it is a release. When the last strong reference goes away the
//! finalize hooks run (most-derived type first, mirroring post-init) and
//! every property is released in insertion order.
//!
//! The property table and tree edges are not internally synchronized
//! beyond their own short-lived locks; callers serialize structural
//! mutation. Only the reference count is safe for uncoordinated
//! concurrent access.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value;

use crate::class::{class_dynamic_cast, ObjectClass};
use crate::property::Property;
use crate::registry::TypeImpl;
use crate::{ObjectError, ObjectResult};

/// Instance-level lifecycle hook.
pub type InstanceFn = Arc<dyn Fn(&Object) + Send + Sync>;

/// A live instance of a concrete registered type.
pub struct Object {
    class: Arc<ObjectClass>,
    weak_self: Weak<Object>,
    parent: RwLock<Weak<Object>>,
    pub(crate) properties: RwLock<Vec<Arc<Property>>>,
}

impl Object {
    /// Instantiate `ty`.
    ///
    /// Resolves the class, then runs `instance_init` hooks ancestors
    /// first and `instance_post_init` hooks most-derived first. The
    /// reversal is deliberate: init lets ancestors set up state before
    /// subclasses touch it, post-init lets subclasses observe a fully
    /// initialized hierarchy.
    ///
    /// Panics if the type is abstract; instantiating one is a programmer
    /// error, not a runtime condition.
    pub fn with_type(ty: &Arc<TypeImpl>) -> Arc<Object> {
        let class = ty.class();
        assert!(
            !ty.is_abstract(),
            "cannot instantiate abstract type '{}'",
            ty.name()
        );
        let obj = Arc::new_cyclic(|weak| Object {
            class,
            weak_self: weak.clone(),
            parent: RwLock::new(Weak::new()),
            properties: RwLock::new(Vec::new()),
        });

        let mut chain = ty.ancestors();
        chain.push(ty.clone());
        for level in &chain {
            if let Some(hook) = level.instance_init() {
                hook(&obj);
            }
        }
        for level in chain.iter().rev() {
            if let Some(hook) = level.instance_post_init() {
                hook(&obj);
            }
        }
        obj
    }

    /// The resolved class record of this instance.
    pub fn class(&self) -> &Arc<ObjectClass> {
        &self.class
    }

    /// Name of this instance's concrete type.
    pub fn type_name(&self) -> &str {
        self.class.name()
    }

    /// The tree parent, if this object is owned by a child property.
    pub fn parent(&self) -> Option<Arc<Object>> {
        self.parent.read().upgrade()
    }

    /// Whether this instance casts to `target` (ancestor type or
    /// implemented interface).
    pub fn is_a(&self, target: &str) -> bool {
        class_dynamic_cast(&self.class, target).is_some()
    }

    /// Cast check that must succeed; panics with a message naming the
    /// instance's type and the expected type.
    #[track_caller]
    pub fn cast_assert(&self, target: &str) {
        if !self.is_a(target) {
            panic!(
                "invalid cast of object of type '{}' to '{}'",
                self.type_name(),
                target
            );
        }
    }

    /// Dispatch a named class method: the concrete class is consulted
    /// first, then the interface shims.
    pub fn call(&self, method: &str, args: &[Value]) -> ObjectResult<Value> {
        let found = self.class.method(method).or_else(|| {
            self.class
                .interfaces()
                .iter()
                .find_map(|shim| shim.method(method))
        });
        let found = found.ok_or_else(|| {
            ObjectError::MethodNotFound(method.to_string(), self.type_name().to_string())
        })?;
        found(self, args)
    }

    /// A fresh strong handle to this object.
    ///
    /// Not available from finalize hooks: the object is already past its
    /// last release by then.
    pub(crate) fn arc(&self) -> Arc<Object> {
        self.weak_self.upgrade().expect("object already finalized")
    }

    pub(crate) fn set_parent(&self, parent: &Arc<Object>) {
        *self.parent.write() = Arc::downgrade(parent);
    }

    pub(crate) fn clear_parent(&self) {
        *self.parent.write() = Weak::new();
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        // finalize most-derived type first, mirroring post-init
        let ty = self.class.type_().clone();
        let mut chain = ty.ancestors();
        chain.push(ty);
        for level in chain.iter().rev() {
            if let Some(hook) = level.instance_finalize() {
                hook(self);
            }
        }

        // release every property in insertion order; child releases drop
        // the only strong reference to their subtree
        let props: Vec<Arc<Property>> = self.properties.get_mut().drain(..).collect();
        for prop in props {
            prop.release(self);
        }
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("type", &self.type_name())
            .field("properties", &self.properties.read().len())
            .finish()
    }
}
