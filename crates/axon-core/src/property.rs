//! Per-instance property tables
//!
//! Properties are an insertion-ordered list of named descriptors. Each
//! descriptor carries a type tag, optional get/set closures working in
//! wire values, and an optional release callback run exactly once when
//! the property is deleted or its owner is finalized.
//!
//! Child and link properties additionally carry the tree-edge semantics:
//! a child property owns the only strong reference to its target and
//! establishes the parent edge; a link property stores a reference under
//! a configurable ownership policy and never implies tree ownership.

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::object::Object;
use crate::{ObjectError, ObjectResult};

/// Property getter: serializes native state into a wire value.
pub type PropertyGetter = Box<dyn Fn(&Object) -> ObjectResult<Value> + Send + Sync>;

/// Property setter: updates native state from a wire value.
pub type PropertySetter = Box<dyn Fn(&Object, &Value) -> ObjectResult<()> + Send + Sync>;

/// Release callback, run exactly once when the property is deleted or its
/// owner is finalized.
pub type PropertyRelease = Box<dyn FnOnce(&Object) + Send + Sync>;

/// Validation callback for link property stores, given the owning object,
/// the property name, and the candidate target.
pub type LinkCheck = Box<dyn Fn(&Object, &str, &Arc<Object>) -> ObjectResult<()> + Send + Sync>;

/// Ownership policy for link properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPolicy {
    /// The link does not own its target; it reads as unset once the
    /// target dies.
    Weak,
    /// The link holds a strong reference, released on unset, replace, or
    /// property release.
    Strong,
}

pub(crate) enum LinkTarget {
    Unset,
    Weak(Weak<Object>),
    Strong(Arc<Object>),
}

impl LinkTarget {
    fn get(&self) -> Option<Arc<Object>> {
        match self {
            LinkTarget::Unset => None,
            LinkTarget::Weak(weak) => weak.upgrade(),
            LinkTarget::Strong(strong) => Some(strong.clone()),
        }
    }
}

pub(crate) enum PropertyKind {
    Plain,
    Child {
        target: Arc<Mutex<Option<Arc<Object>>>>,
    },
    Link {
        target: Arc<RwLock<LinkTarget>>,
        policy: LinkPolicy,
    },
}

/// One named property on one object.
pub struct Property {
    name: String,
    type_tag: String,
    description: Mutex<Option<String>>,
    kind: PropertyKind,
    get: Option<PropertyGetter>,
    set: Option<PropertySetter>,
    release: Mutex<Option<PropertyRelease>>,
}

impl Property {
    /// Property name, unique within its owning object.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type tag, e.g. `"bool"`, `"child<serial>"`, `"link<device>"`.
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Human-readable description, if one was set.
    pub fn description(&self) -> Option<String> {
        self.description.lock().clone()
    }

    pub(crate) fn set_description(&self, description: &str) {
        *self.description.lock() = Some(description.to_string());
    }

    pub(crate) fn is_child(&self) -> bool {
        matches!(self.kind, PropertyKind::Child { .. })
    }

    /// The object this property points at, for child and link properties.
    pub(crate) fn target(&self) -> Option<Arc<Object>> {
        match &self.kind {
            PropertyKind::Plain => None,
            PropertyKind::Child { target } => target.lock().clone(),
            PropertyKind::Link { target, .. } => target.read().get(),
        }
    }

    /// Drop edge state and run the user release callback.
    ///
    /// A child release clears the target's parent pointer and drops the
    /// owning reference; a strong link drops its reference; a weak link
    /// never releases anything.
    pub(crate) fn release(&self, owner: &Object) {
        match &self.kind {
            PropertyKind::Plain => {}
            PropertyKind::Child { target } => {
                if let Some(child) = target.lock().take() {
                    child.clear_parent();
                }
            }
            PropertyKind::Link { target, policy } => {
                if *policy == LinkPolicy::Strong {
                    *target.write() = LinkTarget::Unset;
                }
            }
        }
        if let Some(callback) = self.release.lock().take() {
            callback(owner);
        }
    }
}

impl std::fmt::Debug for Property {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("type", &self.type_tag)
            .finish()
    }
}

/// Property summary returned by [`Object::properties`].
///
/// `description` doubles as the "has description" flag: `None` means the
/// property never had one set.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PropertyInfo {
    /// Property name.
    pub name: String,
    /// Property type tag.
    pub type_tag: String,
    /// Description, if set.
    pub description: Option<String>,
}

impl Object {
    /// Add a plain property. Fails only on a duplicate name.
    ///
    /// A property with no setter is read-only; no getter, write-only.
    pub fn add_property(
        &self,
        name: &str,
        type_tag: &str,
        get: Option<PropertyGetter>,
        set: Option<PropertySetter>,
        release: Option<PropertyRelease>,
    ) -> ObjectResult<Arc<Property>> {
        self.insert_property(Property {
            name: name.to_string(),
            type_tag: type_tag.to_string(),
            description: Mutex::new(None),
            kind: PropertyKind::Plain,
            get,
            set,
            release: Mutex::new(release),
        })
    }

    fn insert_property(&self, property: Property) -> ObjectResult<Arc<Property>> {
        let mut table = self.properties.write();
        if table.iter().any(|p| p.name() == property.name) {
            return Err(ObjectError::DuplicateProperty(property.name));
        }
        let property = Arc::new(property);
        table.push(property.clone());
        Ok(property)
    }

    /// Look up a property by name.
    pub fn find_property(&self, name: &str) -> Option<Arc<Property>> {
        self.properties
            .read()
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    /// Delete a property, running its release callback. Returns whether
    /// the property existed.
    pub fn delete_property(&self, name: &str) -> bool {
        let removed = {
            let mut table = self.properties.write();
            table
                .iter()
                .position(|p| p.name() == name)
                .map(|index| table.remove(index))
        };
        match removed {
            Some(property) => {
                property.release(self);
                true
            }
            None => false,
        }
    }

    /// List all properties in insertion order.
    ///
    /// Note: an earlier revision of this interface reported properties in
    /// reverse-insertion order; consumers must not rely on either.
    pub fn properties(&self) -> Vec<PropertyInfo> {
        self.properties
            .read()
            .iter()
            .map(|p| PropertyInfo {
                name: p.name().to_string(),
                type_tag: p.type_tag().to_string(),
                description: p.description(),
            })
            .collect()
    }

    /// Attach a description to an existing property.
    pub fn set_property_description(&self, name: &str, description: &str) -> ObjectResult<()> {
        let property = self
            .find_property(name)
            .ok_or_else(|| ObjectError::PropertyNotFound(name.to_string()))?;
        property.set_description(description);
        Ok(())
    }

    /// Read a property as a wire value.
    pub fn get_property(&self, name: &str) -> ObjectResult<Value> {
        let property = self
            .find_property(name)
            .ok_or_else(|| ObjectError::PropertyNotFound(name.to_string()))?;
        // table lock is already dropped; getters may traverse the tree
        let get = property.get.as_ref().ok_or(ObjectError::PermissionDenied {
            name: name.to_string(),
            access: "readable",
        })?;
        get(self)
    }

    /// Write a property from a wire value.
    pub fn set_property(&self, name: &str, value: &Value) -> ObjectResult<()> {
        let property = self
            .find_property(name)
            .ok_or_else(|| ObjectError::PropertyNotFound(name.to_string()))?;
        let set = property.set.as_ref().ok_or(ObjectError::PermissionDenied {
            name: name.to_string(),
            access: "writable",
        })?;
        set(self, value)
    }

    /// Typed read of a `bool` property.
    pub fn get_bool(&self, name: &str) -> ObjectResult<bool> {
        match self.get_property(name)? {
            Value::Bool(value) => Ok(value),
            _ => Err(type_mismatch(name, "bool")),
        }
    }

    /// Typed write of a `bool` property.
    pub fn set_bool(&self, name: &str, value: bool) -> ObjectResult<()> {
        self.set_property(name, &Value::Bool(value))
    }

    /// Typed read of an integer property.
    pub fn get_int(&self, name: &str) -> ObjectResult<i64> {
        match self.get_property(name)? {
            Value::Number(number) => number.as_i64().ok_or_else(|| type_mismatch(name, "int")),
            _ => Err(type_mismatch(name, "int")),
        }
    }

    /// Typed write of an integer property.
    pub fn set_int(&self, name: &str, value: i64) -> ObjectResult<()> {
        self.set_property(name, &Value::from(value))
    }

    /// Typed read of a string property.
    pub fn get_str(&self, name: &str) -> ObjectResult<String> {
        match self.get_property(name)? {
            Value::String(value) => Ok(value),
            _ => Err(type_mismatch(name, "string")),
        }
    }

    /// Typed write of a string property.
    pub fn set_str(&self, name: &str, value: &str) -> ObjectResult<()> {
        self.set_property(name, &Value::String(value.to_string()))
    }

    /// Typed read of an enum property as an index into `variants`.
    pub fn get_enum(&self, name: &str, variants: &[&str]) -> ObjectResult<usize> {
        let value = self.get_str(name)?;
        variants
            .iter()
            .position(|v| *v == value)
            .ok_or_else(|| type_mismatch(name, "enum variant"))
    }

    /// Typed write of an enum property by index into `variants`.
    ///
    /// Panics on an out-of-range index; that is a caller bug, not a wire
    /// condition.
    pub fn set_enum(&self, name: &str, variants: &[&str], index: usize) -> ObjectResult<()> {
        assert!(
            index < variants.len(),
            "enum index {} out of range for property '{}'",
            index,
            name
        );
        self.set_str(name, variants[index])
    }

    /// Typed read of a link property, resolving its stored path.
    ///
    /// An unset link reads as `Ok(None)`.
    pub fn get_link(&self, name: &str) -> ObjectResult<Option<Arc<Object>>> {
        let path = self.get_str(name)?;
        if path.is_empty() {
            return Ok(None);
        }
        let registry = self.class().type_().registry();
        registry.resolve_path(&path, None).map(Some)
    }

    /// Add a read-write property backed by a fresh cell of `T`,
    /// serialized through the wire representation.
    ///
    /// Every typed property helper is this one pattern instantiated at a
    /// different type.
    pub fn add_stored<T>(
        &self,
        name: &str,
        type_tag: &str,
        initial: T,
    ) -> ObjectResult<Arc<Property>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let cell = Arc::new(RwLock::new(initial));
        let get = {
            let cell = cell.clone();
            let name = name.to_string();
            move |_obj: &Object| {
                serde_json::to_value(&*cell.read()).map_err(|_| ObjectError::Encode(name.clone()))
            }
        };
        let set = {
            let name = name.to_string();
            let expected = type_tag.to_string();
            move |_obj: &Object, value: &Value| {
                let parsed: T = serde_json::from_value(value.clone())
                    .map_err(|_| type_mismatch(&name, &expected))?;
                *cell.write() = parsed;
                Ok(())
            }
        };
        self.add_property(name, type_tag, Some(Box::new(get)), Some(Box::new(set)), None)
    }

    /// Add a stored `bool` property.
    pub fn add_bool(&self, name: &str, initial: bool) -> ObjectResult<Arc<Property>> {
        self.add_stored(name, "bool", initial)
    }

    /// Add a stored integer property.
    pub fn add_int(&self, name: &str, initial: i64) -> ObjectResult<Arc<Property>> {
        self.add_stored(name, "int", initial)
    }

    /// Add a stored string property.
    pub fn add_str(&self, name: &str, initial: &str) -> ObjectResult<Arc<Property>> {
        self.add_stored(name, "string", initial.to_string())
    }

    /// Add `child` as a child property named `name`, establishing the
    /// tree edge. The property holds the only strong tree reference to
    /// the child; its getter reports the child's canonical path.
    ///
    /// Panics if `child` already has a parent: the tree is single-parent,
    /// and violating that is a programmer error. A duplicate property
    /// name fails without taking ownership of `child`.
    pub fn add_child(&self, name: &str, child: Arc<Object>) -> ObjectResult<Arc<Property>> {
        assert!(
            child.parent().is_none(),
            "object of type '{}' already has a parent; cannot add it as child '{}'",
            child.type_name(),
            name
        );
        let type_tag = format!("child<{}>", child.type_name());
        let slot = Arc::new(Mutex::new(Some(child.clone())));
        let get = {
            let slot = slot.clone();
            move |_obj: &Object| {
                let path = slot
                    .lock()
                    .as_ref()
                    .map(|target| target.canonical_path())
                    .unwrap_or_default();
                Ok(Value::String(path))
            }
        };
        let property = self.insert_property(Property {
            name: name.to_string(),
            type_tag,
            description: Mutex::new(None),
            kind: PropertyKind::Child { target: slot },
            get: Some(Box::new(get)),
            set: None,
            release: Mutex::new(None),
        })?;
        child.set_parent(&self.arc());
        Ok(property)
    }

    /// Add a link property declared to point at `target_type`.
    ///
    /// The getter reports the target's canonical path, or an empty string
    /// while unset. The property is writable only when a `check` callback
    /// is supplied: the setter resolves the incoming path, verifies the
    /// declared type, runs `check`, and only then swaps the stored
    /// reference under the given ownership policy. Writing an empty
    /// string unsets the link.
    pub fn add_link(
        &self,
        name: &str,
        target_type: &str,
        policy: LinkPolicy,
        check: Option<LinkCheck>,
    ) -> ObjectResult<Arc<Property>> {
        let type_tag = format!("link<{}>", target_type);
        let slot = Arc::new(RwLock::new(LinkTarget::Unset));
        let get = {
            let slot = slot.clone();
            move |_obj: &Object| {
                let path = slot
                    .read()
                    .get()
                    .map(|target| target.canonical_path())
                    .unwrap_or_default();
                Ok(Value::String(path))
            }
        };
        let set = check.map(|check| {
            let slot = slot.clone();
            let name = name.to_string();
            let declared = target_type.to_string();
            let setter = move |obj: &Object, value: &Value| {
                let path = value
                    .as_str()
                    .ok_or_else(|| type_mismatch(&name, "string"))?;
                if path.is_empty() {
                    *slot.write() = LinkTarget::Unset;
                    return Ok(());
                }
                let registry = obj.class().type_().registry();
                let target = registry.resolve_path(path, None)?;
                if !target.is_a(&declared) {
                    return Err(ObjectError::WrongType {
                        path: path.to_string(),
                        expected: declared.clone(),
                    });
                }
                check(obj, &name, &target)?;
                *slot.write() = match policy {
                    LinkPolicy::Strong => LinkTarget::Strong(target),
                    LinkPolicy::Weak => LinkTarget::Weak(Arc::downgrade(&target)),
                };
                Ok(())
            };
            Box::new(setter) as PropertySetter
        });
        self.insert_property(Property {
            name: name.to_string(),
            type_tag,
            description: Mutex::new(None),
            kind: PropertyKind::Link {
                target: slot,
                policy,
            },
            get: Some(Box::new(get)),
            set,
            release: Mutex::new(None),
        })
    }

    /// The child properties of this object, in insertion order.
    pub fn children(&self) -> Vec<(String, Arc<Object>)> {
        self.properties
            .read()
            .iter()
            .filter(|p| p.is_child())
            .filter_map(|p| p.target().map(|child| (p.name().to_string(), child)))
            .collect()
    }

    /// Detach this object from its parent, releasing the owning child
    /// property. No-op when unparented.
    pub fn unparent(&self) {
        // hold a strong handle so the release below cannot finalize us
        // while we are still running
        let keep = self.arc();
        let Some(parent) = self.parent() else {
            return;
        };
        let name = parent
            .children()
            .into_iter()
            .find(|(_, child)| Arc::ptr_eq(child, &keep))
            .map(|(name, _)| name);
        if let Some(name) = name {
            parent.delete_property(&name);
        }
    }
}

fn type_mismatch(name: &str, expected: &str) -> ObjectError {
    ObjectError::TypeMismatch {
        name: name.to_string(),
        expected: expected.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Registry, TypeInfo, TYPE_OBJECT};
    use serde_json::json;

    fn test_registry() -> Arc<Registry> {
        let registry = Registry::new();
        registry.register(TypeInfo {
            name: "device".to_string(),
            parent: Some(TYPE_OBJECT.to_string()),
            ..TypeInfo::default()
        });
        registry
    }

    #[test]
    fn test_add_find_delete() {
        let obj = test_registry().new_object("device");
        obj.add_bool("enabled", false).unwrap();

        let property = obj.find_property("enabled").unwrap();
        assert_eq!(property.name(), "enabled");
        assert_eq!(property.type_tag(), "bool");

        assert!(obj.delete_property("enabled"));
        assert!(obj.find_property("enabled").is_none());
        assert!(!obj.delete_property("enabled"));
    }

    #[test]
    fn test_duplicate_property_name_is_rejected() {
        let obj = test_registry().new_object("device");
        obj.add_bool("enabled", false).unwrap();
        assert_eq!(
            obj.add_int("enabled", 0).unwrap_err(),
            ObjectError::DuplicateProperty("enabled".to_string())
        );
        // the original property is untouched
        assert_eq!(obj.get_bool("enabled").unwrap(), false);
    }

    #[test]
    fn test_stored_property_roundtrip() {
        let obj = test_registry().new_object("device");
        obj.add_bool("enabled", false).unwrap();
        obj.add_int("irq", 4).unwrap();
        obj.add_str("label", "ttyS0").unwrap();

        assert_eq!(obj.get_bool("enabled").unwrap(), false);
        obj.set_bool("enabled", true).unwrap();
        assert_eq!(obj.get_bool("enabled").unwrap(), true);

        obj.set_int("irq", 11).unwrap();
        assert_eq!(obj.get_int("irq").unwrap(), 11);

        obj.set_str("label", "ttyS1").unwrap();
        assert_eq!(obj.get_str("label").unwrap(), "ttyS1");
    }

    #[test]
    fn test_read_only_property_rejects_set() {
        let obj = test_registry().new_object("device");
        obj.add_property(
            "version",
            "int",
            Some(Box::new(|_| Ok(json!(7)))),
            None,
            None,
        )
        .unwrap();

        assert_eq!(
            obj.set_property("version", &json!(8)).unwrap_err(),
            ObjectError::PermissionDenied {
                name: "version".to_string(),
                access: "writable",
            }
        );
        // the underlying value is unchanged
        assert_eq!(obj.get_int("version").unwrap(), 7);
    }

    #[test]
    fn test_write_only_property_rejects_get() {
        let obj = test_registry().new_object("device");
        obj.add_property(
            "trigger",
            "bool",
            None,
            Some(Box::new(|_, _| Ok(()))),
            None,
        )
        .unwrap();

        assert_eq!(
            obj.get_property("trigger").unwrap_err(),
            ObjectError::PermissionDenied {
                name: "trigger".to_string(),
                access: "readable",
            }
        );
    }

    #[test]
    fn test_missing_property_errors() {
        let obj = test_registry().new_object("device");
        assert_eq!(
            obj.get_property("nope").unwrap_err(),
            ObjectError::PropertyNotFound("nope".to_string())
        );
        assert_eq!(
            obj.set_property("nope", &json!(1)).unwrap_err(),
            ObjectError::PropertyNotFound("nope".to_string())
        );
    }

    #[test]
    fn test_type_mismatch_on_typed_accessors() {
        let obj = test_registry().new_object("device");
        obj.add_int("irq", 4).unwrap();

        assert!(matches!(
            obj.get_bool("irq").unwrap_err(),
            ObjectError::TypeMismatch { .. }
        ));
        assert!(matches!(
            obj.set_property("irq", &json!("not-a-number")).unwrap_err(),
            ObjectError::TypeMismatch { .. }
        ));
        // the failed write left the value alone
        assert_eq!(obj.get_int("irq").unwrap(), 4);
    }

    #[test]
    fn test_enum_accessors() {
        const SPEEDS: &[&str] = &["slow", "fast", "turbo"];
        let obj = test_registry().new_object("device");
        obj.add_str("speed", "slow").unwrap();

        assert_eq!(obj.get_enum("speed", SPEEDS).unwrap(), 0);
        obj.set_enum("speed", SPEEDS, 2).unwrap();
        assert_eq!(obj.get_enum("speed", SPEEDS).unwrap(), 2);
        assert_eq!(obj.get_str("speed").unwrap(), "turbo");

        obj.set_str("speed", "warp").unwrap();
        assert!(matches!(
            obj.get_enum("speed", SPEEDS).unwrap_err(),
            ObjectError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_delete_runs_release_exactly_once() {
        let obj = test_registry().new_object("device");
        let released = Arc::new(Mutex::new(0));
        let counter = released.clone();
        obj.add_property(
            "payload",
            "int",
            None,
            None,
            Some(Box::new(move |_| *counter.lock() += 1)),
        )
        .unwrap();

        assert!(obj.delete_property("payload"));
        assert_eq!(*released.lock(), 1);
        assert!(!obj.delete_property("payload"));
        assert_eq!(*released.lock(), 1);
    }

    #[test]
    fn test_listing_preserves_insertion_order_and_descriptions() {
        let obj = test_registry().new_object("device");
        obj.add_bool("enabled", false).unwrap();
        obj.add_int("irq", 4).unwrap();
        obj.set_property_description("irq", "interrupt line").unwrap();

        let listed = obj.properties();
        assert_eq!(
            listed,
            vec![
                PropertyInfo {
                    name: "enabled".to_string(),
                    type_tag: "bool".to_string(),
                    description: None,
                },
                PropertyInfo {
                    name: "irq".to_string(),
                    type_tag: "int".to_string(),
                    description: Some("interrupt line".to_string()),
                },
            ]
        );

        assert_eq!(
            obj.set_property_description("missing", "x").unwrap_err(),
            ObjectError::PropertyNotFound("missing".to_string())
        );
    }
}
