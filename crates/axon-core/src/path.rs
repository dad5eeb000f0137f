//! Canonical paths and path resolution
//!
//! Every object owned by the tree has a canonical path: the `/`-joined
//! chain of child-property names from the root down to it. Absolute
//! paths are resolved by walking components; partial paths are searched
//! across the whole tree and must resolve uniquely.

use std::sync::Arc;

use crate::object::Object;
use crate::registry::Registry;
use crate::{ObjectError, ObjectResult};

impl Object {
    /// The final component of this object's canonical path: the name of
    /// the child property registering it in its parent. `None` for
    /// unparented objects (including the root).
    pub fn path_component(&self) -> Option<String> {
        let parent = self.parent()?;
        Some(component_in(&parent, &self.arc()))
    }

    /// The canonical path of this object from the tree root.
    ///
    /// Panics if the object is not attached to the root; asking for the
    /// path of a detached object is a programmer error.
    pub fn canonical_path(&self) -> String {
        let registry = self.class().type_().registry();
        let root = registry.root();
        let mut cursor = self.arc();
        let mut parts = Vec::new();
        while !Arc::ptr_eq(&cursor, &root) {
            let parent = cursor.parent().unwrap_or_else(|| {
                panic!(
                    "object of type '{}' is not attached to the object tree",
                    cursor.type_name()
                )
            });
            parts.push(component_in(&parent, &cursor));
            cursor = parent;
        }
        parts.reverse();
        format!("/{}", parts.join("/"))
    }

    /// Resolve a single path component against this object's child and
    /// link properties. Plain properties never resolve.
    pub fn resolve_component(&self, name: &str) -> Option<Arc<Object>> {
        self.find_property(name).and_then(|p| p.target())
    }
}

/// Name of the child property in `parent` that owns `child`.
///
/// An object with a parent but no matching child property is an invariant
/// violation and fatal.
fn component_in(parent: &Arc<Object>, child: &Arc<Object>) -> String {
    for (name, candidate) in parent.children() {
        if Arc::ptr_eq(&candidate, child) {
            return name;
        }
    }
    panic!(
        "object of type '{}' has a parent but no child property names it",
        child.type_name()
    );
}

impl Registry {
    /// Resolve a path to an object.
    ///
    /// Absolute paths (leading `/`) walk component by component from the
    /// root; empty components are skipped, so consecutive slashes are
    /// harmless. Partial paths are resolved against every node of the
    /// tree and fail as ambiguous when more than one subtree matches.
    /// `target_type` filters the result through a dynamic cast.
    pub fn resolve_path(
        &self,
        path: &str,
        target_type: Option<&str>,
    ) -> ObjectResult<Arc<Object>> {
        let parts: Vec<&str> = path.split('/').collect();
        if path.starts_with('/') {
            resolve_abs(&self.root(), &parts, target_type)
                .ok_or_else(|| ObjectError::PathNotFound(path.to_string()))
        } else {
            let mut ambiguous = false;
            let found = resolve_partial(&self.root(), &parts, target_type, &mut ambiguous);
            if ambiguous {
                Err(ObjectError::AmbiguousPath(path.to_string()))
            } else {
                found.ok_or_else(|| ObjectError::PathNotFound(path.to_string()))
            }
        }
    }
}

fn resolve_abs(
    parent: &Arc<Object>,
    parts: &[&str],
    target_type: Option<&str>,
) -> Option<Arc<Object>> {
    let mut obj = parent.clone();
    for part in parts {
        if part.is_empty() {
            continue;
        }
        obj = obj.resolve_component(part)?;
    }
    match target_type {
        Some(target) if !obj.is_a(target) => None,
        _ => Some(obj),
    }
}

fn resolve_partial(
    parent: &Arc<Object>,
    parts: &[&str],
    target_type: Option<&str>,
    ambiguous: &mut bool,
) -> Option<Arc<Object>> {
    let mut obj = resolve_abs(parent, parts, target_type);
    for (_name, child) in parent.children() {
        if let Some(found) = resolve_partial(&child, parts, target_type, ambiguous) {
            if obj.is_some() {
                *ambiguous = true;
                return None;
            }
            obj = Some(found);
        }
        // stop descending once ambiguity is already known
        if *ambiguous {
            return None;
        }
    }
    obj
}
