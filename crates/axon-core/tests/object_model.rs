//! Integration tests for the object model core
//!
//! Tests cover:
//! - Registering a small type hierarchy and instantiating it
//! - Wire-facing property access and listing
//! - Transactional object creation
//! - Type enumeration by implemented interface
//! - Tree construction, path resolution, and teardown

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;

use axon_core::{
    LinkPolicy, Object, ObjectError, Registry, TypeInfo, TYPE_INTERFACE, TYPE_OBJECT,
};

/// Registry with a `device` base type and a `my-device` subtype carrying
/// a stored `enabled` property, default false.
fn device_registry() -> Arc<Registry> {
    let registry = Registry::new();
    registry.register(TypeInfo {
        name: "device".to_string(),
        parent: Some(TYPE_OBJECT.to_string()),
        abstract_: true,
        ..TypeInfo::default()
    });
    registry.register(TypeInfo {
        name: "my-device".to_string(),
        parent: Some("device".to_string()),
        instance_init: Some(Arc::new(|obj: &Object| {
            obj.add_bool("enabled", false).unwrap();
        })),
        ..TypeInfo::default()
    });
    registry
}

#[test]
fn test_device_scenario_end_to_end() {
    let registry = device_registry();
    let obj = registry.new_object("my-device");

    assert_eq!(obj.get_property("enabled").unwrap(), json!(false));
    obj.set_property("enabled", &json!(true)).unwrap();
    assert_eq!(obj.get_property("enabled").unwrap(), json!(true));

    let listed = obj.properties();
    assert!(listed
        .iter()
        .any(|p| p.name == "enabled" && p.type_tag == "bool"));
}

#[test]
fn test_create_applies_properties_and_attaches() {
    let registry = device_registry();
    let obj = registry
        .create(
            "my-device",
            "dev0",
            &[("enabled".to_string(), json!(true))],
        )
        .unwrap();

    assert_eq!(obj.canonical_path(), "/dev0");
    assert_eq!(obj.get_property("enabled").unwrap(), json!(true));
    let resolved = registry.resolve_path("/dev0", Some("device")).unwrap();
    assert!(Arc::ptr_eq(&resolved, &obj));
}

#[test]
fn test_create_is_transactional() {
    let registry = device_registry();
    let finalized = Arc::new(Mutex::new(0));
    let counter = finalized.clone();
    registry.register(TypeInfo {
        name: "probe".to_string(),
        parent: Some(TYPE_OBJECT.to_string()),
        instance_init: Some(Arc::new(|obj: &Object| {
            obj.add_bool("armed", false).unwrap();
        })),
        instance_finalize: Some(Arc::new(move |_obj: &Object| {
            *counter.lock() += 1;
        })),
        ..TypeInfo::default()
    });

    // a bad property value must not leave a stray object in the tree
    let err = registry
        .create("probe", "probe0", &[("armed".to_string(), json!("yes"))])
        .unwrap_err();
    assert!(matches!(err, ObjectError::TypeMismatch { .. }));
    assert_eq!(*finalized.lock(), 1);
    assert!(registry.resolve_path("/probe0", None).is_err());

    // unknown properties fail the same way
    let err = registry
        .create("probe", "probe0", &[("missing".to_string(), json!(1))])
        .unwrap_err();
    assert_eq!(err, ObjectError::PropertyNotFound("missing".to_string()));
    assert_eq!(*finalized.lock(), 2);

    // a duplicate id fails after construction, before attachment
    registry.create("probe", "probe0", &[]).unwrap();
    let err = registry.create("probe", "probe0", &[]).unwrap_err();
    assert_eq!(err, ObjectError::DuplicateProperty("probe0".to_string()));

    // and the errors for bad type names are typed, not fatal
    assert_eq!(
        registry.create("missing-type", "x", &[]).unwrap_err(),
        ObjectError::UnknownType("missing-type".to_string())
    );
    assert_eq!(
        registry.create("device", "x", &[]).unwrap_err(),
        ObjectError::AbstractType("device".to_string())
    );
}

#[test]
fn test_enumerate_types_by_interface() {
    let registry = Registry::new();
    registry.register(TypeInfo {
        name: "hotpluggable".to_string(),
        parent: Some(TYPE_INTERFACE.to_string()),
        abstract_: true,
        ..TypeInfo::default()
    });
    registry.register(TypeInfo {
        name: "pci-device".to_string(),
        parent: Some(TYPE_OBJECT.to_string()),
        interfaces: vec!["hotpluggable".to_string()],
        ..TypeInfo::default()
    });
    // inherits the interface through its parent
    registry.register(TypeInfo {
        name: "pci-bridge".to_string(),
        parent: Some("pci-device".to_string()),
        ..TypeInfo::default()
    });
    registry.register(TypeInfo {
        name: "sysbus-device".to_string(),
        parent: Some(TYPE_OBJECT.to_string()),
        ..TypeInfo::default()
    });

    let names: Vec<String> = registry
        .enumerate_types(Some("hotpluggable"), false)
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(names, vec!["pci-device".to_string(), "pci-bridge".to_string()]);
}

#[test]
fn test_tree_lifecycle_with_links() {
    let registry = device_registry();
    registry.register(TypeInfo {
        name: "bus".to_string(),
        parent: Some(TYPE_OBJECT.to_string()),
        ..TypeInfo::default()
    });

    let root = registry.root();
    let bus = registry.new_object("bus");
    let dev = registry.new_object("my-device");
    root.add_child("bus0", bus.clone()).unwrap();
    bus.add_child("dev0", dev.clone()).unwrap();

    bus.add_link(
        "primary",
        "my-device",
        LinkPolicy::Weak,
        Some(Box::new(|_, _, _| Ok(()))),
    )
    .unwrap();
    bus.set_property("primary", &json!("/bus0/dev0")).unwrap();
    let linked = bus.get_link("primary").unwrap().unwrap();
    assert!(Arc::ptr_eq(&linked, &dev));

    // tearing the device out of the tree releases the owning reference
    let probe = Arc::downgrade(&dev);
    drop(linked);
    drop(dev);
    registry.resolve_path("/bus0/dev0", None).unwrap().unparent();
    assert!(probe.upgrade().is_none());
    assert!(bus.get_link("primary").unwrap().is_none());

    // the bus itself is still where it was
    assert_eq!(bus.canonical_path(), "/bus0");
}
