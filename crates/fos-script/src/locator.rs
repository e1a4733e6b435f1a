//! Module locators
//!
//! Decide which script module an object binds to. An empty name means
//! the object stays native-only.

use std::cell::RefCell;
use std::collections::HashMap;

use fos_reflect::{ClassId, ObjectFlags, ObjectHandle, ObjectSystem};

pub trait ModuleLocator {
    fn locate(&self, system: &ObjectSystem, object: ObjectHandle) -> String;
}

/// Module name reported by the class's script-binding interface
#[derive(Debug, Default)]
pub struct InterfaceLocator;

impl ModuleLocator for InterfaceLocator {
    fn locate(&self, system: &ObjectSystem, object: ObjectHandle) -> String {
        let Some(class) = system.object_class(object) else {
            return String::new();
        };
        // Interface answers come from the default object; not usable until it is initialized
        if let Some(cdo) = system.class_default_object(class) {
            if system.object_flags(cdo).contains(ObjectFlags::NEED_INITIALIZATION) {
                return String::new();
            }
        }
        system.with_class(class, |c| c.module_name.clone()).flatten().unwrap_or_default()
    }
}

/// Module name derived from where the class lives
#[derive(Debug, Default)]
pub struct PackageLocator {
    cache: RefCell<HashMap<ClassId, String>>,
}

impl PackageLocator {
    pub fn new() -> Self { Self::default() }

    pub fn clear_cache(&self) {
        self.cache.borrow_mut().clear();
    }
}

impl ModuleLocator for PackageLocator {
    fn locate(&self, system: &ObjectSystem, object: ObjectHandle) -> String {
        let Some(class) = system.object_class(object) else {
            return String::new();
        };
        if let Some(name) = self.cache.borrow().get(&class) {
            return name.clone();
        }
        let name = system
            .with_class(class, |c| if c.is_native() { c.name.clone() } else { package_module_name(&c.package) })
            .unwrap_or_default();
        self.cache.borrow_mut().insert(class, name.clone());
        name
    }
}

/// `/Game/Blueprints/BP_Actor` -> `Blueprints.BP_Actor`.
///
/// The root segment is stripped before separators are substituted, so a
/// single-segment path yields an empty name.
pub fn package_module_name(package: &str) -> String {
    let trimmed = package.trim_start_matches('/');
    match trimmed.split_once('/') {
        Some((_, rest)) => rest.trim_end_matches('/').replace('/', "."),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fos_reflect::ClassBuilder;

    #[test]
    fn test_package_module_name() {
        assert_eq!(package_module_name("/Game/Blueprints/BP_Actor"), "Blueprints.BP_Actor");
        assert_eq!(package_module_name("/Game/BP_Hero"), "BP_Hero");
        assert_eq!(package_module_name("/Game/A/B/C"), "A.B.C");
    }

    #[test]
    fn test_single_segment_path() {
        assert_eq!(package_module_name("/Game"), "");
        assert_eq!(package_module_name("/Game/"), "");
        assert_eq!(package_module_name(""), "");
    }

    #[test]
    fn test_package_locator() {
        let system = ObjectSystem::new();
        let native = system.define_class(ClassBuilder::new("Actor")).unwrap();
        let asset = system
            .define_class(ClassBuilder::new("BP_Door_C").extends(native).package("/Game/Level/BP_Door"))
            .unwrap();
        let locator = PackageLocator::new();

        let a = system.new_object(native, "").unwrap();
        let d = system.new_object(asset, "").unwrap();
        assert_eq!(locator.locate(&system, a), "Actor");
        assert_eq!(locator.locate(&system, d), "Level.BP_Door");
        assert_eq!(locator.locate(&system, d), "Level.BP_Door");
    }

    #[test]
    fn test_interface_locator() {
        let system = ObjectSystem::new();
        let plain = system.define_class(ClassBuilder::new("Plain")).unwrap();
        let bound = system.define_class(ClassBuilder::new("Door").script_module("Game.Door")).unwrap();
        let locator = InterfaceLocator;

        assert_eq!(locator.locate(&system, system.new_object(plain, "").unwrap()), "");
        let door = system.new_object(bound, "").unwrap();
        assert_eq!(locator.locate(&system, door), "Game.Door");

        let cdo = system.class_default_object(bound).unwrap();
        system.set_object_flags(cdo, ObjectFlags::CLASS_DEFAULT | ObjectFlags::NEED_INITIALIZATION);
        assert_eq!(locator.locate(&system, door), "");
    }
}
