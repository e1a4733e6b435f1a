//! Class descriptors
//!
//! Script-side view of a reflected class or struct: lazily populated field
//! table, inheritance chain and default parameters. Descriptors survive
//! class invalidation; they unload and re-resolve by name on next use.

use std::collections::HashMap;

use fos_reflect::{ClassFlags, ClassId, FunctionId, ObjectSystem, ParamDef, PropertyKind, Value};

use crate::bridge::{StructBridge, TypeBridge};
use crate::registry;

/// Bytes in front of a native value embedded in a script-side block
const USERDATA_HEADER: usize = 8;

/// Padding that aligns a value placed after the userdata header
pub fn userdata_padding(alignment: usize) -> usize {
    if alignment == 0 || USERDATA_HEADER % alignment == 0 {
        0
    } else {
        alignment - USERDATA_HEADER % alignment
    }
}

/// Field lookup result.
///
/// `index > 0` is property `index - 1`; `index < 0` is function `-index - 1`
/// of the owning descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDesc {
    pub owner: String,
    pub index: i32,
}

impl FieldDesc {
    pub fn is_property(&self) -> bool {
        self.index > 0
    }

    pub fn is_function(&self) -> bool {
        self.index < 0
    }
}

#[derive(Debug, Clone)]
pub struct PropertyDesc {
    pub name: String,
    pub kind: PropertyKind,
}

#[derive(Debug, Clone)]
pub struct FunctionDesc {
    pub name: String,
    pub function: FunctionId,
    pub params: Vec<ParamDef>,
    pub defaults: Vec<(String, Value)>,
}

impl FunctionDesc {
    /// Append defaults for trailing parameters the caller left out
    pub fn fill_defaults(&self, args: &mut Vec<Value>) {
        for param in self.params.iter().skip(args.len()) {
            match self.defaults.iter().find(|(name, _)| *name == param.name) {
                Some((_, value)) => args.push(value.clone()),
                None => break,
            }
        }
    }
}

#[derive(Debug)]
pub struct ClassDescriptor {
    name: String,
    class: Option<ClassId>,
    pub is_struct: bool,
    pub is_class: bool,
    pub is_interface: bool,
    pub is_native: bool,
    pub size: usize,
    pub padding: usize,
    supers: Vec<String>,
    fields: HashMap<String, Option<FieldDesc>>,
    properties: Vec<PropertyDesc>,
    functions: Vec<FunctionDesc>,
}

impl ClassDescriptor {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            class: None,
            is_struct: false,
            is_class: false,
            is_interface: false,
            is_native: false,
            size: 0,
            padding: 0,
            supers: Vec::new(),
            fields: HashMap::new(),
            properties: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn class(&self) -> Option<ClassId> {
        self.class
    }

    pub fn supers(&self) -> &[String] {
        &self.supers
    }

    pub fn is_loaded(&self) -> bool {
        self.class.is_some()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Make sure the native class is resolved; re-resolves by name after
    /// an unload or when the class was replaced by a newer version.
    pub fn load(&mut self, system: &ObjectSystem) -> bool {
        if let Some(class) = self.class {
            if system.is_class_valid(class) && !system.class_flags(class).contains(ClassFlags::NEWER_VERSION_EXISTS) {
                return true;
            }
        }
        self.unload();

        let stripped = match self.name.chars().next() {
            Some('U' | 'A' | 'F') if self.name.len() > 1 => Some(&self.name[1..]),
            _ => None,
        };
        let found = system.find_class(&self.name).or_else(|| stripped.and_then(|n| system.find_class(n)));
        let Some(class) = found else {
            return false;
        };

        let flags = system.class_flags(class);
        self.class = Some(class);
        self.is_struct = flags.contains(ClassFlags::STRUCT);
        self.is_class = !self.is_struct;
        self.is_interface = flags.contains(ClassFlags::INTERFACE);
        self.is_native = flags.contains(ClassFlags::NATIVE);
        if self.is_struct {
            if let Ok(layout) = StructBridge::from_class(system, class) {
                self.size = layout.size();
                self.padding = userdata_padding(layout.alignment());
            }
        } else {
            self.size = std::mem::size_of::<fos_reflect::ObjectHandle>();
            self.padding = 0;
        }
        true
    }

    /// Forget the native class and every memoized field
    pub fn unload(&mut self) {
        self.class = None;
        self.fields.clear();
        self.properties.clear();
        self.functions.clear();
    }

    pub fn property(&self, index: i32) -> Option<&PropertyDesc> {
        if index <= 0 {
            return None;
        }
        self.properties.get(index as usize - 1)
    }

    pub fn function(&self, index: i32) -> Option<&FunctionDesc> {
        if index >= 0 {
            return None;
        }
        self.functions.get((-index) as usize - 1)
    }
}

/// Per-environment descriptor table
#[derive(Debug, Default)]
pub struct ClassRegistry {
    descs: HashMap<String, ClassDescriptor>,
}

impl ClassRegistry {
    pub fn new() -> Self { Self::default() }

    /// Descriptor for `class` (and its super chain), created on first use
    pub fn register(&mut self, system: &ObjectSystem, class: ClassId) -> Option<String> {
        let name = system.class_name(class)?;
        if !self.descs.contains_key(&name) {
            let mut desc = ClassDescriptor::new(&name);
            let mut current = system.super_class(class);
            while let Some(c) = current {
                if let Some(super_name) = system.class_name(c) {
                    desc.supers.push(super_name);
                }
                current = system.super_class(c);
            }
            desc.load(system);
            self.descs.insert(name.clone(), desc);
        }
        Some(name)
    }

    pub fn register_by_name(&mut self, system: &ObjectSystem, name: &str) -> Option<String> {
        let class = system.find_class(name)?;
        self.register(system, class)
    }

    pub fn find(&self, name: &str) -> Option<&ClassDescriptor> {
        self.descs.get(name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut ClassDescriptor> {
        self.descs.get_mut(name)
    }

    /// Resolve `field` on `class`. Fields declared by a super class are
    /// registered on that class's descriptor.
    pub fn register_field(&mut self, system: &ObjectSystem, class: ClassId, field: &str) -> Option<FieldDesc> {
        let name = self.register(system, class)?;
        let desc = self.descs.get_mut(&name)?;
        if !desc.load(system) {
            return None;
        }
        if let Some(memo) = desc.fields.get(field) {
            return memo.clone();
        }
        let class = desc.class?;

        let owner = match system.find_property(class, field) {
            Some(_) => property_owner(system, class, field),
            None => system.find_function(class, field).and_then(|f| system.with_function(f, |def| def.owner)),
        };
        let Some(owner) = owner else {
            desc.fields.insert(field.to_string(), None);
            return None;
        };

        if owner != class {
            let resolved = self.register_field(system, owner, field);
            if let Some(desc) = self.descs.get_mut(&name) {
                desc.fields.insert(field.to_string(), resolved.clone());
            }
            return resolved;
        }

        let desc = self.descs.get_mut(&name)?;
        let index = if let Some((_, property)) = system.find_property(class, field) {
            desc.properties.push(PropertyDesc { name: property.name, kind: property.kind });
            desc.properties.len() as i32
        } else {
            let function = system.find_function(class, field)?;
            let params = system.with_function(function, |f| f.params.clone()).unwrap_or_default();
            let defaults = registry::default_params(&name, field).unwrap_or_default();
            desc.functions.push(FunctionDesc { name: field.to_string(), function, params, defaults });
            -(desc.functions.len() as i32)
        };
        let field_desc = FieldDesc { owner: name, index };
        desc.fields.insert(field.to_string(), Some(field_desc.clone()));
        Some(field_desc)
    }

    pub fn property(&self, field: &FieldDesc) -> Option<&PropertyDesc> {
        self.descs.get(&field.owner)?.property(field.index)
    }

    pub fn function(&self, field: &FieldDesc) -> Option<&FunctionDesc> {
        self.descs.get(&field.owner)?.function(field.index)
    }

    /// Unload every descriptor resolved to `class`
    pub fn unload_class(&mut self, class: ClassId) {
        for desc in self.descs.values_mut() {
            if desc.class == Some(class) {
                desc.unload();
            }
        }
    }

    pub fn clear(&mut self) {
        self.descs.clear();
    }
}

fn property_owner(system: &ObjectSystem, class: ClassId, field: &str) -> Option<ClassId> {
    let mut current = Some(class);
    while let Some(c) = current {
        let own = system.with_class(c, |def| def.properties.iter().any(|p| p.name == field)).unwrap_or(false);
        if own {
            return Some(c);
        }
        current = system.super_class(c);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use fos_reflect::{ClassBuilder, FunctionFlags};

    fn setup() -> (ObjectSystem, ClassId, ClassId) {
        let system = ObjectSystem::new();
        let actor = system
            .define_class(
                ClassBuilder::new("Actor")
                    .property("Health", PropertyKind::Int32)
                    .function_with(
                        "Fire",
                        FunctionFlags::NATIVE,
                        vec![ParamDef::new("Count", PropertyKind::Int32), ParamDef::new("Power", PropertyKind::Float)],
                        None,
                        |frame| Ok(frame.arg(0).clone()),
                    ),
            )
            .unwrap();
        let hero = system
            .define_class(ClassBuilder::new("Hero").extends(actor).property("Mana", PropertyKind::Int32))
            .unwrap();
        (system, actor, hero)
    }

    #[test]
    fn test_signed_field_index() {
        let (system, _, hero) = setup();
        let mut registry = ClassRegistry::new();

        let mana = registry.register_field(&system, hero, "Mana").unwrap();
        assert!(mana.is_property());
        assert_eq!(mana.owner, "Hero");

        let fire = registry.register_field(&system, hero, "Fire").unwrap();
        assert!(fire.is_function());
        assert_eq!(fire.owner, "Actor");
        assert_eq!(registry.function(&fire).unwrap().name, "Fire");

        let health = registry.register_field(&system, hero, "Health").unwrap();
        assert_eq!(health.owner, "Actor");
        assert_eq!(registry.property(&health).unwrap().kind, PropertyKind::Int32);

        assert!(registry.register_field(&system, hero, "Nope").is_none());
        assert_eq!(registry.find("Hero").unwrap().supers(), &["Actor".to_string()]);
    }

    #[test]
    fn test_memoized() {
        let (system, actor, _) = setup();
        let mut registry = ClassRegistry::new();
        let a = registry.register_field(&system, actor, "Health").unwrap();
        let b = registry.register_field(&system, actor, "Health").unwrap();
        assert_eq!(a, b);
        assert_eq!(registry.find("Actor").unwrap().field_count(), 1);
    }

    #[test]
    fn test_unload_and_reload_by_name() {
        let (system, actor, _) = setup();
        let mut registry = ClassRegistry::new();
        registry.register_field(&system, actor, "Health").unwrap();

        system.destroy_class(actor);
        registry.unload_class(actor);
        assert!(!registry.find("Actor").unwrap().is_loaded());

        let actor2 = system.define_class(ClassBuilder::new("Actor").property("Shield", PropertyKind::Int32)).unwrap();
        let desc = registry.find_mut("Actor").unwrap();
        assert!(desc.load(&system));
        assert_eq!(desc.class(), Some(actor2));
        let shield = registry.register_field(&system, actor2, "Shield").unwrap();
        assert!(shield.is_property());
    }

    #[test]
    fn test_prefixed_name_resolves() {
        let (system, _, _) = setup();
        let mut desc = ClassDescriptor::new("AActor");
        assert!(desc.load(&system));
        assert!(desc.is_class);
        assert!(desc.is_native);
    }

    #[test]
    fn test_defaults_fill() {
        let (system, actor, _) = setup();
        let desc = FunctionDesc {
            name: "Fire".into(),
            function: system.find_function(actor, "Fire").unwrap(),
            params: vec![ParamDef::new("Count", PropertyKind::Int32), ParamDef::new("Power", PropertyKind::Float)],
            defaults: vec![("Power".into(), Value::Float(1.0))],
        };
        let mut args = vec![Value::Int(2)];
        desc.fill_defaults(&mut args);
        assert_eq!(args, vec![Value::Int(2), Value::Float(1.0)]);

        let mut none = Vec::new();
        desc.fill_defaults(&mut none);
        assert!(none.is_empty());
    }

    #[test]
    fn test_padding() {
        assert_eq!(userdata_padding(4), 0);
        assert_eq!(userdata_padding(8), 0);
        assert_eq!(userdata_padding(16), 8);
        assert_eq!(userdata_padding(0), 0);
    }
}
