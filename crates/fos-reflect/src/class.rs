//! Class definitions

use std::collections::HashMap;
use std::rc::Rc;

use crate::host::CallFrame;
use crate::{ClassFlags, ClassId, FunctionFlags, FunctionId, NativeFn, ObjectHandle, ParamDef, PropertyKind, ReflectError, Value};

/// Declared property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyKind,
}

/// Reflected class
#[derive(Debug, Clone)]
pub struct ClassDef {
    pub name: String,
    pub super_class: Option<ClassId>,
    pub flags: ClassFlags,
    /// Outermost package path, e.g. `/Game/Blueprints/BP_Actor`
    pub package: String,
    /// Module name reported by the script-binding interface
    pub module_name: Option<String>,
    /// Own properties (super class properties come first in instances)
    pub properties: Vec<PropertyDef>,
    /// Name -> function lookup for this class only
    pub function_map: HashMap<String, FunctionId>,
    /// Every function owned by this class, in link order
    pub children: Vec<FunctionId>,
    pub default_object: Option<ObjectHandle>,
}

impl ClassDef {
    pub fn implements_script_interface(&self) -> bool {
        self.module_name.is_some()
    }

    pub fn is_native(&self) -> bool {
        self.flags.contains(ClassFlags::NATIVE)
    }
}

pub(crate) struct FunctionSpec {
    pub name: String,
    pub flags: FunctionFlags,
    pub params: Vec<ParamDef>,
    pub return_kind: Option<PropertyKind>,
    pub native: Option<NativeFn>,
    pub body: Vec<u8>,
}

/// Builder for [`ClassDef`]
pub struct ClassBuilder {
    pub(crate) name: String,
    pub(crate) super_class: Option<ClassId>,
    pub(crate) flags: ClassFlags,
    pub(crate) package: String,
    pub(crate) module_name: Option<String>,
    pub(crate) properties: Vec<PropertyDef>,
    pub(crate) functions: Vec<FunctionSpec>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            super_class: None,
            flags: ClassFlags::NATIVE,
            package: "/Script/Engine".to_string(),
            module_name: None,
            properties: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn extends(mut self, super_class: ClassId) -> Self {
        self.super_class = Some(super_class);
        self
    }

    pub fn flags(mut self, flags: ClassFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Mark as an asset class living in `package` (clears NATIVE)
    pub fn package(mut self, package: &str) -> Self {
        self.package = package.to_string();
        self.flags.remove(ClassFlags::NATIVE);
        self
    }

    /// Implement the script-binding interface, reporting `module`
    pub fn script_module(mut self, module: &str) -> Self {
        self.module_name = Some(module.to_string());
        self
    }

    pub fn property(mut self, name: &str, kind: PropertyKind) -> Self {
        self.properties.push(PropertyDef { name: name.to_string(), kind });
        self
    }

    /// Native function without declared parameters
    pub fn function<F>(self, name: &str, flags: FunctionFlags, f: F) -> Self
    where
        F: Fn(&CallFrame<'_>) -> Result<Value, ReflectError> + 'static,
    {
        self.function_with(name, flags, Vec::new(), None, f)
    }

    pub fn function_with<F>(
        mut self,
        name: &str,
        flags: FunctionFlags,
        params: Vec<ParamDef>,
        return_kind: Option<PropertyKind>,
        f: F,
    ) -> Self
    where
        F: Fn(&CallFrame<'_>) -> Result<Value, ReflectError> + 'static,
    {
        self.functions.push(FunctionSpec {
            name: name.to_string(),
            flags,
            params,
            return_kind,
            native: Some(Rc::new(f)),
            body: Vec::new(),
        });
        self
    }

    /// Event implemented only by an opaque body (no native entry)
    pub fn event(mut self, name: &str, flags: FunctionFlags, body: &[u8]) -> Self {
        self.functions.push(FunctionSpec {
            name: name.to_string(),
            flags,
            params: Vec::new(),
            return_kind: None,
            native: None,
            body: body.to_vec(),
        });
        self
    }
}
