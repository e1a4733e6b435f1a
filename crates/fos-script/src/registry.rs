//! Binding Registry
//!
//! Process-wide table of statically exported classes, enums, functions and
//! type interfaces. Populated before any environment exists; every
//! environment installs the exported entries into its VM at startup.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

use fos_reflect::Value;

use crate::bridge::TypeBridge;

/// Native function callable from script
pub type ExportedFn = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Hand-authored or reflected class export
#[derive(Clone)]
pub struct ExportedClass {
    pub name: String,
    pub super_name: Option<String>,
    /// Backed by reflection metadata; functions extend the native class
    pub reflected: bool,
    pub functions: Vec<(String, ExportedFn)>,
}

impl ExportedClass {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), super_name: None, reflected: false, functions: Vec::new() }
    }

    pub fn reflected(name: &str) -> Self {
        Self { reflected: true, ..Self::new(name) }
    }

    pub fn extends(mut self, super_name: &str) -> Self {
        self.super_name = Some(super_name.to_string());
        self
    }

    pub fn function<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.push((name.to_string(), Arc::new(f)));
        self
    }

    pub fn find_function(&self, name: &str) -> Option<ExportedFn> {
        self.functions.iter().find(|(n, _)| n == name).map(|(_, f)| f.clone())
    }
}

/// Exported enum
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedEnum {
    pub name: String,
    pub values: Vec<(String, i64)>,
}

#[derive(Default)]
struct Exports {
    reflected: HashMap<String, Arc<ExportedClass>>,
    non_reflected: HashMap<String, Arc<ExportedClass>>,
    enums: HashMap<String, Arc<ExportedEnum>>,
    functions: HashMap<String, ExportedFn>,
    types: HashMap<String, Arc<dyn TypeBridge>>,
    default_params: HashMap<(String, String), Vec<(String, Value)>>,
}

fn exports() -> &'static RwLock<Exports> {
    static EXPORTS: OnceLock<RwLock<Exports>> = OnceLock::new();
    EXPORTS.get_or_init(|| RwLock::new(Exports::default()))
}

fn read() -> RwLockReadGuard<'static, Exports> {
    exports().read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write() -> RwLockWriteGuard<'static, Exports> {
    exports().write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Registration (overwrites silently)
// ============================================================================

pub fn export_class(class: ExportedClass) {
    let mut exports = write();
    let class = Arc::new(class);
    if class.reflected {
        exports.reflected.insert(class.name.clone(), class);
    } else {
        exports.non_reflected.insert(class.name.clone(), class);
    }
}

pub fn export_enum(name: &str, values: &[(&str, i64)]) {
    let entry = ExportedEnum {
        name: name.to_string(),
        values: values.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
    };
    write().enums.insert(name.to_string(), Arc::new(entry));
}

pub fn export_function<F>(name: &str, f: F)
where
    F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
{
    write().functions.insert(name.to_string(), Arc::new(f));
}

pub fn add_type(name: &str, bridge: Arc<dyn TypeBridge>) {
    write().types.insert(name.to_string(), bridge);
}

/// Default values for trailing parameters of a reflected function
pub fn export_default_params(class: &str, function: &str, params: Vec<(String, Value)>) {
    write().default_params.insert((class.to_string(), function.to_string()), params);
}

// ============================================================================
// Queries
// ============================================================================

/// Reflected exports win over non-reflected ones of the same name
pub fn find_class(name: &str) -> Option<Arc<ExportedClass>> {
    let exports = read();
    exports.reflected.get(name).or_else(|| exports.non_reflected.get(name)).cloned()
}

pub fn find_reflected_class(name: &str) -> Option<Arc<ExportedClass>> {
    read().reflected.get(name).cloned()
}

pub fn find_enum(name: &str) -> Option<Arc<ExportedEnum>> {
    read().enums.get(name).cloned()
}

pub fn find_function(name: &str) -> Option<ExportedFn> {
    read().functions.get(name).cloned()
}

pub fn find_type(name: &str) -> Option<Arc<dyn TypeBridge>> {
    read().types.get(name).cloned()
}

pub fn default_params(class: &str, function: &str) -> Option<Vec<(String, Value)>> {
    read().default_params.get(&(class.to_string(), function.to_string())).cloned()
}

/// Non-reflected classes, sorted by name
pub fn non_reflected_classes() -> Vec<Arc<ExportedClass>> {
    let mut classes: Vec<_> = read().non_reflected.values().cloned().collect();
    classes.sort_by(|a, b| a.name.cmp(&b.name));
    classes
}

pub fn enums() -> Vec<Arc<ExportedEnum>> {
    let mut enums: Vec<_> = read().enums.values().cloned().collect();
    enums.sort_by(|a, b| a.name.cmp(&b.name));
    enums
}

pub fn functions() -> Vec<(String, ExportedFn)> {
    let mut functions: Vec<_> = read().functions.iter().map(|(n, f)| (n.clone(), f.clone())).collect();
    functions.sort_by(|a, b| a.0.cmp(&b.0));
    functions
}
