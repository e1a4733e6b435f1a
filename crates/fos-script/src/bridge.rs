//! Type bridges
//!
//! Type-erased operations over raw element bytes. Containers and parameter
//! marshalling only ever talk to a `TypeBridge`, never to a concrete type.

use std::sync::Arc;

use fos_reflect::{ClassFlags, ClassId, Name, ObjectHandle, ObjectSystem, PropertyKind, Value};

use crate::error::{BridgeError, ScriptError};
use crate::registry;

/// Operations for one element type
pub trait TypeBridge: Send + Sync {
    fn name(&self) -> String;

    fn size(&self) -> usize;

    fn alignment(&self) -> usize;

    /// Construct a default value in `dest`
    fn initialize(&self, dest: &mut [u8]) {
        dest.fill(0);
    }

    fn destruct(&self, dest: &mut [u8]) {
        dest.fill(0);
    }

    /// Deep copy of `src` into already-constructed `dest`
    fn copy(&self, dest: &mut [u8], src: &[u8]) {
        dest.copy_from_slice(src);
    }

    fn identical(&self, a: &[u8], b: &[u8]) -> bool {
        a == b
    }

    fn read(&self, src: &[u8]) -> Value;

    fn write(&self, dest: &mut [u8], value: &Value) -> Result<(), BridgeError>;
}

pub(crate) fn align_up(offset: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        offset
    } else {
        offset.div_ceil(alignment) * alignment
    }
}

fn mismatch(expected: &str, value: &Value) -> BridgeError {
    BridgeError { expected: expected.to_string(), got: value.type_name().to_string() }
}

fn fixed<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut bytes = [0u8; N];
    bytes.copy_from_slice(&src[..N]);
    bytes
}

/// Plain scalar kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Bool,
    Int32,
    Int64,
    Float,
    Double,
}

#[derive(Debug, Clone, Copy)]
pub struct ScalarBridge(pub Scalar);

impl TypeBridge for ScalarBridge {
    fn name(&self) -> String {
        match self.0 {
            Scalar::Bool => "bool",
            Scalar::Int32 => "int32",
            Scalar::Int64 => "int64",
            Scalar::Float => "float",
            Scalar::Double => "double",
        }
        .to_string()
    }

    fn size(&self) -> usize {
        match self.0 {
            Scalar::Bool => 1,
            Scalar::Int32 | Scalar::Float => 4,
            Scalar::Int64 | Scalar::Double => 8,
        }
    }

    fn alignment(&self) -> usize {
        self.size()
    }

    fn identical(&self, a: &[u8], b: &[u8]) -> bool {
        match self.0 {
            // NaN != NaN, like the native comparison
            Scalar::Float => f32::from_ne_bytes(fixed(a)) == f32::from_ne_bytes(fixed(b)),
            Scalar::Double => f64::from_ne_bytes(fixed(a)) == f64::from_ne_bytes(fixed(b)),
            _ => a == b,
        }
    }

    fn read(&self, src: &[u8]) -> Value {
        match self.0 {
            Scalar::Bool => Value::Bool(src[0] != 0),
            Scalar::Int32 => Value::Int(i32::from_ne_bytes(fixed(src)) as i64),
            Scalar::Int64 => Value::Int(i64::from_ne_bytes(fixed(src))),
            Scalar::Float => Value::Float(f32::from_ne_bytes(fixed(src)) as f64),
            Scalar::Double => Value::Float(f64::from_ne_bytes(fixed(src))),
        }
    }

    fn write(&self, dest: &mut [u8], value: &Value) -> Result<(), BridgeError> {
        match (self.0, value) {
            (Scalar::Bool, Value::Bool(b)) => dest[0] = *b as u8,
            (Scalar::Int32, Value::Int(i)) => {
                let i = i32::try_from(*i).map_err(|_| mismatch("int32", value))?;
                dest.copy_from_slice(&i.to_ne_bytes());
            }
            (Scalar::Int64, Value::Int(i)) => dest.copy_from_slice(&i.to_ne_bytes()),
            (Scalar::Float, v @ (Value::Float(_) | Value::Int(_))) => {
                dest.copy_from_slice(&(v.as_float().unwrap_or_default() as f32).to_ne_bytes())
            }
            (Scalar::Double, v @ (Value::Float(_) | Value::Int(_))) => {
                dest.copy_from_slice(&v.as_float().unwrap_or_default().to_ne_bytes())
            }
            (Scalar::Int32 | Scalar::Int64, Value::Float(f)) if f.fract() == 0.0 => {
                return self.write(dest, &Value::Int(*f as i64));
            }
            _ => return Err(mismatch(&self.name(), value)),
        }
        Ok(())
    }
}

/// Interned names stored as their 32-bit id
#[derive(Debug, Clone, Copy)]
pub struct NameBridge;

impl TypeBridge for NameBridge {
    fn name(&self) -> String {
        "name".to_string()
    }

    fn size(&self) -> usize {
        4
    }

    fn alignment(&self) -> usize {
        4
    }

    fn read(&self, src: &[u8]) -> Value {
        Value::Str(Name::from_id(u32::from_ne_bytes(fixed(src))).as_string())
    }

    fn write(&self, dest: &mut [u8], value: &Value) -> Result<(), BridgeError> {
        let s = value.as_str().ok_or_else(|| mismatch("name", value))?;
        dest.copy_from_slice(&Name::new(s).id().to_ne_bytes());
        Ok(())
    }
}

/// Object references stored as a generational handle
#[derive(Debug, Clone, Copy)]
pub struct ObjectBridge;

impl ObjectBridge {
    fn store(dest: &mut [u8], handle: ObjectHandle) {
        dest[..4].copy_from_slice(&handle.index.to_ne_bytes());
        dest[4..8].copy_from_slice(&handle.generation.to_ne_bytes());
    }
}

impl TypeBridge for ObjectBridge {
    fn name(&self) -> String {
        "object".to_string()
    }

    fn size(&self) -> usize {
        8
    }

    fn alignment(&self) -> usize {
        4
    }

    fn initialize(&self, dest: &mut [u8]) {
        Self::store(dest, ObjectHandle::NULL);
    }

    fn destruct(&self, dest: &mut [u8]) {
        Self::store(dest, ObjectHandle::NULL);
    }

    fn read(&self, src: &[u8]) -> Value {
        let handle = ObjectHandle {
            index: u32::from_ne_bytes(fixed(&src[..4])),
            generation: u32::from_ne_bytes(fixed(&src[4..8])),
        };
        Value::Object(if handle.is_null() { None } else { Some(handle) })
    }

    fn write(&self, dest: &mut [u8], value: &Value) -> Result<(), BridgeError> {
        match value {
            Value::Object(h) => Self::store(dest, h.unwrap_or(ObjectHandle::NULL)),
            Value::Void => Self::store(dest, ObjectHandle::NULL),
            _ => return Err(mismatch("object", value)),
        }
        Ok(())
    }
}

/// Field of a struct layout
pub struct StructField {
    pub name: String,
    pub offset: usize,
    pub bridge: Arc<dyn TypeBridge>,
}

/// Struct composed of bridged fields at aligned offsets
pub struct StructBridge {
    name: String,
    size: usize,
    alignment: usize,
    fields: Vec<StructField>,
}

impl StructBridge {
    /// Lay out the properties of a struct class
    pub fn from_class(system: &ObjectSystem, class: ClassId) -> Result<Self, ScriptError> {
        let name = system.class_name(class).ok_or_else(|| ScriptError::UnknownType(format!("#{}", class.index())))?;
        if !system.class_flags(class).contains(ClassFlags::STRUCT) {
            return Err(ScriptError::UnknownType(name));
        }

        let mut fields = Vec::new();
        let mut offset = 0;
        let mut alignment = 1;
        for property in system.instance_properties(class) {
            let bridge = bridge_for_kind(system, &property.kind)?;
            offset = align_up(offset, bridge.alignment());
            alignment = alignment.max(bridge.alignment());
            let size = bridge.size();
            fields.push(StructField { name: property.name, offset, bridge });
            offset += size;
        }

        Ok(Self { name, size: align_up(offset, alignment), alignment, fields })
    }

    pub fn fields(&self) -> &[StructField] {
        &self.fields
    }
}

impl TypeBridge for StructBridge {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn size(&self) -> usize {
        self.size
    }

    fn alignment(&self) -> usize {
        self.alignment
    }

    fn initialize(&self, dest: &mut [u8]) {
        dest.fill(0);
        for field in &self.fields {
            field.bridge.initialize(&mut dest[field.offset..field.offset + field.bridge.size()]);
        }
    }

    fn destruct(&self, dest: &mut [u8]) {
        for field in &self.fields {
            field.bridge.destruct(&mut dest[field.offset..field.offset + field.bridge.size()]);
        }
    }

    fn copy(&self, dest: &mut [u8], src: &[u8]) {
        for field in &self.fields {
            let range = field.offset..field.offset + field.bridge.size();
            field.bridge.copy(&mut dest[range.clone()], &src[range]);
        }
    }

    fn identical(&self, a: &[u8], b: &[u8]) -> bool {
        self.fields.iter().all(|field| {
            let range = field.offset..field.offset + field.bridge.size();
            field.bridge.identical(&a[range.clone()], &b[range])
        })
    }

    fn read(&self, src: &[u8]) -> Value {
        Value::Struct(
            self.fields
                .iter()
                .map(|f| (f.name.clone(), f.bridge.read(&src[f.offset..f.offset + f.bridge.size()])))
                .collect(),
        )
    }

    /// Fields missing from `value` keep their current contents
    fn write(&self, dest: &mut [u8], value: &Value) -> Result<(), BridgeError> {
        if !matches!(value, Value::Struct(_)) {
            return Err(mismatch(&self.name, value));
        }
        for field in &self.fields {
            if let Some(v) = value.field(&field.name) {
                field.bridge.write(&mut dest[field.offset..field.offset + field.bridge.size()], v)?;
            }
        }
        Ok(())
    }
}

/// Bridge for a declared kind. Kinds without a fixed layout are rejected.
pub fn bridge_for_kind(system: &ObjectSystem, kind: &PropertyKind) -> Result<Arc<dyn TypeBridge>, ScriptError> {
    let bridge: Arc<dyn TypeBridge> = match kind {
        PropertyKind::Bool => Arc::new(ScalarBridge(Scalar::Bool)),
        PropertyKind::Int32 => Arc::new(ScalarBridge(Scalar::Int32)),
        PropertyKind::Int64 => Arc::new(ScalarBridge(Scalar::Int64)),
        PropertyKind::Float => Arc::new(ScalarBridge(Scalar::Float)),
        PropertyKind::Double => Arc::new(ScalarBridge(Scalar::Double)),
        PropertyKind::Name => Arc::new(NameBridge),
        PropertyKind::Object(_) => Arc::new(ObjectBridge),
        PropertyKind::Struct(class) => Arc::new(StructBridge::from_class(system, *class)?),
        PropertyKind::Str | PropertyKind::Array(_) => return Err(ScriptError::UnknownType(kind.type_name())),
    };
    Ok(bridge)
}

/// Bridge for a type name: builtin scalars, registered type interfaces,
/// then struct classes.
pub fn bridge_by_name(system: &ObjectSystem, name: &str) -> Result<Arc<dyn TypeBridge>, ScriptError> {
    let builtin = match name {
        "bool" => Some(PropertyKind::Bool),
        "int32" | "int" => Some(PropertyKind::Int32),
        "int64" => Some(PropertyKind::Int64),
        "float" => Some(PropertyKind::Float),
        "double" => Some(PropertyKind::Double),
        "name" => Some(PropertyKind::Name),
        "object" => Some(PropertyKind::Object(None)),
        _ => None,
    };
    if let Some(kind) = builtin {
        return bridge_for_kind(system, &kind);
    }
    if let Some(bridge) = registry::find_type(name) {
        return Ok(bridge);
    }
    match system.find_class(name) {
        Some(class) => Ok(Arc::new(StructBridge::from_class(system, class)?)),
        None => Err(ScriptError::UnknownType(name.to_string())),
    }
}
