//! Native values and property kinds

use crate::{ClassId, ObjectHandle, ReflectError};

/// A native value crossing the reflection boundary
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Void,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Object(Option<ObjectHandle>),
    Struct(Vec<(String, Value)>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Object(_) => "object",
            Value::Struct(_) => "struct",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectHandle> {
        match self {
            Value::Object(h) => *h,
            _ => None,
        }
    }

    /// Look up a struct field by name
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Struct(fields) => fields.iter().find(|(n, _)| n == name).map(|(_, v)| v),
            _ => None,
        }
    }
}

/// Declared type of a property, parameter or array element
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKind {
    Bool,
    Int32,
    Int64,
    Float,
    Double,
    Name,
    Str,
    Object(Option<ClassId>),
    Struct(ClassId),
    Array(Box<PropertyKind>),
}

impl PropertyKind {
    pub fn type_name(&self) -> String {
        match self {
            PropertyKind::Bool => "bool".into(),
            PropertyKind::Int32 => "int32".into(),
            PropertyKind::Int64 => "int64".into(),
            PropertyKind::Float => "float".into(),
            PropertyKind::Double => "double".into(),
            PropertyKind::Name => "name".into(),
            PropertyKind::Str => "string".into(),
            PropertyKind::Object(_) => "object".into(),
            PropertyKind::Struct(class) => format!("struct#{}", class.0),
            PropertyKind::Array(inner) => format!("array<{}>", inner.type_name()),
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, PropertyKind::Array(_))
    }

    /// Zero value for scalar kinds
    pub fn default_value(&self) -> Value {
        match self {
            PropertyKind::Bool => Value::Bool(false),
            PropertyKind::Int32 | PropertyKind::Int64 => Value::Int(0),
            PropertyKind::Float | PropertyKind::Double => Value::Float(0.0),
            PropertyKind::Name | PropertyKind::Str => Value::Str(String::new()),
            PropertyKind::Object(_) => Value::Object(None),
            PropertyKind::Struct(_) => Value::Struct(Vec::new()),
            PropertyKind::Array(_) => Value::Void,
        }
    }

    /// Convert a value to this kind, rejecting lossy conversions
    pub fn coerce(&self, value: Value) -> Result<Value, ReflectError> {
        let mismatch = |v: &Value| ReflectError::TypeMismatch {
            expected: self.type_name(),
            got: v.type_name().to_string(),
        };
        match (self, value) {
            (PropertyKind::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (PropertyKind::Int32, Value::Int(i)) => {
                i32::try_from(i).map(|i| Value::Int(i as i64)).map_err(|_| mismatch(&Value::Int(i)))
            }
            (PropertyKind::Int64, Value::Int(i)) => Ok(Value::Int(i)),
            (PropertyKind::Int32 | PropertyKind::Int64, Value::Float(f)) if f.fract() == 0.0 => {
                self.coerce(Value::Int(f as i64))
            }
            (PropertyKind::Float | PropertyKind::Double, v @ (Value::Float(_) | Value::Int(_))) => {
                Ok(Value::Float(v.as_float().unwrap_or_default()))
            }
            (PropertyKind::Name | PropertyKind::Str, Value::Str(s)) => Ok(Value::Str(s)),
            (PropertyKind::Object(_), Value::Object(h)) => Ok(Value::Object(h)),
            (PropertyKind::Object(_), Value::Void) => Ok(Value::Object(None)),
            (PropertyKind::Struct(_), Value::Struct(fields)) => Ok(Value::Struct(fields)),
            (_, v) => Err(mismatch(&v)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_numbers() {
        assert_eq!(PropertyKind::Int32.coerce(Value::Float(3.0)).unwrap(), Value::Int(3));
        assert!(PropertyKind::Int32.coerce(Value::Float(3.5)).is_err());
        assert!(PropertyKind::Int32.coerce(Value::Int(i64::MAX)).is_err());
        assert_eq!(PropertyKind::Double.coerce(Value::Int(2)).unwrap(), Value::Float(2.0));
    }

    #[test]
    fn test_coerce_mismatch() {
        match PropertyKind::Bool.coerce(Value::Str("x".into())) {
            Err(ReflectError::TypeMismatch { expected, got }) => {
                assert_eq!(expected, "bool");
                assert_eq!(got, "string");
            }
            _ => panic!("Expected type mismatch"),
        }
    }

    #[test]
    fn test_object_accepts_void() {
        assert_eq!(PropertyKind::Object(None).coerce(Value::Void).unwrap(), Value::Object(None));
    }
}
