//! Value marshalling between native values and script values

use std::fmt::Write;

use fos_reflect::{ObjectHandle, Value};
use rquickjs::{Ctx, Object};

pub type JsValue<'js> = rquickjs::Value<'js>;

/// Type name as scripts see it
pub fn js_type_name(value: &JsValue<'_>) -> &'static str {
    if value.is_undefined() {
        "undefined"
    } else if value.is_null() {
        "null"
    } else if value.is_bool() {
        "boolean"
    } else if value.is_number() {
        "number"
    } else if value.is_string() {
        "string"
    } else if value.is_function() {
        "function"
    } else if value.is_array() {
        "array"
    } else if value.is_object() {
        "object"
    } else {
        "unknown"
    }
}

/// Handle carried by a bound object proxy
pub fn object_handle(value: &JsValue<'_>) -> Option<ObjectHandle> {
    let object = value.as_object()?;
    let index: Option<f64> = object.get("__idx").ok()?;
    let generation: Option<f64> = object.get("__gen").ok()?;
    Some(ObjectHandle { index: index? as u32, generation: generation? as u32 })
}

/// Native value to script value; `wrap` turns handles into proxies
pub fn to_js<'js>(
    ctx: &Ctx<'js>,
    value: &Value,
    wrap: &mut dyn FnMut(ObjectHandle) -> rquickjs::Result<JsValue<'js>>,
) -> rquickjs::Result<JsValue<'js>> {
    Ok(match value {
        Value::Void => JsValue::new_undefined(ctx.clone()),
        Value::Bool(b) => JsValue::new_bool(ctx.clone(), *b),
        Value::Int(i) => match i32::try_from(*i) {
            Ok(small) => JsValue::new_int(ctx.clone(), small),
            Err(_) => JsValue::new_float(ctx.clone(), *i as f64),
        },
        Value::Float(f) => JsValue::new_float(ctx.clone(), *f),
        Value::Str(s) => rquickjs::String::from_str(ctx.clone(), s)?.into_value(),
        Value::Object(None) => JsValue::new_null(ctx.clone()),
        Value::Object(Some(handle)) => wrap(*handle)?,
        Value::Struct(fields) => {
            let object = Object::new(ctx.clone())?;
            for (name, field) in fields {
                object.set(name.as_str(), to_js(ctx, field, wrap)?)?;
            }
            object.into_value()
        }
    })
}

/// Deepest plain-object nesting converted to a struct
pub const MAX_DEPTH: usize = 32;

/// Most struct fields one conversion produces, across all levels
pub const MAX_FIELDS: usize = 65_536;

/// Script value to native value.
///
/// Object proxies become handles, plain objects become structs with their
/// own enumerable fields; functions and symbols have no native form.
/// Cyclic, too deep or too large objects are a conversion error.
pub fn from_js(value: &JsValue<'_>) -> rquickjs::Result<Value> {
    let mut fields = MAX_FIELDS;
    convert(value, 0, &mut fields)
}

fn convert(value: &JsValue<'_>, depth: usize, fields_left: &mut usize) -> rquickjs::Result<Value> {
    if value.is_undefined() {
        return Ok(Value::Void);
    }
    if value.is_null() {
        return Ok(Value::Object(None));
    }
    if let Some(b) = value.as_bool() {
        return Ok(Value::Bool(b));
    }
    if let Some(i) = value.as_int() {
        return Ok(Value::Int(i as i64));
    }
    if let Some(f) = value.as_float() {
        return Ok(Value::Float(f));
    }
    if let Some(s) = value.as_string() {
        return Ok(Value::Str(s.to_string()?));
    }
    if value.is_function() {
        return Ok(Value::Void);
    }
    if let Some(handle) = object_handle(value) {
        return Ok(Value::Object(Some(handle)));
    }
    if let Some(object) = value.as_object() {
        if depth >= MAX_DEPTH {
            return Err(rquickjs::Error::new_from_js_message(
                "object",
                "struct",
                format!("nested deeper than {} levels (cyclic?)", MAX_DEPTH),
            ));
        }
        let mut fields = Vec::new();
        for prop in object.props::<String, JsValue>() {
            let (name, field) = prop?;
            if *fields_left == 0 {
                return Err(rquickjs::Error::new_from_js_message(
                    "object",
                    "struct",
                    format!("more than {} fields", MAX_FIELDS),
                ));
            }
            *fields_left -= 1;
            fields.push((name, convert(&field, depth + 1, fields_left)?));
        }
        return Ok(Value::Struct(fields));
    }
    Ok(Value::Void)
}

pub fn from_js_args(args: &[JsValue<'_>]) -> rquickjs::Result<Vec<Value>> {
    args.iter().map(from_js).collect()
}

/// Render a script value for logs
pub fn format_value(out: &mut String, value: &JsValue<'_>) {
    if value.is_undefined() {
        out.push_str("undefined");
    } else if value.is_null() {
        out.push_str("null");
    } else if let Some(b) = value.as_bool() {
        write!(out, "{}", b).ok();
    } else if let Some(n) = value.as_int() {
        write!(out, "{}", n).ok();
    } else if let Some(n) = value.as_float() {
        write!(out, "{}", n).ok();
    } else if let Some(s) = value.as_string() {
        if let Ok(s) = s.to_string() {
            out.push_str(&s);
        }
    } else if value.is_array() {
        out.push_str("[Array]");
    } else if value.is_function() {
        out.push_str("[Function]");
    } else if let Some(handle) = object_handle(value) {
        write!(out, "[Object #{}]", handle.index).ok();
    } else if value.is_object() {
        out.push_str("[Object]");
    } else {
        out.push_str("[unknown]");
    }
}

pub fn format_args(values: &[JsValue<'_>]) -> String {
    let mut output = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            output.push(' ');
        }
        format_value(&mut output, value);
    }
    output
}
