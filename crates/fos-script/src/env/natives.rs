//! Native functions installed into every environment's VM
//!
//! The prelude (`prelude.js`) builds object proxies, class tables and the
//! `Bind` library on top of these. Natives hold a weak reference to the
//! environment and throw once it is gone.

use std::rc::{Rc, Weak};

use fos_reflect::{ClassId, ObjectFlags, ObjectHandle, Value};
use rquickjs::class::{JsClass, Readable, Trace, Tracer};
use rquickjs::function::{Constructor, Rest};
use rquickjs::{Class, Ctx, Exception, Function, JsLifetime, Object, Persistent};

use super::host::{throw, Continuation, EnvCore, InVm};
use crate::bridge::{bridge_by_name, bridge_for_kind};
use crate::container::ContainerProxy;
use crate::error::{Access, Result, ScriptError};
use crate::marshal::{self, JsValue};
use crate::registry::{self, ExportedFn};

const FIELD_NONE: i32 = 0;
const FIELD_PROPERTY: i32 = 1;
const FIELD_FUNCTION: i32 = 2;
const FIELD_EXPORT: i32 = 3;

fn upgrade(ctx: &Ctx<'_>, weak: &Weak<EnvCore>) -> rquickjs::Result<Rc<EnvCore>> {
    match weak.upgrade() {
        Some(core) if !core.torn_down.get() => Ok(core),
        _ => Err(throw(ctx, ScriptError::EnvGone)),
    }
}

fn arg<'a, 'js>(args: &'a [JsValue<'js>], index: usize) -> Option<&'a JsValue<'js>> {
    args.get(index)
}

fn arg_string(args: &[JsValue<'_>], index: usize) -> String {
    arg(args, index)
        .and_then(|v| v.as_string())
        .and_then(|s| s.to_string().ok())
        .unwrap_or_default()
}

fn arg_number(args: &[JsValue<'_>], index: usize) -> Option<f64> {
    arg(args, index).and_then(|v| v.as_number())
}

/// Array index; negative and non-numeric values are out of range
fn arg_index(args: &[JsValue<'_>], index: usize) -> Option<usize> {
    arg_number(args, index).filter(|n| *n >= 0.0).map(|n| n as usize)
}

fn arg_handle(args: &[JsValue<'_>]) -> ObjectHandle {
    match (arg_number(args, 0), arg_number(args, 1)) {
        (Some(index), Some(generation)) => ObjectHandle { index: index as u32, generation: generation as u32 },
        _ => ObjectHandle::NULL,
    }
}

fn arg_value(args: &[JsValue<'_>], index: usize) -> rquickjs::Result<Value> {
    match arg(args, index) {
        Some(value) => marshal::from_js(value),
        None => Ok(Value::Void),
    }
}

/// Class and its super classes, nearest first
fn class_chain(core: &EnvCore, class: ClassId) -> Vec<String> {
    let mut names = Vec::new();
    let mut current = Some(class);
    while let Some(class) = current {
        if let Some(name) = core.system.class_name(class) {
            names.push(name);
        }
        current = core.system.super_class(class);
    }
    names
}

fn find_export(core: &EnvCore, class: ClassId, name: &str) -> Option<ExportedFn> {
    class_chain(core, class)
        .iter()
        .find_map(|c| registry::find_reflected_class(c).and_then(|e| e.find_function(name)))
}

pub(crate) fn install<'js>(ctx: &Ctx<'js>, weak: Weak<EnvCore>) -> Result<()> {
    install_console(ctx)?;

    let native = Object::new(ctx.clone())?;
    install_fields(ctx, &native, &weak)?;
    install_arrays(ctx, &native, &weak)?;
    install_library(ctx, &native, &weak)?;

    let prelude: Function = ctx.eval(include_str!("prelude.js"))?;
    let helpers: Object = prelude.call((native,))?;

    let globals = ctx.globals();
    let bind: Object = helpers.get("Bind")?;
    globals.set("Bind", bind)?;

    let w = weak.clone();
    globals.set(
        "require",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<Object<'js>> {
            let core = upgrade(&ctx, &w)?;
            let name = arg_string(&args, 0);
            core.require_in(&ctx, &name).map_err(|e| throw(&ctx, e))
        })?,
    )?;

    if let Some(core) = weak.upgrade() {
        core.state.borrow_mut().helpers = Some(Persistent::save(ctx, helpers.clone()));
    }
    install_exports(ctx, &helpers, &weak)?;
    Ok(())
}

/// Route `console.*` to tracing
fn install_console(ctx: &Ctx<'_>) -> Result<()> {
    let console = Object::new(ctx.clone())?;
    for level in ["log", "info", "warn", "error", "debug"] {
        console.set(
            level,
            Function::new(ctx.clone(), move |args: Rest<JsValue>| {
                log_with_level(level, &args.0);
                Ok::<(), rquickjs::Error>(())
            })?,
        )?;
    }
    ctx.globals().set("console", console)?;
    Ok(())
}

fn log_with_level(level: &str, values: &[JsValue<'_>]) {
    let output = marshal::format_args(values);
    match level {
        "error" => tracing::error!("[Script] {}", output),
        "warn" => tracing::warn!("[Script] {}", output),
        "debug" => tracing::debug!("[Script] {}", output),
        _ => tracing::info!("[Script] {}", output),
    }
}

// ============================================================================
// Object fields
// ============================================================================

fn install_fields<'js>(ctx: &Ctx<'js>, native: &Object<'js>, weak: &Weak<EnvCore>) -> Result<()> {
    // field(cls, key) -> kind of field
    let w = weak.clone();
    native.set(
        "field",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<i32> {
            let core = upgrade(&ctx, &w)?;
            let Some(class) = core.system.find_class(&arg_string(&args, 0)) else {
                return Ok(FIELD_NONE);
            };
            let key = arg_string(&args, 1);
            let field = core.classes.borrow_mut().register_field(&core.system, class, &key);
            Ok(match field {
                Some(field) if field.is_property() => FIELD_PROPERTY,
                Some(_) => FIELD_FUNCTION,
                None if find_export(&core, class, &key).is_some() => FIELD_EXPORT,
                None => FIELD_NONE,
            })
        })?,
    )?;

    // get(idx, gen, cls, key)
    let w = weak.clone();
    native.set(
        "get",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<JsValue<'js>> {
            let core = upgrade(&ctx, &w)?;
            let object = arg_handle(&args);
            let class_name = arg_string(&args, 2);
            let key = arg_string(&args, 3);
            core.dangling
                .check(&core.system, object, Access::Read, &key, &class_name)
                .map_err(|e| throw(&ctx, e))?;

            let is_array = core
                .system
                .object_class(object)
                .and_then(|class| core.system.find_property(class, &key))
                .map(|(_, def)| def.kind.is_array())
                .unwrap_or(false);
            if is_array {
                let id = external_container(&core, object, &key).map_err(|e| throw(&ctx, e))?;
                let make = core.helper(&ctx, "makeArray").map_err(|e| throw(&ctx, e))?;
                return make.call((id,));
            }

            let value = core.system.get_property(object, &key).map_err(|e| throw(&ctx, e.into()))?;
            core.to_js(&ctx, &value)
        })?,
    )?;

    // set(idx, gen, cls, key, value) -> handled natively
    let w = weak.clone();
    native.set(
        "set",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<bool> {
            let core = upgrade(&ctx, &w)?;
            let object = arg_handle(&args);
            let class_name = arg_string(&args, 2);
            let key = arg_string(&args, 3);
            core.dangling
                .check(&core.system, object, Access::Write, &key, &class_name)
                .map_err(|e| throw(&ctx, e))?;
            let is_scalar = core
                .system
                .object_class(object)
                .and_then(|class| core.system.find_property(class, &key))
                .map(|(_, def)| !def.kind.is_array())
                .unwrap_or(false);
            if !is_scalar {
                return Ok(false);
            }
            let value = arg_value(&args, 4)?;
            core.system.set_property(object, &key, value).map_err(|e| throw(&ctx, e.into()))?;
            Ok(true)
        })?,
    )?;

    // call(idx, gen, cls, key, ...args)
    let w = weak.clone();
    native.set(
        "call",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<JsValue<'js>> {
            let core = upgrade(&ctx, &w)?;
            let object = arg_handle(&args);
            let class_name = arg_string(&args, 2);
            let key = arg_string(&args, 3);
            core.dangling
                .check(&core.system, object, Access::Call, &key, &class_name)
                .map_err(|e| throw(&ctx, e))?;

            let mut values = marshal::from_js_args(args.get(4..).unwrap_or_default())?;
            if let Some(class) = core.system.object_class(object) {
                let mut classes = core.classes.borrow_mut();
                if let Some(field) = classes.register_field(&core.system, class, &key) {
                    if let Some(function) = classes.function(&field) {
                        function.fill_defaults(&mut values);
                    }
                }
            }

            let active = InVm { core: &core, ctx: &ctx };
            let result = core
                .system
                .call_with(Some(&active), object, &key, &values)
                .map_err(|e| throw(&ctx, e.into()))?;
            core.to_js(&ctx, &result)
        })?,
    )?;

    // callSuper(cls, name, self, ...args): the implementation an override replaced
    let w = weak.clone();
    native.set(
        "callSuper",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<JsValue<'js>> {
            let core = upgrade(&ctx, &w)?;
            let class_name = arg_string(&args, 0);
            let name = arg_string(&args, 1);
            let object = arg(&args, 2).and_then(marshal::object_handle).unwrap_or(ObjectHandle::NULL);

            let function = core.system.find_class(&class_name).and_then(|class| {
                let recorded = core.overrides.borrow().find(class, &name).map(|r| r.super_function());
                recorded.or_else(|| core.system.find_function(class, &name))
            });
            let Some(function) = function else {
                return Err(Exception::throw_message(
                    &ctx,
                    &format!("no overridden function '{}' on {}", name, class_name),
                ));
            };

            let values = marshal::from_js_args(args.get(3..).unwrap_or_default())?;
            let active = InVm { core: &core, ctx: &ctx };
            let result = core
                .system
                .invoke_with(Some(&active), function, object, &values)
                .map_err(|e| throw(&ctx, e.into()))?;
            core.to_js(&ctx, &result)
        })?,
    )?;

    // callExport(cls, key, receiver, ...args): function exported for a reflected class
    let w = weak.clone();
    native.set(
        "callExport",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<JsValue<'js>> {
            let core = upgrade(&ctx, &w)?;
            let class_name = arg_string(&args, 0);
            let key = arg_string(&args, 1);
            let function = core.system.find_class(&class_name).and_then(|class| find_export(&core, class, &key));
            let Some(function) = function else {
                return Err(Exception::throw_message(&ctx, &format!("no exported function '{}' on {}", key, class_name)));
            };
            let values = marshal::from_js_args(args.get(2..).unwrap_or_default())?;
            let result = function(&values).map_err(|message| Exception::throw_message(&ctx, &message))?;
            core.to_js(&ctx, &result)
        })?,
    )?;

    Ok(())
}

/// Container viewing an array property, shared for the object's lifetime
fn external_container(core: &EnvCore, object: ObjectHandle, key: &str) -> Result<u32> {
    let cache_key = (object, key.to_string());
    if let Some(id) = core.state.borrow().external_containers.get(&cache_key) {
        return Ok(*id);
    }
    let (store, kind) = core.system.array_property(object, key)?;
    let bridge = bridge_for_kind(&core.system, &kind)?;
    let proxy = ContainerProxy::external(&store, bridge).with_byte_limit(core.config.memory_limit);

    let mut state = core.state.borrow_mut();
    state.next_container += 1;
    let id = state.next_container;
    state.containers.insert(id, proxy);
    state.external_containers.insert(cache_key, id);
    Ok(id)
}

// ============================================================================
// Containers
// ============================================================================

enum ArrayResult {
    One(Value),
    Many(Vec<Value>),
}

/// Script handle owning a `Bind.Array` container.
///
/// The VM finalizes it once the script array is unreachable, which frees
/// the container.
pub(crate) struct ArrayOwner {
    id: u32,
    core: Weak<EnvCore>,
}

impl<'js> Trace<'js> for ArrayOwner {
    fn trace<'a>(&self, _tracer: Tracer<'a, 'js>) {}
}

// SAFETY: holds no VM values
unsafe impl<'js> JsLifetime<'js> for ArrayOwner {
    type Changed<'to> = ArrayOwner;
}

impl<'js> JsClass<'js> for ArrayOwner {
    const NAME: &'static str = "ArrayOwner";

    type Mutable = Readable;

    fn constructor(_ctx: &Ctx<'js>) -> rquickjs::Result<Option<Constructor<'js>>> {
        Ok(None)
    }
}

impl Drop for ArrayOwner {
    fn drop(&mut self) {
        if let Some(core) = self.core.upgrade() {
            core.release_container(self.id);
        }
    }
}

fn install_arrays<'js>(ctx: &Ctx<'js>, native: &Object<'js>, weak: &Weak<EnvCore>) -> Result<()> {
    // array(id, op, ...args)
    let w = weak.clone();
    native.set(
        "array",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<JsValue<'js>> {
            let core = upgrade(&ctx, &w)?;
            let id = arg_number(&args, 0).unwrap_or(0.0) as u32;
            let op = arg_string(&args, 1);
            let rest = args.get(2..).unwrap_or_default();

            match array_op(&core, id, &op, rest).map_err(|e| throw(&ctx, e))? {
                ArrayResult::One(value) => core.to_js(&ctx, &value),
                ArrayResult::Many(values) => {
                    let array = rquickjs::Array::new(ctx.clone())?;
                    for (i, value) in values.iter().enumerate() {
                        array.set(i, core.to_js(&ctx, value)?)?;
                    }
                    Ok(array.into_value())
                }
            }
        })?,
    )?;

    // newArray(type) -> owner handle of a script-owned container
    let w = weak.clone();
    native.set(
        "newArray",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<Class<'js, ArrayOwner>> {
                let core = upgrade(&ctx, &w)?;
                let bridge = bridge_by_name(&core.system, &arg_string(&args, 0)).map_err(|e| throw(&ctx, e))?;
                let id = {
                    let mut state = core.state.borrow_mut();
                    state.next_container += 1;
                    let id = state.next_container;
                    let proxy = ContainerProxy::new_owned(bridge).with_byte_limit(core.config.memory_limit);
                    state.containers.insert(id, proxy);
                    id
                };
                // Allocating may run finalizers, so the state is released first
                let owner = Class::instance(ctx.clone(), ArrayOwner { id, core: w.clone() })?;
                owner.set("id", id)?;
                Ok(owner)
            },
        )?,
    )?;

    Ok(())
}

fn array_op(core: &EnvCore, id: u32, op: &str, args: &[JsValue<'_>]) -> Result<ArrayResult> {
    let bridge_error = |e: crate::error::BridgeError| ScriptError::Vm(e.to_string());
    let mut state = core.state.borrow_mut();

    if op == "Append" {
        let other = arg_number(args, 0).map(|n| n as u32);
        let Some(other) = other.filter(|o| state.containers.contains_key(o)) else {
            return Ok(ArrayResult::One(Value::Bool(false)));
        };
        let Some(mut this) = state.containers.remove(&id) else {
            return Err(ScriptError::Vm(format!("container {} has been released", id)));
        };
        let appended = if other == id {
            let values = this.to_values();
            values.iter().all(|v| matches!(this.add_value(v), Ok(Some(_))))
        } else {
            state.containers.get(&other).map(|o| this.append(o)).unwrap_or(false)
        };
        state.containers.insert(id, this);
        return Ok(ArrayResult::One(Value::Bool(appended)));
    }

    if op == "Release" {
        let owned = state.containers.get(&id).map(|c| c.is_owned()).unwrap_or(false);
        let released = owned.then(|| state.containers.remove(&id));
        drop(state);
        // The proxy frees its store on drop
        return Ok(ArrayResult::One(Value::Bool(released.flatten().is_some())));
    }

    let Some(array) = state.containers.get_mut(&id) else {
        return Err(ScriptError::Vm(format!("container {} has been released", id)));
    };
    let index_result = |index: Option<usize>| Value::Int(index.map(|i| i as i64).unwrap_or(-1));

    let result = match op {
        "Num" => Value::Int(array.len() as i64),
        "Add" => index_result(array.add_value(&arg_value(args, 0)?).map_err(bridge_error)?),
        "AddUnique" => index_result(array.add_unique_value(&arg_value(args, 0)?).map_err(bridge_error)?),
        "Insert" => {
            if let Some(index) = arg_index(args, 1) {
                array.insert_value(&arg_value(args, 0)?, index).map_err(bridge_error)?;
            }
            Value::Void
        }
        "Remove" => {
            if let Some(index) = arg_index(args, 0) {
                array.remove(index);
            }
            Value::Void
        }
        "RemoveItem" => Value::Int(array.remove_item_value(&arg_value(args, 0)?).map_err(bridge_error)? as i64),
        "Clear" => {
            array.clear();
            Value::Void
        }
        "Get" => match arg_index(args, 0) {
            Some(index) => array.get_value(index).unwrap_or(Value::Void),
            None => Value::Void,
        },
        "Set" => {
            if let Some(index) = arg_index(args, 0) {
                array.set_value(index, &arg_value(args, 1)?).map_err(bridge_error)?;
            }
            Value::Void
        }
        "Reserve" => Value::Bool(arg_index(args, 0).map(|n| array.reserve(n)).unwrap_or(false)),
        "Resize" => {
            if let Some(len) = arg_index(args, 0) {
                if !array.resize(len) {
                    tracing::debug!("Resize of container {} to {} refused", id, len);
                }
            }
            Value::Void
        }
        "Swap" => {
            if let (Some(a), Some(b)) = (arg_index(args, 0), arg_index(args, 1)) {
                array.swap(a, b);
            }
            Value::Void
        }
        "Shuffle" => {
            array.shuffle();
            Value::Void
        }
        "ToArray" => return Ok(ArrayResult::Many(array.to_values())),
        other => return Err(ScriptError::Vm(format!("unknown array operation '{}'", other))),
    };
    Ok(ArrayResult::One(result))
}

// ============================================================================
// Bind library
// ============================================================================

fn install_library<'js>(ctx: &Ctx<'js>, native: &Object<'js>, weak: &Weak<EnvCore>) -> Result<()> {
    // log(level, ...args)
    native.set(
        "log",
        Function::new(ctx.clone(), move |args: Rest<JsValue<'js>>| {
            let level = match arg_number(&args, 0).unwrap_or(0.0) as i32 {
                2 => "error",
                1 => "warn",
                _ => "info",
            };
            log_with_level(level, args.get(1..).unwrap_or_default());
            Ok::<(), rquickjs::Error>(())
        })?,
    )?;

    // registerContinuation(tag, resolve) -> id
    let w = weak.clone();
    native.set(
        "registerContinuation",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, tag: String, resolve: Function<'js>| -> rquickjs::Result<u32> {
            let core = upgrade(&ctx, &w)?;
            let mut state = core.state.borrow_mut();
            state.next_continuation += 1;
            let id = state.next_continuation;
            tracing::debug!("Script suspended on '{}' as continuation {}", tag, id);
            state.continuations.insert(id, Continuation { tag, resolve: Persistent::save(&ctx, resolve) });
            Ok(id)
        })?,
    )?;

    // ref(object) / unref(object): manual roots
    let w = weak.clone();
    native.set(
        "ref",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<bool> {
            let core = upgrade(&ctx, &w)?;
            let Some(object) = arg(&args, 0).and_then(marshal::object_handle) else {
                return Ok(false);
            };
            if !core.system.is_valid(object) {
                return Ok(false);
            }
            core.system.add_root(object);
            core.state.borrow_mut().manual_refs.insert(object);
            Ok(true)
        })?,
    )?;

    let w = weak.clone();
    native.set(
        "unref",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<bool> {
            let core = upgrade(&ctx, &w)?;
            let Some(object) = arg(&args, 0).and_then(marshal::object_handle) else {
                return Ok(false);
            };
            let held = core.state.borrow_mut().manual_refs.remove(&object);
            if held {
                core.system.remove_root(object);
            }
            Ok(held)
        })?,
    )?;

    // newObject(cls, module, init)
    let w = weak.clone();
    native.set(
        "newObject",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<JsValue<'js>> {
            let core = upgrade(&ctx, &w)?;
            let class_name = arg_string(&args, 0);
            let Some(class) = core.system.find_class(&class_name) else {
                return Err(throw(&ctx, ScriptError::Reflect(fos_reflect::ReflectError::UnknownClass(class_name))));
            };
            let mut module = arg_string(&args, 1);
            let init = arg(&args, 2).filter(|v| v.is_object()).cloned();
            if module.is_empty() && init.is_some() {
                if let Some(cdo) = core.system.class_default_object(class) {
                    module = core.locator.locate(&core.system, cdo);
                }
            }

            let dynamic = !module.is_empty();
            if dynamic {
                let init = init.map(|value| core.state.borrow_mut().refs.add(&ctx, value));
                core.dynamic.borrow_mut().push(class, &module, init);
            }
            let active = InVm { core: &core, ctx: &ctx };
            let created = core.system.new_object_with(Some(&active), class, "", ObjectFlags::NONE);
            if dynamic {
                let init = core.dynamic.borrow_mut().pop();
                if let Some(init) = init {
                    core.state.borrow_mut().refs.release(init);
                }
            }

            let object = created.map_err(|e| throw(&ctx, e.into()))?;
            core.wrap_value(&ctx, object)
        })?,
    )?;

    // hotReload(name) -> number of classes refreshed
    let w = weak.clone();
    native.set(
        "hotReload",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<u32> {
            let core = upgrade(&ctx, &w)?;
            let name = arg_string(&args, 0);
            let name = (!name.is_empty()).then_some(name.as_str());
            let count = core.hot_reload_in(&ctx, name).map_err(|e| throw(&ctx, e))?;
            Ok(count as u32)
        })?,
    )?;

    if let Some(core) = weak.upgrade() {
        native.set("packagePath", core.config.package_path.join(";"))?;
    }
    Ok(())
}

// ============================================================================
// Registry exports
// ============================================================================

fn export_to_js<'js>(ctx: &Ctx<'js>, function: ExportedFn, weak: &Weak<EnvCore>) -> rquickjs::Result<Function<'js>> {
    let w = weak.clone();
    Function::new(ctx.clone(), move |ctx: Ctx<'js>, args: Rest<JsValue<'js>>| -> rquickjs::Result<JsValue<'js>> {
        let core = upgrade(&ctx, &w)?;
        let values = marshal::from_js_args(&args)?;
        let result = function(&values).map_err(|message| Exception::throw_message(&ctx, &message))?;
        core.to_js(&ctx, &result)
    })
}

/// Non-reflected classes, enums and global functions from the registry
fn install_exports<'js>(ctx: &Ctx<'js>, helpers: &Object<'js>, weak: &Weak<EnvCore>) -> Result<()> {
    let globals = ctx.globals();
    let freeze: Function = helpers.get("freeze")?;

    for class in registry::non_reflected_classes() {
        let object = Object::new(ctx.clone())?;
        // Own functions first, then inherited ones not redefined
        let mut current = Some(class.clone());
        while let Some(exported) = current {
            for (name, function) in &exported.functions {
                if !object.contains_key(name.as_str())? {
                    object.set(name.as_str(), export_to_js(ctx, function.clone(), weak)?)?;
                }
            }
            current = exported.super_name.as_deref().and_then(registry::find_class);
        }
        globals.set(class.name.as_str(), object)?;
    }

    for exported in registry::enums() {
        let object = Object::new(ctx.clone())?;
        for (name, value) in &exported.values {
            match i32::try_from(*value) {
                Ok(small) => object.set(name.as_str(), small)?,
                Err(_) => object.set(name.as_str(), *value as f64)?,
            }
        }
        let frozen: Object = freeze.call((object,))?;
        globals.set(exported.name.as_str(), frozen)?;
    }

    for (name, function) in registry::functions() {
        globals.set(name.as_str(), export_to_js(ctx, function, weak)?)?;
    }
    Ok(())
}
