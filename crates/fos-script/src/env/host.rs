//! Environment core
//!
//! The shared state behind a `ScriptEnv`: VM, per-environment registries
//! and the binding procedure. Script-side natives hold a weak reference to
//! it; the object system reaches it through `ScriptHost`.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::thread::ThreadId;

use fos_reflect::{
    ClassFlags, ClassId, FunctionId, HostId, ObjectFlags, ObjectHandle, ObjectSystem, ReflectError, ScriptHost,
    Value,
};
use rquickjs::function::{Rest, This};
use rquickjs::{Context, Ctx, Exception, Function, Object, Persistent, Runtime};

use super::{DeferredBinds, EnvHook, ErrorReporter};
use crate::class_desc::ClassRegistry;
use crate::config::EnvConfig;
use crate::container::ContainerProxy;
use crate::dynamic_binding::DynamicBindingStack;
use crate::error::{Result, ScriptError};
use crate::guards::{DanglingCheck, DeadLoopCheck};
use crate::loader::LoaderChain;
use crate::locator::ModuleLocator;
use crate::marshal::{self, JsValue};
use crate::overrides::OverrideEngine;
use crate::refs::{RefId, RefTable};

/// Identifies a suspended script coroutine
pub type ContinuationId = u32;

pub(crate) struct ObjectEntry {
    pub proxy: Persistent<Object<'static>>,
    /// Bound to a module (as opposed to a plain wrapper)
    pub bound: bool,
}

pub(crate) struct Continuation {
    pub tag: String,
    pub resolve: Persistent<Function<'static>>,
}

/// Everything holding script values. Cleared before the VM goes away.
#[derive(Default)]
pub(crate) struct EnvState {
    pub helpers: Option<Persistent<Object<'static>>>,
    pub modules: HashMap<String, Persistent<Object<'static>>>,
    /// One table per (class, module): dynamic binding may pair a class
    /// with several modules
    pub class_tables: HashMap<(ClassId, String), Persistent<Object<'static>>>,
    /// First module bound for each class; its table serves subclasses and
    /// dispatch to unbound objects
    pub bound_classes: HashMap<ClassId, String>,
    pub objects: HashMap<ObjectHandle, ObjectEntry>,
    pub manual_refs: HashSet<ObjectHandle>,
    pub refs: RefTable,
    pub containers: HashMap<u32, ContainerProxy>,
    pub external_containers: HashMap<(ObjectHandle, String), u32>,
    pub next_container: u32,
    pub continuations: HashMap<ContinuationId, Continuation>,
    pub next_continuation: ContinuationId,
}

pub(crate) struct EnvCore {
    pub id: HostId,
    pub config: EnvConfig,
    pub system: Rc<ObjectSystem>,
    pub state: RefCell<EnvState>,
    /// Containers whose script owner was collected while the state was busy
    pub orphaned_containers: RefCell<Vec<u32>>,
    pub overrides: RefCell<OverrideEngine>,
    pub dynamic: RefCell<DynamicBindingStack>,
    pub classes: RefCell<ClassRegistry>,
    pub deferred: DeferredBinds,
    pub locator: Box<dyn ModuleLocator>,
    pub loaders: LoaderChain,
    pub dead_loop: DeadLoopCheck,
    pub dangling: DanglingCheck,
    pub reporter: RefCell<Option<ErrorReporter>>,
    pub on_destroyed: RefCell<Option<EnvHook>>,
    pub owner_thread: ThreadId,
    pub vm_depth: Cell<u32>,
    pub torn_down: Cell<bool>,
    pub context: Context,
    pub runtime: Runtime,
}

struct DepthScope<'a>(&'a Cell<u32>);

impl Drop for DepthScope<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

/// Turn an error into a script exception
pub(crate) fn throw(ctx: &Ctx<'_>, err: ScriptError) -> rquickjs::Error {
    match err {
        ScriptError::Js(e) => e,
        other => Exception::throw_message(ctx, &other.to_string()),
    }
}

fn describe(caught: &JsValue<'_>) -> String {
    if let Some(object) = caught.as_object() {
        if let Ok(Some(message)) = object.get::<_, Option<String>>("message") {
            return message;
        }
    }
    let mut out = String::new();
    marshal::format_value(&mut out, caught);
    out
}

impl EnvCore {
    pub fn in_vm(&self) -> bool {
        self.vm_depth.get() > 0
    }

    pub fn on_owner_thread(&self) -> bool {
        std::thread::current().id() == self.owner_thread
    }

    pub fn with_vm<R>(&self, f: impl for<'js> FnOnce(Ctx<'js>) -> R) -> R {
        self.vm_depth.set(self.vm_depth.get() + 1);
        let _scope = DepthScope(&self.vm_depth);
        self.context.with(f)
    }

    pub fn report(&self, err: &ScriptError) {
        match &*self.reporter.borrow() {
            Some(reporter) => reporter(err),
            None => tracing::error!("[{}] {}", self.config.name, err),
        }
    }

    /// Top-level script entry: guarded, errors settled and reported,
    /// pending jobs drained afterwards.
    pub fn enter<R>(&self, chunk: &str, f: impl for<'js> FnOnce(&Ctx<'js>) -> Result<R>) -> Result<R> {
        if self.torn_down.get() {
            return Err(ScriptError::EnvGone);
        }
        if self.in_vm() {
            return Err(ScriptError::Vm(format!("environment {} is already running script code", self.config.name)));
        }
        let result = {
            let _guard = self.dead_loop.make_guard();
            let fired = self.dead_loop.fired_count();
            self.with_vm(|ctx| f(&ctx).map_err(|e| self.settle(&ctx, chunk, fired, e)))
        };
        self.run_pending_jobs();
        self.reap_containers();
        if let Err(err) = &result {
            self.report(err);
        }
        result
    }

    /// Clear a pending exception into a `ScriptError`, mapping anything that
    /// follows a watchdog firing to `Timeout`
    pub fn settle(&self, ctx: &Ctx<'_>, chunk: &str, fired_before: u64, err: ScriptError) -> ScriptError {
        let timed_out = self.dead_loop.fired_count() > fired_before;
        match err {
            ScriptError::Js(rquickjs::Error::Exception) => {
                let caught = ctx.catch();
                if timed_out {
                    ScriptError::Timeout
                } else {
                    ScriptError::Exception { chunk: chunk.to_string(), message: describe(&caught) }
                }
            }
            _ if timed_out => ScriptError::Timeout,
            other => other,
        }
    }

    pub fn run_pending_jobs(&self) {
        if self.in_vm() {
            return;
        }
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(job) => {
                    let message = job.0.with(|ctx| describe(&ctx.catch()));
                    self.report(&ScriptError::Exception { chunk: "job".into(), message });
                }
            }
        }
    }

    // ========================================================================
    // Script helpers
    // ========================================================================

    pub fn helper<'js>(&self, ctx: &Ctx<'js>, name: &str) -> Result<Function<'js>> {
        let helpers = self.state.borrow().helpers.clone().ok_or(ScriptError::EnvGone)?;
        Ok(helpers.restore(ctx)?.get(name)?)
    }

    pub fn class_table<'js>(&self, ctx: &Ctx<'js>, class: ClassId) -> Result<Option<Object<'js>>> {
        let module = self.state.borrow().bound_classes.get(&class).cloned();
        match module {
            Some(module) => self.module_table(ctx, class, &module),
            None => Ok(None),
        }
    }

    fn module_table<'js>(&self, ctx: &Ctx<'js>, class: ClassId, module: &str) -> Result<Option<Object<'js>>> {
        let table = self.state.borrow().class_tables.get(&(class, module.to_string())).cloned();
        Ok(match table {
            Some(table) => Some(table.restore(ctx)?),
            None => None,
        })
    }

    /// Table of `start` or of its closest bound super class
    pub fn nearest_table<'js>(&self, ctx: &Ctx<'js>, start: Option<ClassId>) -> Result<Option<Object<'js>>> {
        let mut current = start;
        while let Some(class) = current {
            if let Some(table) = self.class_table(ctx, class)? {
                return Ok(Some(table));
            }
            current = self.system.super_class(class);
        }
        Ok(None)
    }

    /// Script proxy for `object`, created on first use
    pub fn proxy_in<'js>(&self, ctx: &Ctx<'js>, object: ObjectHandle, table: Option<&Object<'js>>) -> Result<Object<'js>> {
        let existing = self.state.borrow().objects.get(&object).map(|e| e.proxy.clone());
        if let Some(existing) = existing {
            let proxy = existing.restore(ctx)?;
            if let Some(table) = table {
                let rebind = self.helper(ctx, "rebind")?;
                let _: JsValue = rebind.call((proxy.clone(), table.clone()))?;
            }
            return Ok(proxy);
        }

        let class = self.system.object_class(object);
        let proto = table.cloned();
        let class_name = class.and_then(|c| self.system.class_name(c)).unwrap_or_default();
        let wrap = self.helper(ctx, "wrap")?;
        let proxy: Object = wrap.call((object.index as f64, object.generation as f64, class_name, proto))?;
        if class.is_some() {
            let entry = ObjectEntry { proxy: Persistent::save(ctx, proxy.clone()), bound: false };
            self.state.borrow_mut().objects.insert(object, entry);
        }
        Ok(proxy)
    }

    pub fn wrap_value<'js>(&self, ctx: &Ctx<'js>, object: ObjectHandle) -> rquickjs::Result<JsValue<'js>> {
        self.proxy_in(ctx, object, None).map(|p| p.into_value()).map_err(|e| throw(ctx, e))
    }

    pub fn to_js<'js>(&self, ctx: &Ctx<'js>, value: &Value) -> rquickjs::Result<JsValue<'js>> {
        marshal::to_js(ctx, value, &mut |handle| self.wrap_value(ctx, handle))
    }

    pub fn is_bound(&self, object: ObjectHandle) -> bool {
        self.state.borrow().objects.get(&object).map(|e| e.bound).unwrap_or(false)
    }

    // ========================================================================
    // Modules
    // ========================================================================

    pub fn require_in<'js>(&self, ctx: &Ctx<'js>, name: &str) -> Result<Object<'js>> {
        let cached = self.state.borrow().modules.get(name).cloned();
        if let Some(module) = cached {
            return Ok(module.restore(ctx)?);
        }

        let source = self.loaders.load(name).ok_or_else(|| ScriptError::ModuleNotFound(name.to_string()))?;
        let fired = self.dead_loop.fired_count();
        let exports = self
            .run_module(ctx, &source.text())
            .map_err(|e| self.settle(ctx, &source.chunk, fired, e))?;
        let Some(module) = exports.as_object().cloned() else {
            return Err(ScriptError::NotATable(marshal::js_type_name(&exports).to_string()));
        };

        self.state.borrow_mut().modules.insert(name.to_string(), Persistent::save(ctx, module.clone()));
        tracing::info!("Loaded script module {} ({})", name, source.chunk);
        Ok(module)
    }

    fn run_module<'js>(&self, ctx: &Ctx<'js>, text: &str) -> Result<JsValue<'js>> {
        let factory: Function = ctx.eval(format!("(function (require) {{\n{}\n}})", text))?;
        let require: JsValue = ctx.globals().get("require")?;
        Ok(factory.call((require,))?)
    }

    pub fn hot_reload_in(&self, ctx: &Ctx<'_>, name: Option<&str>) -> Result<usize> {
        let names: Vec<String> = {
            let mut state = self.state.borrow_mut();
            match name {
                Some(name) => {
                    state.modules.remove(name);
                    vec![name.to_string()]
                }
                None => state.modules.drain().map(|(name, _)| name).collect(),
            }
        };
        let targets: Vec<(ClassId, String)> = self
            .state
            .borrow()
            .class_tables
            .keys()
            .filter(|(_, module)| names.contains(module))
            .cloned()
            .collect();

        let refresh = self.helper(ctx, "refreshTable")?;
        for (class, module) in &targets {
            let exports = self.require_in(ctx, module)?;
            if let Some(table) = self.module_table(ctx, *class, module)? {
                let _: JsValue = refresh.call((table, exports.clone()))?;
            }
            self.apply_overrides(*class, &exports)?;
        }
        tracing::info!("Hot reloaded {} module(s), {} bound class(es)", names.len(), targets.len());
        Ok(targets.len())
    }

    // ========================================================================
    // Binding
    // ========================================================================

    /// Whether `object` would be bound if it were ready
    pub fn is_candidate(&self, object: ObjectHandle) -> bool {
        let Some(class) = self.system.object_class(object) else {
            return false;
        };
        let bindable = self.system.with_class(class, |c| c.implements_script_interface()).unwrap_or(false);
        bindable || self.dynamic.borrow().is_valid(class)
    }

    pub fn try_bind_in(&self, ctx: &Ctx<'_>, object: ObjectHandle) -> bool {
        let system = &*self.system;
        let Some(class) = system.object_class(object) else {
            return false;
        };
        if system.class_flags(class).contains(ClassFlags::NEWER_VERSION_EXISTS) {
            return false;
        }
        if self.is_bound(object) {
            return true;
        }

        let bindable = system.with_class(class, |c| c.implements_script_interface()).unwrap_or(false);
        let dynamic = self.dynamic.borrow().is_valid(class);
        if !bindable && !dynamic {
            return false;
        }
        if system.object_flags(object).contains(ObjectFlags::ASYNC_LOADING) || !self.on_owner_thread() {
            self.deferred.push(object);
            return false;
        }

        let class_name = system.class_name(class).unwrap_or_default();
        if class_name.contains("SKEL_") {
            return false;
        }

        let (module, init) = if dynamic {
            let binding = self.dynamic.borrow().current().clone();
            if bindable {
                let located = self.locator.locate(system, object);
                if !located.is_empty() && located != binding.module_name {
                    tracing::warn!(
                        "Dynamic module {} overrides module {} of class {}",
                        binding.module_name, located, class_name
                    );
                }
            }
            (binding.module_name, binding.initializer)
        } else {
            (self.locator.locate(system, object), None)
        };
        if module.is_empty() {
            return false;
        }

        let fired = self.dead_loop.fired_count();
        match self.bind_in(ctx, object, class, &module, init) {
            Ok(bound) => bound,
            Err(err) => {
                let err = self.settle(ctx, &module, fired, err);
                tracing::warn!(
                    "Failed to attach {} module for object {}: {}",
                    module,
                    system.object_name(object).unwrap_or_default(),
                    err
                );
                false
            }
        }
    }

    pub fn bind_in<'js>(
        &self,
        ctx: &Ctx<'js>,
        object: ObjectHandle,
        class: ClassId,
        module: &str,
        init: Option<RefId>,
    ) -> Result<bool> {
        if self.system.class_flags(class).contains(ClassFlags::NEED_POST_LOAD) {
            return Ok(false);
        }
        if self.is_bound(object) {
            return Ok(true);
        }

        let table = self.bind_class_in(ctx, class, module)?;
        let proxy = self.proxy_in(ctx, object, Some(&table))?;
        if let Some(entry) = self.state.borrow_mut().objects.get_mut(&object) {
            entry.bound = true;
        }
        tracing::debug!(
            "Bound {} to module {}",
            self.system.object_name(object).unwrap_or_default(),
            module
        );

        let initialize: JsValue = table.get("Initialize")?;
        if let Some(initialize) = initialize.as_function() {
            let init_value = match init {
                Some(id) => self.state.borrow().refs.get(ctx, id),
                None => None,
            };
            let init_value = init_value.unwrap_or_else(|| JsValue::new_undefined(ctx.clone()));
            let _: JsValue = initialize.call((This(proxy), init_value))?;
        }
        Ok(true)
    }

    /// Table pairing `class` with `module`, loading the module and
    /// installing overrides the first time
    pub fn bind_class_in<'js>(&self, ctx: &Ctx<'js>, class: ClassId, module: &str) -> Result<Object<'js>> {
        if let Some(table) = self.module_table(ctx, class, module)? {
            return Ok(table);
        }
        if self.system.class_flags(class).contains(ClassFlags::NEED_POST_LOAD) {
            return Err(ScriptError::Vm(format!(
                "class {} is not loaded yet",
                self.system.class_name(class).unwrap_or_default()
            )));
        }

        let exports = self.require_in(ctx, module)?;
        let super_table = self.nearest_table(ctx, self.system.super_class(class))?;
        let class_name = self.system.class_name(class).unwrap_or_default();
        let make = self.helper(ctx, "makeClassTable")?;
        let table: Object = make.call((exports.clone(), class_name.clone(), super_table))?;

        self.classes.borrow_mut().register(&self.system, class);
        let count = self.apply_overrides(class, &exports)?;
        {
            let mut state = self.state.borrow_mut();
            state.class_tables.insert((class, module.to_string()), Persistent::save(ctx, table.clone()));
            state.bound_classes.entry(class).or_insert_with(|| module.to_string());
        }
        tracing::debug!("Bound class {} to module {} ({} overrides)", class_name, module, count);
        Ok(table)
    }

    /// Override every overridable function the module defines
    fn apply_overrides(&self, class: ClassId, exports: &Object<'_>) -> Result<usize> {
        let mut count = 0;
        for (name, function) in self.system.functions_of(class) {
            let value: JsValue = exports.get(name.as_str())?;
            if !value.is_function() {
                continue;
            }
            if self.overrides.borrow_mut().override_function(&self.system, function, class, &name)?.is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn flush_in(&self, ctx: &Ctx<'_>) -> usize {
        let pending = self.deferred.take();
        let mut waiting = Vec::new();
        let mut bound = 0;
        for object in pending {
            if !self.system.is_valid(object) {
                continue;
            }
            if self.system.object_flags(object).contains(ObjectFlags::ASYNC_LOADING) {
                waiting.push(object);
                continue;
            }
            if self.try_bind_in(ctx, object) {
                bound += 1;
            }
        }
        self.deferred.extend(waiting);
        bound
    }

    // ========================================================================
    // Script dispatch
    // ========================================================================

    /// Run the script implementation behind an overridden function
    pub fn invoke_in(&self, ctx: &Ctx<'_>, function: FunctionId, object: ObjectHandle, args: &[Value]) -> Result<Value> {
        let target = self
            .overrides
            .borrow()
            .find_by_function(function)
            .map(|r| (r.class, r.name.clone()))
            .or_else(|| self.system.with_function(function, |f| (f.owner, f.name.clone())));
        let Some((class, name)) = target else {
            return Err(ReflectError::UnknownFunction { class: String::new(), function: format!("{:?}", function) }.into());
        };

        let chunk = format!("{}.{}", self.system.class_name(class).unwrap_or_default(), name);
        let fired = self.dead_loop.fired_count();
        self.call_script_method(ctx, class, &name, object, args)
            .map_err(|e| self.settle(ctx, &chunk, fired, e))
    }

    fn call_script_method(&self, ctx: &Ctx<'_>, class: ClassId, name: &str, object: ObjectHandle, args: &[Value]) -> Result<Value> {
        let this = if object.is_null() || !self.system.is_valid(object) {
            None
        } else {
            Some(self.proxy_in(ctx, object, None)?)
        };

        let method_of = self.helper(ctx, "methodOf")?;
        let mut method: JsValue = method_of.call((this.clone(), name))?;
        if !method.is_function() {
            if let Some(table) = self.class_table(ctx, class)? {
                method = table.get(name)?;
            }
        }
        let Some(method) = method.as_function() else {
            tracing::debug!("No script implementation of {} on this object", name);
            return Ok(Value::Void);
        };

        let js_args = args.iter().map(|a| self.to_js(ctx, a)).collect::<rquickjs::Result<Vec<_>>>()?;
        let this = match this {
            Some(proxy) => proxy.into_value(),
            None => JsValue::new_undefined(ctx.clone()),
        };
        let result: JsValue = method.call((This(this), Rest(js_args)))?;
        Ok(marshal::from_js(&result)?)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub fn forget_object(&self, object: ObjectHandle) {
        let mut state = self.state.borrow_mut();
        state.objects.remove(&object);
        state.manual_refs.remove(&object);
        let stale: Vec<(ObjectHandle, String)> =
            state.external_containers.keys().filter(|(o, _)| *o == object).cloned().collect();
        for key in stale {
            if let Some(id) = state.external_containers.remove(&key) {
                state.containers.remove(&id);
            }
        }
    }

    /// Free a script-owned container after its owner handle was collected.
    ///
    /// Runs from VM finalizers, which may fire while the state is borrowed;
    /// those ids wait for `reap_containers`.
    pub fn release_container(&self, id: u32) {
        match self.state.try_borrow_mut() {
            Ok(mut state) => {
                state.containers.remove(&id);
            }
            Err(_) => self.orphaned_containers.borrow_mut().push(id),
        }
    }

    pub fn reap_containers(&self) {
        let orphaned = self.orphaned_containers.take();
        if orphaned.is_empty() {
            return;
        }
        let mut state = self.state.borrow_mut();
        for id in orphaned {
            state.containers.remove(&id);
        }
    }

    pub fn forget_class(&self, class: ClassId) {
        self.overrides.borrow_mut().restore_class(&self.system, class);
        self.classes.borrow_mut().unload_class(class);
        let mut state = self.state.borrow_mut();
        state.class_tables.retain(|(c, _), _| *c != class);
        state.bound_classes.remove(&class);
    }

    /// Restore overrides, drop every script value and leave the object system
    pub fn teardown(&self) {
        if self.torn_down.replace(true) {
            return;
        }
        tracing::info!("Script environment {} shutting down", self.config.name);
        self.system.remove_host(self.id);
        self.overrides.borrow_mut().restore_all(&self.system);
        self.dynamic.replace(DynamicBindingStack::new());
        let state = self.state.take();
        for object in &state.manual_refs {
            self.system.remove_root(*object);
        }
        drop(state);
        self.classes.borrow_mut().clear();
        self.deferred.take();
    }
}

impl Drop for EnvCore {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl ScriptHost for EnvCore {
    fn host_id(&self) -> HostId {
        self.id
    }

    fn invoke_script(
        &self,
        _system: &ObjectSystem,
        function: FunctionId,
        object: ObjectHandle,
        args: &[Value],
    ) -> std::result::Result<Value, ReflectError> {
        if self.torn_down.get() {
            return Ok(Value::Void);
        }
        if self.in_vm() {
            tracing::error!("Script dispatch into {} from outside its running VM", self.config.name);
            return Err(ReflectError::Script("environment is busy".into()));
        }
        self.enter("dispatch", |ctx| self.invoke_in(ctx, function, object, args))
            .map_err(|e| ReflectError::Script(e.to_string()))
    }

    fn object_created(&self, _system: &ObjectSystem, object: ObjectHandle) {
        if self.torn_down.get() {
            return;
        }
        if self.in_vm() || !self.on_owner_thread() {
            if self.is_candidate(object) {
                self.deferred.push(object);
            }
            return;
        }
        {
            let _guard = self.dead_loop.make_guard();
            self.with_vm(|ctx| self.try_bind_in(&ctx, object));
        }
        self.run_pending_jobs();
    }

    fn object_deleted(&self, _system: &ObjectSystem, object: ObjectHandle) {
        self.forget_object(object);
    }

    fn class_destroyed(&self, _system: &ObjectSystem, class: ClassId) {
        self.forget_class(class);
    }
}

/// The environment while its VM is running: nested dispatch reuses the
/// live context instead of entering the VM again
pub(crate) struct InVm<'a, 'js> {
    pub core: &'a EnvCore,
    pub ctx: &'a Ctx<'js>,
}

impl ScriptHost for InVm<'_, '_> {
    fn host_id(&self) -> HostId {
        self.core.id
    }

    fn invoke_script(
        &self,
        _system: &ObjectSystem,
        function: FunctionId,
        object: ObjectHandle,
        args: &[Value],
    ) -> std::result::Result<Value, ReflectError> {
        self.core
            .invoke_in(self.ctx, function, object, args)
            .map_err(|e| ReflectError::Script(e.to_string()))
    }

    fn object_created(&self, _system: &ObjectSystem, object: ObjectHandle) {
        self.core.try_bind_in(self.ctx, object);
    }

    fn object_deleted(&self, _system: &ObjectSystem, object: ObjectHandle) {
        self.core.forget_object(object);
    }

    fn class_destroyed(&self, _system: &ObjectSystem, class: ClassId) {
        self.core.forget_class(class);
    }
}
