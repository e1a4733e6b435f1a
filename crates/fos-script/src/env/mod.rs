//! Script Environment
//!
//! One QuickJS VM bound to an object system. The environment binds objects
//! to script modules as they are created, overrides reflected functions the
//! modules implement, and restores everything when it goes away.
//!
//! Environments are independent: each registers as its own script host,
//! and objects bound in one are invisible to another.

mod host;
mod natives;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use fos_reflect::{ClassId, HostId, ObjectFlags, ObjectHandle, ObjectSystem, ReflectError, ScriptHook, ScriptHost, Value};
use rquickjs::{Context, Runtime};

pub use self::host::ContinuationId;
use self::host::{EnvCore, EnvState};
use crate::class_desc::ClassRegistry;
use crate::config::EnvConfig;
use crate::dynamic_binding::DynamicBindingStack;
use crate::error::{Result, ScriptError};
use crate::guards::{DanglingCheck, DeadLoopCheck};
use crate::loader::{LoaderChain, LoaderFn};
use crate::locator::{InterfaceLocator, ModuleLocator};
use crate::marshal::{self, JsValue};
use crate::overrides::OverrideEngine;

/// Called with the environment after creation or before teardown
pub type EnvHook = Box<dyn Fn(&ScriptEnv)>;

/// Receives every error that reaches the top of a script call
pub type ErrorReporter = Box<dyn Fn(&ScriptError)>;

static NEXT_ENV_ID: AtomicU64 = AtomicU64::new(1);

/// Objects waiting to be bound on the owner thread.
///
/// Cloneable and `Send`; loader threads push, `ScriptEnv::flush_deferred`
/// drains.
#[derive(Clone, Default)]
pub struct DeferredBinds(Arc<Mutex<Vec<ObjectHandle>>>);

impl DeferredBinds {
    fn lock(&self) -> MutexGuard<'_, Vec<ObjectHandle>> {
        self.0.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, object: ObjectHandle) {
        let mut pending = self.lock();
        if !pending.contains(&object) {
            pending.push(object);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub(crate) fn take(&self) -> Vec<ObjectHandle> {
        std::mem::take(&mut *self.lock())
    }

    pub(crate) fn extend(&self, objects: Vec<ObjectHandle>) {
        for object in objects {
            self.push(object);
        }
    }
}

pub struct EnvBuilder {
    system: Rc<ObjectSystem>,
    config: EnvConfig,
    locator: Option<Box<dyn ModuleLocator>>,
    loaders: Vec<LoaderFn>,
    builtins: Vec<(String, String)>,
    on_created: Option<EnvHook>,
    on_destroyed: Option<EnvHook>,
    on_runtime: Option<Box<dyn FnOnce(&Runtime)>>,
}

impl EnvBuilder {
    pub fn new(system: Rc<ObjectSystem>) -> Self {
        Self {
            system,
            config: EnvConfig::default(),
            locator: None,
            loaders: Vec::new(),
            builtins: Vec::new(),
            on_created: None,
            on_destroyed: None,
            on_runtime: None,
        }
    }

    pub fn config(mut self, config: EnvConfig) -> Self {
        self.config = config;
        self
    }

    pub fn locator(mut self, locator: impl ModuleLocator + 'static) -> Self {
        self.locator = Some(Box::new(locator));
        self
    }

    /// Custom loader, tried before the filesystem and built-in sources
    pub fn loader(mut self, loader: impl Fn(&str) -> Option<crate::loader::ModuleSource> + 'static) -> Self {
        self.loaders.push(Box::new(loader));
        self
    }

    pub fn builtin(mut self, name: &str, source: &str) -> Self {
        self.builtins.push((name.to_string(), source.to_string()));
        self
    }

    pub fn on_created(mut self, hook: impl Fn(&ScriptEnv) + 'static) -> Self {
        self.on_created = Some(Box::new(hook));
        self
    }

    pub fn on_destroyed(mut self, hook: impl Fn(&ScriptEnv) + 'static) -> Self {
        self.on_destroyed = Some(Box::new(hook));
        self
    }

    /// Tune the runtime (collector settings and the like) before the
    /// context is created
    pub fn on_runtime(mut self, hook: impl FnOnce(&Runtime) + 'static) -> Self {
        self.on_runtime = Some(Box::new(hook));
        self
    }

    pub fn build(self) -> Result<ScriptEnv> {
        let config = self.config;
        let runtime = Runtime::new().map_err(|e| ScriptError::Vm(e.to_string()))?;
        runtime.set_memory_limit(config.memory_limit);
        runtime.set_max_stack_size(config.max_stack_size);
        runtime.set_gc_threshold(config.gc_threshold);
        if let Some(hook) = self.on_runtime {
            hook(&runtime);
        }
        let context = Context::full(&runtime).map_err(|e| ScriptError::Vm(e.to_string()))?;

        let dead_loop = DeadLoopCheck::new(config.dead_loop_timeout, Duration::from_millis(config.watchdog_tick_ms));
        if dead_loop.is_enabled() {
            let trap = dead_loop.trap();
            runtime.set_interrupt_handler(Some(Box::new(move || trap.poll())));
        }

        let mut loaders = LoaderChain::new(&config);
        for loader in self.loaders {
            loaders.add_loader(loader);
        }
        for (name, source) in &self.builtins {
            loaders.add_builtin(name, source);
        }

        let id: HostId = NEXT_ENV_ID.fetch_add(1, Ordering::SeqCst);
        let system = self.system;
        let locator = self.locator.unwrap_or_else(|| Box::new(InterfaceLocator));
        let dangling = DanglingCheck::new(config.dangling_check);
        let core = Rc::new_cyclic(|weak: &Weak<EnvCore>| {
            let host: Weak<dyn ScriptHost> = weak.clone();
            EnvCore {
                id,
                config,
                system: system.clone(),
                state: RefCell::new(EnvState::default()),
                orphaned_containers: RefCell::new(Vec::new()),
                overrides: RefCell::new(OverrideEngine::new(ScriptHook::new(host, id))),
                dynamic: RefCell::new(DynamicBindingStack::new()),
                classes: RefCell::new(ClassRegistry::new()),
                deferred: DeferredBinds::default(),
                locator,
                loaders,
                dead_loop,
                dangling,
                reporter: RefCell::new(None),
                on_destroyed: RefCell::new(self.on_destroyed),
                owner_thread: std::thread::current().id(),
                vm_depth: Cell::new(0),
                torn_down: Cell::new(false),
                context,
                runtime,
            }
        });

        let host: Weak<dyn ScriptHost> = Rc::downgrade(&core) as Weak<dyn ScriptHost>;
        system.add_host(id, host);
        let weak = Rc::downgrade(&core);
        core.with_vm(|ctx| natives::install(&ctx, weak))?;

        let env = ScriptEnv { core };
        tracing::info!(
            "Script environment {} created (watchdog {}s, dangling check {})",
            env.name(),
            env.core.dead_loop.timeout(),
            env.core.dangling.is_enabled()
        );
        if let Some(hook) = self.on_created {
            hook(&env);
        }
        Ok(env)
    }
}

/// Script environment handle
pub struct ScriptEnv {
    core: Rc<EnvCore>,
}

impl ScriptEnv {
    /// Environment with the default configuration
    pub fn new(system: Rc<ObjectSystem>) -> Result<Self> {
        Self::builder(system).build()
    }

    pub fn builder(system: Rc<ObjectSystem>) -> EnvBuilder {
        EnvBuilder::new(system)
    }

    pub fn name(&self) -> &str {
        &self.core.config.name
    }

    pub fn id(&self) -> HostId {
        self.core.id
    }

    pub fn config(&self) -> &EnvConfig {
        &self.core.config
    }

    pub fn system(&self) -> &Rc<ObjectSystem> {
        &self.core.system
    }

    /// Load the startup module and bind the configured classes up front
    pub fn start(&self) -> Result<()> {
        let core = &*self.core;
        if let Some(module) = core.config.startup_module.clone() {
            core.enter(&module, |ctx| core.require_in(ctx, &module).map(|_| ()))?;
        }
        for class_name in core.config.pre_bind_classes.clone() {
            let Some(class) = core.system.find_class(&class_name) else {
                tracing::warn!("Pre-bind class {} does not exist", class_name);
                continue;
            };
            let Some(cdo) = core.system.class_default_object(class) else {
                continue;
            };
            let module = core.locator.locate(&core.system, cdo);
            if module.is_empty() {
                continue;
            }
            core.enter(&module, |ctx| core.bind_class_in(ctx, class, &module).map(|_| ()))?;
        }
        Ok(())
    }

    pub fn do_string(&self, code: &str) -> Result<Value> {
        self.do_string_named(code, "chunk")
    }

    /// Evaluate `code` as a global script; `chunk` names it in errors
    pub fn do_string_named(&self, code: &str, chunk: &str) -> Result<Value> {
        self.core.enter(chunk, |ctx| {
            let result: JsValue = ctx.eval(code)?;
            Ok(marshal::from_js(&result)?)
        })
    }

    /// Load a module (cached after the first success)
    pub fn require(&self, name: &str) -> Result<()> {
        let core = &*self.core;
        core.enter(name, |ctx| core.require_in(ctx, name).map(|_| ()))
    }

    /// Drop a module from the cache so the next `require` loads it again
    pub fn unload_module(&self, name: &str) -> bool {
        self.core.state.borrow_mut().modules.remove(name).is_some()
    }

    pub fn module_loaded(&self, name: &str) -> bool {
        self.core.state.borrow().modules.contains_key(name)
    }

    // ========================================================================
    // Binding
    // ========================================================================

    /// Bind `object` to the module its class resolves to. Deferred objects
    /// and objects without a module return false.
    pub fn try_bind(&self, object: ObjectHandle) -> bool {
        let core = &*self.core;
        core.enter("bind", |ctx| Ok(core.try_bind_in(ctx, object))).unwrap_or(false)
    }

    /// Bind `object` to an explicit module
    pub fn bind(&self, object: ObjectHandle, module: &str) -> Result<bool> {
        let core = &*self.core;
        let class = core.system.object_class(object).ok_or(ReflectError::StaleObject(object))?;
        core.enter(module, |ctx| core.bind_in(ctx, object, class, module, None))
    }

    pub fn is_bound(&self, object: ObjectHandle) -> bool {
        self.core.is_bound(object)
    }

    /// Bind objects whose binding was deferred; returns how many got bound
    pub fn flush_deferred(&self) -> usize {
        let core = &*self.core;
        core.enter("deferred", |ctx| Ok(core.flush_in(ctx))).unwrap_or(0)
    }

    /// Queue shared with threads that create objects
    pub fn deferred_binds(&self) -> DeferredBinds {
        self.core.deferred.clone()
    }

    /// Create an object of `class` bound to `module` regardless of its
    /// class's own mapping
    pub fn new_object_with_module(&self, class: ClassId, module: &str) -> Result<ObjectHandle> {
        let core = &*self.core;
        core.dynamic.borrow_mut().push(class, module, None);
        let created = core.system.new_object_with(None, class, "", ObjectFlags::NONE);
        core.dynamic.borrow_mut().pop();
        Ok(created?)
    }

    /// Reload one module (or all of them) and refresh the classes bound to it
    pub fn hot_reload(&self, name: Option<&str>) -> Result<usize> {
        let core = &*self.core;
        core.enter("hot reload", |ctx| core.hot_reload_in(ctx, name))
    }

    /// Run a full VM collection; script arrays nothing references any more
    /// free their containers
    pub fn gc(&self) {
        self.core.runtime.run_gc();
        self.core.reap_containers();
    }

    // ========================================================================
    // Coroutines and errors
    // ========================================================================

    /// Resume a coroutine suspended with `Bind.Suspend`. Returns false when
    /// no such continuation is waiting.
    pub fn resume(&self, id: ContinuationId, value: Value) -> Result<bool> {
        let core = &*self.core;
        let Some(continuation) = core.state.borrow_mut().continuations.remove(&id) else {
            return Ok(false);
        };
        tracing::debug!("Resuming continuation {} ({})", id, continuation.tag);
        core.enter("resume", |ctx| {
            let resolve = continuation.resolve.restore(ctx)?;
            let value = core.to_js(ctx, &value)?;
            let _: JsValue = resolve.call((value,))?;
            Ok(true)
        })
    }

    /// Waiting continuations with their tags, oldest first
    pub fn pending_continuations(&self) -> Vec<(ContinuationId, String)> {
        let mut pending: Vec<_> = self
            .core
            .state
            .borrow()
            .continuations
            .iter()
            .map(|(id, c)| (*id, c.tag.clone()))
            .collect();
        pending.sort_by_key(|(id, _)| *id);
        pending
    }

    pub fn set_error_reporter(&self, reporter: impl Fn(&ScriptError) + 'static) {
        *self.core.reporter.borrow_mut() = Some(Box::new(reporter));
    }

    // ========================================================================
    // Overrides
    // ========================================================================

    /// Put back the native implementations of `class`; returns how many
    pub fn restore_overrides(&self, class: ClassId) -> usize {
        self.core.overrides.borrow_mut().restore_class(&self.core.system, class)
    }

    pub fn suspend_overrides(&self, class: ClassId) {
        self.core.overrides.borrow_mut().suspend(&self.core.system, class);
    }

    pub fn resume_overrides(&self, class: ClassId) {
        self.core.overrides.borrow_mut().resume(&self.core.system, class);
    }

    pub fn override_count(&self) -> usize {
        self.core.overrides.borrow().len()
    }

    pub fn bound_object_count(&self) -> usize {
        self.core.state.borrow().objects.values().filter(|e| e.bound).count()
    }

    pub fn manual_ref_count(&self) -> usize {
        self.core.state.borrow().manual_refs.len()
    }

    pub fn container_count(&self) -> usize {
        self.core.state.borrow().containers.len()
    }
}

impl Drop for ScriptEnv {
    fn drop(&mut self) {
        let hook = self.core.on_destroyed.borrow_mut().take();
        if let Some(hook) = hook {
            hook(self);
        }
        self.core.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fos_reflect::{ClassBuilder, FunctionFlags, PropertyKind};

    fn system() -> Rc<ObjectSystem> {
        let system = Rc::new(ObjectSystem::new());
        system
            .define_class(
                ClassBuilder::new("Pawn")
                    .script_module("Pawn")
                    .property("Health", PropertyKind::Int32)
                    .function("Hit", FunctionFlags::NATIVE | FunctionFlags::EVENT, |frame| {
                        let hp = frame.system.get_property(frame.object, "Health")?.as_int().unwrap_or(0);
                        frame.system.set_property(frame.object, "Health", Value::Int(hp - 1))?;
                        Ok(Value::Str("native".into()))
                    }),
            )
            .unwrap();
        system
    }

    #[test]
    fn test_do_string() {
        let env = ScriptEnv::new(system()).unwrap();
        assert_eq!(env.do_string("1 + 2").unwrap(), Value::Int(3));
        assert_eq!(env.do_string("'a' + 'b'").unwrap(), Value::Str("ab".into()));
    }

    #[test]
    fn test_exception_names_chunk() {
        let env = ScriptEnv::new(system()).unwrap();
        env.set_error_reporter(|_| {});
        let err = env.do_string_named("throw new Error('boom')", "test.js").unwrap_err();
        assert_eq!(err.to_string(), "test.js: boom");
        // The VM stays usable
        assert_eq!(env.do_string("40 + 2").unwrap(), Value::Int(42));
    }

    #[test]
    fn test_deferred_binds_dedup() {
        let deferred = DeferredBinds::default();
        let object = ObjectHandle { index: 1, generation: 0 };
        deferred.push(object);
        deferred.push(object);
        assert_eq!(deferred.len(), 1);
        assert_eq!(deferred.take(), vec![object]);
        assert!(deferred.is_empty());
    }

    #[test]
    fn test_hooks_run() {
        let created = Rc::new(Cell::new(false));
        let destroyed = Rc::new(Cell::new(false));
        let (c, d) = (created.clone(), destroyed.clone());
        let env = ScriptEnv::builder(system())
            .on_created(move |_| c.set(true))
            .on_destroyed(move |_| d.set(true))
            .build()
            .unwrap();
        assert!(created.get());
        assert!(!destroyed.get());
        drop(env);
        assert!(destroyed.get());
    }

    #[test]
    fn test_bind_on_create() {
        let system = system();
        let env = ScriptEnv::builder(system.clone())
            .builtin("Pawn", "return { Hit() { this.Health = this.Health + 10; return 'script'; } };")
            .build()
            .unwrap();
        let pawn = system.find_class("Pawn").unwrap();
        let object = system.new_object(pawn, "").unwrap();
        assert!(env.is_bound(object));
        assert_eq!(system.call(object, "Hit", &[]).unwrap(), Value::Str("script".into()));
        assert_eq!(system.get_property(object, "Health").unwrap(), Value::Int(10));

        drop(env);
        assert_eq!(system.call(object, "Hit", &[]).unwrap(), Value::Str("native".into()));
        assert_eq!(system.get_property(object, "Health").unwrap(), Value::Int(9));
    }
}
