//! Integration tests for script environments
//!
//! Native classes, script modules, overrides and environment lifecycle.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use fos_reflect::{ClassBuilder, ClassId, FunctionFlags, ObjectSystem, PropertyKind, Value};
use fos_script::registry::{self, ExportedClass};
use fos_script::{EnvConfig, ModuleSource, ScriptEnv, ScriptError};

fn overridable() -> FunctionFlags {
    FunctionFlags::NATIVE | FunctionFlags::EVENT
}

/// `Actor` with a native `OnSpawn` that counts its own calls
fn actor_system() -> (Rc<ObjectSystem>, ClassId) {
    let system = Rc::new(ObjectSystem::new());
    let actor = system
        .define_class(
            ClassBuilder::new("Actor")
                .script_module("Actor")
                .property("Health", PropertyKind::Int32)
                .property("Spawns", PropertyKind::Int32)
                .property("Tags", PropertyKind::Array(Box::new(PropertyKind::Int32)))
                .function("OnSpawn", overridable(), |frame| {
                    let spawns = frame.system.get_property(frame.object, "Spawns")?.as_int().unwrap_or(0);
                    frame.system.set_property(frame.object, "Spawns", Value::Int(spawns + 1))?;
                    Ok(Value::Str("native".into()))
                })
                .function("OnHit", overridable(), |_| Ok(Value::Int(0)))
                .function("Ping", FunctionFlags::NATIVE, |frame| {
                    frame.call(frame.object, "OnHit", &[Value::Int(5)])
                }),
        )
        .unwrap();
    (system, actor)
}

fn env_with(system: &Rc<ObjectSystem>, modules: &[(&str, &str)]) -> ScriptEnv {
    let mut builder = ScriptEnv::builder(system.clone());
    for (name, source) in modules {
        builder = builder.builtin(name, source);
    }
    let env = builder.build().unwrap();
    env.set_error_reporter(|_| {});
    env
}

fn spawns(system: &ObjectSystem, object: fos_reflect::ObjectHandle) -> Value {
    system.get_property(object, "Spawns").unwrap()
}

// ============================================================================
// OVERRIDES
// ============================================================================

#[test]
fn test_override_then_restore() {
    let (system, actor) = actor_system();
    let env = env_with(&system, &[(
        "Actor",
        "return { OnSpawn() { this.Spawns = this.Spawns + 100; return 'script'; } };",
    )]);

    let object = system.new_object(actor, "").unwrap();
    assert!(env.is_bound(object));
    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Str("script".into()));
    assert_eq!(spawns(&system, object), Value::Int(100));

    assert_eq!(env.restore_overrides(actor), 1);
    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Str("native".into()));
    assert_eq!(spawns(&system, object), Value::Int(101));
}

#[test]
fn test_restore_is_exact() {
    let (system, actor) = actor_system();
    let on_spawn = system.find_function(actor, "OnSpawn").unwrap();
    let before = system.function_state(on_spawn).unwrap();

    let env = env_with(&system, &[("Actor", "return { OnSpawn() { return 1; } };")]);
    system.new_object(actor, "").unwrap();
    assert_ne!(system.function_state(on_spawn).unwrap(), before);

    env.restore_overrides(actor);
    assert_eq!(system.function_state(on_spawn).unwrap(), before);
}

#[test]
fn test_overridden_calls_native() {
    let (system, actor) = actor_system();
    let _env = env_with(&system, &[(
        "Actor",
        "return { OnSpawn() { return 'script+' + this.Overridden.OnSpawn(this); } };",
    )]);

    let object = system.new_object(actor, "").unwrap();
    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Str("script+native".into()));
    assert_eq!(spawns(&system, object), Value::Int(1));
}

#[test]
fn test_nested_dispatch() {
    let (system, actor) = actor_system();
    let _env = env_with(&system, &[(
        "Actor",
        "return { OnHit(n) { return n * 2; }, OnSpawn() { return this.Ping(); } };",
    )]);

    // native -> script -> native -> script
    let object = system.new_object(actor, "").unwrap();
    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Int(10));
}

#[test]
fn test_module_without_function_keeps_native() {
    let (system, actor) = actor_system();
    let env = env_with(&system, &[("Actor", "return { Helper() { return 3; } };")]);

    let object = system.new_object(actor, "").unwrap();
    assert!(env.is_bound(object));
    assert_eq!(env.override_count(), 0);
    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Str("native".into()));
}

#[test]
fn test_suspend_resume_overrides() {
    let (system, actor) = actor_system();
    let env = env_with(&system, &[("Actor", "return { OnSpawn() { return 'script'; } };")]);
    let object = system.new_object(actor, "").unwrap();

    env.suspend_overrides(actor);
    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Str("native".into()));
    env.resume_overrides(actor);
    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Str("script".into()));
}

#[test]
fn test_subclass_module() {
    let (system, actor) = actor_system();
    let hero = system
        .define_class(ClassBuilder::new("Hero").extends(actor).script_module("Hero"))
        .unwrap();
    let _env = env_with(&system, &[
        ("Actor", "return { OnSpawn() { return 'actor'; } };"),
        ("Hero", "return { OnSpawn() { return 'hero'; } };"),
    ]);

    let plain = system.new_object(actor, "").unwrap();
    let hero_object = system.new_object(hero, "").unwrap();
    assert_eq!(system.call(plain, "OnSpawn", &[]).unwrap(), Value::Str("actor".into()));
    assert_eq!(system.call(hero_object, "OnSpawn", &[]).unwrap(), Value::Str("hero".into()));
}

#[test]
fn test_class_destroyed_restores() {
    let (system, actor) = actor_system();
    let env = env_with(&system, &[("Actor", "return { OnSpawn() { return 'script'; } };")]);
    system.new_object(actor, "").unwrap();
    assert_eq!(env.override_count(), 1);

    system.destroy_class(actor);
    assert_eq!(env.override_count(), 0);
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_teardown_restores_native() {
    let (system, actor) = actor_system();
    let env = env_with(&system, &[("Actor", "return { OnSpawn() { return 'script'; } };")]);
    let object = system.new_object(actor, "").unwrap();

    drop(env);
    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Str("native".into()));
    // Objects created afterwards stay native
    let later = system.new_object(actor, "").unwrap();
    assert_eq!(system.call(later, "OnSpawn", &[]).unwrap(), Value::Str("native".into()));
}

#[test]
fn test_environments_stack() {
    let (system, actor) = actor_system();
    let first = env_with(&system, &[("Actor", "return { OnSpawn() { return 'first'; } };")]);
    let second = env_with(&system, &[("Actor", "return { OnSpawn() { return 'second'; } };")]);
    let object = system.new_object(actor, "").unwrap();
    assert!(first.is_bound(object));
    assert!(second.is_bound(object));

    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Str("second".into()));
    drop(second);
    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Str("first".into()));
    drop(first);
    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Str("native".into()));
}

#[test]
fn test_environments_drop_oldest_first() {
    let (system, actor) = actor_system();
    let on_spawn = system.find_function(actor, "OnSpawn").unwrap();
    let before = system.function_state(on_spawn).unwrap();
    let first = env_with(&system, &[("Actor", "return { OnSpawn() { return 'first'; } };")]);
    let second = env_with(&system, &[(
        "Actor",
        "return { OnSpawn() { return 'second+' + this.Overridden.OnSpawn(this); } };",
    )]);
    let object = system.new_object(actor, "").unwrap();
    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Str("second+first".into()));

    // The newer override survives; its super call falls through to native
    drop(first);
    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Str("second+native".into()));
    assert_eq!(spawns(&system, object), Value::Int(1));

    drop(second);
    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Str("native".into()));
    assert_eq!(system.function_state(on_spawn).unwrap(), before);
}

#[test]
fn test_environments_restore_class_out_of_order() {
    let (system, actor) = actor_system();
    let first = env_with(&system, &[("Actor", "return { OnSpawn() { return 'first'; } };")]);
    let second = env_with(&system, &[("Actor", "return { OnSpawn() { return 'second'; } };")]);
    let object = system.new_object(actor, "").unwrap();

    assert_eq!(first.restore_overrides(actor), 1);
    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Str("second".into()));
    assert_eq!(second.restore_overrides(actor), 1);
    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Str("native".into()));
}

#[test]
fn test_deferred_bind() {
    let (system, actor) = actor_system();
    let env = env_with(&system, &[("Actor", "return { OnSpawn() { return 'script'; } };")]);

    let object = system.new_loading_object(actor, "").unwrap();
    assert!(!env.is_bound(object));
    assert_eq!(env.deferred_binds().len(), 1);

    // Still loading: stays queued
    assert_eq!(env.flush_deferred(), 0);
    assert_eq!(env.deferred_binds().len(), 1);

    system.finish_loading(object);
    assert_eq!(env.flush_deferred(), 1);
    assert!(env.is_bound(object));
    assert!(env.deferred_binds().is_empty());
}

#[test]
fn test_deferred_from_other_thread() {
    let (system, actor) = actor_system();
    // Created before any environment exists
    let object = system.new_object(actor, "").unwrap();
    let env = env_with(&system, &[("Actor", "return {};")]);
    assert!(!env.is_bound(object));

    let deferred = env.deferred_binds();
    std::thread::spawn(move || deferred.push(object)).join().unwrap();
    assert_eq!(env.flush_deferred(), 1);
    assert!(env.is_bound(object));
}

#[test]
fn test_deleted_object_is_forgotten() {
    let (system, actor) = actor_system();
    let env = env_with(&system, &[("Actor", "return {};")]);
    let object = system.new_object(actor, "").unwrap();
    assert_eq!(env.bound_object_count(), 1);

    system.destroy_object(object);
    assert_eq!(env.bound_object_count(), 0);
}

#[test]
fn test_initialize_runs_on_bind() {
    let (system, actor) = actor_system();
    let _env = env_with(&system, &[("Actor", "return { Initialize() { this.Health = 50; } };")]);
    let object = system.new_object(actor, "").unwrap();
    assert_eq!(system.get_property(object, "Health").unwrap(), Value::Int(50));
}

#[test]
fn test_start_runs_startup_module() {
    let system = Rc::new(ObjectSystem::new());
    let config = EnvConfig { startup_module: Some("Main".into()), ..Default::default() };
    let env = ScriptEnv::builder(system)
        .config(config)
        .builtin("Main", "globalThis.started = true; return {};")
        .build()
        .unwrap();
    env.start().unwrap();
    assert!(env.module_loaded("Main"));
    assert_eq!(env.do_string("started").unwrap(), Value::Bool(true));
}

// ============================================================================
// DYNAMIC BINDING
// ============================================================================

fn npc_system() -> (Rc<ObjectSystem>, ClassId) {
    let system = Rc::new(ObjectSystem::new());
    let npc = system.define_class(ClassBuilder::new("Npc").property("Level", PropertyKind::Int32)).unwrap();
    (system, npc)
}

const FRIENDLY: &str = "return {
    Initialize(init) { this.Mood = init ? init.mood : 'none'; },
    Greet() { return 'hi ' + this.Mood; },
};";

#[test]
fn test_new_object_from_script() {
    let (system, _) = npc_system();
    let env = env_with(&system, &[("Npc.Friendly", FRIENDLY)]);

    let greeting = env
        .do_string("const npc = Bind.NewObject('Npc', 'Npc.Friendly', { mood: 'happy' }); npc.Greet()")
        .unwrap();
    assert_eq!(greeting, Value::Str("hi happy".into()));

    let handle = env.do_string("npc").unwrap().as_object().unwrap();
    assert!(env.is_bound(handle));
    // A plain object of the same class is not bound
    assert_eq!(env.do_string("Bind.NewObject('Npc').Greet === undefined").unwrap(), Value::Bool(true));
}

#[test]
fn test_new_object_with_module() {
    let (system, npc) = npc_system();
    let env = env_with(&system, &[("Npc.Friendly", FRIENDLY)]);

    let object = env.new_object_with_module(npc, "Npc.Friendly").unwrap();
    assert!(env.is_bound(object));
    let other = system.new_object(npc, "").unwrap();
    assert!(!env.is_bound(other));
}

#[test]
fn test_explicit_bind() {
    let (system, npc) = npc_system();
    let env = env_with(&system, &[("Npc.Friendly", FRIENDLY)]);
    let object = system.new_object(npc, "").unwrap();
    assert!(!env.try_bind(object));
    assert!(env.bind(object, "Npc.Friendly").unwrap());
    assert!(env.is_bound(object));
}

// ============================================================================
// SCRIPT ACCESS
// ============================================================================

#[test]
fn test_native_properties_from_script() {
    let (system, actor) = actor_system();
    let _env = env_with(&system, &[(
        "Actor",
        "return { Initialize() { this.Health = 7; this.Tags.Add(3); this.Tags.Add(4); this.Extra = 'js'; } };",
    )]);
    let object = system.new_object(actor, "").unwrap();
    assert_eq!(system.get_property(object, "Health").unwrap(), Value::Int(7));

    let (store, _) = system.array_property(object, "Tags").unwrap();
    assert_eq!(store.borrow().num(), 2);
}

#[test]
fn test_dangling_access_reports() {
    let (system, actor) = actor_system();
    let env = env_with(&system, &[("Actor", "return { Initialize() { globalThis.last = this; } };")]);
    let object = system.new_object(actor, "").unwrap();
    assert_eq!(env.do_string("last.Health").unwrap(), Value::Int(0));

    system.destroy_object(object);
    let err = env.do_string_named("last.Health", "check").unwrap_err();
    assert_eq!(err.to_string(), "check: attempt to read property 'Health' on released object (Actor)");

    let err = env.do_string_named("last.OnSpawn()", "check").unwrap_err();
    assert_eq!(err.to_string(), "check: attempt to call function 'OnSpawn' on released object (Actor)");
}

#[test]
fn test_dangling_write_reports() {
    let (system, actor) = actor_system();
    let env = env_with(&system, &[("Actor", "return { Initialize() { globalThis.last = this; } };")]);
    let object = system.new_object(actor, "").unwrap();

    system.destroy_object(object);
    let err = env.do_string_named("last.Health = 3", "check").unwrap_err();
    assert_eq!(err.to_string(), "check: attempt to write property 'Health' on released object (Actor)");
}

#[test]
fn test_write_uses_object_class() {
    let (system, actor) = actor_system();
    let env = env_with(&system, &[("Actor", "return { Initialize() { globalThis.last = this; } };")]);
    let object = system.new_object(actor, "").unwrap();

    // A newer class under the same name no longer declares Health
    system.define_class(ClassBuilder::new("Actor")).unwrap();
    env.do_string("last.Health = 9").unwrap();
    assert_eq!(system.get_property(object, "Health").unwrap(), Value::Int(9));
}

#[test]
fn test_manual_refs() {
    let (system, actor) = actor_system();
    let env = env_with(&system, &[("Actor", "return { Initialize() { globalThis.last = this; } };")]);
    let object = system.new_object(actor, "").unwrap();

    assert_eq!(env.do_string("Bind.Ref(last)").unwrap(), Value::Bool(true));
    assert!(system.is_rooted(object));
    assert_eq!(env.manual_ref_count(), 1);

    assert_eq!(env.do_string("Bind.Unref(last)").unwrap(), Value::Bool(true));
    assert!(!system.is_rooted(object));

    env.do_string("Bind.Ref(last)").unwrap();
    drop(env);
    assert!(!system.is_rooted(object));
}

#[test]
fn test_registry_exports() {
    registry::export_function("fos_test_add", |args| {
        Ok(Value::Int(args.iter().filter_map(|a| a.as_int()).sum()))
    });
    registry::export_enum("FosTestColor", &[("Red", 1), ("Blue", 2)]);
    registry::export_class(ExportedClass::new("FosTestMath").function("Twice", |args| {
        Ok(Value::Int(args.first().and_then(|a| a.as_int()).unwrap_or(0) * 2))
    }));
    registry::export_class(ExportedClass::reflected("Actor").function("Describe", |args| {
        Ok(Value::Str(format!("actor:{}", args.first().map(|a| a.type_name()).unwrap_or("none"))))
    }));

    let (system, actor) = actor_system();
    let env = env_with(&system, &[("Actor", "return { Initialize() { globalThis.last = this; } };")]);
    system.new_object(actor, "").unwrap();

    assert_eq!(env.do_string("fos_test_add(2, 3)").unwrap(), Value::Int(5));
    assert_eq!(env.do_string("FosTestColor.Blue").unwrap(), Value::Int(2));
    assert_eq!(env.do_string("Object.isFrozen(FosTestColor)").unwrap(), Value::Bool(true));
    assert_eq!(env.do_string("FosTestMath.Twice(21)").unwrap(), Value::Int(42));
    assert_eq!(env.do_string("last.Describe()").unwrap(), Value::Str("actor:object".into()));
}

#[test]
fn test_registry_priority() {
    registry::export_class(ExportedClass::new("FosTestShared"));
    registry::export_class(ExportedClass::reflected("FosTestShared"));
    for _ in 0..3 {
        assert!(registry::find_class("FosTestShared").unwrap().reflected);
    }
}

// ============================================================================
// MODULES
// ============================================================================

#[test]
fn test_module_must_be_table() {
    let system = Rc::new(ObjectSystem::new());
    let env = env_with(&system, &[("Broken", "return 5;")]);
    let err = env.require("Broken").unwrap_err();
    assert!(matches!(err, ScriptError::NotATable(ref got) if got == "number"));
    assert_eq!(err.to_string(), "table needed but got number");
    assert!(!env.module_loaded("Broken"));
}

#[test]
fn test_module_not_found() {
    let system = Rc::new(ObjectSystem::new());
    let env = env_with(&system, &[]);
    assert!(matches!(env.require("Nope"), Err(ScriptError::ModuleNotFound(_))));
}

#[test]
fn test_require_from_script() {
    let system = Rc::new(ObjectSystem::new());
    let env = env_with(&system, &[
        ("Util", "return { twice(x) { return x * 2; } };"),
        ("Game", "const util = require('Util'); return { run() { return util.twice(4); } };"),
    ]);
    assert_eq!(env.do_string("require('Game').run()").unwrap(), Value::Int(8));
    assert!(env.module_loaded("Util"));
}

#[test]
fn test_hot_reload() {
    let (system, actor) = actor_system();
    let source = Rc::new(RefCell::new("return { OnSpawn() { return 'v1'; } };".to_string()));
    let current = source.clone();
    let env = ScriptEnv::builder(system.clone())
        .loader(move |name| (name == "Actor").then(|| ModuleSource::new(current.borrow().as_bytes(), "mem:Actor")))
        .build()
        .unwrap();

    let object = system.new_object(actor, "").unwrap();
    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Str("v1".into()));

    *source.borrow_mut() = "return { OnSpawn() { return 'v2'; } };".to_string();
    assert_eq!(env.hot_reload(Some("Actor")).unwrap(), 1);
    assert_eq!(system.call(object, "OnSpawn", &[]).unwrap(), Value::Str("v2".into()));
}

// ============================================================================
// COROUTINES AND ERRORS
// ============================================================================

#[test]
fn test_suspend_and_resume() {
    let system = Rc::new(ObjectSystem::new());
    let env = env_with(&system, &[]);
    env.do_string(
        "globalThis.result = 'pending';
         (async () => { const v = await Bind.Suspend('door'); globalThis.result = 'got ' + v; })();",
    )
    .unwrap();

    assert_eq!(env.pending_continuations(), vec![(1, "door".to_string())]);
    assert_eq!(env.do_string("result").unwrap(), Value::Str("pending".into()));

    assert!(env.resume(1, Value::Str("open".into())).unwrap());
    assert_eq!(env.do_string("result").unwrap(), Value::Str("got open".into()));
    assert!(!env.resume(1, Value::Void).unwrap());
    assert!(env.pending_continuations().is_empty());
}

#[test]
fn test_error_reporter_receives_errors() {
    let system = Rc::new(ObjectSystem::new());
    let env = ScriptEnv::new(system).unwrap();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    env.set_error_reporter(move |err| sink.borrow_mut().push(err.to_string()));

    assert!(env.do_string_named("undefinedFunction()", "main.js").is_err());
    assert_eq!(seen.borrow().len(), 1);
    assert!(seen.borrow()[0].starts_with("main.js: "));
}

#[test]
fn test_script_error_in_override() {
    let (system, actor) = actor_system();
    let _env = env_with(&system, &[("Actor", "return { OnSpawn() { throw new Error('bad spawn'); } };")]);
    let object = system.new_object(actor, "").unwrap();
    let err = system.call(object, "OnSpawn", &[]).unwrap_err();
    assert!(err.to_string().contains("bad spawn"));
}

#[test]
fn test_cyclic_result_is_an_error() {
    let system = Rc::new(ObjectSystem::new());
    let env = env_with(&system, &[]);
    let err = env.do_string("const o = {}; o.self = o; o").unwrap_err();
    assert!(err.to_string().contains("nested deeper than"), "{}", err);
    assert!(env.do_string("let v = 0; for (let i = 0; i < 100; i++) { v = { v }; } v").is_err());
    assert_eq!(env.do_string("1 + 1").unwrap(), Value::Int(2));
}

#[test]
fn test_cyclic_argument_throws_in_script() {
    let (system, actor) = actor_system();
    let env = env_with(&system, &[("Actor", "return { Initialize() { globalThis.last = this; } };")]);
    system.new_object(actor, "").unwrap();

    env.do_string("globalThis.loop = {}; loop.self = loop; undefined").unwrap();
    let caught = env.do_string("try { last.Ping(loop); 'passed' } catch (e) { 'caught' }").unwrap();
    assert_eq!(caught, Value::Str("caught".into()));
    let caught = env.do_string("try { Bind.Array('int32').Add(loop); 'added' } catch (e) { 'caught' }").unwrap();
    assert_eq!(caught, Value::Str("caught".into()));
    assert_eq!(env.do_string("last.Ping()").unwrap(), Value::Int(0));
}

// ============================================================================
// WATCHDOG
// ============================================================================

fn watchdog_env(timeout: u32) -> ScriptEnv {
    watchdog_env_ticking(timeout, 20)
}

fn watchdog_env_ticking(timeout: u32, tick_ms: u64) -> ScriptEnv {
    let config = EnvConfig { dead_loop_timeout: timeout, watchdog_tick_ms: tick_ms, ..Default::default() };
    let env = ScriptEnv::builder(Rc::new(ObjectSystem::new())).config(config).build().unwrap();
    env.set_error_reporter(|_| {});
    env
}

#[test]
fn test_runaway_script_times_out() {
    let env = watchdog_env(2);
    assert!(matches!(env.do_string("while (true) {}"), Err(ScriptError::Timeout)));
    // Faulted once; the environment keeps working
    assert_eq!(env.do_string("1 + 1").unwrap(), Value::Int(2));
    // A script cannot swallow the abort
    assert!(matches!(
        env.do_string("try { while (true) {} } catch (e) {} while (true) {}"),
        Err(ScriptError::Timeout)
    ));
}

#[test]
fn test_disabled_watchdog_never_faults() {
    let env = watchdog_env(0);
    assert_eq!(env.do_string("let i = 0; while (i < 2000000) { i++; } i").unwrap(), Value::Int(2000000));
}

#[test]
fn test_timeout_within_one_extra_tick() {
    let (timeout, tick) = (2u32, Duration::from_millis(50));
    let env = watchdog_env_ticking(timeout, tick.as_millis() as u64);

    let start = Instant::now();
    assert!(matches!(env.do_string("while (true) {}"), Err(ScriptError::Timeout)));
    let elapsed = start.elapsed();
    assert!(elapsed >= tick * (timeout - 1), "faulted early: {:?}", elapsed);
    assert!(elapsed < tick * (timeout + 1), "faulted late: {:?}", elapsed);
}
