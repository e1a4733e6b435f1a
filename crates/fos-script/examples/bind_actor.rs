//! Bind a script module to a native class and override one of its events.
//!
//! Run with `RUST_LOG=debug` to see binding and override logs.

use std::rc::Rc;

use fos_reflect::{ClassBuilder, FunctionFlags, ObjectSystem, PropertyKind, Value};
use fos_script::{console, EnvConfig, ScriptEnv};

const ACTOR_MODULE: &str = r#"
return {
    Initialize(init) {
        this.Health = 100;
        console.log('spawned', this.Name);
    },
    TakeDamage(amount) {
        const left = this.Overridden.TakeDamage(this, amount * 2);
        Bind.Log('double damage, health now', left);
        return left;
    },
};
"#;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let system = Rc::new(ObjectSystem::new());
    let actor = system.define_class(
        ClassBuilder::new("Actor")
            .script_module("Actor")
            .property("Name", PropertyKind::Str)
            .property("Health", PropertyKind::Int32)
            .function("TakeDamage", FunctionFlags::NATIVE | FunctionFlags::EVENT, |frame| {
                let health = frame.system.get_property(frame.object, "Health")?.as_int().unwrap_or(0);
                let amount = frame.arg(0).as_int().unwrap_or(0);
                let left = (health - amount).max(0);
                frame.system.set_property(frame.object, "Health", Value::Int(left))?;
                Ok(Value::Int(left))
            }),
    )?;

    let config = EnvConfig { dead_loop_timeout: 5, ..Default::default() };
    let env = ScriptEnv::builder(system.clone())
        .config(config)
        .builtin("Actor", ACTOR_MODULE)
        .build()?;

    let hero = system.new_object(actor, "Hero")?;
    system.set_property(hero, "Name", Value::Str("Hero".into()))?;

    let left = system.call(hero, "TakeDamage", &[Value::Int(15)])?;
    println!("health after script override: {:?}", left);

    env.restore_overrides(actor);
    let left = system.call(hero, "TakeDamage", &[Value::Int(15)])?;
    println!("health after restore: {:?}", left);

    if let console::ConsoleOutput::Value(value) = console::execute(&env, "script.do 6 * 7")? {
        println!("console: {:?}", value);
    }
    Ok(())
}
