//! Debug console commands
//!
//! - `script.do <code>`: evaluate code in the environment
//! - `script.dofile <module>`: reload a module from scratch
//! - `script.gc`: run a full collection

use fos_reflect::Value;

use crate::env::ScriptEnv;
use crate::error::Result;

/// Outcome of a console line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleOutput {
    /// Result of `script.do`
    Value(Value),
    Done,
    /// Not a script command
    Unknown,
}

pub fn execute(env: &ScriptEnv, line: &str) -> Result<ConsoleOutput> {
    let line = line.trim();
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };

    match command {
        "script.do" => Ok(ConsoleOutput::Value(env.do_string_named(rest, "console")?)),
        "script.dofile" => {
            env.unload_module(rest);
            env.gc();
            env.require(rest)?;
            tracing::info!("Reloaded module {}", rest);
            Ok(ConsoleOutput::Done)
        }
        "script.gc" => {
            env.gc();
            Ok(ConsoleOutput::Done)
        }
        _ => Ok(ConsoleOutput::Unknown),
    }
}
