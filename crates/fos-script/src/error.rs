//! Script binding errors

use fos_reflect::ReflectError;

/// Kind of access that hit a released object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Call,
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Access::Read => write!(f, "read property"),
            Access::Write => write!(f, "write property"),
            Access::Call => write!(f, "call function"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("failed to create script VM: {0}")]
    Vm(String),

    #[error("{chunk}: {message}")]
    Exception { chunk: String, message: String },

    #[error("script exec timeout")]
    Timeout,

    #[error("attempt to {access} '{field}' on released object ({class})")]
    Dangling { access: Access, field: String, class: String },

    #[error("module '{0}' not found")]
    ModuleNotFound(String),

    #[error("table needed but got {0}")]
    NotATable(String),

    #[error("unknown element type: {0}")]
    UnknownType(String),

    #[error("script environment has been torn down")]
    EnvGone,

    #[error(transparent)]
    Reflect(#[from] ReflectError),

    #[error(transparent)]
    Js(#[from] rquickjs::Error),
}

/// Failure writing a value into raw element storage
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cannot store {got} as {expected}")]
pub struct BridgeError {
    pub expected: String,
    pub got: String,
}

pub type Result<T, E = ScriptError> = std::result::Result<T, E>;
