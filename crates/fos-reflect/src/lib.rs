//! fOS Reflect
//!
//! Reflected native object system that script environments bind to.
//!
//! Features:
//! - Classes with single inheritance, properties and a function map
//! - Function metadata with native, script and trampoline dispatch
//! - Generational object handles (stale handles never dereference)
//! - Raw dynamic arrays for script container views
//! - Lifecycle notifications for script hosts

mod arena;
mod array;
mod class;
mod flags;
mod function;
mod host;
mod name;
mod system;
mod value;

pub use arena::GenArena;
pub use array::RawArray;
pub use class::{ClassBuilder, ClassDef, PropertyDef};
pub use flags::{ClassFlags, FunctionFlags, ObjectFlags};
pub use function::{Dispatch, FunctionBody, FunctionDef, FunctionState, NativeFn, ParamDef, ScriptHook};
pub use host::{CallFrame, HostId, ScriptHost};
pub use name::Name;
pub use system::{ObjectData, ObjectSystem, PropertyValue};
pub use value::{PropertyKind, Value};

/// Class identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Function identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub(crate) u32);

impl FunctionId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Generational handle to a live object.
///
/// A handle whose slot has been freed (and possibly reused) no longer
/// resolves; the object system reports it as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    pub index: u32,
    pub generation: u32,
}

impl ObjectHandle {
    /// Handle value used for "no object" in raw storage
    pub const NULL: ObjectHandle = ObjectHandle { index: u32::MAX, generation: u32::MAX };

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

/// Reflection errors
#[derive(Debug, thiserror::Error)]
pub enum ReflectError {
    #[error("unknown class: {0}")]
    UnknownClass(String),

    #[error("unknown function '{function}' on class {class}")]
    UnknownFunction { class: String, function: String },

    #[error("unknown property '{property}' on class {class}")]
    UnknownProperty { class: String, property: String },

    #[error("object handle {0:?} is stale")]
    StaleObject(ObjectHandle),

    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: String },

    #[error("cannot duplicate native function {0}")]
    NativeDuplicate(String),

    #[error("function {0} has no bound implementation")]
    Unbound(String),

    #[error("native call failed: {0}")]
    Native(String),

    #[error("script dispatch failed: {0}")]
    Script(String),
}
