//! Function metadata and dispatch entries

use std::fmt;
use std::rc::{Rc, Weak};

use crate::host::{CallFrame, HostId, ScriptHost};
use crate::{ClassId, FunctionFlags, FunctionId, PropertyKind, ReflectError, Value};

/// Native implementation of a function
pub type NativeFn = Rc<dyn Fn(&CallFrame<'_>) -> Result<Value, ReflectError>>;

/// Declared parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub kind: PropertyKind,
}

impl ParamDef {
    pub fn new(name: &str, kind: PropertyKind) -> Self {
        Self { name: name.to_string(), kind }
    }
}

/// Function body.
///
/// `Redirect` is only ever installed by a true override: it carries the
/// identity of the override function the trampoline forwards to, while the
/// original function keeps its own id and name.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    Code(Vec<u8>),
    Redirect(FunctionId),
}

impl Default for FunctionBody {
    fn default() -> Self {
        FunctionBody::Code(Vec::new())
    }
}

/// Weak link from a script-dispatched function to the environment that owns it
#[derive(Clone)]
pub struct ScriptHook {
    host: Weak<dyn ScriptHost>,
    id: HostId,
}

impl ScriptHook {
    pub fn new(host: Weak<dyn ScriptHost>, id: HostId) -> Self {
        Self { host, id }
    }

    pub fn host_id(&self) -> HostId {
        self.id
    }

    /// The owning host, unless it has been torn down
    pub fn upgrade(&self) -> Option<Rc<dyn ScriptHost>> {
        self.host.upgrade()
    }
}

/// Dispatch entry of a function
#[derive(Clone, Default)]
pub enum Dispatch {
    /// No implementation; calls do nothing
    #[default]
    Unbound,
    Native(NativeFn),
    /// Calls run the script function of the owning host
    Script(ScriptHook),
    /// Calls follow the `Redirect` body to a script override
    Trampoline,
}

impl PartialEq for Dispatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Dispatch::Unbound, Dispatch::Unbound) => true,
            (Dispatch::Native(a), Dispatch::Native(b)) => Rc::ptr_eq(a, b),
            (Dispatch::Script(a), Dispatch::Script(b)) => a.id == b.id,
            (Dispatch::Trampoline, Dispatch::Trampoline) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Unbound => write!(f, "Unbound"),
            Dispatch::Native(func) => write!(f, "Native({:p})", Rc::as_ptr(func) as *const ()),
            Dispatch::Script(hook) => write!(f, "Script(host {})", hook.id),
            Dispatch::Trampoline => write!(f, "Trampoline"),
        }
    }
}

/// Reflected function
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub owner: ClassId,
    pub flags: FunctionFlags,
    pub params: Vec<ParamDef>,
    pub return_kind: Option<PropertyKind>,
    pub super_function: Option<FunctionId>,
    pub body: FunctionBody,
    pub dispatch: Dispatch,
    /// Created by the override engine rather than declared by a class
    pub script_override: bool,
}

impl FunctionDef {
    pub fn new(name: &str, owner: ClassId, flags: FunctionFlags) -> Self {
        Self {
            name: name.to_string(),
            owner,
            flags,
            params: Vec::new(),
            return_kind: None,
            super_function: None,
            body: FunctionBody::default(),
            dispatch: Dispatch::Unbound,
            script_override: false,
        }
    }

    pub fn is_overridable(&self) -> bool {
        self.flags.is_overridable()
    }

    /// Snapshot of everything that decides how a call is dispatched
    pub fn state(&self) -> FunctionState {
        FunctionState {
            flags: self.flags,
            params: self.params.clone(),
            super_function: self.super_function,
            body: self.body.clone(),
            dispatch: self.dispatch.clone(),
        }
    }
}

/// Comparable dispatch state of a function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionState {
    pub flags: FunctionFlags,
    pub params: Vec<ParamDef>,
    pub super_function: Option<FunctionId>,
    pub body: FunctionBody,
    pub dispatch: Dispatch,
}
