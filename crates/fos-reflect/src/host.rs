//! Script host interface
//!
//! A script environment registers itself with the object system as a
//! `ScriptHost`. It receives lifecycle notifications and runs script
//! dispatched functions.

use crate::{ClassId, FunctionId, ObjectHandle, ObjectSystem, ReflectError, Value};

/// Identifies a host across weak references
pub type HostId = u64;

pub trait ScriptHost {
    fn host_id(&self) -> HostId;

    /// Run the script side of `function` on `object`
    fn invoke_script(
        &self,
        system: &ObjectSystem,
        function: FunctionId,
        object: ObjectHandle,
        args: &[Value],
    ) -> Result<Value, ReflectError>;

    fn object_created(&self, _system: &ObjectSystem, _object: ObjectHandle) {}

    /// Sent for every deleted object, bound or not
    fn object_deleted(&self, _system: &ObjectSystem, _object: ObjectHandle) {}

    /// Sent before the class's functions are released
    fn class_destroyed(&self, _system: &ObjectSystem, _class: ClassId) {}
}

static VOID: Value = Value::Void;

/// Arguments of a native call.
///
/// `active` is the host whose VM is currently executing, if any. Nested
/// calls made through the frame hand it back to the object system so that
/// a host is never re-entered from the outside while it runs.
pub struct CallFrame<'a> {
    pub system: &'a ObjectSystem,
    pub function: FunctionId,
    pub object: ObjectHandle,
    pub args: &'a [Value],
    pub(crate) active: Option<&'a dyn ScriptHost>,
}

impl<'a> CallFrame<'a> {
    /// Argument `index`, or `Void` when missing
    pub fn arg(&self, index: usize) -> &Value {
        self.args.get(index).unwrap_or(&VOID)
    }

    pub fn active(&self) -> Option<&'a dyn ScriptHost> {
        self.active
    }

    /// Call a function by name on another object
    pub fn call(&self, object: ObjectHandle, name: &str, args: &[Value]) -> Result<Value, ReflectError> {
        self.system.call_with(self.active, object, name, args)
    }

    /// Create an object from inside a native call
    pub fn new_object(&self, class: ClassId, name: &str) -> Result<ObjectHandle, ReflectError> {
        self.system.new_object_with(self.active, class, name, crate::ObjectFlags::NONE)
    }
}
