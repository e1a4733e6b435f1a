//! fOS Script Binding
//!
//! Binds QuickJS script modules to reflected native classes.
//!
//! Features:
//! - Per-object module binding as objects are created (or deferred)
//! - Script overrides of native functions, fully restorable
//! - Type bridges and container proxies over native dynamic arrays
//! - Process-wide export registry for classes, enums and functions
//! - Runaway-script watchdog and dangling-reference checks
//! - Several independent environments over one object system

mod bridge;
mod class_desc;
mod config;
mod container;
mod dynamic_binding;
mod env;
mod error;
mod guards;
mod loader;
mod locator;
mod marshal;
mod overrides;
mod refs;

pub mod console;
pub mod registry;

pub use bridge::{bridge_by_name, bridge_for_kind, NameBridge, ObjectBridge, Scalar, ScalarBridge, StructBridge, StructField, TypeBridge};
pub use class_desc::{userdata_padding, ClassDescriptor, ClassRegistry, FieldDesc, FunctionDesc, PropertyDesc};
pub use config::EnvConfig;
pub use container::{ArrayAllocator, ContainerProxy, HeapAllocator};
pub use dynamic_binding::{DynamicBinding, DynamicBindingStack};
pub use env::{ContinuationId, DeferredBinds, EnvBuilder, EnvHook, ErrorReporter, ScriptEnv};
pub use error::{Access, BridgeError, Result, ScriptError};
pub use guards::{DanglingCheck, DeadLoopCheck, DeadLoopGuard, WatchdogTrap};
pub use loader::{LoaderChain, LoaderFn, ModuleSource};
pub use locator::{package_module_name, InterfaceLocator, ModuleLocator, PackageLocator};
pub use overrides::{OverrideEngine, OverrideRecord, OVERRIDDEN_SUFFIX};
pub use refs::{RefId, RefTable};
