//! Class, function and object flag sets

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

macro_rules! flag_set {
    ($(#[$meta:meta])* $name:ident { $($(#[$fmeta:meta])* $flag:ident = $bit:expr,)* }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(u32);

        impl $name {
            pub const NONE: $name = $name(0);
            $($(#[$fmeta])* pub const $flag: $name = $name(1 << $bit);)*

            pub fn bits(self) -> u32 {
                self.0
            }

            pub fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn intersects(self, other: $name) -> bool {
                self.0 & other.0 != 0
            }

            pub fn insert(&mut self, other: $name) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: $name) {
                self.0 &= !other.0;
            }
        }

        impl BitOr for $name {
            type Output = $name;

            fn bitor(self, rhs: $name) -> $name {
                $name(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: $name) {
                self.0 |= rhs.0;
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut names = Vec::new();
                $(if self.contains($name::$flag) { names.push(stringify!($flag)); })*
                write!(f, "{}({})", stringify!($name), names.join(" | "))
            }
        }
    };
}

flag_set! {
    /// Class flags
    ClassFlags {
        /// Implemented in native code (not an asset class)
        NATIVE = 0,
        STRUCT = 1,
        INTERFACE = 2,
        /// Never collected; overrides created for it are rooted too
        ROOTED = 3,
        /// Stale class left behind by a recompile
        NEWER_VERSION_EXISTS = 4,
        NEED_POST_LOAD = 5,
    }
}

flag_set! {
    /// Function flags
    FunctionFlags {
        NATIVE = 0,
        EVENT = 1,
        /// Implementable by script or asset logic
        BLUEPRINT_EVENT = 2,
        /// Network replicated
        NET = 3,
        STATIC = 4,
    }
}

flag_set! {
    /// Object flags
    ObjectFlags {
        CLASS_DEFAULT = 0,
        NEED_INITIALIZATION = 1,
        ASYNC_LOADING = 2,
        NEED_POST_LOAD = 3,
    }
}

impl FunctionFlags {
    /// Whether script code may replace this function.
    ///
    /// Replicated-only callables are never overridable.
    pub fn is_overridable(self) -> bool {
        self.contains(FunctionFlags::BLUEPRINT_EVENT)
            || (self.contains(FunctionFlags::NATIVE | FunctionFlags::EVENT) && !self.contains(FunctionFlags::NET))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_ops() {
        let mut flags = FunctionFlags::NATIVE | FunctionFlags::EVENT;
        assert!(flags.contains(FunctionFlags::NATIVE));
        flags.remove(FunctionFlags::NATIVE);
        assert!(!flags.contains(FunctionFlags::NATIVE));
        assert!(flags.intersects(FunctionFlags::EVENT | FunctionFlags::NET));
        assert_eq!(format!("{:?}", flags), "FunctionFlags(EVENT)");
    }

    #[test]
    fn test_overridable() {
        assert!(FunctionFlags::BLUEPRINT_EVENT.is_overridable());
        assert!((FunctionFlags::NATIVE | FunctionFlags::EVENT).is_overridable());
        assert!(!(FunctionFlags::NATIVE | FunctionFlags::EVENT | FunctionFlags::NET).is_overridable());
        assert!(!FunctionFlags::NATIVE.is_overridable());
        assert!(!FunctionFlags::NET.is_overridable());
    }
}
