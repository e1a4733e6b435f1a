//! Name Interning
//!
//! Process-wide deduplicated names, stored as a u32 id inside raw values.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Interned name
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Name {
    id: u32,
}

impl Name {
    /// The empty name (id 0)
    pub const NONE: Name = Name { id: 0 };

    /// Intern a string
    pub fn new(s: &str) -> Self {
        with_interner(|interner| interner.intern(s))
    }

    /// Rebuild a name from a raw id. Unknown ids resolve to the empty string.
    pub fn from_id(id: u32) -> Self {
        Name { id }
    }

    pub fn id(self) -> u32 {
        self.id
    }

    /// Resolve to the interned string
    pub fn as_string(self) -> String {
        with_interner(|interner| interner.get(self).map(|s| s.to_string()).unwrap_or_default())
    }
}

impl std::fmt::Debug for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Name({}, {:?})", self.id, self.as_string())
    }
}

#[derive(Debug)]
struct NameInterner {
    strings: Vec<Arc<str>>,
    lookup: HashMap<Arc<str>, u32>,
}

impl NameInterner {
    fn new() -> Self {
        let mut interner = Self { strings: Vec::new(), lookup: HashMap::new() };
        interner.intern("");
        interner
    }

    fn intern(&mut self, s: &str) -> Name {
        if let Some(&id) = self.lookup.get(s) {
            return Name { id };
        }

        let id = self.strings.len() as u32;
        let arc: Arc<str> = s.into();
        self.strings.push(arc.clone());
        self.lookup.insert(arc, id);
        Name { id }
    }

    fn get(&self, name: Name) -> Option<&str> {
        self.strings.get(name.id as usize).map(|s| s.as_ref())
    }
}

fn with_interner<R>(f: impl FnOnce(&mut NameInterner) -> R) -> R {
    static NAMES: OnceLock<Mutex<NameInterner>> = OnceLock::new();
    let names = NAMES.get_or_init(|| Mutex::new(NameInterner::new()));
    let mut guard = names.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
}
