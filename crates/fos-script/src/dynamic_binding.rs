//! Dynamic binding stack
//!
//! Scoped override of the class -> module mapping, pushed around object
//! construction so "the next object of class X loads module Y".

use fos_reflect::ClassId;

use crate::refs::RefId;

/// One class -> module mapping with an optional initializer table
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DynamicBinding {
    pub class: Option<ClassId>,
    pub module_name: String,
    pub initializer: Option<RefId>,
}

#[derive(Debug, Default)]
pub struct DynamicBindingStack {
    current: DynamicBinding,
    saved: Vec<DynamicBinding>,
}

impl DynamicBindingStack {
    pub fn new() -> Self { Self::default() }

    /// Install a new mapping, saving the current one
    pub fn push(&mut self, class: ClassId, module_name: &str, initializer: Option<RefId>) {
        let next = DynamicBinding {
            class: Some(class),
            module_name: module_name.to_string(),
            initializer,
        };
        self.saved.push(std::mem::replace(&mut self.current, next));
    }

    /// Restore the previous mapping and hand back the popped initializer
    /// so the caller can release it.
    ///
    /// # Panics
    ///
    /// Panics when nothing was pushed; push and pop must be strictly paired.
    pub fn pop(&mut self) -> Option<RefId> {
        assert!(!self.saved.is_empty(), "DynamicBindingStack::pop called without a matching push");
        let popped = std::mem::take(&mut self.current);
        self.current = self.saved.pop().unwrap_or_default();
        popped.initializer
    }

    /// Whether the current mapping applies to exactly `class`
    pub fn is_valid(&self, class: ClassId) -> bool {
        self.current.class == Some(class) && !self.current.module_name.is_empty()
    }

    pub fn current(&self) -> &DynamicBinding {
        &self.current
    }

    pub fn depth(&self) -> usize {
        self.saved.len()
    }
}
