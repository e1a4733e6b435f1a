//! Function override engine
//!
//! Interposes script implementations on reflected functions. A true
//! override keeps the original function's identity: its body becomes a
//! `Redirect` to a script-dispatched duplicate and its dispatch becomes a
//! trampoline. An added function (inherited name defined by a subclass
//! module) is a duplicate installed in the subclass's function map.
//!
//! Several environments may override the same function. The layers live
//! in the object system's override chain, so each environment removes
//! only its own layer and the original state comes back with the last one.

use fos_reflect::{ClassFlags, ClassId, Dispatch, FunctionFlags, FunctionId, ObjectSystem, ReflectError, ScriptHook};

/// Suffix of the copy that keeps the pre-override implementation callable
pub const OVERRIDDEN_SUFFIX: &str = "__Overridden";

#[derive(Debug, Clone)]
pub struct OverrideRecord {
    pub class: ClassId,
    pub name: String,
    /// Function being overridden (inherited ancestor for added functions)
    pub from: FunctionId,
    /// Script-dispatched duplicate
    pub function: FunctionId,
    /// Copy of the original dispatch for super calls (true overrides only)
    pub overridden: Option<FunctionId>,
    pub added: bool,
    /// Owning class is permanently rooted
    pub rooted: bool,
    active: bool,
}

impl OverrideRecord {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Function that runs the pre-override implementation
    pub fn super_function(&self) -> FunctionId {
        self.overridden.unwrap_or(self.from)
    }
}

/// Per-environment override table
pub struct OverrideEngine {
    hook: ScriptHook,
    records: Vec<OverrideRecord>,
}

impl OverrideEngine {
    /// Overrides dispatch to the host behind `hook`
    pub fn new(hook: ScriptHook) -> Self {
        Self { hook, records: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn find(&self, class: ClassId, name: &str) -> Option<&OverrideRecord> {
        self.records.iter().find(|r| r.class == class && r.name == name)
    }

    /// Record whose script-dispatched duplicate is `function`
    pub fn find_by_function(&self, function: FunctionId) -> Option<&OverrideRecord> {
        self.records.iter().find(|r| r.function == function)
    }

    pub fn records_of(&self, class: ClassId) -> impl Iterator<Item = &OverrideRecord> {
        self.records.iter().filter(move |r| r.class == class)
    }

    /// Override `from` on `class` under `name`.
    ///
    /// Returns the script-dispatched function, or `None` when `from` is not
    /// overridable. Overriding twice is a no-op.
    pub fn override_function(
        &mut self,
        system: &ObjectSystem,
        from: FunctionId,
        class: ClassId,
        name: &str,
    ) -> Result<Option<FunctionId>, ReflectError> {
        let mut source = system.function(from).ok_or_else(|| ReflectError::UnknownFunction {
            class: system.class_name(class).unwrap_or_default(),
            function: name.to_string(),
        })?;
        let mut from = from;
        // Added here by another environment: stack on the same inherited function
        if source.script_override && source.owner == class {
            let Some(inherited) = source.super_function.and_then(|f| system.function(f).map(|def| (f, def))) else {
                return Ok(None);
            };
            (from, source) = inherited;
        }
        if !source.is_overridable() {
            tracing::debug!("{} is not overridable, skipped", name);
            return Ok(None);
        }
        if let Some(existing) = self.find(class, name) {
            return Ok(Some(existing.function));
        }

        let added = source.owner != class;
        let function = self.duplicate(system, from, class, name, source.flags)?;
        system.update_function(function, |f| f.script_override = true);

        let overridden = if added {
            None
        } else {
            let copy = self.duplicate(system, from, class, &format!("{}{}", name, OVERRIDDEN_SUFFIX), source.flags)?;
            Some(copy)
        };

        system.link_child(class, function);
        let rooted = system.class_flags(class).contains(ClassFlags::ROOTED);

        tracing::debug!(
            "Override {}::{} ({})",
            system.class_name(class).unwrap_or_default(),
            name,
            if added { "added" } else { "replaced" }
        );
        self.records.push(OverrideRecord {
            class,
            name: name.to_string(),
            from,
            function,
            overridden,
            added,
            rooted,
            active: false,
        });
        let index = self.records.len() - 1;
        self.activate(system, index, true);
        Ok(Some(function))
    }

    /// Structural copy of `from`; NATIVE is lifted for the copy and put back on both
    fn duplicate(
        &self,
        system: &ObjectSystem,
        from: FunctionId,
        class: ClassId,
        name: &str,
        flags: FunctionFlags,
    ) -> Result<FunctionId, ReflectError> {
        system.update_function(from, |f| f.flags.remove(FunctionFlags::NATIVE));
        let result = system.duplicate_function(from, class, name);
        system.update_function(from, |f| f.flags = flags);
        let copy = result?;
        system.update_function(copy, |f| f.flags = flags);
        Ok(copy)
    }

    fn activate(&mut self, system: &ObjectSystem, index: usize, active: bool) {
        let record = &mut self.records[index];
        if record.active == active {
            return;
        }
        record.active = active;

        let (class, from, function, overridden) = (record.class, record.from, record.function, record.overridden);
        if record.added {
            if active {
                let hook = self.hook.clone();
                system.update_function(function, |f| {
                    f.super_function = Some(from);
                    f.flags.insert(FunctionFlags::NATIVE);
                    f.dispatch = Dispatch::Script(hook);
                });
                system.push_added_override(class, &record.name, function);
            } else {
                system.pop_added_override(class, &record.name, function);
            }
            return;
        }

        if active {
            let Some(base) = system.base_state(from) else {
                return;
            };
            let hook = self.hook.clone();
            system.update_function(function, |f| {
                f.params = base.params;
                f.super_function = base.super_function;
                f.body = base.body;
                f.dispatch = Dispatch::Script(hook);
            });
            system.push_override(from, function, overridden);
        } else {
            system.pop_override(from, function);
        }
    }

    /// Toggle one override without discarding it
    pub fn set_active(&mut self, system: &ObjectSystem, class: ClassId, name: &str, active: bool) -> bool {
        match self.records.iter().position(|r| r.class == class && r.name == name) {
            Some(index) => {
                self.activate(system, index, active);
                true
            }
            None => false,
        }
    }

    /// Revert every override of `class` to native behavior, keeping the records
    pub fn suspend(&mut self, system: &ObjectSystem, class: ClassId) {
        for index in self.indices_of(class) {
            self.activate(system, index, false);
        }
    }

    pub fn resume(&mut self, system: &ObjectSystem, class: ClassId) {
        for index in self.indices_of(class) {
            self.activate(system, index, true);
        }
    }

    /// Permanently undo one override
    pub fn restore(&mut self, system: &ObjectSystem, class: ClassId, name: &str) -> bool {
        match self.records.iter().position(|r| r.class == class && r.name == name) {
            Some(index) => {
                self.restore_at(system, index);
                true
            }
            None => false,
        }
    }

    /// Permanently undo every override of `class`
    pub fn restore_class(&mut self, system: &ObjectSystem, class: ClassId) -> usize {
        let indices = self.indices_of(class);
        let count = indices.len();
        for index in indices.into_iter().rev() {
            self.restore_at(system, index);
        }
        if count > 0 {
            tracing::debug!("Restored {} overrides of {}", count, system.class_name(class).unwrap_or_default());
        }
        count
    }

    pub fn restore_all(&mut self, system: &ObjectSystem) {
        while !self.records.is_empty() {
            self.restore_at(system, self.records.len() - 1);
        }
    }

    fn restore_at(&mut self, system: &ObjectSystem, index: usize) {
        self.activate(system, index, false);
        let record = self.records.remove(index);
        system.unlink_child(record.class, record.function);
        system.remove_function(record.function);
        if let Some(overridden) = record.overridden {
            system.remove_function(overridden);
        }
    }

    fn indices_of(&self, class: ClassId) -> Vec<usize> {
        self.records.iter().enumerate().filter(|(_, r)| r.class == class).map(|(i, _)| i).collect()
    }
}
