//! Object System
//!
//! Owns classes, functions and objects, dispatches calls and notifies
//! script hosts about object lifecycle.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use crate::arena::GenArena;
use crate::class::{ClassBuilder, ClassDef, PropertyDef};
use crate::function::{Dispatch, FunctionBody, FunctionDef, FunctionState, ScriptHook};
use crate::host::{CallFrame, HostId, ScriptHost};
use crate::{
    ClassFlags, ClassId, FunctionFlags, FunctionId, ObjectFlags, ObjectHandle, PropertyKind, RawArray,
    ReflectError, Value,
};

/// Storage of one property on an object
#[derive(Debug, Clone)]
pub enum PropertyValue {
    Scalar(Value),
    Array(Rc<RefCell<RawArray>>),
}

/// A live object
#[derive(Debug)]
pub struct ObjectData {
    pub class: ClassId,
    pub name: String,
    pub flags: ObjectFlags,
    pub properties: Vec<PropertyValue>,
}

/// Script overrides stacked on one function, oldest first
#[derive(Debug)]
struct OverrideChain {
    original: FunctionState,
    layers: Vec<OverrideLayer>,
}

#[derive(Debug, Clone, Copy)]
struct OverrideLayer {
    function: FunctionId,
    /// Copy that runs whatever sits below this layer
    overridden: Option<FunctionId>,
}

impl OverrideChain {
    /// Dispatch state that forwards to the layer below `depth`
    fn state_below(&self, depth: usize) -> FunctionState {
        match depth.checked_sub(1).and_then(|i| self.layers.get(i)) {
            None => self.original.clone(),
            Some(layer) => {
                let mut flags = self.original.flags;
                flags.insert(FunctionFlags::NATIVE);
                FunctionState {
                    flags,
                    params: self.original.params.clone(),
                    super_function: self.original.super_function,
                    body: FunctionBody::Redirect(layer.function),
                    dispatch: Dispatch::Trampoline,
                }
            }
        }
    }
}

/// Reflected object runtime
#[derive(Default)]
pub struct ObjectSystem {
    classes: RefCell<Vec<Option<ClassDef>>>,
    class_names: RefCell<HashMap<String, ClassId>>,
    functions: RefCell<Vec<Option<FunctionDef>>>,
    override_chains: RefCell<HashMap<FunctionId, OverrideChain>>,
    added_chains: RefCell<HashMap<(ClassId, String), Vec<FunctionId>>>,
    objects: RefCell<GenArena<ObjectData>>,
    roots: RefCell<HashSet<ObjectHandle>>,
    hosts: RefCell<Vec<(HostId, Weak<dyn ScriptHost>)>>,
    next_object: Cell<u32>,
}

impl ObjectSystem {
    pub fn new() -> Self { Self::default() }

    // ========================================================================
    // Classes
    // ========================================================================

    /// Define a class and create its default object.
    ///
    /// Redefining an existing name marks the previous class as stale
    /// (`NEWER_VERSION_EXISTS`) and makes the name resolve to the new one.
    pub fn define_class(&self, builder: ClassBuilder) -> Result<ClassId, ReflectError> {
        if let Some(super_class) = builder.super_class {
            if !self.is_class_valid(super_class) {
                return Err(ReflectError::UnknownClass(format!("#{}", super_class.0)));
            }
        }

        let id = ClassId(self.classes.borrow().len() as u32);
        let mut def = ClassDef {
            name: builder.name.clone(),
            super_class: builder.super_class,
            flags: builder.flags,
            package: builder.package,
            module_name: builder.module_name,
            properties: builder.properties,
            function_map: HashMap::new(),
            children: Vec::new(),
            default_object: None,
        };

        for spec in builder.functions {
            let mut function = FunctionDef::new(&spec.name, id, spec.flags);
            function.params = spec.params;
            function.return_kind = spec.return_kind;
            function.body = FunctionBody::Code(spec.body);
            if let Some(native) = spec.native {
                function.dispatch = Dispatch::Native(native);
            }
            if let Some(super_class) = builder.super_class {
                function.super_function = self.find_function(super_class, &spec.name);
            }
            let fid = self.push_function(function);
            def.function_map.insert(spec.name, fid);
            def.children.push(fid);
        }

        self.classes.borrow_mut().push(Some(def));

        let previous = self.class_names.borrow_mut().insert(builder.name.clone(), id);
        if let Some(previous) = previous {
            self.update_class(previous, |c| c.flags.insert(ClassFlags::NEWER_VERSION_EXISTS));
        }

        let properties = self.instance_properties(id);
        let cdo = self.objects.borrow_mut().insert(ObjectData {
            class: id,
            name: format!("Default__{}", builder.name),
            flags: ObjectFlags::CLASS_DEFAULT,
            properties: properties.iter().map(|p| Self::initial_value(&p.kind)).collect(),
        });
        self.update_class(id, |c| c.default_object = Some(cdo));

        tracing::debug!("Defined class {} ({:?})", builder.name, id);
        Ok(id)
    }

    /// Destroy a class, its instances and its functions.
    ///
    /// Hosts are notified first so they can restore anything they installed.
    pub fn destroy_class(&self, class: ClassId) {
        if !self.is_class_valid(class) {
            return;
        }

        let instances: Vec<ObjectHandle> = {
            let objects = self.objects.borrow();
            objects.handles().into_iter()
                .filter(|h| objects.get(*h).map(|o| o.class == class).unwrap_or(false))
                .collect()
        };
        for handle in instances {
            self.destroy_object(handle);
        }

        for host in self.live_hosts() {
            host.class_destroyed(self, class);
        }

        let Some(def) = self.classes.borrow_mut()[class.0 as usize].take() else {
            return;
        };
        {
            let mut functions = self.functions.borrow_mut();
            for fid in def.children.iter().chain(def.function_map.values()) {
                if let Some(slot) = functions.get_mut(fid.0 as usize) {
                    *slot = None;
                }
            }
        }
        self.override_chains
            .borrow_mut()
            .retain(|fid, _| !def.children.contains(fid) && !def.function_map.values().any(|f| f == fid));
        self.added_chains.borrow_mut().retain(|(c, _), _| *c != class);
        let mut names = self.class_names.borrow_mut();
        if names.get(&def.name) == Some(&class) {
            names.remove(&def.name);
        }
        tracing::debug!("Destroyed class {}", def.name);
    }

    pub fn find_class(&self, name: &str) -> Option<ClassId> {
        self.class_names.borrow().get(name).copied()
    }

    pub fn is_class_valid(&self, class: ClassId) -> bool {
        self.classes.borrow().get(class.0 as usize).map(|c| c.is_some()).unwrap_or(false)
    }

    /// Run `f` against a class definition
    pub fn with_class<R>(&self, class: ClassId, f: impl FnOnce(&ClassDef) -> R) -> Option<R> {
        let classes = self.classes.borrow();
        classes.get(class.0 as usize).and_then(|c| c.as_ref()).map(f)
    }

    pub fn update_class<R>(&self, class: ClassId, f: impl FnOnce(&mut ClassDef) -> R) -> Option<R> {
        let mut classes = self.classes.borrow_mut();
        classes.get_mut(class.0 as usize).and_then(|c| c.as_mut()).map(f)
    }

    pub fn class_name(&self, class: ClassId) -> Option<String> {
        self.with_class(class, |c| c.name.clone())
    }

    pub fn class_flags(&self, class: ClassId) -> ClassFlags {
        self.with_class(class, |c| c.flags).unwrap_or_default()
    }

    pub fn super_class(&self, class: ClassId) -> Option<ClassId> {
        self.with_class(class, |c| c.super_class).flatten()
    }

    pub fn class_default_object(&self, class: ClassId) -> Option<ObjectHandle> {
        self.with_class(class, |c| c.default_object).flatten()
    }

    /// Whether `class` is `parent` or derives from it
    pub fn is_child_of(&self, class: ClassId, parent: ClassId) -> bool {
        let mut current = Some(class);
        while let Some(c) = current {
            if c == parent {
                return true;
            }
            current = self.super_class(c);
        }
        false
    }

    /// Properties of an instance of `class`, super class first
    pub fn instance_properties(&self, class: ClassId) -> Vec<PropertyDef> {
        let mut chain = Vec::new();
        let mut current = Some(class);
        while let Some(c) = current {
            chain.push(c);
            current = self.super_class(c);
        }
        chain.iter().rev()
            .filter_map(|c| self.with_class(*c, |def| def.properties.clone()))
            .flatten()
            .collect()
    }

    /// Index of a property within instances of `class`
    pub fn find_property(&self, class: ClassId, name: &str) -> Option<(usize, PropertyDef)> {
        self.instance_properties(class).into_iter().enumerate().find(|(_, p)| p.name == name)
    }

    // ========================================================================
    // Functions
    // ========================================================================

    fn push_function(&self, def: FunctionDef) -> FunctionId {
        let mut functions = self.functions.borrow_mut();
        let id = FunctionId(functions.len() as u32);
        functions.push(Some(def));
        id
    }

    pub fn function(&self, function: FunctionId) -> Option<FunctionDef> {
        self.with_function(function, |f| f.clone())
    }

    pub fn with_function<R>(&self, function: FunctionId, f: impl FnOnce(&FunctionDef) -> R) -> Option<R> {
        let functions = self.functions.borrow();
        functions.get(function.0 as usize).and_then(|f| f.as_ref()).map(f)
    }

    pub fn update_function<R>(&self, function: FunctionId, f: impl FnOnce(&mut FunctionDef) -> R) -> Option<R> {
        let mut functions = self.functions.borrow_mut();
        functions.get_mut(function.0 as usize).and_then(|f| f.as_mut()).map(f)
    }

    pub fn function_state(&self, function: FunctionId) -> Option<FunctionState> {
        self.with_function(function, |f| f.state())
    }

    pub fn is_function_valid(&self, function: FunctionId) -> bool {
        self.with_function(function, |_| ()).is_some()
    }

    /// Look a function up by name, walking the super chain
    pub fn find_function(&self, class: ClassId, name: &str) -> Option<FunctionId> {
        let mut current = Some(class);
        while let Some(c) = current {
            if let Some(fid) = self.find_own_function(c, name) {
                return Some(fid);
            }
            current = self.super_class(c);
        }
        None
    }

    /// Look a function up in the class's own function map
    pub fn find_own_function(&self, class: ClassId, name: &str) -> Option<FunctionId> {
        self.with_class(class, |c| c.function_map.get(name).copied()).flatten()
    }

    /// Visible functions of a class by name, most derived first wins
    pub fn functions_of(&self, class: ClassId) -> Vec<(String, FunctionId)> {
        let mut seen = HashSet::new();
        let mut result = Vec::new();
        let mut current = Some(class);
        while let Some(c) = current {
            let mut own: Vec<(String, FunctionId)> = self
                .with_class(c, |def| def.function_map.iter().map(|(n, f)| (n.clone(), *f)).collect())
                .unwrap_or_default();
            own.sort_by_key(|(_, f)| *f);
            for (name, fid) in own {
                if seen.insert(name.clone()) {
                    result.push((name, fid));
                }
            }
            current = self.super_class(c);
        }
        result
    }

    /// Structural copy of a function under a new owner and name.
    ///
    /// Functions flagged NATIVE cannot be duplicated.
    pub fn duplicate_function(&self, function: FunctionId, owner: ClassId, name: &str) -> Result<FunctionId, ReflectError> {
        let source = self.function(function)
            .ok_or_else(|| ReflectError::UnknownFunction { class: format!("#{}", owner.0), function: name.to_string() })?;
        if source.flags.contains(FunctionFlags::NATIVE) {
            return Err(ReflectError::NativeDuplicate(source.name));
        }
        let mut copy = source;
        copy.name = name.to_string();
        copy.owner = owner;
        Ok(self.push_function(copy))
    }

    /// Release a function created by `duplicate_function`
    pub fn remove_function(&self, function: FunctionId) {
        if let Some(slot) = self.functions.borrow_mut().get_mut(function.0 as usize) {
            *slot = None;
        }
    }

    /// Append a function to the class's method chain
    pub fn link_child(&self, class: ClassId, function: FunctionId) {
        self.update_class(class, |c| {
            if !c.children.contains(&function) {
                c.children.push(function);
            }
        });
    }

    pub fn unlink_child(&self, class: ClassId, function: FunctionId) {
        self.update_class(class, |c| c.children.retain(|f| *f != function));
    }

    pub fn add_function_to_map(&self, class: ClassId, name: &str, function: FunctionId) {
        self.update_class(class, |c| c.function_map.insert(name.to_string(), function));
    }

    pub fn remove_function_from_map(&self, class: ClassId, name: &str) -> Option<FunctionId> {
        self.update_class(class, |c| c.function_map.remove(name)).flatten()
    }

    // ========================================================================
    // Override chains
    // ========================================================================

    /// State of `function` before any script override was stacked on it
    pub fn base_state(&self, function: FunctionId) -> Option<FunctionState> {
        if let Some(chain) = self.override_chains.borrow().get(&function) {
            return Some(chain.original.clone());
        }
        self.function_state(function)
    }

    /// Number of script overrides currently stacked on `function`
    pub fn override_depth(&self, function: FunctionId) -> usize {
        self.override_chains.borrow().get(&function).map(|c| c.layers.len()).unwrap_or(0)
    }

    /// Stack the script-dispatched `function` on top of `target`.
    ///
    /// `target` keeps its identity and redirects to the newest layer;
    /// `overridden` is re-pointed at whatever sits below the new layer.
    pub fn push_override(&self, target: FunctionId, function: FunctionId, overridden: Option<FunctionId>) -> bool {
        let Some(state) = self.function_state(target) else {
            return false;
        };
        {
            let mut chains = self.override_chains.borrow_mut();
            let chain = chains.entry(target).or_insert_with(|| OverrideChain { original: state, layers: Vec::new() });
            chain.layers.retain(|l| l.function != function);
            chain.layers.push(OverrideLayer { function, overridden });
        }
        self.relink_overrides(target);
        true
    }

    /// Take `function` out of `target`'s chain wherever it sits.
    ///
    /// The layers around it are re-pointed; removing the last layer writes
    /// the original state back.
    pub fn pop_override(&self, target: FunctionId, function: FunctionId) -> bool {
        let emptied = {
            let mut chains = self.override_chains.borrow_mut();
            let Some(chain) = chains.get_mut(&target) else {
                return false;
            };
            let before = chain.layers.len();
            chain.layers.retain(|l| l.function != function);
            if chain.layers.len() == before {
                return false;
            }
            if chain.layers.is_empty() { chains.remove(&target) } else { None }
        };
        match emptied {
            Some(chain) => self.apply_state(target, chain.original),
            None => self.relink_overrides(target),
        }
        true
    }

    fn relink_overrides(&self, target: FunctionId) {
        let updates: Vec<(FunctionId, FunctionState)> = {
            let chains = self.override_chains.borrow();
            let Some(chain) = chains.get(&target) else {
                return;
            };
            let mut updates = vec![(target, chain.state_below(chain.layers.len()))];
            for (depth, layer) in chain.layers.iter().enumerate() {
                if let Some(overridden) = layer.overridden {
                    updates.push((overridden, chain.state_below(depth)));
                }
            }
            updates
        };
        for (function, state) in updates {
            self.apply_state(function, state);
        }
    }

    fn apply_state(&self, function: FunctionId, state: FunctionState) {
        self.update_function(function, |f| {
            f.flags = state.flags;
            f.params = state.params;
            f.super_function = state.super_function;
            f.body = state.body;
            f.dispatch = state.dispatch;
        });
    }

    /// Install `function` in `class`'s map under `name`, above any function
    /// another host added there
    pub fn push_added_override(&self, class: ClassId, name: &str, function: FunctionId) {
        {
            let mut chains = self.added_chains.borrow_mut();
            let chain = chains.entry((class, name.to_string())).or_default();
            chain.retain(|f| *f != function);
            chain.push(function);
        }
        self.add_function_to_map(class, name, function);
    }

    /// Remove an added function; the next newest one takes the map slot
    pub fn pop_added_override(&self, class: ClassId, name: &str, function: FunctionId) -> bool {
        let key = (class, name.to_string());
        let top = {
            let mut chains = self.added_chains.borrow_mut();
            let Some(chain) = chains.get_mut(&key) else {
                return false;
            };
            let before = chain.len();
            chain.retain(|f| *f != function);
            if chain.len() == before {
                return false;
            }
            let top = chain.last().copied();
            if top.is_none() {
                chains.remove(&key);
            }
            top
        };
        match top {
            Some(top) => self.add_function_to_map(class, name, top),
            None => {
                if self.find_own_function(class, name) == Some(function) {
                    self.remove_function_from_map(class, name);
                }
            }
        }
        true
    }

    // ========================================================================
    // Objects
    // ========================================================================

    pub fn new_object(&self, class: ClassId, name: &str) -> Result<ObjectHandle, ReflectError> {
        self.new_object_with(None, class, name, ObjectFlags::NONE)
    }

    /// Create an object that is still loading; hosts see `ASYNC_LOADING`
    pub fn new_loading_object(&self, class: ClassId, name: &str) -> Result<ObjectHandle, ReflectError> {
        self.new_object_with(None, class, name, ObjectFlags::ASYNC_LOADING | ObjectFlags::NEED_POST_LOAD)
    }

    pub fn new_object_with(
        &self,
        active: Option<&dyn ScriptHost>,
        class: ClassId,
        name: &str,
        flags: ObjectFlags,
    ) -> Result<ObjectHandle, ReflectError> {
        if !self.is_class_valid(class) {
            return Err(ReflectError::UnknownClass(format!("#{}", class.0)));
        }
        let properties = self.instance_properties(class);
        let name = if name.is_empty() {
            let n = self.next_object.get();
            self.next_object.set(n + 1);
            format!("{}_{}", self.class_name(class).unwrap_or_default(), n)
        } else {
            name.to_string()
        };
        let handle = self.objects.borrow_mut().insert(ObjectData {
            class,
            name,
            flags,
            properties: properties.iter().map(|p| Self::initial_value(&p.kind)).collect(),
        });

        for host in self.live_hosts() {
            match active.filter(|a| a.host_id() == host.host_id()) {
                Some(active) => active.object_created(self, handle),
                None => host.object_created(self, handle),
            }
        }
        Ok(handle)
    }

    /// Clear loading flags once an object has finished async loading
    pub fn finish_loading(&self, object: ObjectHandle) {
        if let Some(data) = self.objects.borrow_mut().get_mut(object) {
            data.flags.remove(ObjectFlags::ASYNC_LOADING | ObjectFlags::NEED_POST_LOAD);
        }
    }

    pub fn destroy_object(&self, object: ObjectHandle) -> bool {
        let removed = self.objects.borrow_mut().remove(object);
        if removed.is_none() {
            return false;
        }
        self.roots.borrow_mut().remove(&object);
        for host in self.live_hosts() {
            host.object_deleted(self, object);
        }
        true
    }

    pub fn is_valid(&self, object: ObjectHandle) -> bool {
        self.objects.borrow().contains(object)
    }

    pub fn object_class(&self, object: ObjectHandle) -> Option<ClassId> {
        self.objects.borrow().get(object).map(|o| o.class)
    }

    pub fn object_name(&self, object: ObjectHandle) -> Option<String> {
        self.objects.borrow().get(object).map(|o| o.name.clone())
    }

    pub fn object_flags(&self, object: ObjectHandle) -> ObjectFlags {
        self.objects.borrow().get(object).map(|o| o.flags).unwrap_or_default()
    }

    pub fn set_object_flags(&self, object: ObjectHandle, flags: ObjectFlags) {
        if let Some(data) = self.objects.borrow_mut().get_mut(object) {
            data.flags = flags;
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.borrow().len()
    }

    /// Keep an object alive regardless of other references
    pub fn add_root(&self, object: ObjectHandle) {
        if self.is_valid(object) {
            self.roots.borrow_mut().insert(object);
        }
    }

    pub fn remove_root(&self, object: ObjectHandle) {
        self.roots.borrow_mut().remove(&object);
    }

    pub fn is_rooted(&self, object: ObjectHandle) -> bool {
        self.roots.borrow().contains(&object)
    }

    fn initial_value(kind: &PropertyKind) -> PropertyValue {
        match kind {
            PropertyKind::Array(_) => PropertyValue::Array(Rc::new(RefCell::new(RawArray::new()))),
            other => PropertyValue::Scalar(other.default_value()),
        }
    }

    // ========================================================================
    // Properties
    // ========================================================================

    fn resolve_property(&self, object: ObjectHandle, name: &str) -> Result<(usize, PropertyDef), ReflectError> {
        let class = self.object_class(object).ok_or(ReflectError::StaleObject(object))?;
        self.find_property(class, name).ok_or_else(|| ReflectError::UnknownProperty {
            class: self.class_name(class).unwrap_or_default(),
            property: name.to_string(),
        })
    }

    pub fn get_property(&self, object: ObjectHandle, name: &str) -> Result<Value, ReflectError> {
        let (index, def) = self.resolve_property(object, name)?;
        let objects = self.objects.borrow();
        let data = objects.get(object).ok_or(ReflectError::StaleObject(object))?;
        match &data.properties[index] {
            PropertyValue::Scalar(v) => Ok(v.clone()),
            PropertyValue::Array(_) => Err(ReflectError::TypeMismatch {
                expected: "scalar".into(),
                got: def.kind.type_name(),
            }),
        }
    }

    pub fn set_property(&self, object: ObjectHandle, name: &str, value: Value) -> Result<(), ReflectError> {
        let (index, def) = self.resolve_property(object, name)?;
        if def.kind.is_array() {
            return Err(ReflectError::TypeMismatch { expected: def.kind.type_name(), got: value.type_name().into() });
        }
        let value = def.kind.coerce(value)?;
        let mut objects = self.objects.borrow_mut();
        let data = objects.get_mut(object).ok_or(ReflectError::StaleObject(object))?;
        data.properties[index] = PropertyValue::Scalar(value);
        Ok(())
    }

    /// Backing store and element kind of an array property
    pub fn array_property(&self, object: ObjectHandle, name: &str) -> Result<(Rc<RefCell<RawArray>>, PropertyKind), ReflectError> {
        let (index, def) = self.resolve_property(object, name)?;
        let objects = self.objects.borrow();
        let data = objects.get(object).ok_or(ReflectError::StaleObject(object))?;
        match (&data.properties[index], def.kind) {
            (PropertyValue::Array(store), PropertyKind::Array(inner)) => Ok((store.clone(), *inner)),
            (_, kind) => Err(ReflectError::TypeMismatch { expected: "array".into(), got: kind.type_name() }),
        }
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Call a function by name on an object
    pub fn call(&self, object: ObjectHandle, name: &str, args: &[Value]) -> Result<Value, ReflectError> {
        self.call_with(None, object, name, args)
    }

    pub fn call_with(
        &self,
        active: Option<&dyn ScriptHost>,
        object: ObjectHandle,
        name: &str,
        args: &[Value],
    ) -> Result<Value, ReflectError> {
        let class = self.object_class(object).ok_or(ReflectError::StaleObject(object))?;
        let function = self.find_function(class, name).ok_or_else(|| ReflectError::UnknownFunction {
            class: self.class_name(class).unwrap_or_default(),
            function: name.to_string(),
        })?;
        self.invoke_with(active, function, object, args)
    }

    /// Invoke a specific function
    pub fn invoke(&self, function: FunctionId, object: ObjectHandle, args: &[Value]) -> Result<Value, ReflectError> {
        self.invoke_with(None, function, object, args)
    }

    pub fn invoke_with(
        &self,
        active: Option<&dyn ScriptHost>,
        function: FunctionId,
        object: ObjectHandle,
        args: &[Value],
    ) -> Result<Value, ReflectError> {
        if !object.is_null() && !self.is_valid(object) {
            return Err(ReflectError::StaleObject(object));
        }

        let (name, dispatch, redirect) = self
            .with_function(function, |f| {
                let redirect = match f.body {
                    FunctionBody::Redirect(target) => Some(target),
                    FunctionBody::Code(_) => None,
                };
                (f.name.clone(), f.dispatch.clone(), redirect)
            })
            .ok_or_else(|| ReflectError::UnknownFunction {
                class: String::new(),
                function: format!("#{}", function.0),
            })?;

        match dispatch {
            Dispatch::Unbound => Ok(Value::Void),
            Dispatch::Native(native) => {
                let frame = CallFrame { system: self, function, object, args, active };
                native(&frame)
            }
            Dispatch::Script(hook) => self.dispatch_script(active, &hook, function, object, args),
            Dispatch::Trampoline => {
                let target = redirect.ok_or_else(|| ReflectError::Unbound(name.clone()))?;
                match self.with_function(target, |f| f.dispatch.clone()) {
                    Some(Dispatch::Script(hook)) => self.dispatch_script(active, &hook, target, object, args),
                    _ => Err(ReflectError::Unbound(name)),
                }
            }
        }
    }

    fn dispatch_script(
        &self,
        active: Option<&dyn ScriptHost>,
        hook: &ScriptHook,
        function: FunctionId,
        object: ObjectHandle,
        args: &[Value],
    ) -> Result<Value, ReflectError> {
        if let Some(active) = active.filter(|a| a.host_id() == hook.host_id()) {
            return active.invoke_script(self, function, object, args);
        }
        match hook.upgrade() {
            Some(host) => host.invoke_script(self, function, object, args),
            None => {
                tracing::debug!("Script host {} is gone, skipping dispatch", hook.host_id());
                Ok(Value::Void)
            }
        }
    }

    // ========================================================================
    // Hosts
    // ========================================================================

    pub fn add_host(&self, id: HostId, host: Weak<dyn ScriptHost>) {
        self.hosts.borrow_mut().push((id, host));
    }

    pub fn remove_host(&self, id: HostId) {
        self.hosts.borrow_mut().retain(|(h, _)| *h != id);
    }

    fn live_hosts(&self) -> Vec<Rc<dyn ScriptHost>> {
        let mut hosts = self.hosts.borrow_mut();
        hosts.retain(|(_, h)| h.strong_count() > 0);
        hosts.iter().filter_map(|(_, h)| h.upgrade()).collect()
    }
}
