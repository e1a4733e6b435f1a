//! Script value references
//!
//! Keeps script values alive across native code by opaque id.

use std::collections::HashMap;

use rquickjs::{Ctx, Persistent, Value};

/// Opaque reference id (0 is never issued)
pub type RefId = u32;

#[derive(Default)]
pub struct RefTable {
    next: RefId,
    entries: HashMap<RefId, Persistent<Value<'static>>>,
}

impl RefTable {
    pub fn new() -> Self { Self::default() }

    pub fn add<'js>(&mut self, ctx: &Ctx<'js>, value: Value<'js>) -> RefId {
        self.next = self.next.wrapping_add(1).max(1);
        self.entries.insert(self.next, Persistent::save(ctx, value));
        self.next
    }

    pub fn get<'js>(&self, ctx: &Ctx<'js>, id: RefId) -> Option<Value<'js>> {
        self.entries.get(&id)?.clone().restore(ctx).ok()
    }

    pub fn release(&mut self, id: RefId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    #[test]
    fn test_add_get_release() {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        let mut table = RefTable::new();

        context.with(|ctx| {
            let value: Value = ctx.eval("({ hp: 10 })").unwrap();
            let id = table.add(&ctx, value);
            assert_ne!(id, 0);

            let back = table.get(&ctx, id).unwrap();
            let hp: i32 = back.as_object().unwrap().get("hp").unwrap();
            assert_eq!(hp, 10);

            assert!(table.release(id));
            assert!(!table.release(id));
            assert!(table.get(&ctx, id).is_none());
        });
        table.clear();
    }
}
