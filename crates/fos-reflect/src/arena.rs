//! Generational arena (slot map) backing object storage.

use crate::ObjectHandle;

pub struct GenArena<T> {
    items: Vec<Option<(T, u32)>>,
    free_list: Vec<u32>,
    generations: Vec<u32>,
}

impl<T> GenArena<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            free_list: Vec::new(),
            generations: Vec::new(),
        }
    }

    /// Insert item
    pub fn insert(&mut self, value: T) -> ObjectHandle {
        if let Some(index) = self.free_list.pop() {
            let generation = self.generations[index as usize];
            self.items[index as usize] = Some((value, generation));
            ObjectHandle { index, generation }
        } else {
            let index = self.items.len() as u32;
            self.items.push(Some((value, 0)));
            self.generations.push(0);
            ObjectHandle { index, generation: 0 }
        }
    }

    /// Get item, if the handle is still live
    pub fn get(&self, handle: ObjectHandle) -> Option<&T> {
        self.items.get(handle.index as usize)
            .and_then(|opt| opt.as_ref())
            .filter(|(_, g)| *g == handle.generation)
            .map(|(val, _)| val)
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Option<&mut T> {
        self.items.get_mut(handle.index as usize)
            .and_then(|opt| opt.as_mut())
            .filter(|(_, g)| *g == handle.generation)
            .map(|(val, _)| val)
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Remove item; the slot's generation is bumped so old handles go stale
    pub fn remove(&mut self, handle: ObjectHandle) -> Option<T> {
        let slot = self.items.get_mut(handle.index as usize)?;
        if !matches!(slot, Some((_, g)) if *g == handle.generation) {
            return None;
        }
        let (val, _) = slot.take()?;
        self.generations[handle.index as usize] = handle.generation.wrapping_add(1);
        self.free_list.push(handle.index);
        Some(val)
    }

    /// Live handles in slot order
    pub fn handles(&self) -> Vec<ObjectHandle> {
        self.items.iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|(_, g)| ObjectHandle { index: i as u32, generation: *g }))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.iter().filter(|i| i.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for GenArena<T> {
    fn default() -> Self { Self::new() }
}
