//! Container Proxy
//!
//! Script-facing view over a native dynamic array. Element operations go
//! through a [`TypeBridge`]; out-of-range indices are ignored rather than
//! raised, so scripts cannot bring down the host with a bad index.
//! Growth past the proxy's byte limit, or past what the allocator can
//! hand out, fails the same quiet way.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use fos_reflect::{RawArray, Value};
use rand::Rng;

use crate::bridge::TypeBridge;
use crate::error::BridgeError;

/// Allocates and frees self-owned backing stores
pub trait ArrayAllocator {
    fn allocate(&self) -> RawArray {
        RawArray::new()
    }

    fn free(&self, store: RawArray);
}

/// Default allocator
#[derive(Debug, Default)]
pub struct HeapAllocator;

impl ArrayAllocator for HeapAllocator {
    fn free(&self, store: RawArray) {
        drop(store);
    }
}

enum Backing {
    /// Owned by a native object; never freed here
    External(Weak<RefCell<RawArray>>),
    /// Owned by the proxy; `None` only after release
    Owned(Option<RawArray>, Rc<dyn ArrayAllocator>),
}

pub struct ContainerProxy {
    backing: Backing,
    bridge: Arc<dyn TypeBridge>,
    element_size: usize,
    /// Holds exactly one element
    scratch: Vec<u8>,
    /// Largest store, in bytes, this proxy grows to
    byte_limit: usize,
}

impl ContainerProxy {
    /// View an array owned by someone else
    pub fn external(store: &Rc<RefCell<RawArray>>, bridge: Arc<dyn TypeBridge>) -> Self {
        Self::with_backing(Backing::External(Rc::downgrade(store)), bridge)
    }

    /// Own a fresh array from `allocator`
    pub fn owned(bridge: Arc<dyn TypeBridge>, allocator: Rc<dyn ArrayAllocator>) -> Self {
        let store = allocator.allocate();
        Self::with_backing(Backing::Owned(Some(store), allocator), bridge)
    }

    pub fn new_owned(bridge: Arc<dyn TypeBridge>) -> Self {
        Self::owned(bridge, Rc::new(HeapAllocator))
    }

    fn with_backing(backing: Backing, bridge: Arc<dyn TypeBridge>) -> Self {
        let element_size = bridge.size();
        let mut scratch = vec![0u8; element_size];
        bridge.initialize(&mut scratch);
        Self { backing, bridge, element_size, scratch, byte_limit: usize::MAX }
    }

    pub fn with_byte_limit(mut self, bytes: usize) -> Self {
        self.byte_limit = bytes;
        self
    }

    /// Whether `count` elements stay under the byte limit
    fn fits(&self, count: usize) -> bool {
        count.checked_mul(self.element_size.max(1)).is_some_and(|bytes| bytes <= self.byte_limit)
    }

    pub fn is_owned(&self) -> bool {
        matches!(self.backing, Backing::Owned(..))
    }

    pub fn bridge(&self) -> &Arc<dyn TypeBridge> {
        &self.bridge
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// False once an external store has been released
    pub fn is_alive(&self) -> bool {
        self.with_store_ref(|_, _, _| ()).is_some()
    }

    fn with_store<R>(&mut self, f: impl FnOnce(&mut RawArray, &dyn TypeBridge, usize) -> R) -> Option<R> {
        let bridge = &*self.bridge;
        let size = self.element_size;
        match &mut self.backing {
            Backing::External(weak) => {
                let store = weak.upgrade()?;
                let mut store = store.borrow_mut();
                Some(f(&mut store, bridge, size))
            }
            Backing::Owned(store, _) => store.as_mut().map(|s| f(s, bridge, size)),
        }
    }

    fn with_store_ref<R>(&self, f: impl FnOnce(&RawArray, &dyn TypeBridge, usize) -> R) -> Option<R> {
        let bridge = &*self.bridge;
        let size = self.element_size;
        match &self.backing {
            Backing::External(weak) => {
                let store = weak.upgrade()?;
                let store = store.borrow();
                Some(f(&store, bridge, size))
            }
            Backing::Owned(store, _) => store.as_ref().map(|s| f(s, bridge, size)),
        }
    }

    fn construct(store: &mut RawArray, bridge: &dyn TypeBridge, size: usize, index: usize, count: usize) {
        for i in index..index + count {
            bridge.initialize(store.element_mut(i, size));
        }
    }

    fn destruct(store: &mut RawArray, bridge: &dyn TypeBridge, size: usize, index: usize, count: usize) {
        for i in index..index + count {
            bridge.destruct(store.element_mut(i, size));
        }
    }

    // ========================================================================
    // Raw element operations
    // ========================================================================

    pub fn len(&self) -> usize {
        self.with_store_ref(|store, _, _| store.num()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_valid_index(&self, index: usize) -> bool {
        index < self.len()
    }

    /// Append one element; returns its index
    pub fn add(&mut self, item: &[u8]) -> Option<usize> {
        if !self.fits(self.len().saturating_add(1)) {
            return None;
        }
        self.with_store(|store, bridge, size| {
            let index = store.add(1, size)?;
            Self::construct(store, bridge, size, index, 1);
            bridge.copy(store.element_mut(index, size), item);
            Some(index)
        })
        .flatten()
    }

    /// Append `count` default-constructed elements; returns the first index
    pub fn add_defaulted(&mut self, count: usize) -> Option<usize> {
        if !self.fits(self.len().saturating_add(count)) {
            return None;
        }
        self.with_store(|store, bridge, size| {
            let index = store.add(count, size)?;
            Self::construct(store, bridge, size, index, count);
            Some(index)
        })
        .flatten()
    }

    /// Index of the first element identical to `item`
    pub fn find(&self, item: &[u8]) -> Option<usize> {
        self.with_store_ref(|store, bridge, size| {
            (0..store.num()).find(|&i| bridge.identical(item, store.element(i, size)))
        })
        .flatten()
    }

    /// Append unless an identical element exists; returns the element's index
    pub fn add_unique(&mut self, item: &[u8]) -> Option<usize> {
        match self.find(item) {
            Some(index) => Some(index),
            None => self.add(item),
        }
    }

    pub fn insert(&mut self, item: &[u8], index: usize) {
        if !self.fits(self.len().saturating_add(1)) {
            return;
        }
        self.with_store(|store, bridge, size| {
            if store.is_valid_index(index) && store.insert(index, 1, size) {
                Self::construct(store, bridge, size, index, 1);
                bridge.copy(store.element_mut(index, size), item);
            }
        });
    }

    pub fn remove(&mut self, index: usize) {
        self.with_store(|store, bridge, size| {
            if store.is_valid_index(index) {
                Self::destruct(store, bridge, size, index, 1);
                store.remove(index, 1, size);
            }
        });
    }

    /// Remove every element identical to `item`; returns how many went
    pub fn remove_item(&mut self, item: &[u8]) -> usize {
        let mut removed = 0;
        while let Some(index) = self.find(item) {
            self.remove(index);
            removed += 1;
        }
        removed
    }

    pub fn clear(&mut self) {
        self.with_store(|store, bridge, size| {
            let num = store.num();
            if num > 0 {
                Self::destruct(store, bridge, size, 0, num);
                store.empty(0, size);
            }
        });
    }

    /// Preallocate room for `capacity` elements. Fails on a non-empty array
    /// and on a capacity the store cannot hold.
    pub fn reserve(&mut self, capacity: usize) -> bool {
        if !self.fits(capacity) {
            return false;
        }
        self.with_store(|store, _, size| store.num() == 0 && store.empty(capacity, size))
            .unwrap_or(false)
    }

    /// Grow with default elements or shrink to `new_len`. Returns false,
    /// leaving the array as it was, when it cannot grow that far.
    pub fn resize(&mut self, new_len: usize) -> bool {
        if !self.fits(new_len) {
            return false;
        }
        self.with_store(|store, bridge, size| {
            let num = store.num();
            if new_len > num {
                let Some(index) = store.add(new_len - num, size) else {
                    return false;
                };
                Self::construct(store, bridge, size, index, new_len - num);
            } else if new_len < num {
                Self::destruct(store, bridge, size, new_len, num - new_len);
                store.remove(new_len, num - new_len, size);
            }
            true
        })
        .unwrap_or(false)
    }

    /// Copy element `index` into `out`; false when out of range
    pub fn get(&self, index: usize, out: &mut [u8]) -> bool {
        self.with_store_ref(|store, bridge, size| {
            if !store.is_valid_index(index) {
                return false;
            }
            bridge.copy(out, store.element(index, size));
            true
        })
        .unwrap_or(false)
    }

    pub fn set(&mut self, index: usize, item: &[u8]) {
        self.with_store(|store, bridge, size| {
            if store.is_valid_index(index) {
                bridge.copy(store.element_mut(index, size), item);
            }
        });
    }

    pub fn swap(&mut self, a: usize, b: usize) {
        self.with_store(|store, _, size| {
            if a != b && store.is_valid_index(a) && store.is_valid_index(b) {
                store.swap(a, b, size);
            }
        });
    }

    /// Fisher-Yates shuffle
    pub fn shuffle(&mut self) {
        self.with_store(|store, _, size| {
            let num = store.num();
            if num < 2 {
                return;
            }
            let mut rng = rand::thread_rng();
            for i in 0..num - 1 {
                let j = rng.gen_range(i..num);
                store.swap(i, j, size);
            }
        });
    }

    /// Append copies of every element of `other`. Element types must match.
    pub fn append(&mut self, other: &ContainerProxy) -> bool {
        if other.bridge.name() != self.bridge.name() || other.element_size != self.element_size {
            return false;
        }
        // Snapshot first: both proxies may view the same store
        let Some(source) = other.with_store_ref(|store, _, size| store.data(size).to_vec()) else {
            return false;
        };
        let count = source.len() / self.element_size.max(1);
        if !self.fits(self.len().saturating_add(count)) {
            return false;
        }
        self.with_store(|store, bridge, size| {
            if count == 0 {
                return true;
            }
            let Some(first) = store.add(count, size) else {
                return false;
            };
            Self::construct(store, bridge, size, first, count);
            for (i, src) in source.chunks(size.max(1)).enumerate() {
                bridge.copy(store.element_mut(first + i, size), src);
            }
            true
        })
        .unwrap_or(false)
    }

    // ========================================================================
    // Value operations (through the scratch element)
    // ========================================================================

    fn stage(&mut self, value: &Value) -> Result<Vec<u8>, BridgeError> {
        let mut scratch = std::mem::take(&mut self.scratch);
        self.bridge.initialize(&mut scratch);
        match self.bridge.write(&mut scratch, value) {
            Ok(()) => Ok(scratch),
            Err(e) => {
                self.scratch = scratch;
                Err(e)
            }
        }
    }

    fn unstage(&mut self, mut scratch: Vec<u8>) {
        self.bridge.destruct(&mut scratch);
        self.scratch = scratch;
    }

    pub fn add_value(&mut self, value: &Value) -> Result<Option<usize>, BridgeError> {
        let item = self.stage(value)?;
        let index = self.add(&item);
        self.unstage(item);
        Ok(index)
    }

    pub fn add_unique_value(&mut self, value: &Value) -> Result<Option<usize>, BridgeError> {
        let item = self.stage(value)?;
        let index = self.add_unique(&item);
        self.unstage(item);
        Ok(index)
    }

    pub fn find_value(&mut self, value: &Value) -> Result<Option<usize>, BridgeError> {
        let item = self.stage(value)?;
        let index = self.find(&item);
        self.unstage(item);
        Ok(index)
    }

    pub fn insert_value(&mut self, value: &Value, index: usize) -> Result<(), BridgeError> {
        let item = self.stage(value)?;
        self.insert(&item, index);
        self.unstage(item);
        Ok(())
    }

    pub fn remove_item_value(&mut self, value: &Value) -> Result<usize, BridgeError> {
        let item = self.stage(value)?;
        let removed = self.remove_item(&item);
        self.unstage(item);
        Ok(removed)
    }

    pub fn set_value(&mut self, index: usize, value: &Value) -> Result<(), BridgeError> {
        let item = self.stage(value)?;
        self.set(index, &item);
        self.unstage(item);
        Ok(())
    }

    pub fn get_value(&mut self, index: usize) -> Option<Value> {
        let mut scratch = std::mem::take(&mut self.scratch);
        let value = self.get(index, &mut scratch).then(|| self.bridge.read(&scratch));
        self.scratch = scratch;
        value
    }

    pub fn to_values(&self) -> Vec<Value> {
        self.with_store_ref(|store, bridge, size| {
            (0..store.num()).map(|i| bridge.read(store.element(i, size))).collect()
        })
        .unwrap_or_default()
    }
}

impl Drop for ContainerProxy {
    fn drop(&mut self) {
        if let Backing::Owned(..) = self.backing {
            self.clear();
            if let Backing::Owned(store, allocator) = &mut self.backing {
                if let Some(store) = store.take() {
                    allocator.free(store);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{Scalar, ScalarBridge};

    fn int_array() -> ContainerProxy {
        ContainerProxy::new_owned(Arc::new(ScalarBridge(Scalar::Int32)))
    }

    fn filled(values: &[i64]) -> ContainerProxy {
        let mut array = int_array();
        for v in values {
            array.add_value(&Value::Int(*v)).unwrap();
        }
        array
    }

    fn ints(array: &ContainerProxy) -> Vec<i64> {
        array.to_values().iter().filter_map(|v| v.as_int()).collect()
    }

    #[test]
    fn test_add_then_get() {
        let mut array = int_array();
        let index = array.add_value(&Value::Int(7)).unwrap().unwrap();
        assert_eq!(index, 0);
        assert_eq!(array.get_value(index), Some(Value::Int(7)));
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut array = filled(&[1, 2, 3, 4]);
        array.remove(1);
        assert_eq!(ints(&array), vec![1, 3, 4]);
    }

    #[test]
    fn test_out_of_range_is_noop() {
        let mut array = filled(&[1, 2]);
        array.remove(5);
        array.insert_value(&Value::Int(9), 2).unwrap();
        array.set_value(10, &Value::Int(9)).unwrap();
        array.swap(0, 7);
        assert_eq!(array.get_value(2), None);
        assert_eq!(ints(&array), vec![1, 2]);
    }

    #[test]
    fn test_insert() {
        let mut array = filled(&[1, 3]);
        array.insert_value(&Value::Int(2), 1).unwrap();
        assert_eq!(ints(&array), vec![1, 2, 3]);
    }

    #[test]
    fn test_add_unique_and_remove_item() {
        let mut array = filled(&[5, 6, 5]);
        assert_eq!(array.add_unique_value(&Value::Int(6)).unwrap(), Some(1));
        assert_eq!(array.len(), 3);
        assert_eq!(array.add_unique_value(&Value::Int(8)).unwrap(), Some(3));
        assert_eq!(array.remove_item_value(&Value::Int(5)).unwrap(), 2);
        assert_eq!(ints(&array), vec![6, 8]);
    }

    #[test]
    fn test_reserve() {
        let mut array = int_array();
        assert!(array.reserve(16));
        array.add_value(&Value::Int(1)).unwrap();
        assert!(!array.reserve(32));
        assert_eq!(ints(&array), vec![1]);
    }

    #[test]
    fn test_resize() {
        let mut array = filled(&[1, 2, 3]);
        assert!(array.resize(5));
        assert_eq!(ints(&array), vec![1, 2, 3, 0, 0]);
        assert!(array.resize(1));
        assert_eq!(ints(&array), vec![1]);
    }

    #[test]
    fn test_oversized_reserve_and_resize_refused() {
        let mut array = int_array();
        assert!(!array.reserve(usize::MAX / 2));
        assert!(!array.reserve(1_000_000_000_000_000_000));
        assert!(!array.resize(100_000_000_000_000_000));
        assert!(array.is_empty());

        array.add_value(&Value::Int(4)).unwrap();
        assert!(!array.resize(usize::MAX));
        assert_eq!(ints(&array), vec![4]);
    }

    #[test]
    fn test_byte_limit() {
        // Four int32 elements fit in sixteen bytes
        let mut array = int_array().with_byte_limit(16);
        assert!(array.reserve(4));
        assert!(!array.reserve(5));
        assert!(array.resize(4));
        assert_eq!(array.add_value(&Value::Int(1)).unwrap(), None);
        assert_eq!(array.add_defaulted(1), None);
        assert_eq!(array.len(), 4);

        let other = filled(&[1]);
        assert!(!array.append(&other));
        assert!(array.resize(2));
        assert!(array.append(&other));
        assert_eq!(ints(&array), vec![0, 0, 1]);
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut array = filled(&[1, 2, 3, 4, 5, 6, 7, 8]);
        array.shuffle();
        let mut values = ints(&array);
        values.sort();
        assert_eq!(values, vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_append() {
        let mut a = filled(&[1]);
        let b = filled(&[2, 3]);
        assert!(a.append(&b));
        assert_eq!(ints(&a), vec![1, 2, 3]);

        let names = ContainerProxy::new_owned(Arc::new(crate::bridge::NameBridge));
        assert!(!a.append(&names));
    }

    #[test]
    fn test_type_mismatch() {
        let mut array = int_array();
        assert!(array.add_value(&Value::Str("nope".into())).is_err());
        assert!(array.is_empty());
    }

    #[test]
    fn test_external_released() {
        let store = Rc::new(RefCell::new(RawArray::new()));
        let mut array = ContainerProxy::external(&store, Arc::new(ScalarBridge(Scalar::Int32)));
        array.add_value(&Value::Int(1)).unwrap();
        assert_eq!(store.borrow().num(), 1);

        drop(store);
        assert!(!array.is_alive());
        assert_eq!(array.add_value(&Value::Int(2)).unwrap(), None);
        assert_eq!(array.len(), 0);
    }
}
