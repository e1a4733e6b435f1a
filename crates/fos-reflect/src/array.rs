//! Raw dynamic array
//!
//! Untyped growable byte storage. Every operation takes the element size;
//! element construction and destruction belong to the caller.

/// Native dynamic array backing store
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawArray {
    data: Vec<u8>,
    num: usize,
    max: usize,
}

impl RawArray {
    pub fn new() -> Self { Self::default() }

    /// Number of elements
    pub fn num(&self) -> usize {
        self.num
    }

    /// Allocated element capacity
    pub fn max(&self) -> usize {
        self.max
    }

    pub fn is_empty(&self) -> bool {
        self.num == 0
    }

    pub fn is_valid_index(&self, index: usize) -> bool {
        index < self.num
    }

    /// Bytes of all live elements
    pub fn data(&self, element_size: usize) -> &[u8] {
        &self.data[..self.num * element_size]
    }

    pub fn data_mut(&mut self, element_size: usize) -> &mut [u8] {
        &mut self.data[..self.num * element_size]
    }

    /// Bytes of a single element
    pub fn element(&self, index: usize, element_size: usize) -> &[u8] {
        let offset = index * element_size;
        &self.data[offset..offset + element_size]
    }

    pub fn element_mut(&mut self, index: usize, element_size: usize) -> &mut [u8] {
        let offset = index * element_size;
        &mut self.data[offset..offset + element_size]
    }

    /// Append `count` zeroed, unconstructed slots. Returns the first new
    /// index, or `None` when the store cannot grow that far.
    pub fn add(&mut self, count: usize, element_size: usize) -> Option<usize> {
        let index = self.num;
        let num = self.num.checked_add(count)?;
        if !self.grow(num, element_size) {
            return None;
        }
        self.num = num;
        Some(index)
    }

    /// Open `count` zeroed slots at `index`, shifting successors up
    pub fn insert(&mut self, index: usize, count: usize, element_size: usize) -> bool {
        let old_len = self.num * element_size;
        let Some(num) = self.num.checked_add(count) else {
            return false;
        };
        if !self.grow(num, element_size) {
            return false;
        }
        self.num = num;
        let at = index * element_size;
        let span = count * element_size;
        self.data.copy_within(at..old_len, at + span);
        self.data[at..at + span].fill(0);
        true
    }

    /// Drop `count` slots at `index` (already destructed), shifting successors down
    pub fn remove(&mut self, index: usize, count: usize, element_size: usize) {
        let at = index * element_size;
        let span = count * element_size;
        let len = self.num * element_size;
        self.data.copy_within(at + span..len, at);
        self.data[len - span..len].fill(0);
        self.num -= count;
    }

    /// Forget all elements, keeping room for `slack` of them.
    ///
    /// Returns false and keeps no room when `slack` elements cannot be
    /// allocated.
    pub fn empty(&mut self, slack: usize, element_size: usize) -> bool {
        self.num = 0;
        self.max = 0;
        self.data = Vec::new();
        self.grow(slack, element_size)
    }

    /// Exchange the bytes of two elements
    pub fn swap(&mut self, a: usize, b: usize, element_size: usize) {
        if a == b {
            return;
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.data.split_at_mut(hi * element_size);
        head[lo * element_size..(lo + 1) * element_size].swap_with_slice(&mut tail[..element_size]);
    }

    /// Make room for `num` elements without touching `num` itself
    fn grow(&mut self, num: usize, element_size: usize) -> bool {
        if num <= self.max && self.data.len() >= num.saturating_mul(element_size) {
            return true;
        }
        let Some(exact) = num.checked_mul(element_size) else {
            return false;
        };
        let doubled = self.max.saturating_mul(2).max(num).max(4);
        let (max, needed) = match doubled.checked_mul(element_size) {
            Some(bytes) => (doubled, bytes),
            None => (num, exact),
        };
        if self.data.len() < needed {
            if self.data.try_reserve_exact(needed - self.data.len()).is_err() {
                return false;
            }
            self.data.resize(needed, 0);
        }
        self.max = max;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(array: &mut RawArray, v: u32) {
        let i = array.add(1, 4).unwrap();
        array.element_mut(i, 4).copy_from_slice(&v.to_ne_bytes());
    }

    fn read(array: &RawArray, i: usize) -> u32 {
        u32::from_ne_bytes(array.element(i, 4).try_into().unwrap())
    }

    #[test]
    fn test_add_and_remove() {
        let mut array = RawArray::new();
        for v in [10, 20, 30, 40] {
            push(&mut array, v);
        }
        assert_eq!(array.num(), 4);
        array.remove(1, 1, 4);
        assert_eq!(array.num(), 3);
        assert_eq!((read(&array, 0), read(&array, 1), read(&array, 2)), (10, 30, 40));
    }

    #[test]
    fn test_insert_shifts() {
        let mut array = RawArray::new();
        push(&mut array, 1);
        push(&mut array, 3);
        assert!(array.insert(1, 1, 4));
        array.element_mut(1, 4).copy_from_slice(&2u32.to_ne_bytes());
        assert_eq!((read(&array, 0), read(&array, 1), read(&array, 2)), (1, 2, 3));
    }

    #[test]
    fn test_swap_and_empty() {
        let mut array = RawArray::new();
        push(&mut array, 1);
        push(&mut array, 2);
        array.swap(0, 1, 4);
        assert_eq!((read(&array, 0), read(&array, 1)), (2, 1));

        assert!(array.empty(8, 4));
        assert!(array.is_empty());
        assert_eq!(array.max(), 8);
    }

    #[test]
    fn test_oversized_growth_is_refused() {
        let mut array = RawArray::new();
        push(&mut array, 7);
        assert_eq!(array.add(usize::MAX, 4), None);
        assert_eq!(array.add(usize::MAX / 2, 4), None);
        assert!(!array.insert(0, usize::MAX / 4, 8));
        // Nothing changed
        assert_eq!(array.num(), 1);
        assert_eq!(read(&array, 0), 7);

        assert!(!array.empty(usize::MAX / 2, 4));
        assert!(array.is_empty());
        assert_eq!(array.max(), 0);
        push(&mut array, 9);
        assert_eq!(read(&array, 0), 9);
    }
}
