//! Fixed-capacity rotating history.

use std::collections::VecDeque;

/// A bounded buffer that keeps the most recent `capacity` items.
///
/// Iteration always runs oldest-to-newest regardless of how many wraps have
/// happened. Once full, each push evicts exactly the oldest element.
/// Clearing empties the buffer but owns no sequence numbering — message
/// sequences belong to the conversation that stamps them.
#[derive(Debug, Clone)]
pub struct HistoryBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> HistoryBuffer<T> {
    /// Create a buffer. `capacity` must be at least 1.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "history capacity must be at least 1");
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    /// Append one item, evicting the oldest when already full.
    pub fn push(&mut self, item: T) {
        if self.items.len() >= self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Append several items in order.
    pub fn extend(&mut self, items: impl IntoIterator<Item = T>) {
        for item in items {
            self.push(item);
        }
    }

    /// Oldest-to-newest iteration; non-mutating and restartable.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

impl<'a, T> IntoIterator for &'a HistoryBuffer<T> {
    type Item = &'a T;
    type IntoIter = std::collections::vec_deque::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_yields_nothing() {
        let buffer: HistoryBuffer<i32> = HistoryBuffer::new(5);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.is_empty());
        assert_eq!(buffer.iter().count(), 0);
    }

    #[test]
    fn push_then_iterate_in_order() {
        let mut buffer = HistoryBuffer::new(5);
        buffer.extend([1, 2, 3]);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), [1, 2, 3]);
        assert_eq!(buffer.len(), 3);
        assert!(!buffer.is_full());
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut buffer = HistoryBuffer::new(3);
        buffer.extend([1, 2, 3, 4, 5]);
        assert_eq!(buffer.len(), 3);
        assert!(buffer.is_full());
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), [3, 4, 5]);
    }

    #[test]
    fn iteration_is_restartable() {
        let mut buffer = HistoryBuffer::new(2);
        buffer.extend(["a", "b", "c"]);
        let first: Vec<_> = buffer.iter().collect();
        let second: Vec<_> = buffer.iter().collect();
        assert_eq!(first, second);
        assert_eq!(first, [&"b", &"c"]);
    }

    #[test]
    fn length_never_exceeds_capacity() {
        for capacity in 1..=8usize {
            let mut buffer = HistoryBuffer::new(capacity);
            for n in 0..20 {
                buffer.push(n);
                assert!(buffer.len() <= capacity);
            }
            let expected: Vec<_> = (20 - capacity as i32..20).collect();
            assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), expected);
        }
    }

    #[test]
    fn clear_resets_contents() {
        let mut buffer = HistoryBuffer::new(3);
        buffer.extend([1, 2, 3, 4]);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.iter().count(), 0);
        buffer.push(9);
        assert_eq!(buffer.iter().copied().collect::<Vec<_>>(), [9]);
    }

    #[test]
    #[should_panic(expected = "capacity must be at least 1")]
    fn zero_capacity_is_rejected() {
        let _ = HistoryBuffer::<i32>::new(0);
    }
}
