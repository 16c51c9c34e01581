// Bounded FIFO buffer used for telemetry history and the event log
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct BoundedBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedBuffer<T> {
    /// A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, returning the evicted oldest item once full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }
}

impl<T: Clone> BoundedBuffer<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_exceeds_capacity() {
        let mut buffer = BoundedBuffer::new(3);
        for i in 0..10 {
            buffer.push(i);
            assert!(buffer.len() <= 3);
        }
        assert_eq!(buffer.to_vec(), vec![7, 8, 9]);
    }

    #[test]
    fn test_evicts_exactly_the_oldest() {
        let mut buffer = BoundedBuffer::new(2);
        assert_eq!(buffer.push("a"), None);
        assert_eq!(buffer.push("b"), None);
        assert_eq!(buffer.push("c"), Some("a"));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.latest(), Some(&"c"));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut buffer = BoundedBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.push(1);
        assert_eq!(buffer.push(2), Some(1));
        assert_eq!(buffer.to_vec(), vec![2]);
    }
}
