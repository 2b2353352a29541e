use serde::{Deserialize, Serialize};

/// Fixed-capacity ring of the most recent samples.
///
/// Once full, each `add` overwrites the oldest slot in place, so memory stays
/// bounded at `capacity` elements for the lifetime of the buffer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CircularBuffer<T> {
    slots: Vec<T>,
    next: usize,
    capacity: usize,
}

impl<T> CircularBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            next: 0,
            capacity,
        }
    }

    pub fn add(&mut self, item: T) {
        if self.slots.len() < self.capacity {
            self.slots.push(item);
        } else {
            self.slots[self.next] = item;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub fn count(&self) -> usize {
        self.slots.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.next = 0;
    }

    /// Most recent samples first, walking backwards from the last write.
    pub fn iter_recent(&self) -> impl Iterator<Item = &T> + '_ {
        let len = self.slots.len();
        (0..len).map(move |i| &self.slots[(self.next + len - 1 - i) % len])
    }

    pub fn latest(&self) -> Option<&T> {
        self.iter_recent().next()
    }

    pub fn get_average<F>(&self, selector: F) -> f64
    where
        F: Fn(&T) -> f64,
    {
        if self.slots.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.slots.iter().map(selector).sum();
        sum / self.slots.len() as f64
    }
}

impl<T: Clone> CircularBuffer<T> {
    /// The `n` most recent samples, most recent first.
    pub fn get_last(&self, n: usize) -> Vec<T> {
        self.iter_recent().take(n).cloned().collect()
    }

    /// Current contents in insertion order, oldest first.
    pub fn to_vec_oldest_first(&self) -> Vec<T> {
        let mut items = self.get_last(self.slots.len());
        items.reverse();
        items
    }
}

impl<T> Default for CircularBuffer<T> {
    fn default() -> Self {
        Self::new(crate::DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_of_three() {
        let mut buffer = CircularBuffer::new(10);
        buffer.add(10.0);
        buffer.add(20.0);
        buffer.add(30.0);
        assert!((buffer.get_average(|v| *v) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overwrites_oldest_when_full() {
        let mut buffer = CircularBuffer::new(3);
        for i in 1..=5 {
            buffer.add(i);
        }
        assert_eq!(buffer.count(), 3);
        assert!(buffer.is_full());
        assert_eq!(buffer.get_last(3), vec![5, 4, 3]);
        assert_eq!(buffer.to_vec_oldest_first(), vec![3, 4, 5]);
    }

    #[test]
    fn test_get_last_before_full() {
        let mut buffer = CircularBuffer::new(8);
        buffer.add("a");
        buffer.add("b");
        assert_eq!(buffer.get_last(5), vec!["b", "a"]);
        assert_eq!(buffer.latest(), Some(&"b"));
    }

    #[test]
    fn test_empty_average_is_zero() {
        let buffer: CircularBuffer<f64> = CircularBuffer::new(4);
        assert_eq!(buffer.get_average(|v| *v), 0.0);
        assert!(buffer.latest().is_none());
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut buffer = CircularBuffer::new(0);
        buffer.add(1);
        buffer.add(2);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.get_last(4), vec![2]);
    }
}
