use std::collections::VecDeque;

/// FIFO ring buffer: once `capacity` is reached the oldest entry goes first.
#[derive(Debug, Clone)]
pub struct LogBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T: Clone> LogBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity,
        }
    }

    /// Seed from existing entries, keeping only the newest `capacity`.
    pub fn with_entries(capacity: usize, entries: impl IntoIterator<Item = T>) -> Self {
        let mut buffer = Self::new(capacity);
        for entry in entries {
            buffer.push(entry);
        }
        buffer
    }

    /// Append and return how many entries were evicted.
    pub fn push(&mut self, entry: T) -> usize {
        self.entries.push_back(entry);
        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_first() {
        let mut buffer = LogBuffer::new(3);
        for i in 0..3 {
            assert_eq!(buffer.push(i), 0);
        }
        assert_eq!(buffer.push(3), 1);
        assert_eq!(buffer.to_vec(), vec![1, 2, 3]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_seed_is_trimmed_to_capacity() {
        let buffer = LogBuffer::with_entries(2, vec!["a", "b", "c", "d"]);
        assert_eq!(buffer.to_vec(), vec!["c", "d"]);
    }

    #[test]
    fn test_clear() {
        let mut buffer = LogBuffer::with_entries(5, 0..4);
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 5);
    }
}
