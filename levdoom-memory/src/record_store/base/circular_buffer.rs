//! Fixed-capacity FIFO of records for uniform sampling.
use std::collections::{vec_deque, VecDeque};

/// Ordered records, oldest first, evicted from the front once full.
#[derive(Debug, Clone)]
pub struct CircularBuffer<R> {
    capacity: usize,
    records: VecDeque<R>,
}

impl<R> CircularBuffer<R> {
    /// Creates an empty buffer. `capacity` must be positive.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    /// Wraps records into a buffer, keeping the newest `capacity` of them.
    ///
    /// Returns the buffer and the number of records dropped from the front.
    pub fn from_records(capacity: usize, records: Vec<R>) -> (Self, usize) {
        let mut records = VecDeque::from(records);
        let n_dropped = records.len().saturating_sub(capacity);
        records.drain(..n_dropped);
        (Self { capacity, records }, n_dropped)
    }

    /// Appends a record, returning the evicted oldest one if the buffer was full.
    pub fn push(&mut self, record: R) -> Option<R> {
        self.records.push_back(record);
        if self.records.len() > self.capacity {
            self.records.pop_front()
        } else {
            None
        }
    }

    /// Record at position `ix`, 0 being the oldest.
    pub fn get(&self, ix: usize) -> Option<&R> {
        self.records.get(ix)
    }

    /// `len` consecutive records starting at `start`.
    pub fn range(&self, start: usize, len: usize) -> vec_deque::Iter<'_, R> {
        self.records.range(start..start + len)
    }

    /// The newest `n` records, oldest first.
    pub fn suffix(&self, n: usize) -> vec_deque::Iter<'_, R> {
        let n = n.min(self.records.len());
        self.records.range(self.records.len() - n..)
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::CircularBuffer;

    #[test]
    fn test_fifo_eviction() {
        let mut buffer = CircularBuffer::new(3);
        assert_eq!(buffer.push(0), None);
        assert_eq!(buffer.push(1), None);
        assert_eq!(buffer.push(2), None);
        assert_eq!(buffer.push(3), Some(0));
        assert_eq!(buffer.push(4), Some(1));
        assert_eq!(buffer.len(), 3);
        assert_eq!(
            buffer.range(0, 3).copied().collect::<Vec<_>>(),
            vec![2, 3, 4]
        );
        assert_eq!(buffer.range(1, 2).copied().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(buffer.suffix(2).copied().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(buffer.suffix(10).count(), 3);
    }

    #[test]
    fn test_from_records_keeps_newest() {
        let (buffer, n_dropped) = CircularBuffer::from_records(3, (0..5).collect());
        assert_eq!(n_dropped, 2);
        assert_eq!(buffer.suffix(3).copied().collect::<Vec<_>>(), vec![2, 3, 4]);

        let (buffer, n_dropped) = CircularBuffer::from_records(3, vec![7]);
        assert_eq!(n_dropped, 0);
        assert_eq!(buffer.get(0), Some(&7));
        assert_eq!(buffer.len(), 1);
    }
}
