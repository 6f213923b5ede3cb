//! FIFO of nonce ranges waiting to be scanned.

use std::collections::VecDeque;

use crate::types::NonceRange;

/// Ranges received but not yet started, oldest first.
///
/// Only the executor touches the queue. Task replacement flushes it.
#[derive(Debug, Default)]
pub struct RangeQueue {
    ranges: VecDeque<NonceRange>,
}

impl RangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, range: NonceRange) {
        self.ranges.push_back(range);
    }

    pub fn pop(&mut self) -> Option<NonceRange> {
        self.ranges.pop_front()
    }

    /// Drop every queued range, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.ranges.len();
        self.ranges.clear();
        discarded
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u64, end: u64) -> NonceRange {
        NonceRange::new(start, end).unwrap()
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = RangeQueue::new();
        queue.push(range(0, 10));
        queue.push(range(10, 20));
        queue.push(range(5, 5));

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop(), Some(range(0, 10)));
        assert_eq!(queue.pop(), Some(range(10, 20)));
        assert_eq!(queue.pop(), Some(range(5, 5)));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_clear_reports_discarded() {
        let mut queue = RangeQueue::new();
        queue.push(range(0, 10));
        queue.push(range(10, 20));

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.clear(), 0);
    }
}
