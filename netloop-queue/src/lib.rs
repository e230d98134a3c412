//! A priority queue for pending work items (packets, tasks).
//!
//! Items are ordered by `(priority desc, arrival asc)`: [`PriorityQueue::dequeue`] always returns
//! the highest-priority item present, and items with equal priority come out in the order they
//! were enqueued. Both operations are `O(log n)`.
//!
//! ```
//! use netloop_queue::{PriorityQueue, QueueItem};
//!
//! let queue = PriorityQueue::new();
//! queue.enqueue(QueueItem::new(0, 1, "bulk"));
//! queue.enqueue(QueueItem::new(1, 3, "voice"));
//!
//! assert_eq!(queue.dequeue().unwrap().payload, "voice");
//! assert_eq!(queue.dequeue().unwrap().payload, "bulk");
//! assert!(queue.dequeue().is_err());
//! ```

use std::{cmp::Ordering, collections::BinaryHeap};

use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue is empty")]
    Empty,
}

/// A unit of pending work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem<T> {
    /// Caller-assigned identifier.
    pub id: u64,
    /// Higher values are served first.
    pub priority: i64,
    pub payload: T,
}

impl<T> QueueItem<T> {
    pub const fn new(id: u64, priority: i64, payload: T) -> Self {
        Self { id, priority, payload }
    }
}

/// Heap entry. The arrival sequence number makes the order total, which is what keeps
/// equal-priority items FIFO on a non-stable heap.
#[derive(Debug)]
struct Entry<T> {
    seq: u64,
    item: QueueItem<T>,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then LOWER sequence number first.
        self.item.priority.cmp(&other.item.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
struct Inner<T> {
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

/// A thread-safe priority queue, FIFO among equal priorities.
///
/// The queue has its own lock and can be shared (e.g. behind an `Arc`) between producers and
/// the driver that drains it.
#[derive(Debug)]
pub struct PriorityQueue<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner { heap: BinaryHeap::new(), next_seq: 0 }) }
    }

    /// Creates a queue with room for `capacity` items before reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { inner: Mutex::new(Inner { heap: BinaryHeap::with_capacity(capacity), next_seq: 0 }) }
    }

    /// Inserts an item.
    pub fn enqueue(&self, item: QueueItem<T>) {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq = seq.wrapping_add(1);
        inner.heap.push(Entry { seq, item });
    }

    /// Inserts all items of a batch, preserving their relative arrival order.
    pub fn enqueue_batch(&self, items: impl IntoIterator<Item = QueueItem<T>>) {
        let mut inner = self.inner.lock();
        for item in items {
            let seq = inner.next_seq;
            inner.next_seq = seq.wrapping_add(1);
            inner.heap.push(Entry { seq, item });
        }
    }

    /// Removes and returns the highest-priority item.
    pub fn dequeue(&self) -> Result<QueueItem<T>, QueueError> {
        self.inner.lock().heap.pop().map(|entry| entry.item).ok_or(QueueError::Empty)
    }

    /// Removes up to `max` items (all of them if `None`) in dequeue order, under a single lock
    /// acquisition.
    pub fn drain(&self, max: Option<usize>) -> Vec<QueueItem<T>> {
        let mut inner = self.inner.lock();
        let n = max.map_or(inner.heap.len(), |max| max.min(inner.heap.len()));

        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            match inner.heap.pop() {
                Some(entry) => out.push(entry.item),
                None => break,
            }
        }

        out
    }

    /// Returns the priority of the item that would be dequeued next.
    pub fn peek_priority(&self) -> Option<i64> {
        self.inner.lock().heap.peek().map(|entry| entry.item.priority)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }
}
