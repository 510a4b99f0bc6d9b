//! Shared FIFO buffer between producers and the drain loop.
//!
//! Producers append at the tail; only the drain loop removes, and only from the
//! head, after the acceptor confirmed the batch. Every operation takes the lock for
//! the in-memory mutation alone, so the lock is never held across I/O.

use crate::error::DrainError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

#[derive(Debug)]
struct Shared<T> {
    items: Mutex<VecDeque<T>>,
    enqueued: Notify,
}

/// Ordered, concurrently accessed queue of pending items.
///
/// Clones are handles onto the same queue.
#[derive(Debug)]
pub struct BatchQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BatchQueue<T> {
    fn clone(&self) -> Self {
        Self { shared: self.shared.clone() }
    }
}

impl<T> Default for BatchQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BatchQueue<T> {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared { items: Mutex::new(VecDeque::new()), enqueued: Notify::new() }),
        }
    }

    /// Append `items` to the tail, preserving their order.
    ///
    /// Returns the queue length after the append.
    ///
    /// # Errors
    /// [`DrainError::EmptyBatch`] if `items` is empty; the queue is left untouched.
    pub fn enqueue(&self, items: Vec<T>) -> Result<usize, DrainError> {
        if items.is_empty() {
            return Err(DrainError::EmptyBatch);
        }
        let len = {
            let mut guard = self.lock();
            guard.extend(items);
            guard.len()
        };
        // Stores a permit when the drain loop is not parked yet.
        self.shared.enqueued.notify_one();
        Ok(len)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Remove and return up to `n` items from the head.
    pub fn remove_prefix(&self, n: usize) -> Vec<T> {
        let mut guard = self.lock();
        let n = n.min(guard.len());
        guard.drain(..n).collect()
    }

    /// Resolves after the next successful enqueue (or immediately if one happened
    /// since the last wait).
    pub async fn wait_for_items(&self) {
        self.shared.enqueued.notified().await;
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        // Each operation leaves the deque consistent, so a poisoned guard is usable.
        self.shared.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> BatchQueue<T> {
    /// Copy up to `n` items from the head without removing them.
    pub fn peek(&self, n: usize) -> Vec<T> {
        self.lock().iter().take(n).cloned().collect()
    }

    /// Copy of the whole queue, head first.
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn empty_enqueue_is_rejected_without_change() {
        let q = BatchQueue::new();
        q.enqueue(vec![1]).unwrap();
        assert_eq!(q.enqueue(Vec::new()), Err(DrainError::EmptyBatch));
        assert_eq!(q.snapshot(), vec![1]);
    }

    #[test]
    fn enqueue_appends_in_order_and_reports_length() {
        let q = BatchQueue::new();
        assert_eq!(q.enqueue(vec![1, 2]), Ok(2));
        assert_eq!(q.enqueue(vec![3]), Ok(3));
        assert_eq!(q.snapshot(), vec![1, 2, 3]);
    }

    #[test]
    fn peek_does_not_remove() {
        let q = BatchQueue::new();
        q.enqueue(vec!['a', 'b', 'c']).unwrap();
        assert_eq!(q.peek(2), vec!['a', 'b']);
        assert_eq!(q.peek(10), vec!['a', 'b', 'c']);
        assert_eq!(q.len(), 3);
    }

    #[test]
    fn remove_prefix_takes_head_and_tolerates_short_queue() {
        let q = BatchQueue::new();
        q.enqueue(vec![1, 2, 3]).unwrap();
        assert_eq!(q.remove_prefix(2), vec![1, 2]);
        assert_eq!(q.remove_prefix(5), vec![3]);
        assert!(q.is_empty());
        assert!(q.remove_prefix(1).is_empty());
    }

    #[test]
    fn clones_share_state() {
        let q = BatchQueue::new();
        let other = q.clone();
        q.enqueue(vec![7]).unwrap();
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn concurrent_producers_keep_per_producer_order() {
        let q = BatchQueue::new();
        let handles: Vec<_> = (0..4u32)
            .map(|p| {
                let q = q.clone();
                std::thread::spawn(move || {
                    for i in 0..250u32 {
                        q.enqueue(vec![(p, i)]).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let all = q.snapshot();
        assert_eq!(all.len(), 1000);
        for p in 0..4u32 {
            let seq: Vec<u32> = all.iter().filter(|(who, _)| *who == p).map(|(_, i)| *i).collect();
            assert_eq!(seq, (0..250).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn enqueue_before_wait_is_not_lost() {
        let q = BatchQueue::new();
        q.enqueue(vec![1]).unwrap();
        tokio::time::timeout(Duration::from_secs(1), q.wait_for_items())
            .await
            .expect("permit stored by enqueue");
    }

    #[tokio::test]
    async fn waiter_wakes_on_enqueue() {
        let q = BatchQueue::<u8>::new();
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.wait_for_items().await })
        };
        tokio::task::yield_now().await;
        q.enqueue(vec![1]).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    }
}
