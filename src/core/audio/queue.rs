//! Unbounded FIFO handoff between audio threads and the async session layer.
//!
//! Each audio direction owns one queue with a single producer and a single
//! consumer. Consumers poll with [`POLL_INTERVAL`] so a worker thread notices
//! its stop flag within one interval even when no audio is flowing.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::time::Duration;

/// Upper bound on how long a consumer blocks in [`AudioQueue::get`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Thread-safe unbounded FIFO queue.
///
/// Cloning yields another handle to the same queue.
#[derive(Debug)]
pub struct AudioQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> AudioQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Enqueue an item. Never blocks.
    pub fn put(&self, item: T) {
        // Both ends live in `self`, so the channel cannot be disconnected here.
        let _ = self.tx.send(item);
    }

    /// Dequeue the oldest item, waiting at most `timeout`.
    pub fn get(&self, timeout: Duration) -> Option<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(item) => Some(item),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Dequeue using the standard poll interval.
    pub fn poll(&self) -> Option<T> {
        self.get(POLL_INTERVAL)
    }

    /// Dequeue without waiting.
    pub fn try_get(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Discard everything currently queued and return how many items were dropped.
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<T> Default for AudioQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

// Manual impl: cloning the handles must not require `T: Clone`.
impl<T> Clone for AudioQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}
