use std::{collections::VecDeque, time::Duration};

use parking_lot::{Condvar, Mutex};

/// Outcome of a non-blocking push onto a [`FrameQueue`].
#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome<T> {
    /// The item was accepted.
    Accepted,
    /// The queue was full; the item comes back to the caller.
    Rejected(T),
}

impl<T> PushOutcome<T> {
    /// Whether the push landed.
    pub fn is_accepted(&self) -> bool {
        matches!(self, PushOutcome::Accepted)
    }
}

/// A bounded hand-off queue between the producer callback and the polling
/// consumer.
///
/// The producer side never blocks: a push against a full queue is rejected
/// and the item is handed back so the caller can recycle it. The consumer
/// side may wait with a timeout.
///
/// The depth is deliberately small; a deep queue only adds latency between
/// capture and delivery, it cannot raise throughput.
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use ocular_core::prelude::FrameQueue;
///
/// let queue: FrameQueue<u32> = FrameQueue::with_depth(2);
/// assert!(queue.try_push(1).is_accepted());
/// assert!(queue.try_push(2).is_accepted());
/// assert!(!queue.try_push(3).is_accepted());
/// assert_eq!(queue.wait_pop(Duration::from_millis(10)), Some(1));
/// ```
pub struct FrameQueue<T> {
    state: Mutex<VecDeque<T>>,
    ready: Condvar,
    depth: usize,
}

impl<T> FrameQueue<T> {
    /// Create a queue holding at most `depth` items.
    pub fn with_depth(depth: usize) -> Self {
        let depth = depth.max(1);
        Self {
            state: Mutex::new(VecDeque::with_capacity(depth)),
            ready: Condvar::new(),
            depth,
        }
    }

    /// Push without blocking. A full queue rejects and returns the item.
    pub fn try_push(&self, item: T) -> PushOutcome<T> {
        let mut state = self.state.lock();
        if state.len() >= self.depth {
            return PushOutcome::Rejected(item);
        }
        state.push_back(item);
        drop(state);
        self.ready.notify_one();
        PushOutcome::Accepted
    }

    /// Pop the oldest item, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout. A zero timeout degenerates to
    /// [`FrameQueue::try_pop`].
    pub fn wait_pop(&self, timeout: Duration) -> Option<T> {
        let mut state = self.state.lock();
        if let Some(item) = state.pop_front() {
            return Some(item);
        }
        if timeout.is_zero() {
            return None;
        }
        // Condvar wakeups can be spurious; re-check under a shrinking budget.
        let deadline = std::time::Instant::now() + timeout;
        loop {
            if self.ready.wait_until(&mut state, deadline).timed_out() {
                return state.pop_front();
            }
            if let Some(item) = state.pop_front() {
                return Some(item);
            }
        }
    }

    /// Pop the oldest item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        self.state.lock().pop_front()
    }

    /// Drain every queued item into a vector, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.state.lock().drain(..).collect()
    }

    /// Items currently queued.
    pub fn len(&self) -> usize {
        self.state.lock().len()
    }

    /// Whether the queue is empty right now.
    pub fn is_empty(&self) -> bool {
        self.state.lock().is_empty()
    }

    /// Maximum number of items the queue will hold.
    pub fn depth(&self) -> usize {
        self.depth
    }
}
