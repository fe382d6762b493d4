use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, PoisonError};

use crate::options::WaitMode;

/// Verdicts of a failed enqueue. The split between `Full` and `Timeout` is
/// what distinguishes non-blocking from immediate submissions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueError {
    Full,
    Timeout,
}

/// Verdicts of a failed dequeue
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DequeueError {
    Empty,
    Timeout,
}

/// Fixed-capacity FIFO queue: multi-producer, single consumer. Producers park
/// on a condvar when the queue is full (per their wait mode); the consumer
/// parks when it is empty. Insertion order is delivery order.
pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

struct Inner<T> {
    items: VecDeque<T>,
    // pending consumer wakeups requested via wake_consumer()
    wakeups: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                wakeups: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Insert an entry, parking the caller per `mode` when the queue is full.
    /// A non-full queue is the fast path: lock, push, signal, return.
    pub fn enqueue(&self, entry: T, mode: WaitMode) -> Result<(), EnqueueError> {
        let mut inner = self.lock();
        loop {
            if inner.items.len() < self.capacity {
                inner.items.push_back(entry);
                self.not_empty.notify_one();
                return Ok(());
            }
            match mode {
                WaitMode::NonBlock => return Err(EnqueueError::Full),
                WaitMode::Immediate => return Err(EnqueueError::Timeout),
                WaitMode::Blocking => {
                    inner = self
                        .not_full
                        .wait(inner)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                WaitMode::Until(_) => {
                    let remaining = match mode.remaining() {
                        Some(remaining) if !remaining.is_zero() => remaining,
                        _ => return Err(EnqueueError::Timeout),
                    };
                    let (guard, _) = self
                        .not_full
                        .wait_timeout(inner, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    inner = guard;
                }
            }
        }
    }

    /// Remove the oldest entry, parking the caller per `mode` when the queue
    /// is empty. A pending wakeup (see [`BoundedQueue::wake_consumer`])
    /// returns control with `Empty` instead of an entry.
    pub fn dequeue(&self, mode: WaitMode) -> Result<T, DequeueError> {
        let mut inner = self.lock();
        loop {
            if let Some(entry) = inner.items.pop_front() {
                self.not_full.notify_all();
                return Ok(entry);
            }
            if inner.wakeups > 0 {
                inner.wakeups -= 1;
                return Err(DequeueError::Empty);
            }
            match mode {
                WaitMode::NonBlock => return Err(DequeueError::Empty),
                WaitMode::Immediate => return Err(DequeueError::Timeout),
                WaitMode::Blocking => {
                    inner = self
                        .not_empty
                        .wait(inner)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                WaitMode::Until(_) => {
                    let remaining = match mode.remaining() {
                        Some(remaining) if !remaining.is_zero() => remaining,
                        _ => return Err(DequeueError::Timeout),
                    };
                    let (guard, _) = self
                        .not_empty
                        .wait_timeout(inner, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    inner = guard;
                }
            }
        }
    }

    /// Park per `mode` until the queue is non-empty, without popping. Lets a
    /// consumer take its processing lock before it removes anything, so no
    /// entry is ever popped-but-undispatched while another drainer runs.
    pub fn wait_nonempty(&self, mode: WaitMode) -> Result<(), DequeueError> {
        let mut inner = self.lock();
        loop {
            if !inner.items.is_empty() {
                return Ok(());
            }
            if inner.wakeups > 0 {
                inner.wakeups -= 1;
                return Err(DequeueError::Empty);
            }
            match mode {
                WaitMode::NonBlock => return Err(DequeueError::Empty),
                WaitMode::Immediate => return Err(DequeueError::Timeout),
                WaitMode::Blocking => {
                    inner = self
                        .not_empty
                        .wait(inner)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                WaitMode::Until(_) => {
                    let remaining = match mode.remaining() {
                        Some(remaining) if !remaining.is_zero() => remaining,
                        _ => return Err(DequeueError::Timeout),
                    };
                    let (guard, _) = self
                        .not_empty
                        .wait_timeout(inner, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    inner = guard;
                }
            }
        }
    }

    /// Take every queued entry at once, releasing all parked producers
    pub fn drain(&self) -> Vec<T> {
        let mut inner = self.lock();
        let drained = inner.items.drain(..).collect();
        self.not_full.notify_all();
        drained
    }

    /// Nudge a consumer parked on an empty queue; its dequeue returns `Empty`
    pub fn wake_consumer(&self) {
        let mut inner = self.lock();
        inner.wakeups += 1;
        self.not_empty.notify_all();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
