//! Bounded blocking FIFO with an explicit closed state.
//!
//! # Responsibilities
//! - Block producers while full and consumers while empty
//! - Wake every waiter when closed
//!
//! # Design Decisions
//! - One mutex guards both the items and the closed flag, so a waiter
//!   re-checks `closed` on every wakeup
//! - Separate condition variables for "not empty" and "not full"

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

/// Returned by [`BoundedQueue`] operations once the queue is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("queue closed")]
pub struct QueueClosed;

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// A multi-producer, multi-consumer queue with a fixed capacity.
pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                items: VecDeque::new(),
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append an item, waiting for space if the queue is full.
    pub fn push(&self, item: T) -> Result<(), QueueClosed> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(QueueClosed);
            }
            if state.items.len() < self.capacity {
                break;
            }
            state = self
                .not_full
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest item, waiting until one is available.
    ///
    /// A closed queue reports [`QueueClosed`] even if items remain.
    pub fn pop(&self) -> Result<T, QueueClosed> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return Err(QueueClosed);
            }
            if let Some(item) = state.items.pop_front() {
                drop(state);
                self.not_full.notify_one();
                return Ok(item);
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Close the queue and wake all waiters.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn close(&self) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        state.items.clear();
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
