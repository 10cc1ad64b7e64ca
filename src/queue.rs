//! queue.rs
//! Thread-safe mailbox of pending control messages.
//! - any number of producers enqueue; exactly one consumer drains
//! - one mutex + one condition variable; the condvar is signalled exactly once
//!   per successful enqueue, after the lock is released
//! - `drain_all` claims the entire backlog in a single list swap, so the lock
//!   is held only for the duration of that swap

use std::collections::VecDeque;
use std::mem;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::message::{ControlIndex, ControlMessage, ControlValue};

/// Result of a consumer's timed wait on the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The queue was signalled (or already held work when the wait began).
    WokeWithWork,
    /// The timeout elapsed with no signal; the caller should re-check its
    /// stop flag and wait again.
    TimedOut,
}

/// FIFO of pending control messages shared between producers and the single
/// dispatch worker.
pub struct EventQueue {
    pending: Mutex<VecDeque<ControlMessage>>,
    available: Condvar,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Appends a message stamped with the current time and signals the
    /// consumer. Callers are only ever blocked for the push itself.
    pub fn enqueue(&self, control_index: ControlIndex, control_value: ControlValue) {
        let message = ControlMessage::new(control_index, control_value);
        {
            let mut pending = self.pending.lock();
            pending.push_back(message);
        }
        self.available.notify_one();
    }

    /// Atomically removes and returns every queued message in arrival order,
    /// leaving the queue empty. Consumer-side only.
    pub fn drain_all(&self) -> Vec<ControlMessage> {
        let mut pending = self.pending.lock();
        Vec::from(mem::take(&mut *pending))
    }

    /// Blocks until the queue is signalled or `timeout` elapses.
    ///
    /// Returns immediately with `WokeWithWork` when messages are already
    /// pending; a signal sent before the consumer reaches its wait would
    /// otherwise be lost and the backlog would sit out the full timeout. A
    /// `WokeWithWork` result does not guarantee a non-empty queue (shutdown
    /// wakes the consumer without enqueuing), so callers must tolerate an
    /// empty `drain_all` afterwards.
    pub fn wait_for_work(&self, timeout: Duration) -> WaitOutcome {
        let mut pending = self.pending.lock();
        if !pending.is_empty() {
            return WaitOutcome::WokeWithWork;
        }
        let result = self.available.wait_for(&mut pending, timeout);
        if result.timed_out() && pending.is_empty() {
            WaitOutcome::TimedOut
        } else {
            WaitOutcome::WokeWithWork
        }
    }

    /// Signals the wait condition without enqueuing anything. Shutdown uses
    /// this to cut the consumer's timed wait short instead of letting it run
    /// out the full interval.
    pub fn wake(&self) {
        self.available.notify_one();
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
