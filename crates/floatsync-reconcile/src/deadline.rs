//! Deadline scheduler.
//!
//! Timers are owned by the reconciler task and polled from its select loop.
//! Every armed timer is identified by a [`DeadlineHandle`] that is never
//! reused, so disarming a handle that already fired (or was already
//! disarmed) is a no-op even if the underlying queue slot has been recycled.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::poll_fn;
use tokio_util::time::delay_queue::{DelayQueue, Key};

/// Owned reference to one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeadlineHandle(u64);

impl DeadlineHandle {
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Keyed timer queue carrying an action per timer.
#[derive(Debug)]
pub struct DeadlineScheduler<T> {
    queue: DelayQueue<(DeadlineHandle, T)>,
    keys: HashMap<DeadlineHandle, Key>,
    next_id: u64,
}

impl<T> Default for DeadlineScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DeadlineScheduler<T> {
    pub fn new() -> Self {
        Self {
            queue: DelayQueue::new(),
            keys: HashMap::new(),
            next_id: 0,
        }
    }

    /// Arm a timer firing after `delay`.
    pub fn arm_in(&mut self, delay: Duration, action: T) -> DeadlineHandle {
        let handle = DeadlineHandle(self.next_id);
        self.next_id += 1;

        let key = self.queue.insert((handle, action), delay);
        self.keys.insert(handle, key);
        handle
    }

    /// Arm a timer firing at a wall-clock instant. Instants in the past fire
    /// on the next poll.
    pub fn arm_at(&mut self, fire_at: DateTime<Utc>, action: T) -> DeadlineHandle {
        self.arm_in(delay_until(fire_at, Utc::now()), action)
    }

    /// Cancel a pending timer. Returns false if it already fired or was
    /// already disarmed.
    pub fn disarm(&mut self, handle: DeadlineHandle) -> bool {
        match self.keys.remove(&handle) {
            Some(key) => {
                self.queue.remove(&key);
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, handle: DeadlineHandle) -> bool {
        self.keys.contains_key(&handle)
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Drop every armed timer, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.keys.len();
        self.queue.clear();
        self.keys.clear();
        count
    }

    /// Wait for the next timer to fire.
    ///
    /// Returns `None` immediately when nothing is armed. Cancel safe: a timer
    /// is only consumed when this future completes.
    pub async fn next_expired(&mut self) -> Option<(DeadlineHandle, T)> {
        let expired = poll_fn(|cx| self.queue.poll_expired(cx)).await?;
        let (handle, action) = expired.into_inner();
        self.keys.remove(&handle);
        Some((handle, action))
    }
}

/// Time left until `fire_at`, clamped at zero.
pub fn delay_until(fire_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (fire_at - now).to_std().unwrap_or(Duration::ZERO)
}
