//! A resizable concurrency gate with priority-ordered admission.
//!
//! An [`AdmissionLimiter`] admits at most `capacity` callers at a time.
//! Callers that cannot be admitted right away wait in a queue ordered by
//! priority (highest first) and arrival (earliest first). Slots are handed
//! back either right away with [`AdmissionLimiter::release`] or after a delay
//! with [`AdmissionLimiter::release_after`], which is how rolling rate limit
//! windows are approximated without tracking individual timestamps.
//!
//! # Implementation Details
//!
//! All state lives behind a single [`parking_lot::Mutex`] which is never held
//! across an `.await`. Each waiter owns the receiving end of a
//! [`tokio::sync::oneshot`] channel for as long as it is queued; admitting a
//! waiter means incrementing the occupancy and sending on its channel while
//! holding the lock. Waiters are
//! kept in a [`BTreeMap`] keyed by `(Reverse(priority), arrival)` so that the
//! next waiter to admit is always the first entry, and a cancelled waiter can
//! be removed by key.

use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::Context;

/// Waiting for a slot ended because the caller's context ended
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("Waiting for admission was cancelled")]
pub struct Cancelled;

/// Position of a waiter in the queue. Ordering puts higher priorities first
/// and earlier arrivals first within the same priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct WaiterKey {
    priority: Reverse<i32>,
    arrival: u64,
}

#[derive(Debug)]
struct State {
    capacity: usize,
    occupied: usize,
    waiters: BTreeMap<WaiterKey, oneshot::Sender<()>>,
    next_arrival: u64,
}

impl State {
    /// Admit queued waiters in order while there is room
    fn admit_waiters(&mut self) {
        while self.occupied < self.capacity {
            let Some((_, waiter)) = self.waiters.pop_first() else {
                break;
            };
            // A failed send means the waiter is gone; its slot stays free
            if waiter.send(()).is_ok() {
                self.occupied += 1;
            }
        }
    }

    fn release(&mut self) {
        self.occupied = self.occupied.saturating_sub(1);
        self.admit_waiters();
    }
}

/// Bounds the number of concurrently admitted callers to a ceiling which can
/// be changed at any time.
///
/// # Examples
///
/// ```
/// use quotagate_lib::Context;
/// use quotagate_lib::ratelimit::AdmissionLimiter;
///
/// # #[tokio::main]
/// # async fn main() {
/// let limiter = AdmissionLimiter::new(2);
/// let ctx = Context::new();
///
/// limiter.obtain(&ctx, 0).await.unwrap();
/// limiter.obtain(&ctx, 0).await.unwrap();
/// assert_eq!(limiter.occupied(), 2);
///
/// limiter.release();
/// assert_eq!(limiter.occupied(), 1);
/// # }
/// ```
#[derive(Debug)]
pub struct AdmissionLimiter {
    state: Mutex<State>,
}

impl AdmissionLimiter {
    /// Create a limiter admitting at most `capacity` callers at once
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                capacity,
                occupied: 0,
                waiters: BTreeMap::new(),
                next_arrival: 0,
            }),
        }
    }

    /// Wait until a slot is available or `ctx` ends.
    ///
    /// Admission is immediate if the limiter has room and nobody is queued.
    /// Otherwise the caller is queued with `priority` (higher is served
    /// first) until [`release`](Self::release) or
    /// [`set_capacity`](Self::set_capacity) admits it.
    ///
    /// Dropping the returned future has the same effect as cancelling
    /// `ctx`: the waiter leaves the queue, and a slot that was granted
    /// concurrently is handed on to the next waiter.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if `ctx` ends before a slot was obtained.
    pub async fn obtain(&self, ctx: &Context, priority: i32) -> Result<(), Cancelled> {
        let mut queued = {
            let mut state = self.state.lock();
            if state.occupied < state.capacity && state.waiters.is_empty() {
                state.occupied += 1;
                return Ok(());
            }
            if ctx.is_done() {
                return Err(Cancelled);
            }
            self.enqueue(&mut state, priority)
        };

        let granted = tokio::select! {
            biased;
            () = ctx.done() => false,
            granted = &mut queued.granted => granted.is_ok(),
        };
        if granted {
            queued.key = None;
            Ok(())
        } else {
            Err(Cancelled)
        }
    }

    /// Put a waiter into the queue. The caller must hold the state lock.
    fn enqueue<'a>(&'a self, state: &mut State, priority: i32) -> Queued<'a> {
        let (sender, granted) = oneshot::channel();
        let key = WaiterKey {
            priority: Reverse(priority),
            arrival: state.next_arrival,
        };
        state.next_arrival += 1;
        state.waiters.insert(key, sender);
        Queued {
            limiter: self,
            key: Some(key),
            granted,
        }
    }

    /// Return one slot and admit the next waiter if there is room.
    ///
    /// Releasing more slots than were obtained has no effect.
    pub fn release(&self) {
        self.state.lock().release();
    }

    /// Return one slot once `delay` has elapsed, without waiting for it.
    ///
    /// Every call schedules its own release, independent of any others
    /// still pending.
    pub fn release_after(self: &Arc<Self>, delay: Duration) {
        if delay.is_zero() {
            self.release();
            return;
        }
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            limiter.release();
        });
    }

    /// Change the ceiling and admit queued waiters the new ceiling makes
    /// room for.
    ///
    /// Lowering the ceiling below the current occupancy revokes nothing;
    /// new admissions wait until enough slots were released.
    pub fn set_capacity(&self, capacity: usize) {
        let mut state = self.state.lock();
        if state.capacity != capacity {
            log::trace!(
                "Resizing limiter from {} to {capacity} ({} occupied, {} waiting)",
                state.capacity,
                state.occupied,
                state.waiters.len()
            );
        }
        state.capacity = capacity;
        state.admit_waiters();
    }

    /// The current ceiling
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// The number of callers currently holding a slot
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.state.lock().occupied
    }

    /// The number of callers waiting for a slot
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

/// Removes a waiter from the queue unless it was disarmed after being
/// admitted.
///
/// The guard owns the receiving end of the grant, so a concurrent admission
/// always succeeds in sending. If the grant arrived but was never taken, the
/// slot is released again.
struct Queued<'a> {
    limiter: &'a AdmissionLimiter,
    key: Option<WaiterKey>,
    granted: oneshot::Receiver<()>,
}

impl Drop for Queued<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            let mut state = self.limiter.state.lock();
            if state.waiters.remove(&key).is_none() && self.granted.try_recv().is_ok() {
                state.release();
            }
        }
    }
}
