//! Bounded-concurrency task executor
//!
//! An explicit counting semaphore with a FIFO queue of waiters. When a running
//! task finishes, its slot is handed straight to the oldest waiter, so queued
//! tasks start strictly in the order they were submitted. State lives behind a
//! `std::sync::Mutex` that is never held across an `.await`, which keeps the
//! limiter correct on a multi-threaded runtime.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

use crate::error::{DiscoveryError, Result};

#[derive(Debug, Default)]
struct LimiterState {
    /// Slots in use, including slots handed to a waiter that hasn't resumed yet
    running: usize,
    next_ticket: u64,
    queue: VecDeque<(u64, oneshot::Sender<()>)>,
}

impl LimiterState {
    /// Give a finished slot to the next live waiter, or free it
    fn hand_off(&mut self) {
        while let Some((_, waiter)) = self.queue.pop_front() {
            if waiter.send(()).is_ok() {
                return;
            }
        }
        self.running -= 1;
    }
}

/// Runs at most `limit` tasks at a time
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    limit: usize,
    state: Mutex<LimiterState>,
}

impl ConcurrencyLimiter {
    pub fn new(limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(DiscoveryError::InvalidConfiguration(
                "Concurrency limit must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            limit,
            state: Mutex::new(LimiterState::default()),
        })
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of tasks currently holding a slot
    pub fn running_count(&self) -> usize {
        self.lock_state().running
    }

    /// Number of tasks waiting for a slot
    pub fn queue_length(&self) -> usize {
        self.lock_state().queue.len()
    }

    /// Run `task` once a slot is free and return its output untouched.
    ///
    /// A task that fails (or panics) releases its slot like any other; the
    /// error reaches only this caller.
    pub async fn execute<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _slot = self.acquire().await;
        task().await
    }

    fn lock_state(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn acquire(&self) -> Slot<'_> {
        loop {
            let waiter = {
                let mut state = self.lock_state();
                if state.running < self.limit {
                    state.running += 1;
                    return Slot { limiter: self };
                }

                let (tx, rx) = oneshot::channel();
                let ticket = state.next_ticket;
                state.next_ticket += 1;
                state.queue.push_back((ticket, tx));
                Waiter {
                    limiter: self,
                    ticket,
                    rx,
                    settled: false,
                }
            };

            if waiter.wait().await {
                return Slot { limiter: self };
            }
        }
    }
}

/// A held slot; dropping it passes the slot on
struct Slot<'a> {
    limiter: &'a ConcurrencyLimiter,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.limiter.lock_state().hand_off();
    }
}

/// A queued caller waiting for a slot
struct Waiter<'a> {
    limiter: &'a ConcurrencyLimiter,
    ticket: u64,
    rx: oneshot::Receiver<()>,
    settled: bool,
}

impl Waiter<'_> {
    /// Resolves to true once a slot has been handed to this waiter
    async fn wait(mut self) -> bool {
        let granted = (&mut self.rx).await.is_ok();
        self.settled = true;
        granted
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }

        // Caller went away while queued
        let mut state = self.limiter.lock_state();
        if let Some(pos) = state.queue.iter().position(|(t, _)| *t == self.ticket) {
            state.queue.remove(pos);
            return;
        }

        // Already dequeued: if the slot was handed over, pass it along
        self.rx.close();
        if self.rx.try_recv().is_ok() {
            state.hand_off();
        }
    }
}
