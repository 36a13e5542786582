//! Weighted admission gate.
//!
//! A counting semaphore over `capacity` units where each acquisition takes a
//! caller-chosen number of units. Units come back only through [`Permit`]'s
//! `Drop`, so a release without a matching acquire cannot be written.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::cancel::CancelToken;

/// How long a cancellable acquire sleeps before re-checking the token.
const CANCEL_POLL: Duration = Duration::from_millis(25);

#[derive(Debug)]
struct State {
    available: u32,
    peak_in_flight: u32,
}

#[derive(Debug)]
pub struct AdmissionGate {
    capacity: u32,
    state: Mutex<State>,
    freed: Condvar,
}

/// Units held by one admitted job. Dropping it returns them to the gate.
#[derive(Debug)]
pub struct Permit {
    gate: Arc<AdmissionGate>,
    weight: u32,
}

impl Permit {
    pub fn weight(&self) -> u32 {
        self.weight
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.gate.release(self.weight);
    }
}

impl AdmissionGate {
    pub fn new(capacity: u32) -> Arc<Self> {
        assert!(capacity >= 1, "admission capacity must be at least 1");
        Arc::new(Self {
            capacity,
            state: Mutex::new(State {
                available: capacity,
                peak_in_flight: 0,
            }),
            freed: Condvar::new(),
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn available(&self) -> u32 {
        self.lock().available
    }

    pub fn in_flight(&self) -> u32 {
        self.capacity - self.lock().available
    }

    /// Highest number of units ever held at once.
    pub fn peak_in_flight(&self) -> u32 {
        self.lock().peak_in_flight
    }

    /// Blocks until `weight` units are free and takes them.
    ///
    /// # Panics
    ///
    /// Panics if `weight` is zero or larger than the capacity; such a request
    /// could never be satisfied.
    pub fn acquire(self: &Arc<Self>, weight: u32) -> Permit {
        self.check_weight(weight);
        let mut state = self.lock();
        while state.available < weight {
            state = self.freed.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        self.take(&mut state, weight);
        drop(state);
        self.permit(weight)
    }

    /// Like [`acquire`](Self::acquire) but gives up, returning `None`, once
    /// `cancel` is set.
    pub fn acquire_until(self: &Arc<Self>, weight: u32, cancel: &CancelToken) -> Option<Permit> {
        self.check_weight(weight);
        let mut state = self.lock();
        while state.available < weight {
            if cancel.is_cancelled() {
                return None;
            }
            state = self
                .freed
                .wait_timeout(state, CANCEL_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        if cancel.is_cancelled() {
            return None;
        }
        self.take(&mut state, weight);
        drop(state);
        Some(self.permit(weight))
    }

    /// Takes `weight` units only if they are free right now.
    pub fn try_acquire(self: &Arc<Self>, weight: u32) -> Option<Permit> {
        self.check_weight(weight);
        let mut state = self.lock();
        if state.available < weight {
            return None;
        }
        self.take(&mut state, weight);
        drop(state);
        Some(self.permit(weight))
    }

    fn release(&self, weight: u32) {
        let mut state = self.lock();
        assert!(
            state.available + weight <= self.capacity,
            "released {weight} units with only {} outstanding",
            self.capacity - state.available
        );
        state.available += weight;
        drop(state);
        self.freed.notify_all();
    }

    fn take(&self, state: &mut State, weight: u32) {
        state.available -= weight;
        state.peak_in_flight = state.peak_in_flight.max(self.capacity - state.available);
    }

    fn permit(self: &Arc<Self>, weight: u32) -> Permit {
        Permit {
            gate: Arc::clone(self),
            weight,
        }
    }

    fn check_weight(&self, weight: u32) {
        assert!(
            (1..=self.capacity).contains(&weight),
            "weight {weight} outside 1..={}",
            self.capacity
        );
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
