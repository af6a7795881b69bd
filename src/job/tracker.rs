//! Job budget tracking
//!
//! Remote bulk APIs cap the number of jobs an account may run at once. The
//! tracker hands out reservations before a job is created and binds them to
//! the job id once the API returned it, so the number of outstanding
//! reservations never exceeds the limit.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Handle on a budget slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReservationId {
    index: usize,
    generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SlotState {
    Free,
    Reserved,
    Bound(String),
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    state: SlotState,
}

#[derive(Debug, Default)]
struct TrackerState {
    slots: Vec<Slot>,
    free: Vec<usize>,
    by_job_id: HashMap<String, usize>,
    outstanding: usize,
}

impl TrackerState {
    fn slot_mut(&mut self, reservation: ReservationId) -> Result<&mut Slot> {
        match self.slots.get_mut(reservation.index) {
            Some(slot)
                if slot.generation == reservation.generation && slot.state != SlotState::Free =>
            {
                Ok(slot)
            }
            _ => Err(Error::job_tracker(format!(
                "reservation {reservation:?} is not held"
            ))),
        }
    }

    fn free_slot(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        if let SlotState::Bound(job_id) = &slot.state {
            self.by_job_id.remove(job_id);
        }
        slot.state = SlotState::Free;
        slot.generation += 1;
        self.free.push(index);
        self.outstanding -= 1;
    }
}

/// Concurrency budget shared by every orchestrator talking to the same API
#[derive(Debug)]
pub struct JobTracker {
    limit: usize,
    state: Mutex<TrackerState>,
}

impl JobTracker {
    /// Create a tracker allowing `limit` concurrent jobs
    pub fn new(limit: usize) -> Self {
        let limit = if limit < 1 {
            warn!("The job budget must be at least 1, got {limit}. Using 1 instead");
            1
        } else {
            limit
        };

        Self {
            limit,
            state: Mutex::new(TrackerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve a slot for a job about to be created
    pub fn try_to_get_intent(&self) -> Result<ReservationId> {
        let mut state = self.lock();
        if state.outstanding >= self.limit {
            return Err(Error::ConcurrentJobLimitReached { limit: self.limit });
        }

        let index = if let Some(index) = state.free.pop() {
            index
        } else {
            state.slots.push(Slot {
                generation: 0,
                state: SlotState::Free,
            });
            state.slots.len() - 1
        };

        let slot = &mut state.slots[index];
        slot.state = SlotState::Reserved;
        let reservation = ReservationId {
            index,
            generation: slot.generation,
        };
        state.outstanding += 1;
        Ok(reservation)
    }

    /// Bind a reservation to the id of the job it was used for
    ///
    /// A reservation already bound to another job is re-bound; this is how a
    /// replacement job inherits the slot of the job it replaces.
    pub fn add_job(&self, reservation: ReservationId, job_id: &str) -> Result<()> {
        let mut state = self.lock();
        let previous = std::mem::replace(
            &mut state.slot_mut(reservation)?.state,
            SlotState::Bound(job_id.to_string()),
        );
        if let SlotState::Bound(previous_id) = previous {
            state.by_job_id.remove(&previous_id);
        }
        state.by_job_id.insert(job_id.to_string(), reservation.index);
        Ok(())
    }

    /// Slot currently held by a job
    pub fn reservation_for(&self, job_id: &str) -> Option<ReservationId> {
        let state = self.lock();
        let index = *state.by_job_id.get(job_id)?;
        Some(ReservationId {
            index,
            generation: state.slots[index].generation,
        })
    }

    /// Free the slot held by a job
    pub fn remove_job(&self, job_id: &str) {
        let mut state = self.lock();
        match state.by_job_id.get(job_id).copied() {
            Some(index) => state.free_slot(index),
            None => debug!("Job {job_id} does not hold any budget, nothing to release"),
        }
    }

    /// Free a reservation that was never bound to a job
    pub fn release_intent(&self, reservation: ReservationId) {
        let mut state = self.lock();
        if state.slot_mut(reservation).is_ok() {
            state.free_slot(reservation.index);
        }
    }

    /// Number of reserved or bound slots
    pub fn outstanding(&self) -> usize {
        self.lock().outstanding
    }

    /// Maximum number of concurrent jobs
    pub fn limit(&self) -> usize {
        self.limit
    }
}
