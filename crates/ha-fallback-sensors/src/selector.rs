//! Source selection and hysteresis
//!
//! [`select_source`] picks the first eligible source. [`Selector`] decides
//! whether the sensor actually follows that pick right away or only after
//! it has stayed the same for the configured delay.

use chrono::{DateTime, Utc};
use ha_core::{State, STATE_UNAVAILABLE, STATE_UNKNOWN};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::conditions::ConditionSet;

/// Whether a raw state value means the source has no usable reading
pub fn is_unavailable_value(value: &str) -> bool {
    matches!(value, STATE_UNAVAILABLE | STATE_UNKNOWN | "None" | "")
}

/// Check whether the source at `index` is available and passes its conditions
pub fn is_eligible(index: usize, state: &State, conditions: &ConditionSet) -> bool {
    !is_unavailable_value(&state.state) && conditions.is_valid(index, &state.state)
}

/// Index of the first source that is available and passes its conditions
///
/// `sources` holds the current state of each configured source in order,
/// `None` for entities that don't exist.
pub fn select_source(sources: &[Option<State>], conditions: &ConditionSet) -> Option<usize> {
    sources.iter().enumerate().find_map(|(index, state)| {
        let Some(state) = state else {
            debug!(index, "Source does not exist");
            return None;
        };
        if is_unavailable_value(&state.state) {
            debug!(index, entity_id = %state.entity_id, state = %state.state, "Source unavailable");
            return None;
        }
        if !conditions.is_valid(index, &state.state) {
            debug!(index, entity_id = %state.entity_id, state = %state.state, "Source fails conditions");
            return None;
        }
        Some(index)
    })
}

/// A switch waiting for its candidate to stay stable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingSwitch {
    pub candidate: Option<usize>,
    pub deadline: Instant,
}

/// Outcome of one [`Selector::evaluate`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First evaluation; the candidate was adopted without counting a switch
    Initial(Option<usize>),
    /// The active source stays as it is
    Unchanged,
    /// The active source changed
    Switched {
        from: Option<usize>,
        to: Option<usize>,
    },
    /// A switch is waiting for `deadline`
    Deferred {
        candidate: Option<usize>,
        deadline: Instant,
    },
}

/// Tracks the active source index across evaluations
#[derive(Debug, Clone)]
pub struct Selector {
    delay: Duration,
    initialized: bool,
    current: Option<usize>,
    pending: Option<PendingSwitch>,
    fallback_count: u64,
    last_fallback_time: Option<DateTime<Utc>>,
}

impl Selector {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            initialized: false,
            current: None,
            pending: None,
            fallback_count: 0,
            last_fallback_time: None,
        }
    }

    /// Feed the latest winning candidate
    ///
    /// Leaving "no source" is never delayed. A different candidate replaces
    /// a pending one and restarts its timer; the same candidate keeps the
    /// running timer and is committed once `now` reaches the deadline.
    pub fn evaluate(&mut self, candidate: Option<usize>, now: Instant) -> Transition {
        if !self.initialized {
            self.initialized = true;
            self.current = candidate;
            return Transition::Initial(candidate);
        }

        if candidate == self.current {
            if let Some(pending) = self.pending.take() {
                debug!(candidate = ?pending.candidate, "Candidate returned to active source, cancelling switch");
            }
            return Transition::Unchanged;
        }

        if self.delay.is_zero() || self.current.is_none() {
            return self.commit(candidate);
        }

        match self.pending {
            Some(pending) if pending.candidate == candidate => {
                if now >= pending.deadline {
                    self.commit(candidate)
                } else {
                    trace!(?candidate, "Switch still pending");
                    Transition::Deferred {
                        candidate,
                        deadline: pending.deadline,
                    }
                }
            }
            _ => {
                let deadline = now + self.delay;
                debug!(?candidate, delay = ?self.delay, "Deferring switch");
                self.pending = Some(PendingSwitch {
                    candidate,
                    deadline,
                });
                Transition::Deferred {
                    candidate,
                    deadline,
                }
            }
        }
    }

    fn commit(&mut self, to: Option<usize>) -> Transition {
        let from = self.current;
        self.current = to;
        self.pending = None;
        self.fallback_count += 1;
        self.last_fallback_time = Some(Utc::now());
        Transition::Switched { from, to }
    }

    /// Index of the active source
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn pending(&self) -> Option<PendingSwitch> {
        self.pending
    }

    /// When the pending switch is due, if there is one
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.deadline)
    }

    /// Number of switches since the sensor started
    pub fn fallback_count(&self) -> u64 {
        self.fallback_count
    }

    pub fn last_fallback_time(&self) -> Option<DateTime<Utc>> {
        self.last_fallback_time
    }
}
