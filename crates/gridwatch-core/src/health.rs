//! Health states and the monotone-worsening comparison used when
//! aggregating verdicts.

use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// The health verdict attached to a service, partition, or engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Ok,
    Warning,
    Error,
    /// Not yet evaluated. Superseded by any proposed state.
    Unknown,
}

impl HealthState {
    /// Severity rank for worsening comparisons. `Unknown` ranks below
    /// everything so it never displaces an evaluated state.
    fn rank(self) -> u8 {
        match self {
            HealthState::Unknown => 0,
            HealthState::Ok => 1,
            HealthState::Warning => 2,
            HealthState::Error => 3,
        }
    }

    /// Monotone worsening: the result is `proposed` iff it is strictly
    /// worse than `current` (Ok < Warning < Error), except that an
    /// `Unknown` current state is always replaced by the proposal.
    pub fn escalate(current: HealthState, proposed: HealthState) -> HealthState {
        if current == HealthState::Unknown {
            return proposed;
        }
        if proposed.rank() > current.rank() {
            proposed
        } else {
            current
        }
    }
}

/// Whether an HTTP status code counts as success.
pub fn is_success_code(code: u16) -> bool {
    (200..=299).contains(&code)
}

/// An atomically readable health state, shared between an engine and the
/// self-reporter without coordination.
#[derive(Debug)]
pub struct HealthStateCell(AtomicU8);

impl HealthStateCell {
    pub fn new(state: HealthState) -> Self {
        Self(AtomicU8::new(encode(state)))
    }

    pub fn get(&self) -> HealthState {
        decode(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, state: HealthState) {
        self.0.store(encode(state), Ordering::Relaxed);
    }

    /// Apply a proposed state under the monotone-worsening rule.
    pub fn escalate(&self, proposed: HealthState) {
        let current = self.get();
        self.set(HealthState::escalate(current, proposed));
    }
}

impl Default for HealthStateCell {
    fn default() -> Self {
        Self::new(HealthState::Unknown)
    }
}

fn encode(state: HealthState) -> u8 {
    match state {
        HealthState::Unknown => 0,
        HealthState::Ok => 1,
        HealthState::Warning => 2,
        HealthState::Error => 3,
    }
}

fn decode(raw: u8) -> HealthState {
    match raw {
        1 => HealthState::Ok,
        2 => HealthState::Warning,
        3 => HealthState::Error,
        _ => HealthState::Unknown,
    }
}
