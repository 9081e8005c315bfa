#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
use crate::pb::literal::{Lit, Variable};
use bit_vec::BitVec;

/// Cached branching polarity per variable. Deterministic by default; a
/// small noise probability flips the cached phase occasionally to escape
/// stale polarities.
#[derive(Clone, Debug, PartialEq)]
pub struct SavedPhases {
    phases: BitVec,
    noise: f64,
}

impl SavedPhases {
    #[must_use]
    pub fn new(num_vars: usize) -> Self {
        Self {
            phases: BitVec::from_elem(num_vars + 1, true),
            noise: 0.0,
        }
    }

    #[must_use]
    pub fn with_noise(num_vars: usize, noise: f64) -> Self {
        Self {
            phases: BitVec::from_elem(num_vars + 1, true),
            noise,
        }
    }

    pub fn save(&mut self, lit: Lit) {
        self.phases.set(lit.variable() as usize, lit.polarity());
    }

    #[must_use]
    pub fn next(&self, var: Variable) -> bool {
        let phase = self.phases.get(var as usize).unwrap_or(true);
        if self.noise > 0.0 && fastrand::f64() < self.noise {
            !phase
        } else {
            phase
        }
    }

    pub fn reset(&mut self) {
        self.phases.set_all();
    }
}
