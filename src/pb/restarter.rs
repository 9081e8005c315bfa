#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
//! Restart schedules. A restart abandons all decisions (but keeps every
//! learned constraint) and resumes from the root, which helps escape stuck
//! regions of the search space on hard instances.

use std::fmt::Debug;

/// Interface polled once per conflict by the search controller.
pub trait Restarter: Debug + Clone {
    fn new() -> Self;

    /// Conflicts remaining until the next restart fires.
    fn restarts_in(&self) -> usize;

    /// Consumes one conflict from the countdown.
    fn tick(&mut self);

    /// Resets the countdown to the next interval.
    fn restart(&mut self);

    fn num_restarts(&self) -> usize;

    /// Returns `true` exactly when a restart fires, advancing internal
    /// state either way.
    fn should_restart(&mut self) -> bool {
        if self.restarts_in() == 0 {
            self.restart();
            true
        } else {
            self.tick();
            false
        }
    }
}

/// Luby-sequence schedule: intervals `luby(1)*N, luby(2)*N, ...` where the
/// sequence runs 1, 1, 2, 1, 1, 2, 4, ... The unit factor `N` scales every
/// interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Luby<const N: usize> {
    restarts: usize,
    restarts_in: usize,
    next_index: usize,
}

impl<const N: usize> Luby<N> {
    /// The x-th element of the Luby sequence (0-based): 1, 1, 2, 1, 1, 2,
    /// 4, 1, ...
    #[must_use]
    pub fn luby(x: usize) -> usize {
        let mut seq = 0_u32;
        let mut size = 1_usize;
        while size < x + 1 {
            seq += 1;
            size = 2 * size + 1;
        }
        let mut x = x;
        while size - 1 != x {
            size = (size - 1) >> 1;
            seq -= 1;
            x %= size;
        }
        1 << seq
    }
}

impl<const N: usize> Restarter for Luby<N> {
    fn new() -> Self {
        Self {
            restarts: 0,
            restarts_in: N * Self::luby(0),
            next_index: 1,
        }
    }

    fn restarts_in(&self) -> usize {
        self.restarts_in
    }

    fn tick(&mut self) {
        self.restarts_in = self.restarts_in.saturating_sub(1);
    }

    fn restart(&mut self) {
        self.restarts += 1;
        self.restarts_in = Self::luby(self.next_index) * N;
        self.next_index += 1;
    }

    fn num_restarts(&self) -> usize {
        self.restarts
    }
}

/// Disables restarts entirely; useful as a baseline and in tests that need
/// a deterministic single descent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Never;

impl Restarter for Never {
    fn new() -> Self {
        Self
    }

    fn restarts_in(&self) -> usize {
        usize::MAX
    }

    fn tick(&mut self) {}

    fn restart(&mut self) {}

    fn num_restarts(&self) -> usize {
        0
    }

    fn should_restart(&mut self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_luby_sequence_prefix() {
        let expected = [1, 1, 2, 1, 1, 2, 4, 1, 1, 2, 1, 1, 2, 4, 8];
        for (i, &want) in expected.iter().enumerate() {
            assert_eq!(Luby::<1>::luby(i), want, "luby({i})");
        }
    }

    #[test]
    fn test_luby_restarter_fires_on_schedule() {
        let mut r: Luby<2> = Luby::new();
        let mut fired = Vec::new();
        for conflict in 0..20 {
            if r.should_restart() {
                fired.push(conflict);
            }
        }
        // First interval is N * luby(0) = 2 conflicts.
        assert_eq!(fired.first(), Some(&2));
        assert_eq!(r.num_restarts(), fired.len());
    }

    #[test]
    fn test_never() {
        let mut r = Never::new();
        for _ in 0..100 {
            assert!(!r.should_restart());
        }
        assert_eq!(r.num_restarts(), 0);
    }
}
