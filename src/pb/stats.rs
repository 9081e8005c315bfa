#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
//! Passive run counters, incremented by the engine at defined events and
//! flushed as a CSV row on demand. Nothing here feeds back into search
//! except the cooperative time-limit poll.

use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct Stats {
    pub conflicts: u64,
    pub decisions: u64,
    pub propagations: u64,
    pub propagations_clause: u64,
    pub propagations_card: u64,
    pub propagations_counting: u64,
    pub prop_checks: u64,
    pub watch_lookups: u64,
    pub watch_checks: u64,
    pub resolve_steps: u64,
    pub weakened: u64,
    pub trail_pops: u64,
    pub restarts: u64,
    pub cleanups: u64,
    pub removed_constraints: u64,
    pub learned_clauses: u64,
    pub learned_cardinalities: u64,
    pub learned_generals: u64,
    pub learned_length_sum: u64,
    pub gcd_reductions: u64,
    pub overflow_fallbacks: u64,
    pub cores: u64,
    pub solutions: u64,
    pub heuristic_invocations: u64,
    pub heuristic_time: f64,
    pub max_heuristic_time: f64,
    pub time_limit: Option<f64>,
    start: Instant,
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Stats {
    #[must_use]
    pub fn new() -> Self {
        Self {
            conflicts: 0,
            decisions: 0,
            propagations: 0,
            propagations_clause: 0,
            propagations_card: 0,
            propagations_counting: 0,
            prop_checks: 0,
            watch_lookups: 0,
            watch_checks: 0,
            resolve_steps: 0,
            weakened: 0,
            trail_pops: 0,
            restarts: 0,
            cleanups: 0,
            removed_constraints: 0,
            learned_clauses: 0,
            learned_cardinalities: 0,
            learned_generals: 0,
            learned_length_sum: 0,
            gcd_reductions: 0,
            overflow_fallbacks: 0,
            cores: 0,
            solutions: 0,
            heuristic_invocations: 0,
            heuristic_time: 0.0,
            max_heuristic_time: 0.0,
            time_limit: None,
            start: Instant::now(),
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Cooperative time-limit check, polled at decision, restart and
    /// cleanup boundaries. The engine never preempts.
    #[must_use]
    pub fn time_limit_exceeded(&self) -> bool {
        self.time_limit
            .is_some_and(|limit| self.elapsed() >= limit)
    }

    pub fn record_heuristic_run(&mut self, seconds: f64) {
        self.heuristic_invocations += 1;
        self.heuristic_time += seconds;
        if seconds > self.max_heuristic_time {
            self.max_heuristic_time = seconds;
        }
    }

    /// Deterministic work measure, independent of wall time.
    #[must_use]
    pub fn det_time(&self) -> u64 {
        1 + self.propagations
            + self.prop_checks
            + self.watch_lookups
            + self.watch_checks
            + self.decisions
            + self.trail_pops
    }

    #[must_use]
    pub fn csv_header() -> &'static str {
        "conflicts,decisions,propagations,resolve_steps,restarts,cleanups,\
         learned_clauses,learned_cardinalities,learned_generals,cores,\
         heuristic_invocations,heuristic_time,max_heuristic_time,elapsed"
    }

    #[must_use]
    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{:.4},{:.4},{:.4}",
            self.conflicts,
            self.decisions,
            self.propagations,
            self.resolve_steps,
            self.restarts,
            self.cleanups,
            self.learned_clauses,
            self.learned_cardinalities,
            self.learned_generals,
            self.cores,
            self.heuristic_invocations,
            self.heuristic_time,
            self.max_heuristic_time,
            self.elapsed(),
        )
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "c conflicts            {}", self.conflicts)?;
        writeln!(f, "c decisions            {}", self.decisions)?;
        writeln!(f, "c propagations         {}", self.propagations)?;
        writeln!(f, "c resolve steps        {}", self.resolve_steps)?;
        writeln!(f, "c restarts             {}", self.restarts)?;
        writeln!(f, "c cleanups             {}", self.cleanups)?;
        writeln!(f, "c removed constraints  {}", self.removed_constraints)?;
        writeln!(f, "c heuristic runs       {}", self.heuristic_invocations)?;
        writeln!(f, "c heuristic time       {:.4}s", self.heuristic_time)?;
        write!(f, "c elapsed              {:.4}s", self.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_limit() {
        let mut stats = Stats::new();
        assert!(!stats.time_limit_exceeded());
        stats.time_limit = Some(0.0);
        assert!(stats.time_limit_exceeded());
    }

    #[test]
    fn test_heuristic_tracking() {
        let mut stats = Stats::new();
        stats.record_heuristic_run(0.5);
        stats.record_heuristic_run(0.2);
        assert_eq!(stats.heuristic_invocations, 2);
        assert!((stats.heuristic_time - 0.7).abs() < 1e-9);
        assert!((stats.max_heuristic_time - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_csv_row_field_count() {
        let stats = Stats::new();
        assert_eq!(
            stats.csv_row().split(',').count(),
            Stats::csv_header().split(',').count()
        );
    }
}
