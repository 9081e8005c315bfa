#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
//! The search controller. Drives propagate / analyze / backjump / decide,
//! fires restarts and store cleanups on their own schedules, and handles
//! assumption literals as pseudo-decisions with core extraction on
//! failure.
//!
//! `solve_step` runs until the next natural checkpoint and returns a
//! [`SolveState`]; `solve` loops over steps until a terminal state,
//! polling the cooperative time limit between steps. Nothing preempts a
//! step in flight.

use crate::pb::activity::VarActivity;
use crate::pb::assignment::Assignment;
use crate::pb::centrality::{self, HeuristicMode};
use crate::pb::conflict_analysis::{analyze, ConflictOutcome};
use crate::pb::constraint::{Constraint, Normalized};
use crate::pb::literal::{Lit, Variable};
use crate::pb::phase_saving::SavedPhases;
use crate::pb::propagation::{enqueue, run_propagation};
use crate::pb::restarter::{Luby, Restarter};
use crate::pb::stats::Stats;
use crate::pb::store::{CRef, ConstraintStore};
use crate::pb::trail::{Reason, Trail};
use crate::pb::watch::Watches;
use ordered_float::OrderedFloat;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Reverse;
use std::error::Error;

const FIRST_REDUCE_AT: u64 = 2000;
const CONSTRAINT_DECAY: f64 = 0.999;

/// Checkpoint states of one solve step. `Sat`, `Unsat` and `Inconsistent`
/// are terminal; `Restarted` and `Inprocessed` hand control back so an
/// embedding caller can inspect state or stop early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolveState {
    Sat,
    Unsat,
    /// The assumptions cannot jointly hold; carries the extracted core, a
    /// subset of the assumptions. Cores are handed out, never retained.
    Inconsistent(Vec<Lit>),
    Inprocessed,
    Restarted,
}

/// External handle for an input constraint, stable across store
/// compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstraintId(u64);

/// Optional supplier of extra valid constraints (an LP relaxation, a cut
/// generator). Failures are reported and ignored; the search continues
/// without the cuts.
pub trait CutSource {
    /// Returns constraints as `(terms, degree)` meaning
    /// `sum(coef * lit) >= degree`.
    ///
    /// # Errors
    /// Any error aborts only this round of cuts, never the search.
    fn generate(
        &mut self,
        assignment: &Assignment,
    ) -> Result<Vec<(Vec<(i64, Lit)>, i64)>, Box<dyn Error + Send + Sync>>;
}

#[derive(Debug)]
pub struct Solver<R: Restarter = Luby<100>> {
    num_vars: usize,
    store: ConstraintStore,
    watches: Watches,
    trail: Trail,
    assignment: Assignment,
    activity: VarActivity,
    phases: SavedPhases,
    restarter: R,
    pub stats: Stats,
    heuristic: HeuristicMode,
    assumptions: Vec<Lit>,
    pending: Vec<Constraint>,
    external: FxHashMap<ConstraintId, Option<CRef>>,
    next_id: u64,
    constraint_inc: f64,
    nconfl_to_reduce: u64,
    conflicts_since_reduce: u64,
    last_solution: Option<Vec<Lit>>,
    presolved: bool,
    unsat: bool,
}

impl<R: Restarter> Solver<R> {
    #[must_use]
    pub fn new(num_vars: usize) -> Self {
        Self {
            num_vars,
            store: ConstraintStore::new(),
            watches: Watches::new(num_vars),
            trail: Trail::new(num_vars),
            assignment: Assignment::new(num_vars),
            activity: VarActivity::new(num_vars),
            phases: SavedPhases::new(num_vars),
            restarter: R::new(),
            stats: Stats::new(),
            heuristic: HeuristicMode::Vsids,
            assumptions: Vec::new(),
            pending: Vec::new(),
            external: FxHashMap::default(),
            next_id: 0,
            constraint_inc: 1.0,
            nconfl_to_reduce: FIRST_REDUCE_AT,
            conflicts_since_reduce: 0,
            last_solution: None,
            presolved: false,
            unsat: false,
        }
    }

    pub fn set_heuristic(&mut self, mode: HeuristicMode) {
        self.heuristic = mode;
    }

    pub fn set_time_limit(&mut self, seconds: f64) {
        self.stats.time_limit = Some(seconds);
    }

    /// Conflicts until the next learned-store cleanup; the interval then
    /// grows geometrically from this value. A tuning knob, also handy for
    /// forcing cleanups in small harnesses.
    pub fn set_reduce_interval(&mut self, conflicts: u64) {
        self.nconfl_to_reduce = conflicts;
    }

    /// Literals to hold as pseudo-decisions for the next solve, decided in
    /// order before any free variable.
    pub fn set_assumptions(&mut self, assumptions: &[Lit]) {
        self.assumptions = assumptions.to_vec();
    }

    pub fn clear_assumptions(&mut self) {
        self.assumptions.clear();
    }

    #[must_use]
    pub const fn num_vars(&self) -> usize {
        self.num_vars
    }

    #[must_use]
    pub fn last_solution(&self) -> Option<&[Lit]> {
        self.last_solution.as_deref()
    }

    /// Adds `sum(coef * lit) >= degree` to the formula. Must be called at
    /// the root (between solves). A constraint unsatisfiable on its own
    /// marks the whole formula unsatisfiable. The returned id is the
    /// stable external name of the input line; the in-store handle it
    /// resolves to is tracked internally and re-resolved across
    /// compactions, so callers never hold a raw `CRef`.
    pub fn add_constraint(&mut self, terms: &[(i64, Lit)], degree: i64) -> ConstraintId {
        debug_assert_eq!(self.trail.decision_level(), 0, "constraints are added at the root");
        let id = ConstraintId(self.next_id);
        self.next_id += 1;
        let cref = match Constraint::normalized(terms, degree) {
            Normalized::Tautology => None,
            Normalized::Contradiction => {
                log::debug!("input constraint is contradictory");
                self.unsat = true;
                None
            }
            Normalized::Constraint(c) => self.ingest(c),
        };
        self.external.insert(id, cref);
        id
    }

    pub fn add_clause(&mut self, lits: &[Lit]) -> ConstraintId {
        let terms: Vec<(i64, Lit)> = lits.iter().map(|&l| (1, l)).collect();
        self.add_constraint(&terms, 1)
    }

    /// Removes a previously added input constraint.
    ///
    /// # Panics
    /// If the constraint currently serves as a reason on the trail.
    pub fn drop_constraint(&mut self, id: ConstraintId) {
        if let Some(Some(cref)) = self.external.remove(&id) {
            self.watches.detach(cref, &self.store[cref]);
            self.store.remove(cref, false);
        }
    }

    /// Pulls a round of cuts from an external source. Errors are logged
    /// and swallowed; the search continues without the cuts.
    pub fn pull_cuts(&mut self, source: &mut dyn CutSource) {
        match source.generate(&self.assignment) {
            Ok(cuts) => {
                for (terms, degree) in cuts {
                    if let Normalized::Constraint(c) = Constraint::normalized(&terms, degree) {
                        self.pending.push(c);
                    }
                }
            }
            Err(err) => log::warn!("cut source failed, continuing without cuts: {err}"),
        }
    }

    /// Stores and watches a normalized constraint, propagating anything it
    /// forces immediately. Unit constraints bypass the store: their literal
    /// is enqueued as root-forced.
    fn ingest(&mut self, constraint: Constraint) -> Option<CRef> {
        if constraint.len() == 1 {
            if !enqueue(
                constraint.lits[0],
                Reason::Decision,
                &mut self.trail,
                &mut self.assignment,
                &mut self.store,
            ) {
                self.unsat = true;
            }
            return None;
        }
        let cref = self.store.alloc(constraint);
        self.watches.attach(cref, &self.store[cref]);
        self.propagate_attached(cref);
        Some(cref)
    }

    /// Attach-time propagation: literals already falsified were processed
    /// before this constraint existed, so forced literals must be enqueued
    /// here rather than waiting for a watch visit.
    fn propagate_attached(&mut self, cref: CRef) {
        let slack = self.store[cref].slack(&self.assignment);
        if slack < 0 {
            // Falsified on arrival. Watchers only fire on new
            // falsifications, so this would otherwise go unnoticed.
            if self.trail.decision_level() == 0 {
                self.unsat = true;
            }
            return;
        }
        let forced: Vec<Lit> = self.store[cref]
            .iter()
            .filter(|&(coef, l)| coef > slack && self.assignment.lit_value(l).is_none())
            .map(|(_, l)| l)
            .collect();
        for lit in forced {
            if !enqueue(
                lit,
                Reason::Constraint(cref),
                &mut self.trail,
                &mut self.assignment,
                &mut self.store,
            ) && self.trail.decision_level() == 0
            {
                self.unsat = true;
            }
        }
    }

    fn flush_pending(&mut self) {
        debug_assert_eq!(self.trail.decision_level(), 0);
        while let Some(constraint) = self.pending.pop() {
            self.ingest(constraint);
        }
    }

    /// One-shot cheap simplification before the first decision: root
    /// propagation plus the configured centrality scoring pass.
    pub fn presolve(&mut self) {
        if self.presolved {
            return;
        }
        self.presolved = true;
        self.flush_pending();
        if run_propagation(
            &mut self.store,
            &mut self.watches,
            &mut self.trail,
            &mut self.assignment,
            &mut self.stats,
            false,
        )
        .is_some()
        {
            self.unsat = true;
            return;
        }
        centrality::apply(
            self.heuristic,
            &self.store,
            self.num_vars,
            &mut self.activity,
            &mut self.stats,
        );
    }

    /// Runs to a terminal state, polling the time limit at checkpoints. A
    /// hit time limit returns `Inprocessed` (indeterminate).
    pub fn solve(&mut self) -> SolveState {
        self.backjump(0);
        self.presolve();
        loop {
            match self.solve_step() {
                SolveState::Restarted | SolveState::Inprocessed => {
                    if self.stats.time_limit_exceeded() {
                        log::info!("time limit reached after {} conflicts", self.stats.conflicts);
                        return SolveState::Inprocessed;
                    }
                }
                terminal => return terminal,
            }
        }
    }

    /// Runs search until the next checkpoint: a terminal answer, a restart
    /// or a store cleanup.
    pub fn solve_step(&mut self) -> SolveState {
        if self.unsat {
            return SolveState::Unsat;
        }
        if self.trail.decision_level() == 0 {
            self.flush_pending();
        }
        loop {
            let conflict = run_propagation(
                &mut self.store,
                &mut self.watches,
                &mut self.trail,
                &mut self.assignment,
                &mut self.stats,
                false,
            );

            if let Some(conflict) = conflict {
                self.stats.conflicts += 1;
                self.conflicts_since_reduce += 1;
                if self.trail.decision_level() == 0 {
                    self.unsat = true;
                    return SolveState::Unsat;
                }
                if !self.handle_conflict(conflict) {
                    return SolveState::Unsat;
                }
                if self.restarter.should_restart() {
                    self.stats.restarts += 1;
                    log::debug!(
                        "restart {} at {} conflicts",
                        self.stats.restarts,
                        self.stats.conflicts
                    );
                    self.backjump(0);
                    return SolveState::Restarted;
                }
                if self.conflicts_since_reduce >= self.nconfl_to_reduce {
                    self.inprocess();
                    return SolveState::Inprocessed;
                }
                continue;
            }

            match self.decide() {
                Decision::Made => {}
                Decision::Sat => {
                    // Back to the root so constraints can be added before
                    // the next solve.
                    self.backjump(0);
                    return SolveState::Sat;
                }
                Decision::FailedAssumption(failed) => {
                    let core = self.extract_core(failed);
                    self.backjump(0);
                    return SolveState::Inconsistent(core);
                }
            }
        }
    }

    /// Learns from a falsified constraint and backjumps. Returns `false`
    /// when the conflict holds at the root.
    fn handle_conflict(&mut self, conflict: CRef) -> bool {
        self.activity.decay();
        self.constraint_inc /= CONSTRAINT_DECAY;
        let outcome = analyze(
            conflict,
            &mut self.store,
            &self.trail,
            &self.assignment,
            &mut self.activity,
            self.constraint_inc,
            &mut self.stats,
        );
        let ConflictOutcome::Learned(analysis) = outcome else {
            self.unsat = true;
            return false;
        };
        log::trace!(
            "conflict {}: learned len {} lbd {} backjump {}",
            self.stats.conflicts,
            analysis.learned.len(),
            analysis.learned.lbd,
            analysis.backjump
        );
        self.backjump(analysis.backjump);
        let asserting = analysis.asserting;
        if analysis.learned.len() == 1 {
            debug_assert_eq!(self.trail.decision_level(), 0);
            if !enqueue(
                asserting,
                Reason::Decision,
                &mut self.trail,
                &mut self.assignment,
                &mut self.store,
            ) {
                self.unsat = true;
                return false;
            }
        } else {
            let cref = self.ingest(analysis.learned);
            // The chosen backjump level guarantees the learned constraint
            // is not falsified on arrival; usually it also propagates the
            // asserting literal, but a weighted constraint may land on a
            // level where it neither conflicts nor forces.
            debug_assert!(
                cref.is_some_and(|c| self.store[c].slack(&self.assignment) >= 0),
                "learned constraint falsified at its backjump level"
            );
            debug_assert!(!self.assignment.is_false(asserting));
        }
        true
    }

    fn decide(&mut self) -> Decision {
        // Assumptions first, in order, ignoring the polarity heuristics.
        for i in 0..self.assumptions.len() {
            let assumption = self.assumptions[i];
            if self.assignment.is_true(assumption) {
                continue;
            }
            if self.assignment.is_false(assumption) {
                return Decision::FailedAssumption(assumption);
            }
            self.stats.decisions += 1;
            self.trail.new_level();
            let ok = enqueue(
                assumption,
                Reason::Decision,
                &mut self.trail,
                &mut self.assignment,
                &mut self.store,
            );
            debug_assert!(ok);
            return Decision::Made;
        }

        let Some(var) = self.activity.pick(&self.assignment) else {
            debug_assert!(self
                .store
                .crefs()
                .all(|c| self.store[c].is_satisfied(&self.assignment)));
            self.stats.solutions += 1;
            self.last_solution = Some(self.assignment.solution());
            return Decision::Sat;
        };
        self.stats.decisions += 1;
        self.trail.new_level();
        let lit = self.pick_branch_lit(var);
        let ok = enqueue(
            lit,
            Reason::Decision,
            &mut self.trail,
            &mut self.assignment,
            &mut self.store,
        );
        debug_assert!(ok);
        Decision::Made
    }

    /// Cached-phase polarity: the last full solution wins over the saved
    /// phase, so optimization reruns stay near the incumbent.
    fn pick_branch_lit(&self, var: Variable) -> Lit {
        let polarity = self.last_solution.as_ref().map_or_else(
            || self.phases.next(var),
            |solution| solution[var as usize - 1].polarity(),
        );
        Lit::new(var, polarity)
    }

    /// Pops above `level`, caching the phase of every popped literal.
    fn backjump(&mut self, level: usize) {
        if level >= self.trail.decision_level() {
            return;
        }
        let from = self.trail.level_start(level + 1);
        for i in from..self.trail.len() {
            self.phases.save(self.trail[i].lit);
        }
        let popped = self
            .trail
            .backjump_to(level, &mut self.assignment, &mut self.store);
        self.stats.trail_pops += popped as u64;
    }

    /// Walks reason chains down from a falsified assumption, collecting the
    /// assumption decisions that feed it. Contradictory assumptions at the
    /// root yield the singleton core.
    fn extract_core(&mut self, failed: Lit) -> Vec<Lit> {
        self.stats.cores += 1;
        let mut core = vec![failed];
        if self.trail.decision_level() == 0 {
            return core;
        }
        let mut seen: FxHashSet<Variable> = FxHashSet::default();
        seen.insert(failed.variable());
        let start = self.trail.level_start(1);
        for i in (start..self.trail.len()).rev() {
            let step = self.trail[i];
            if !seen.remove(&step.lit.variable()) {
                continue;
            }
            match step.reason {
                Reason::Decision => core.push(step.lit),
                Reason::Constraint(cref) => {
                    for lit in &self.store[cref].lits {
                        if self.trail.level(lit.variable()) > 0 {
                            seen.insert(lit.variable());
                        }
                    }
                }
            }
        }
        log::debug!("extracted core of {} assumptions", core.len());
        core
    }

    /// Learned-store cleanup plus arena compaction. Every held `CRef` (trail
    /// reasons, watch lists, external handles) is re-resolved afterwards.
    fn inprocess(&mut self) {
        self.conflicts_since_reduce = 0;
        self.nconfl_to_reduce = self.nconfl_to_reduce * 3 / 2;
        self.stats.cleanups += 1;
        self.reduce_db();
        let relocation = self.store.garbage_collect();
        self.watches.rebuild(&self.store);
        self.trail.remap_reasons(&relocation);
        for slot in self.external.values_mut() {
            if let Some(old) = *slot {
                *slot = relocation.get(&old).copied();
            }
        }
        log::debug!(
            "cleanup {}: {} constraints live, next reduce in {} conflicts",
            self.stats.cleanups,
            self.store.len(),
            self.nconfl_to_reduce
        );
    }

    /// Drops the weaker half of the disposable learned constraints: lowest
    /// activity first, ties broken toward higher LBD. Locked and low-LBD
    /// constraints are kept unconditionally.
    fn reduce_db(&mut self) {
        let mut candidates: Vec<CRef> = self
            .store
            .crefs()
            .filter(|&cref| {
                let c = &self.store[cref];
                c.learned && !c.is_locked() && c.lbd > 2
            })
            .collect();
        candidates.sort_by_key(|&cref| {
            let c = &self.store[cref];
            (OrderedFloat(c.activity), Reverse(c.lbd))
        });
        let to_remove = candidates.len() / 2;
        for &cref in &candidates[..to_remove] {
            self.watches.detach(cref, &self.store[cref]);
            self.store.remove(cref, false);
            self.stats.removed_constraints += 1;
        }
    }
}

enum Decision {
    Made,
    Sat,
    FailedAssumption(Lit),
}
