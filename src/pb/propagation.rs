#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
//! Unit propagation over watched literals, generalized to arbitrary-degree
//! constraints. Clauses keep the classic two-watched scheme with lazy watch
//! replacement; cardinalities watch degree+1 literals; general constraints
//! use counting propagation with slack recomputation.

use crate::pb::assignment::Assignment;
use crate::pb::constraint::Shape;
use crate::pb::literal::Lit;
use crate::pb::stats::Stats;
use crate::pb::store::{CRef, ConstraintStore};
use crate::pb::trail::{Reason, Trail};
use crate::pb::watch::{Watch, Watches};
use smallvec::SmallVec;

/// Asserts a literal with its justifying reason, appending it to the trail.
/// Returns `false` if the literal's negation already holds, which is a
/// conflict the caller must surface.
pub fn enqueue(
    lit: Lit,
    reason: Reason,
    trail: &mut Trail,
    assignment: &mut Assignment,
    store: &mut ConstraintStore,
) -> bool {
    if assignment.is_false(lit) {
        return false;
    }
    if assignment.is_true(lit) {
        return true;
    }
    assignment.assign(lit);
    if let Reason::Constraint(cref) = reason {
        store.lock(cref);
    }
    trail.push(lit, reason);
    true
}

enum Action {
    Keep,
    KeepBlocking(Lit),
    MoveWatch { to: Lit, blocking: Lit },
    Propagate(SmallVec<[Lit; 4]>),
    Conflict,
}

fn visit_clause(
    cref: CRef,
    false_lit: Lit,
    store: &mut ConstraintStore,
    assignment: &Assignment,
) -> Action {
    let c = &mut store[cref];
    if c.lits[0] == false_lit {
        c.swap_terms(0, 1);
    }
    debug_assert_eq!(c.lits[1], false_lit);

    let first = c.lits[0];
    if assignment.is_true(first) {
        return Action::KeepBlocking(first);
    }
    if let Some(j) = (2..c.len()).position(|j| !assignment.is_false(c.lits[j])) {
        c.swap_terms(1, j + 2);
        return Action::MoveWatch {
            to: c.lits[1],
            blocking: first,
        };
    }
    if assignment.is_false(first) {
        return Action::Conflict;
    }
    Action::Propagate(SmallVec::from_slice(&[first]))
}

fn visit_cardinality(
    cref: CRef,
    false_lit: Lit,
    store: &mut ConstraintStore,
    assignment: &Assignment,
) -> Action {
    let c = &mut store[cref];
    let prefix = Watches::watched_prefix(c);
    let Some(wi) = (0..prefix).position(|k| c.lits[k] == false_lit) else {
        // Stale entry from a watch that already moved away.
        return Action::Keep;
    };

    if let Some(j) = (prefix..c.len()).find(|&j| !assignment.is_false(c.lits[j])) {
        c.swap_terms(wi, j);
        let blocking = c.lits[(wi + 1) % prefix];
        return Action::MoveWatch {
            to: c.lits[wi],
            blocking,
        };
    }

    // Every unwatched literal is false: the other watched literals must all
    // hold to reach the degree.
    if (0..prefix).any(|k| k != wi && assignment.is_false(c.lits[k])) {
        return Action::Conflict;
    }
    let forced: SmallVec<[Lit; 4]> = (0..prefix)
        .filter(|&k| k != wi)
        .map(|k| c.lits[k])
        .filter(|&l| assignment.lit_value(l).is_none())
        .collect();
    if forced.is_empty() {
        Action::Keep
    } else {
        Action::Propagate(forced)
    }
}

fn visit_general(cref: CRef, store: &ConstraintStore, assignment: &Assignment) -> Action {
    let c = &store[cref];
    let slack = c.slack(assignment);
    if slack < 0 {
        return Action::Conflict;
    }
    let forced: SmallVec<[Lit; 4]> = c
        .iter()
        .filter(|&(coef, l)| coef > slack && assignment.lit_value(l).is_none())
        .map(|(_, l)| l)
        .collect();
    if forced.is_empty() {
        Action::Keep
    } else {
        Action::Propagate(forced)
    }
}

/// Runs unit propagation to fixpoint or contradiction, processing literals
/// from `trail.qhead` onward. Returns the falsified constraint on conflict.
/// With `only_units`, non-clause constraints are skipped (cheap presolve
/// pass).
pub fn run_propagation(
    store: &mut ConstraintStore,
    watches: &mut Watches,
    trail: &mut Trail,
    assignment: &mut Assignment,
    stats: &mut Stats,
    only_units: bool,
) -> Option<CRef> {
    while trail.qhead < trail.len() {
        let p = trail[trail.qhead].lit;
        trail.qhead += 1;
        stats.prop_checks += 1;

        let false_lit = !p;
        let mut i = 0;
        while i < watches[false_lit].len() {
            let Watch { cref, blocking } = watches[false_lit][i];
            stats.watch_lookups += 1;
            let shape = store[cref].shape;
            // One true literal only discharges a degree-1 clause; higher
            // degrees may still have propagations or a conflict pending.
            if shape == Shape::Clause && assignment.is_true(blocking) {
                i += 1;
                continue;
            }
            if only_units && shape != Shape::Clause {
                i += 1;
                continue;
            }
            stats.watch_checks += 1;

            let action = match shape {
                Shape::Clause => visit_clause(cref, false_lit, store, assignment),
                Shape::Cardinality => visit_cardinality(cref, false_lit, store, assignment),
                Shape::General => visit_general(cref, store, assignment),
            };

            match action {
                Action::Keep => i += 1,
                Action::KeepBlocking(b) => {
                    watches[false_lit][i].blocking = b;
                    i += 1;
                }
                Action::MoveWatch { to, blocking } => {
                    watches[to].push(Watch { cref, blocking });
                    watches[false_lit].swap_remove(i);
                }
                Action::Propagate(lits) => {
                    for lit in lits {
                        if !enqueue(lit, Reason::Constraint(cref), trail, assignment, store) {
                            return Some(cref);
                        }
                        stats.propagations += 1;
                        match shape {
                            Shape::Clause => stats.propagations_clause += 1,
                            Shape::Cardinality => stats.propagations_card += 1,
                            Shape::General => stats.propagations_counting += 1,
                        }
                    }
                    i += 1;
                }
                Action::Conflict => return Some(cref),
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pb::constraint::{Constraint, Normalized};

    fn lit(v: i32) -> Lit {
        Lit::from_i32(v)
    }

    struct Fixture {
        store: ConstraintStore,
        watches: Watches,
        trail: Trail,
        assignment: Assignment,
        stats: Stats,
    }

    impl Fixture {
        fn new(num_vars: usize) -> Self {
            Self {
                store: ConstraintStore::new(),
                watches: Watches::new(num_vars),
                trail: Trail::new(num_vars),
                assignment: Assignment::new(num_vars),
                stats: Stats::new(),
            }
        }

        fn add(&mut self, terms: &[(i64, i32)], degree: i64) -> CRef {
            let terms: Vec<(i64, Lit)> = terms.iter().map(|&(c, l)| (c, lit(l))).collect();
            let Normalized::Constraint(c) = Constraint::normalized(&terms, degree) else {
                panic!("expected constraint");
            };
            let cref = self.store.alloc(c);
            self.watches.attach(cref, &self.store[cref]);
            cref
        }

        fn decide(&mut self, l: i32) {
            self.trail.new_level();
            assert!(enqueue(
                lit(l),
                Reason::Decision,
                &mut self.trail,
                &mut self.assignment,
                &mut self.store,
            ));
        }

        fn propagate(&mut self) -> Option<CRef> {
            run_propagation(
                &mut self.store,
                &mut self.watches,
                &mut self.trail,
                &mut self.assignment,
                &mut self.stats,
                false,
            )
        }
    }

    #[test]
    fn test_clause_propagates_last_literal() {
        let mut f = Fixture::new(3);
        f.add(&[(1, 1), (1, 2), (1, 3)], 1);
        f.decide(-1);
        assert_eq!(f.propagate(), None);
        f.decide(-2);
        assert_eq!(f.propagate(), None);
        assert!(f.assignment.is_true(lit(3)));
    }

    #[test]
    fn test_clause_conflict() {
        let mut f = Fixture::new(2);
        f.add(&[(1, 1), (1, 2)], 1);
        let second = f.add(&[(1, 1), (1, -2)], 1);
        f.decide(-1);
        // x2 is forced by the first clause and falsifies the second.
        assert_eq!(f.propagate(), Some(second));
    }

    #[test]
    fn test_cardinality_propagates_past_true_watch() {
        // x1 + x2 + x3 >= 2 with x1 already true: ~x2 must still force x3.
        // A satisfied watch discharges a clause but not a higher degree.
        let mut f = Fixture::new(3);
        f.add(&[(1, 1), (1, 2), (1, 3)], 2);
        f.decide(1);
        assert_eq!(f.propagate(), None);
        f.decide(-2);
        assert_eq!(f.propagate(), None);
        assert!(f.assignment.is_true(lit(3)));
    }

    #[test]
    fn test_general_conflict_past_true_watch() {
        // 2 x1 + x2 + x3 >= 3 with x1 true: ~x2 and ~x3 leave the degree
        // unreachable even though a watched literal is satisfied.
        let mut f = Fixture::new(3);
        let cref = f.add(&[(2, 1), (1, 2), (1, 3)], 3);
        f.decide(1);
        assert_eq!(f.propagate(), None);
        f.trail.new_level();
        for l in [-2, -3] {
            assert!(enqueue(
                lit(l),
                Reason::Decision,
                &mut f.trail,
                &mut f.assignment,
                &mut f.store,
            ));
        }
        assert_eq!(f.propagate(), Some(cref));
    }

    #[test]
    fn test_cardinality_propagates_when_tight() {
        // x1 + x2 + x3 >= 2, ~x3 forces x1 and x2.
        let mut f = Fixture::new(3);
        f.add(&[(1, 1), (1, 2), (1, 3)], 2);
        f.decide(-3);
        assert_eq!(f.propagate(), None);
        assert!(f.assignment.is_true(lit(1)));
        assert!(f.assignment.is_true(lit(2)));
    }

    #[test]
    fn test_general_propagates_large_coefficient() {
        // 3 x1 + 2 x2 + 1 x3 >= 3: falsifying x1 forces x2 (slack 0 < 2)
        // and x3.
        let mut f = Fixture::new(3);
        f.add(&[(3, 1), (2, 2), (1, 3)], 3);
        f.decide(-1);
        assert_eq!(f.propagate(), None);
        assert!(f.assignment.is_true(lit(2)));
        assert!(f.assignment.is_true(lit(3)));
    }

    #[test]
    fn test_general_conflict_on_negative_slack() {
        let mut f = Fixture::new(3);
        let cref = f.add(&[(2, 1), (1, 2), (1, 3)], 3);
        f.decide(-1);
        // 1 + 1 < 3: conflict.
        assert_eq!(f.propagate(), Some(cref));
    }

    #[test]
    fn test_root_conflict_from_units() {
        // x1 + x2 >= 2 with root units ~x1, ~x2 conflicts with no decisions.
        let mut f = Fixture::new(2);
        let cref = f.add(&[(1, 1), (1, 2)], 2);
        for unit in [-1, -2] {
            assert!(enqueue(
                lit(unit),
                Reason::Decision,
                &mut f.trail,
                &mut f.assignment,
                &mut f.store,
            ));
        }
        assert_eq!(f.propagate(), Some(cref));
        assert_eq!(f.trail.decision_level(), 0);
    }
}
