#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
//! Conflict analysis over weighted constraints. The falsified constraint is
//! repeatedly resolved against the reason of the most recently assigned
//! conflicting variable until exactly one falsified literal remains at the
//! conflict level, yielding an asserting learned constraint and a backjump
//! level.
//!
//! Each resolution step cancels the pivot variable exactly: the reason is
//! first reduced so the pivot carries coefficient 1 (weakening
//! non-falsified non-divisible terms, then ceiling division), then added
//! scaled by the conflict side's pivot coefficient, then saturated. If a
//! step would leave 64-bit range, or a reduced reason fails to keep the
//! resolvent conflicting, the step is redone as clausal resolution between
//! the two sides' clausal images, which always yields a conflicting clause.

use crate::pb::activity::VarActivity;
use crate::pb::assignment::Assignment;
use crate::pb::constraint::{Constraint, Normalized, Shape};
use crate::pb::literal::{Lit, Variable};
use crate::pb::stats::Stats;
use crate::pb::store::{CRef, ConstraintStore};
use crate::pb::trail::{Reason, Trail};
use rustc_hash::{FxHashMap, FxHashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub learned: Constraint,
    pub backjump: usize,
    pub asserting: Lit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictOutcome {
    /// Conflict holds at the root: the formula is unsatisfiable.
    Ground,
    Learned(Analysis),
}

/// Working form of the evolving conflict constraint: one entry per
/// variable, coefficient always positive on the stored polarity.
#[derive(Debug, Clone, Default)]
struct Combo {
    terms: FxHashMap<Variable, (i128, bool)>,
    degree: i128,
}

impl Combo {
    fn from_constraint(c: &Constraint) -> Self {
        let mut combo = Self {
            terms: FxHashMap::default(),
            degree: i128::from(c.degree),
        };
        for (coef, lit) in c.iter() {
            combo
                .terms
                .insert(lit.variable(), (i128::from(coef), lit.polarity()));
        }
        combo
    }

    fn lit_of(&self, var: Variable) -> Option<Lit> {
        self.terms.get(&var).map(|&(_, pol)| Lit::new(var, pol))
    }

    fn falsified_lits<'a>(
        &'a self,
        assignment: &'a Assignment,
    ) -> impl Iterator<Item = (Lit, i128)> + 'a {
        self.terms.iter().filter_map(|(&var, &(coef, pol))| {
            let lit = Lit::new(var, pol);
            assignment.is_false(lit).then_some((lit, coef))
        })
    }

    /// Highest decision level among falsified literals and the count of
    /// falsified literals at that level.
    fn conflict_levels(&self, assignment: &Assignment, trail: &Trail) -> (usize, usize) {
        let mut top = 0;
        let mut count = 0;
        for (lit, _) in self.falsified_lits(assignment) {
            let level = trail.level(lit.variable());
            if level > top {
                top = level;
                count = 1;
            } else if level == top {
                count += 1;
            }
        }
        (top, count)
    }

    fn slack(&self, assignment: &Assignment) -> i128 {
        let reachable: i128 = self
            .terms
            .iter()
            .filter(|&(&var, &(_, pol))| !assignment.is_false(Lit::new(var, pol)))
            .map(|(_, &(coef, _))| coef)
            .sum();
        reachable - self.degree
    }

    /// Adds `mult` times a reduced reason, cancelling opposing occurrences.
    fn add_scaled(&mut self, coefs: &[i128], lits: &[Lit], degree: i128, mult: i128) {
        self.degree += mult * degree;
        for (&coef, &lit) in coefs.iter().zip(lits) {
            let coef = coef * mult;
            let var = lit.variable();
            match self.terms.get_mut(&var) {
                None => {
                    self.terms.insert(var, (coef, lit.polarity()));
                }
                Some(entry) => {
                    if entry.1 == lit.polarity() {
                        entry.0 += coef;
                    } else if entry.0 > coef {
                        // a*x + b*~x = b + (a-b)*x
                        entry.0 -= coef;
                        self.degree -= coef;
                    } else {
                        self.degree -= entry.0;
                        entry.0 = coef - entry.0;
                        entry.1 = lit.polarity();
                    }
                }
            }
        }
        self.terms.retain(|_, &mut (coef, _)| coef > 0);
    }

    fn saturate(&mut self) {
        let degree = self.degree;
        for (coef, _) in self.terms.values_mut() {
            if *coef > degree {
                *coef = degree;
            }
        }
    }

    fn exceeds_word_size(&self) -> bool {
        self.degree > i128::from(i64::MAX)
            || self.terms.values().any(|&(c, _)| c > i128::from(i64::MAX))
    }

    /// Redoes a failed weighted step as clausal resolution. The combo as it
    /// stood before the step implies the clause over its falsified literals
    /// (it was conflicting), and a reason that propagated `pivot` implies
    /// the clause `pivot` or one of its currently falsified literals.
    /// Resolving the two on `pivot` leaves a clause every literal of which
    /// is falsified.
    fn resolve_clausally(
        &mut self,
        pivot: Lit,
        pre_falsified: &[Lit],
        reason: &Constraint,
        assignment: &Assignment,
    ) {
        self.terms.clear();
        self.degree = 1;
        for &lit in pre_falsified {
            if lit.variable() != pivot.variable() {
                self.terms.insert(lit.variable(), (1, lit.polarity()));
            }
        }
        for (_, lit) in reason.iter() {
            if lit != pivot && assignment.is_false(lit) {
                self.terms.insert(lit.variable(), (1, lit.polarity()));
            }
        }
    }

    fn into_constraint(self) -> Normalized {
        let terms: Vec<(i64, Lit)> = self
            .terms
            .iter()
            .map(|(&var, &(coef, pol))| {
                (
                    i64::try_from(coef).expect("saturated within word size"),
                    Lit::new(var, pol),
                )
            })
            .collect();
        let degree = i64::try_from(self.degree).expect("within word size");
        Constraint::normalized(&terms, degree)
    }
}

fn gcd(a: i64, b: i64) -> i64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Ceiling division for a possibly negative dividend and positive divisor.
fn div_ceil(a: i128, b: i128) -> i128 {
    debug_assert!(b > 0);
    (a + b - 1).div_euclid(b)
}

/// Reduces a reason so the pivot carries coefficient 1: weakens
/// non-falsified terms whose coefficient is not divisible by the pivot's,
/// partially weakens falsified ones down to a multiple, then divides.
fn reduce_reason(
    reason: &Constraint,
    pivot: Lit,
    assignment: &Assignment,
    stats: &mut Stats,
) -> (Vec<i128>, Vec<Lit>, i128) {
    let pivot_coef = i128::from(reason.coef_of(pivot).expect("pivot in reason"));
    let mut coefs: Vec<i128> = Vec::with_capacity(reason.len());
    let mut lits: Vec<Lit> = Vec::with_capacity(reason.len());
    let mut degree = i128::from(reason.degree);

    if pivot_coef == 1 {
        for (coef, lit) in reason.iter() {
            coefs.push(i128::from(coef));
            lits.push(lit);
        }
        return (coefs, lits, degree);
    }

    for (coef, lit) in reason.iter() {
        let coef = i128::from(coef);
        let remainder = coef % pivot_coef;
        if lit == pivot || remainder == 0 {
            coefs.push(coef / pivot_coef);
            lits.push(lit);
        } else if assignment.is_false(lit) {
            // Partial weakening down to the nearest multiple keeps the
            // literal but stays divisible.
            degree -= remainder;
            stats.weakened += 1;
            if coef > remainder {
                coefs.push((coef - remainder) / pivot_coef);
                lits.push(lit);
            }
        } else {
            degree -= coef;
            stats.weakened += 1;
        }
    }
    degree = div_ceil(degree, pivot_coef);
    (coefs, lits, degree)
}

/// Runs conflict analysis from the falsified constraint `conflict`.
/// Activity of every touched variable is bumped; reason constraints get
/// their activity bumped by `constraint_inc` and their LBD refreshed.
pub fn analyze(
    conflict: CRef,
    store: &mut ConstraintStore,
    trail: &Trail,
    assignment: &Assignment,
    activity: &mut VarActivity,
    constraint_inc: f64,
    stats: &mut Stats,
) -> ConflictOutcome {
    let mut combo = Combo::from_constraint(&store[conflict]);
    debug_assert!(combo.slack(assignment) < 0, "analysis needs a falsified constraint");

    let mut touched: FxHashSet<Variable> =
        store[conflict].lits.iter().map(|l| l.variable()).collect();
    store[conflict].bump_activity(constraint_inc);

    let mut i = trail.len();
    loop {
        let (conflict_level, count) = combo.conflict_levels(assignment, trail);
        if conflict_level == 0 {
            for &var in &touched {
                activity.bump(var);
            }
            return ConflictOutcome::Ground;
        }
        if count == 1 {
            let asserting = combo
                .falsified_lits(assignment)
                .find(|&(l, _)| trail.level(l.variable()) == conflict_level)
                .map(|(l, _)| l)
                .expect("counted above");
            for &var in &touched {
                activity.bump(var);
            }
            return finish(combo, asserting, assignment, trail, stats);
        }

        // Most recently assigned conflicting variable with a reason.
        let (pivot_var, reason_ref) = loop {
            debug_assert!(i > 0, "ran out of trail during analysis");
            i -= 1;
            let step = trail[i];
            let var = step.lit.variable();
            if step.level != conflict_level {
                continue;
            }
            let Some(combo_lit) = combo.lit_of(var) else {
                continue;
            };
            if combo_lit != !step.lit {
                continue;
            }
            match step.reason {
                Reason::Constraint(cref) => break (var, cref),
                Reason::Decision => unreachable!(
                    "decision reached while {count} conflicting literals remain at its level"
                ),
            }
        };

        let pivot = trail[trail.position(pivot_var)].lit;
        let mult = combo
            .terms
            .get(&pivot_var)
            .map(|&(coef, _)| coef)
            .expect("pivot in combo");

        store[reason_ref].bump_activity(constraint_inc);
        let lbd = store[reason_ref].compute_lbd(assignment, trail);
        store[reason_ref].lbd = lbd;
        for lit in &store[reason_ref].lits {
            touched.insert(lit.variable());
        }

        let pre_falsified: Vec<Lit> =
            combo.falsified_lits(assignment).map(|(l, _)| l).collect();
        let (coefs, lits, degree) = reduce_reason(&store[reason_ref], pivot, assignment, stats);
        combo.add_scaled(&coefs, &lits, degree, mult);
        combo.saturate();
        stats.resolve_steps += 1;

        if combo.exceeds_word_size() || combo.slack(assignment) >= 0 {
            // The weighted resolvent left word size or lost the conflict;
            // redo the step clausally, which is always sound.
            stats.overflow_fallbacks += 1;
            combo.resolve_clausally(pivot, &pre_falsified, &store[reason_ref], assignment);
            debug_assert!(combo.slack(assignment) < 0);
        }
    }
}

fn finish(
    combo: Combo,
    asserting: Lit,
    assignment: &Assignment,
    trail: &Trail,
    stats: &mut Stats,
) -> ConflictOutcome {
    let constraint = match combo.into_constraint() {
        Normalized::Constraint(c) => c,
        Normalized::Contradiction => return ConflictOutcome::Ground,
        Normalized::Tautology => unreachable!("a falsified constraint cannot be a tautology"),
    };
    let mut constraint = apply_gcd_reduction(constraint, stats);
    let Some(backjump) = assertion_level(&constraint, asserting, assignment, trail) else {
        return ConflictOutcome::Ground;
    };
    constraint.learned = true;
    constraint.lbd = constraint.compute_lbd(assignment, trail);
    match constraint.shape {
        Shape::Clause => stats.learned_clauses += 1,
        Shape::Cardinality => stats.learned_cardinalities += 1,
        Shape::General => stats.learned_generals += 1,
    }
    stats.learned_length_sum += constraint.len() as u64;
    ConflictOutcome::Learned(Analysis {
        learned: constraint,
        backjump,
        asserting,
    })
}

/// Deepest decision level the learned constraint can return to without
/// being falsified there. Unlike the clausal case, the second-highest
/// falsified level is not always safe for weighted constraints: restoring
/// a level restores the coefficient mass falsified there, and the slack
/// may stay negative below it. Levels where the constraint propagates the
/// asserting literal are preferred; `None` means it is falsified even at
/// the root.
fn assertion_level(
    constraint: &Constraint,
    asserting: Lit,
    assignment: &Assignment,
    trail: &Trail,
) -> Option<usize> {
    let asserting_coef = i128::from(
        constraint
            .coef_of(asserting)
            .expect("asserting literal is in the learned constraint"),
    );
    let reachable: i128 = constraint
        .iter()
        .filter(|&(_, l)| !assignment.is_false(l))
        .map(|(c, _)| i128::from(c))
        .sum();
    let full_slack = reachable - i128::from(constraint.degree);

    // Falsified coefficient mass per decision level, ascending.
    let mut by_level: Vec<(usize, i128)> = Vec::new();
    for (coef, l) in constraint.iter().filter(|&(_, l)| assignment.is_false(l)) {
        let level = trail.level(l.variable());
        match by_level.iter_mut().find(|(lv, _)| *lv == level) {
            Some(entry) => entry.1 += i128::from(coef),
            None => by_level.push((level, i128::from(coef))),
        }
    }
    by_level.sort_unstable_by_key(|&(lv, _)| lv);
    let top = by_level.last().map_or(0, |&(lv, _)| lv);
    let total: i128 = by_level.iter().map(|&(_, m)| m).sum();

    // Candidate targets: the root plus every falsified level below the
    // top. Slack at a candidate is the full slack plus the mass falsified
    // strictly above it, so it shrinks as candidates rise; the first one
    // inside `[0, asserting_coef)` is the deepest asserting level.
    let mut candidates = vec![0];
    candidates.extend(
        by_level
            .iter()
            .map(|&(lv, _)| lv)
            .filter(|&lv| lv > 0 && lv < top),
    );
    let mut fallback = None;
    let mut below_mass = 0_i128;
    let mut j = 0;
    for &level in &candidates {
        while j < by_level.len() && by_level[j].0 <= level {
            below_mass += by_level[j].1;
            j += 1;
        }
        let slack_at = full_slack + (total - below_mass);
        if slack_at < 0 {
            break;
        }
        if slack_at < asserting_coef {
            return Some(level);
        }
        fallback = Some(level);
    }
    fallback
}

fn apply_gcd_reduction(constraint: Constraint, stats: &mut Stats) -> Constraint {
    let g = constraint.coefs.iter().fold(0, |acc, &c| gcd(acc, c));
    if g <= 1 {
        return constraint;
    }
    stats.gcd_reductions += 1;
    let terms: Vec<(i64, Lit)> = constraint
        .iter()
        .map(|(coef, lit)| (coef / g, lit))
        .collect();
    match Constraint::normalized(&terms, (constraint.degree + g - 1) / g) {
        Normalized::Constraint(c) => c,
        _ => constraint,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pb::propagation::{enqueue, run_propagation};
    use crate::pb::watch::Watches;

    fn lit(v: i32) -> Lit {
        Lit::from_i32(v)
    }

    struct Fixture {
        store: ConstraintStore,
        watches: Watches,
        trail: Trail,
        assignment: Assignment,
        activity: VarActivity,
        stats: Stats,
    }

    impl Fixture {
        fn new(num_vars: usize) -> Self {
            Self {
                store: ConstraintStore::new(),
                watches: Watches::new(num_vars),
                trail: Trail::new(num_vars),
                assignment: Assignment::new(num_vars),
                activity: VarActivity::new(num_vars),
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

        fn analyze(&mut self, conflict: CRef) -> ConflictOutcome {
            analyze(
                conflict,
                &mut self.store,
                &self.trail,
                &self.assignment,
                &mut self.activity,
                1.0,
                &mut self.stats,
            )
        }
    }

    #[test]
    fn test_clausal_first_uip() {
        // (x1 v x2), (~x2 v x3), (~x2 v ~x3): deciding ~x1 forces x2, then
        // x3 and ~x3 clash. The first UIP is x2.
        let mut f = Fixture::new(3);
        f.add(&[(1, 1), (1, 2)], 1);
        f.add(&[(1, -2), (1, 3)], 1);
        f.add(&[(1, -2), (1, -3)], 1);
        f.decide(-1);
        let conflict = f.propagate().expect("conflict");

        let ConflictOutcome::Learned(analysis) = f.analyze(conflict) else {
            panic!("expected learned constraint");
        };
        assert_eq!(analysis.asserting, lit(-2));
        assert_eq!(analysis.backjump, 0);
        assert!(analysis.learned.learned);
        assert!(f.stats.resolve_steps >= 1);
    }

    #[test]
    fn test_learned_constraint_is_asserting_after_backjump() {
        let mut f = Fixture::new(4);
        f.add(&[(1, 1), (1, 2)], 1);
        f.add(&[(1, -2), (1, 3)], 1);
        f.add(&[(1, -2), (1, -3)], 1);
        f.decide(4);
        assert_eq!(f.propagate(), None);
        f.decide(-1);
        let conflict = f.propagate().expect("conflict");

        let ConflictOutcome::Learned(analysis) = f.analyze(conflict) else {
            panic!("expected learned constraint");
        };
        // The learned constraint only mentions level-2 variables, so the
        // backjump skips the unrelated first decision.
        assert_eq!(analysis.backjump, 0);
        assert!(f
            .assignment
            .is_false(analysis.asserting));
    }

    #[test]
    fn test_weighted_resolution_stays_conflicting() {
        // 2 x1 + x2 + x3 >= 2 propagates x1 once x2 is false; a second
        // constraint then contradicts x1 with weight.
        let mut f = Fixture::new(3);
        f.add(&[(2, 1), (1, 2), (1, 3)], 2);
        f.add(&[(2, -1), (1, 2)], 2);
        f.decide(-2);
        let conflict = f.propagate().expect("conflict");

        let ConflictOutcome::Learned(analysis) = f.analyze(conflict) else {
            panic!("expected learned constraint");
        };
        assert_eq!(analysis.backjump, 0);
        assert_eq!(f.stats.resolve_steps, 1);
        let _ = analysis;
    }

    #[test]
    fn test_degenerate_reason_reduction_learns_implied_unit() {
        // Deciding x1 forces ~x3 and (with weight 2) x2, falsifying the
        // third constraint. Reducing the reason 2 x2 + ~x1 + x5 >= 2 for
        // pivot x2 weakens it into a tautology and the resolvent goes
        // slack; the clausal rescue must still end at the implied unit
        // ~x1 rather than a literal the formula does not force.
        let mut f = Fixture::new(5);
        f.add(&[(1, -1), (1, -3)], 1);
        f.add(&[(2, 2), (1, -1), (1, 5)], 2);
        let conflict_source = f.add(&[(2, -2), (1, 3), (1, 4)], 2);
        f.add(&[(1, -3), (1, -2)], 1);
        f.add(&[(1, -3), (1, 2)], 1);
        f.decide(1);
        let conflict = f.propagate().expect("conflict");
        assert_eq!(conflict, conflict_source);

        let ConflictOutcome::Learned(analysis) = f.analyze(conflict) else {
            panic!("expected learned constraint");
        };
        assert_eq!(analysis.asserting, lit(-1));
        assert_eq!(analysis.backjump, 0);
        assert!(f.stats.overflow_fallbacks >= 1);
    }

    #[test]
    fn test_root_conflict_is_ground() {
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
        assert_eq!(f.analyze(cref), ConflictOutcome::Ground);
    }

    #[test]
    fn test_assertion_level_accounts_for_lower_level_mass() {
        // 3 x1 + x2 >= 4 with ~x2 at level 1 and ~x1 at level 2: at the
        // runner-up level the constraint is still falsified (slack -1), so
        // only the root is safe. There it forces both literals.
        let mut f = Fixture::new(2);
        f.decide(-2);
        f.decide(-1);
        let Normalized::Constraint(c) = Constraint::normalized(&[(3, lit(1)), (1, lit(2))], 4)
        else {
            panic!("expected constraint");
        };
        assert_eq!(
            assertion_level(&c, lit(1), &f.assignment, &f.trail),
            Some(0)
        );
    }

    #[test]
    fn test_analysis_bumps_touched_activity() {
        let mut f = Fixture::new(3);
        f.add(&[(1, 1), (1, 2)], 1);
        f.add(&[(1, -2), (1, 3)], 1);
        f.add(&[(1, -2), (1, -3)], 1);
        f.decide(-1);
        let conflict = f.propagate().expect("conflict");
        let before = f.activity[2];
        let _ = f.analyze(conflict);
        assert!(f.activity[2] > before);
    }
}
