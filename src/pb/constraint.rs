#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
//! Linear pseudo-Boolean constraints in the canonical form
//! `sum(coef_i * lit_i) >= degree` with strictly positive coefficients.
//!
//! Three shapes are distinguished so the propagator can dispatch to the
//! cheapest scheme that is sound for the constraint: clauses (all
//! coefficients 1, degree 1) use two watched literals, cardinalities (all
//! coefficients 1, degree d) watch d+1 literals, and general constraints
//! fall back to counting propagation over every literal.

use crate::pb::assignment::Assignment;
use crate::pb::literal::Lit;
use crate::pb::trail::Trail;
use rustc_hash::FxHashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Shape {
    Clause,
    Cardinality,
    General,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub lits: Vec<Lit>,
    pub coefs: Vec<i64>,
    pub degree: i64,
    pub shape: Shape,
    pub learned: bool,
    pub lbd: u32,
    pub activity: f64,
    pub(crate) lock: u32,
    pub(crate) deleted: bool,
}

/// Result of normalizing raw terms into canonical form.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// Trivially true (degree dropped to zero or below).
    Tautology,
    /// Trivially false (coefficient sum cannot reach the degree).
    Contradiction,
    Constraint(Constraint),
}

impl Constraint {
    /// Normalizes `terms >= degree` into canonical form: negative
    /// coefficients are rewritten over the negated literal, duplicate and
    /// opposing occurrences of a variable are merged, coefficients are
    /// saturated at the degree, and the shape tag is derived.
    #[must_use]
    pub fn normalized(terms: &[(i64, Lit)], degree: i64) -> Normalized {
        let mut degree = i128::from(degree);

        // Merge per variable; a positive entry coefficient always rides on
        // `pol`'s polarity of the variable.
        let mut merged: Vec<(u32, i128, bool)> = Vec::with_capacity(terms.len());
        for &(coef, lit) in terms {
            if coef == 0 {
                continue;
            }
            let (coef, lit) = if coef < 0 {
                // c*l >= d  <=>  -c*~l >= d - c
                degree -= i128::from(coef);
                (-i128::from(coef), !lit)
            } else {
                (i128::from(coef), lit)
            };
            let var = lit.variable();
            match merged.iter_mut().find(|(v, _, _)| *v == var) {
                None => merged.push((var, coef, lit.polarity())),
                Some(entry) => {
                    if entry.2 == lit.polarity() {
                        entry.1 += coef;
                    } else if entry.1 > coef {
                        // a*x + b*~x = b + (a-b)*x
                        entry.1 -= coef;
                        degree -= coef;
                    } else {
                        degree -= entry.1;
                        entry.1 = coef - entry.1;
                        entry.2 = lit.polarity();
                    }
                }
            }
        }
        merged.retain(|&(_, c, _)| c > 0);

        if degree <= 0 {
            return Normalized::Tautology;
        }

        // Saturation: no coefficient contributes beyond the degree.
        for entry in &mut merged {
            entry.1 = entry.1.min(degree);
        }

        let total: i128 = merged.iter().map(|&(_, c, _)| c).sum();
        if total < degree {
            return Normalized::Contradiction;
        }
        // Saturated coefficients are bounded by the degree, so a degree
        // within i64 keeps every stored value within i64.
        assert!(
            degree <= i128::from(i64::MAX),
            "normalized degree {degree} exceeds the 64-bit coefficient range"
        );

        // Cardinality detection: equal coefficients divide through.
        let first = merged[0].1;
        if merged.iter().all(|&(_, c, _)| c == first) && first > 1 {
            degree = (degree + first - 1) / first;
            for entry in &mut merged {
                entry.1 = 1;
            }
        }

        // Largest coefficients first; ties by variable id for determinism.
        merged.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let degree = degree as i64;
        let lits: Vec<Lit> = merged.iter().map(|&(v, _, p)| Lit::new(v, p)).collect();
        let coefs: Vec<i64> = merged.iter().map(|&(_, c, _)| c as i64).collect();

        let shape = if coefs.iter().all(|&c| c == 1) {
            if degree == 1 {
                Shape::Clause
            } else {
                Shape::Cardinality
            }
        } else {
            Shape::General
        };

        Normalized::Constraint(Self {
            lits,
            coefs,
            degree,
            shape,
            learned: false,
            lbd: 0,
            activity: 0.0,
            lock: 0,
            deleted: false,
        })
    }

    #[must_use]
    pub fn clause(lits: Vec<Lit>) -> Normalized {
        let terms: Vec<(i64, Lit)> = lits.into_iter().map(|l| (1, l)).collect();
        Self::normalized(&terms, 1)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lits.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, Lit)> + '_ {
        self.coefs.iter().copied().zip(self.lits.iter().copied())
    }

    #[must_use]
    pub fn coef_of(&self, lit: Lit) -> Option<i64> {
        self.lits
            .iter()
            .position(|&l| l == lit)
            .map(|i| self.coefs[i])
    }

    /// Slack under the current assignment: the coefficient mass still able
    /// to contribute, minus the degree. Negative slack means falsified.
    #[must_use]
    pub fn slack(&self, assignment: &Assignment) -> i64 {
        let reachable: i128 = self
            .iter()
            .filter(|&(_, l)| !assignment.is_false(l))
            .map(|(c, _)| i128::from(c))
            .sum();
        i64::try_from((reachable - i128::from(self.degree)).clamp(
            i128::from(i64::MIN),
            i128::from(i64::MAX),
        ))
        .expect("clamped")
    }

    #[must_use]
    pub fn is_satisfied(&self, assignment: &Assignment) -> bool {
        let satisfied: i128 = self
            .iter()
            .filter(|&(_, l)| assignment.is_true(l))
            .map(|(c, _)| i128::from(c))
            .sum();
        satisfied >= i128::from(self.degree)
    }

    /// Literal-block distance: distinct decision levels among currently
    /// falsified literals. Lower values mark higher-quality constraints.
    #[must_use]
    pub fn compute_lbd(&self, assignment: &Assignment, trail: &Trail) -> u32 {
        let levels: FxHashSet<usize> = self
            .lits
            .iter()
            .filter(|&&l| assignment.is_false(l))
            .map(|&l| trail.level(l.variable()))
            .collect();
        u32::try_from(levels.len()).unwrap_or(u32::MAX)
    }

    pub fn bump_activity(&mut self, inc: f64) {
        self.activity += inc;
    }

    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.lock > 0
    }

    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn swap_terms(&mut self, i: usize, j: usize) {
        self.lits.swap(i, j);
        self.coefs.swap(i, j);
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (c, l)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, " +")?;
            }
            write!(f, "{c} {l}")?;
        }
        write!(f, " >= {}", self.degree)
    }
}
