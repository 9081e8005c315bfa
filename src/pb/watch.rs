#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
use crate::pb::constraint::{Constraint, Shape};
use crate::pb::literal::Lit;
use crate::pb::store::{CRef, ConstraintStore};
use smallvec::SmallVec;
use std::ops::{Index, IndexMut};

/// A watch registration: the constraint to revisit when the watched literal
/// becomes false, plus a blocking literal. For a clause a satisfied
/// blocking literal lets the visit be skipped without touching the
/// constraint; higher-degree constraints are visited regardless, since one
/// true literal does not discharge them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watch {
    pub cref: CRef,
    pub blocking: Lit,
}

/// Per-literal watch lists. A clause watches its first two literals, a
/// cardinality of degree d its first d+1, and a general constraint every
/// literal (counting scheme).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Watches(Vec<SmallVec<[Watch; 6]>>);

impl Index<Lit> for Watches {
    type Output = SmallVec<[Watch; 6]>;

    fn index(&self, index: Lit) -> &Self::Output {
        &self.0[index.index()]
    }
}

impl IndexMut<Lit> for Watches {
    fn index_mut(&mut self, index: Lit) -> &mut Self::Output {
        &mut self.0[index.index()]
    }
}

impl Watches {
    #[must_use]
    pub fn new(num_vars: usize) -> Self {
        Self(vec![SmallVec::new(); num_vars * 2])
    }

    /// Number of leading positions of `constraint.lits` that carry watches.
    #[must_use]
    pub fn watched_prefix(constraint: &Constraint) -> usize {
        match constraint.shape {
            Shape::Clause => 2.min(constraint.len()),
            Shape::Cardinality => {
                (usize::try_from(constraint.degree).unwrap_or(usize::MAX) + 1)
                    .min(constraint.len())
            }
            Shape::General => constraint.len(),
        }
    }

    pub fn attach(&mut self, cref: CRef, constraint: &Constraint) {
        debug_assert!(constraint.len() >= 2, "unit constraints are enqueued, not watched");
        let prefix = Self::watched_prefix(constraint);
        for i in 0..prefix {
            let lit = constraint.lits[i];
            let blocking = constraint.lits[usize::from(i == 0)];
            self[lit].push(Watch { cref, blocking });
        }
    }

    pub fn detach(&mut self, cref: CRef, constraint: &Constraint) {
        let prefix = Self::watched_prefix(constraint);
        for i in 0..prefix {
            self[constraint.lits[i]].retain(|w| w.cref != cref);
        }
    }

    pub fn move_watch(&mut self, cref: CRef, from: Lit, to: Lit, blocking: Lit) {
        self[from].retain(|w| w.cref != cref);
        self[to].push(Watch { cref, blocking });
    }

    /// Drops everything and re-registers all live constraints. Required
    /// after arena compaction, which invalidates every stored `CRef`.
    pub fn rebuild(&mut self, store: &ConstraintStore) {
        for list in &mut self.0 {
            list.clear();
        }
        for cref in store.crefs() {
            let constraint = &store[cref];
            let prefix = Self::watched_prefix(constraint);
            for i in 0..prefix {
                let lit = constraint.lits[i];
                let blocking = constraint.lits[usize::from(i == 0)];
                self[lit].push(Watch { cref, blocking });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pb::constraint::Normalized;

    fn lit(v: i32) -> Lit {
        Lit::from_i32(v)
    }

    fn normalized(terms: &[(i64, i32)], degree: i64) -> Constraint {
        let terms: Vec<(i64, Lit)> = terms.iter().map(|&(c, l)| (c, lit(l))).collect();
        let Normalized::Constraint(c) = Constraint::normalized(&terms, degree) else {
            panic!("expected constraint");
        };
        c
    }

    #[test]
    fn test_clause_watches_two() {
        let c = normalized(&[(1, 1), (1, 2), (1, 3)], 1);
        assert_eq!(c.shape, Shape::Clause);
        let mut w = Watches::new(3);
        w.attach(CRef(0), &c);
        let watched: usize = (1..=3)
            .map(|v| w[lit(v)].len() + w[lit(-v)].len())
            .sum();
        assert_eq!(watched, 2);
    }

    #[test]
    fn test_cardinality_watches_degree_plus_one() {
        let c = normalized(&[(1, 1), (1, 2), (1, 3), (1, 4)], 2);
        assert_eq!(c.shape, Shape::Cardinality);
        assert_eq!(Watches::watched_prefix(&c), 3);
    }

    #[test]
    fn test_general_watches_all() {
        let c = normalized(&[(3, 1), (2, 2), (1, 3)], 3);
        assert_eq!(c.shape, Shape::General);
        assert_eq!(Watches::watched_prefix(&c), 3);
    }

    #[test]
    fn test_rebuild_after_compaction() {
        let mut store = ConstraintStore::new();
        let a = store.alloc(normalized(&[(1, 1), (1, 2)], 1));
        let b = store.alloc(normalized(&[(1, 2), (1, 3)], 1));
        let mut w = Watches::new(3);
        w.attach(a, &store[a]);
        w.attach(b, &store[b]);

        store.remove(a, false);
        let map = store.garbage_collect();
        w.rebuild(&store);

        let b_new = map[&b];
        assert!(w[lit(2)].iter().any(|watch| watch.cref == b_new));
        assert!(w[lit(1)].is_empty());
    }
}
