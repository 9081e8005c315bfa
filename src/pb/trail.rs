#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
use crate::pb::assignment::Assignment;
use crate::pb::literal::{Lit, Variable};
use crate::pb::store::{CRef, ConstraintStore};
use std::ops::Index;

const NO_POS: usize = usize::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, PartialOrd, Ord)]
pub enum Reason {
    #[default]
    Decision,
    Constraint(CRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub lit: Lit,
    pub level: usize,
    pub reason: Reason,
}

/// Chronological record of assigned literals, partitioned into decision
/// levels by `lim` (index of each level's first step). Level 0 holds only
/// root-forced literals; every later level starts with its decision.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Trail {
    steps: Vec<Step>,
    lim: Vec<usize>,
    pub qhead: usize,
    pos: Vec<usize>,
    level_of: Vec<usize>,
}

impl Index<usize> for Trail {
    type Output = Step;

    fn index(&self, index: usize) -> &Self::Output {
        &self.steps[index]
    }
}

impl Trail {
    #[must_use]
    pub fn new(num_vars: usize) -> Self {
        Self {
            steps: Vec::with_capacity(num_vars),
            lim: Vec::new(),
            qhead: 0,
            pos: vec![NO_POS; num_vars + 1],
            level_of: vec![0; num_vars + 1],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Step> {
        self.steps.iter()
    }

    #[must_use]
    pub fn decision_level(&self) -> usize {
        self.lim.len()
    }

    #[must_use]
    pub fn is_on_trail(&self, var: Variable) -> bool {
        self.pos[var as usize] != NO_POS
    }

    #[must_use]
    pub fn position(&self, var: Variable) -> usize {
        self.pos[var as usize]
    }

    #[must_use]
    pub fn level(&self, var: Variable) -> usize {
        self.level_of[var as usize]
    }

    #[must_use]
    pub fn reason(&self, var: Variable) -> Reason {
        self.steps[self.pos[var as usize]].reason
    }

    /// Opens a new decision level; the next pushed literal is its decision.
    pub fn new_level(&mut self) {
        self.lim.push(self.steps.len());
    }

    /// Index of the first step of `level`.
    #[must_use]
    pub fn level_start(&self, level: usize) -> usize {
        if level == 0 {
            0
        } else {
            self.lim[level - 1]
        }
    }

    pub fn push(&mut self, lit: Lit, reason: Reason) {
        let var = lit.variable() as usize;
        debug_assert_eq!(self.pos[var], NO_POS, "variable already on trail");
        let level = self.decision_level();
        self.pos[var] = self.steps.len();
        self.level_of[var] = level;
        self.steps.push(Step { lit, level, reason });
    }

    /// Pops all steps above `level` in reverse assignment order, restoring
    /// variable state and releasing reason locks. `qhead` is pulled back so
    /// no remaining literal is left unprocessed.
    pub fn backjump_to(
        &mut self,
        level: usize,
        assignment: &mut Assignment,
        store: &mut ConstraintStore,
    ) -> usize {
        debug_assert!(level <= self.decision_level());
        let keep = if level >= self.decision_level() {
            self.steps.len()
        } else {
            self.level_start(level + 1)
        };
        let mut popped = 0;
        while self.steps.len() > keep {
            let step = self.steps.pop().expect("non-empty");
            let var = step.lit.variable();
            assignment.unassign(var);
            self.pos[var as usize] = NO_POS;
            self.level_of[var as usize] = 0;
            if let Reason::Constraint(cref) = step.reason {
                store.unlock(cref);
            }
            popped += 1;
        }
        self.lim.truncate(level);
        self.qhead = self.qhead.min(self.steps.len());
        popped
    }

    /// Re-resolves every reason handle through a compaction relocation map.
    /// Locked constraints survive collection, so every stored handle must
    /// have a new home.
    pub fn remap_reasons(&mut self, relocation: &rustc_hash::FxHashMap<CRef, CRef>) {
        for step in &mut self.steps {
            if let Reason::Constraint(cref) = step.reason {
                step.reason = Reason::Constraint(relocation[&cref]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_partition_trail() {
        let mut trail = Trail::new(4);
        let mut a = Assignment::new(4);
        let mut store = ConstraintStore::new();

        trail.push(Lit::new(1, true), Reason::Decision);
        a.assign(Lit::new(1, true));
        trail.new_level();
        trail.push(Lit::new(2, true), Reason::Decision);
        a.assign(Lit::new(2, true));
        trail.push(Lit::new(3, false), Reason::Decision);
        a.assign(Lit::new(3, false));

        assert_eq!(trail.decision_level(), 1);
        assert_eq!(trail.level(1), 0);
        assert_eq!(trail.level(2), 1);
        assert_eq!(trail.level(3), 1);
        assert_eq!(trail.level_start(1), 1);

        // Levels are non-decreasing along the trail.
        let mut prev = 0;
        for step in trail.iter() {
            assert!(step.level >= prev);
            prev = step.level;
        }

        trail.backjump_to(0, &mut a, &mut store);
        assert_eq!(trail.len(), 1);
        assert_eq!(trail.decision_level(), 0);
        assert!(a[2].is_unassigned());
        assert!(a[1].is_assigned());
    }

    #[test]
    fn test_remap_reasons_after_compaction() {
        use crate::pb::constraint::{Constraint, Normalized};

        let mk = |lits: &[i32]| {
            let Normalized::Constraint(c) =
                Constraint::clause(lits.iter().map(|&l| Lit::from_i32(l)).collect())
            else {
                panic!("expected constraint");
            };
            c
        };
        let mut trail = Trail::new(2);
        let mut a = Assignment::new(2);
        let mut store = ConstraintStore::new();
        let dead = store.alloc(mk(&[1, 2]));
        let reason = store.alloc(mk(&[-1, 2]));

        trail.new_level();
        trail.push(Lit::new(1, true), Reason::Decision);
        a.assign(Lit::new(1, true));
        trail.push(Lit::new(2, true), Reason::Constraint(reason));
        a.assign(Lit::new(2, true));
        store.lock(reason);

        store.remove(dead, false);
        let relocation = store.garbage_collect();
        trail.remap_reasons(&relocation);

        assert_eq!(relocation[&reason], CRef(0));
        assert_eq!(trail.reason(2), Reason::Constraint(CRef(0)));
        assert!(store[CRef(0)].is_locked());
    }

    #[test]
    fn test_backjump_resets_qhead() {
        let mut trail = Trail::new(2);
        let mut a = Assignment::new(2);
        let mut store = ConstraintStore::new();

        trail.new_level();
        trail.push(Lit::new(1, true), Reason::Decision);
        a.assign(Lit::new(1, true));
        trail.qhead = 1;
        trail.backjump_to(0, &mut a, &mut store);
        assert_eq!(trail.qhead, 0);
    }
}
