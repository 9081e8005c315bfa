#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
use crate::pb::literal::{Lit, Variable};
use core::ops::{Index, IndexMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub enum VarState {
    #[default]
    Unassigned,
    Assigned(bool),
}

impl VarState {
    #[must_use]
    pub const fn is_assigned(self) -> bool {
        matches!(self, Self::Assigned(_))
    }

    #[must_use]
    pub const fn is_unassigned(self) -> bool {
        !self.is_assigned()
    }
}

/// Current truth values of all variables, indexed 1..=n.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Assignment {
    values: Vec<VarState>,
    num_assigned: usize,
}

impl Index<Variable> for Assignment {
    type Output = VarState;

    fn index(&self, index: Variable) -> &Self::Output {
        &self.values[index as usize]
    }
}

impl IndexMut<Variable> for Assignment {
    fn index_mut(&mut self, index: Variable) -> &mut Self::Output {
        &mut self.values[index as usize]
    }
}

impl Assignment {
    #[must_use]
    pub fn new(num_vars: usize) -> Self {
        Self {
            values: vec![VarState::Unassigned; num_vars + 1],
            num_assigned: 0,
        }
    }

    #[must_use]
    pub fn num_vars(&self) -> usize {
        self.values.len().saturating_sub(1)
    }

    #[must_use]
    pub const fn num_assigned(&self) -> usize {
        self.num_assigned
    }

    #[must_use]
    pub fn all_assigned(&self) -> bool {
        self.num_assigned == self.num_vars()
    }

    pub fn assign(&mut self, lit: Lit) {
        debug_assert!(self[lit.variable()].is_unassigned());
        self[lit.variable()] = VarState::Assigned(lit.polarity());
        self.num_assigned += 1;
    }

    pub fn unassign(&mut self, var: Variable) {
        debug_assert!(self[var].is_assigned());
        self[var] = VarState::Unassigned;
        self.num_assigned -= 1;
    }

    #[must_use]
    pub fn var_value(&self, var: Variable) -> Option<bool> {
        match self.values.get(var as usize) {
            Some(VarState::Assigned(b)) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn lit_value(&self, lit: Lit) -> Option<bool> {
        self.var_value(lit.variable())
            .map(|b| b == lit.polarity())
    }

    #[must_use]
    pub fn is_false(&self, lit: Lit) -> bool {
        self.lit_value(lit) == Some(false)
    }

    #[must_use]
    pub fn is_true(&self, lit: Lit) -> bool {
        self.lit_value(lit) == Some(true)
    }

    /// The satisfying assignment as signed literals, 1..=n.
    #[must_use]
    pub fn solution(&self) -> Vec<Lit> {
        (1..=self.num_vars() as Variable)
            .map(|v| Lit::new(v, self.var_value(v).unwrap_or(false)))
            .collect()
    }
}
