#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
use crate::pb::assignment::Assignment;
use crate::pb::literal::Variable;
use std::ops::{Index, IndexMut};

const DEFAULT_DECAY: f64 = 0.95;
const RESCALE_LIMIT: f64 = 1e100;

/// Shared variable activity vector, 1-based. Written either by the
/// VSIDS-style bump/decay below or wholesale by the centrality engine; the
/// decision selector only ever reads it, so it stays agnostic to which
/// heuristic populated the scores.
#[derive(Debug, Clone, PartialEq)]
pub struct VarActivity {
    scores: Vec<f64>,
    inc: f64,
    decay: f64,
}

impl Index<Variable> for VarActivity {
    type Output = f64;

    fn index(&self, index: Variable) -> &Self::Output {
        &self.scores[index as usize]
    }
}

impl IndexMut<Variable> for VarActivity {
    fn index_mut(&mut self, index: Variable) -> &mut Self::Output {
        &mut self.scores[index as usize]
    }
}

impl VarActivity {
    #[must_use]
    pub fn new(num_vars: usize) -> Self {
        Self {
            scores: vec![0.0; num_vars + 1],
            inc: 1.0,
            decay: DEFAULT_DECAY,
        }
    }

    #[must_use]
    pub fn num_vars(&self) -> usize {
        self.scores.len().saturating_sub(1)
    }

    pub fn bump(&mut self, var: Variable) {
        self.scores[var as usize] += self.inc;
        // At the limit the increment can be absorbed entirely, so the
        // comparison must not be strict.
        if self.scores[var as usize] >= RESCALE_LIMIT {
            self.rescale();
        }
    }

    /// Geometric decay, implemented by growing the increment.
    pub fn decay(&mut self) {
        self.inc /= self.decay;
    }

    fn rescale(&mut self) {
        for score in &mut self.scores {
            *score /= RESCALE_LIMIT;
        }
        self.inc /= RESCALE_LIMIT;
    }

    pub fn set(&mut self, var: Variable, score: f64) {
        debug_assert!(score.is_finite(), "non-finite activity score");
        self.scores[var as usize] = score;
    }

    /// Highest-activity unassigned variable, ties broken by lowest index.
    #[must_use]
    pub fn pick(&self, assignment: &Assignment) -> Option<Variable> {
        let mut best: Option<(Variable, f64)> = None;
        for var in 1..=self.num_vars() as Variable {
            if assignment[var].is_assigned() {
                continue;
            }
            let score = self[var];
            match best {
                Some((_, b)) if score <= b => {}
                _ => best = Some((var, score)),
            }
        }
        best.map(|(v, _)| v)
    }
}
