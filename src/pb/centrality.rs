#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
//! Structural branching scores from a weighted variable-constraint graph.
//!
//! The formula is modelled as a bipartite graph: one node per constraint,
//! then one node per positive literal, then one per negative literal. An
//! edge joins a constraint to every literal it mentions, weighted by
//! `coef / degree`. Each centrality measure scores the nodes and the
//! per-variable result `max(pos, neg) * num_vars * 2` overwrites the
//! activity vector, so the decision loop is agnostic to which heuristic
//! filled it.
//!
//! The graph is built, consumed and discarded within one invocation. It
//! holds plain indices, never store handles, so compaction cannot
//! invalidate it mid-use.

use crate::pb::activity::VarActivity;
use crate::pb::stats::Stats;
use crate::pb::store::ConstraintStore;
use clap::ValueEnum;
use rustc_hash::FxHashMap;
use std::time::Instant;

/// Which scoring scheme populates the activity vector before search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum HeuristicMode {
    /// Conflict-driven bump/decay only; no graph is built.
    #[default]
    Vsids,
    Degree,
    DegreeWeighted,
    PseudoBoolean,
    PageRank,
    Hits,
    Eigenvector,
    Closeness,
    Betweenness,
}

/// All-pairs shortest paths are cubic in the node count, so the
/// Floyd-Warshall measures only run on instances below this many nodes.
const FLOYD_WARSHALL_NODE_BUDGET: usize = 2000;

/// Unreachable-pair sentinel. `MAX` (not infinity) so that tie detection
/// in the betweenness pass treats unreachable pairs the same way on every
/// platform: `MAX + 0 == MAX`, while `MAX + MAX` overflows past any
/// stored distance.
const UNREACHED: f64 = f64::MAX;

#[derive(Debug, Clone, Default)]
pub struct Graph {
    adjacency: FxHashMap<usize, FxHashMap<usize, f64>>,
    nodes_amount: usize,
    n_vars: usize,
    n_constraints: usize,
}

impl Graph {
    /// Snapshots the live constraints of the store. Constraint `i` maps to
    /// node `i`, `+v` to `n_constraints + (v-1)` and `-v` to
    /// `n_constraints + n_vars + (v-1)`.
    #[must_use]
    pub fn build(store: &ConstraintStore, num_vars: usize) -> Self {
        let n_constraints = store.crefs().count();
        let mut graph = Self {
            adjacency: FxHashMap::default(),
            nodes_amount: n_constraints + 2 * num_vars,
            n_vars: num_vars,
            n_constraints,
        };
        for (index, cref) in store.crefs().enumerate() {
            let constraint = &store[cref];
            let degree = constraint.degree as f64;
            for (coef, lit) in constraint.iter() {
                let lit_node = graph.lit_node(lit.variable(), lit.polarity());
                let weight = coef as f64 / degree;
                graph
                    .adjacency
                    .entry(lit_node)
                    .or_default()
                    .insert(index, weight);
                graph
                    .adjacency
                    .entry(index)
                    .or_default()
                    .insert(lit_node, weight);
            }
        }
        graph
    }

    const fn lit_node(&self, var: u32, polarity: bool) -> usize {
        let slot = self.n_constraints + (var as usize - 1);
        if polarity {
            slot
        } else {
            slot + self.n_vars
        }
    }

    #[must_use]
    pub const fn nodes(&self) -> usize {
        self.nodes_amount
    }

    #[must_use]
    pub const fn fits_shortest_path_budget(&self) -> bool {
        self.nodes_amount <= FLOYD_WARSHALL_NODE_BUDGET
    }

    /// Drops the adjacency structure; scores must already be extracted.
    pub fn clean_mem(&mut self) {
        self.adjacency.clear();
    }

    /// Writes `max(pos, neg) * n_vars * 2` per variable, with non-finite
    /// node scores treated as zero.
    fn write_scores(&self, node_scores: &[f64], activity: &mut VarActivity) {
        let scale = (self.n_vars * 2) as f64;
        for var in 1..=self.n_vars {
            let pos = node_scores[self.n_constraints + var - 1];
            let neg = node_scores[self.n_constraints + self.n_vars + var - 1];
            let score = pos.max(neg) * scale;
            activity.set(var as u32, if score.is_finite() { score } else { 0.0 });
        }
    }

    pub fn degree_centrality(&self, activity: &mut VarActivity, weighted: bool) {
        let mut scores = vec![0.0; self.nodes_amount];
        for (&node, edges) in &self.adjacency {
            scores[node] = if weighted {
                edges.values().sum()
            } else {
                edges.len() as f64
            };
        }
        self.write_scores(&scores, activity);
    }

    pub fn pagerank(&self, activity: &mut VarActivity) {
        const DAMPING: f64 = 0.85;
        const MAX_ITERATIONS: usize = 10;
        let n = self.nodes_amount as f64;
        let mut ranks = vec![1.0 / n; self.nodes_amount];
        // Out-degree by edge count, matching the historical behaviour of
        // this measure here: weights scale contributions but the
        // normalization is structural.
        let mut out_degree = vec![0.0; self.nodes_amount];
        for (&node, edges) in &self.adjacency {
            out_degree[node] = edges.len() as f64;
        }
        let base = (1.0 - DAMPING) / n;
        for _ in 0..MAX_ITERATIONS {
            let mut next = vec![0.0; self.nodes_amount];
            for (&node, edges) in &self.adjacency {
                for (&adj, &weight) in edges {
                    next[node] += ranks[adj] * (weight / out_degree[adj]);
                }
                next[node] = DAMPING * next[node] + base;
            }
            ranks = next;
        }
        self.write_scores(&ranks, activity);
    }

    /// Hyperlink-induced topic search; the authority index is extracted.
    /// Renormalization is the square root of the sum of square roots,
    /// kept for score reproducibility.
    pub fn hits(&self, activity: &mut VarActivity) {
        const MAX_ITERATIONS: usize = 10;
        let mut auth = vec![1.0; self.nodes_amount];
        let mut hub = vec![1.0; self.nodes_amount];
        for _ in 0..MAX_ITERATIONS {
            let mut norm = 0.0;
            for (&node, edges) in &self.adjacency {
                auth[node] = edges
                    .iter()
                    .map(|(&adj, &weight)| weight * hub[adj])
                    .sum();
                norm += auth[node].sqrt();
            }
            let norm = norm.sqrt();
            if norm > 0.0 {
                for &node in self.adjacency.keys() {
                    auth[node] /= norm;
                }
            }
            let mut norm = 0.0;
            for (&node, edges) in &self.adjacency {
                hub[node] = edges
                    .iter()
                    .map(|(&adj, &weight)| weight * auth[adj])
                    .sum();
                norm += hub[node].sqrt();
            }
            let norm = norm.sqrt();
            if norm > 0.0 {
                for &node in self.adjacency.keys() {
                    hub[node] /= norm;
                }
            }
        }
        self.write_scores(&auth, activity);
    }

    pub fn eigenvector(&self, activity: &mut VarActivity) {
        const MAX_ITERATIONS: usize = 10;
        let mut centrality = vec![1.0; self.nodes_amount];
        for _ in 0..MAX_ITERATIONS {
            let mut next = vec![0.0; self.nodes_amount];
            let mut sum = 0.0;
            for (&node, edges) in &self.adjacency {
                next[node] = edges
                    .iter()
                    .map(|(&adj, &weight)| weight * centrality[adj])
                    .sum();
                sum += next[node] * next[node];
            }
            let norm = sum.sqrt();
            if norm == 0.0 {
                // Isolated graph: every score stays zero.
                centrality = next;
                break;
            }
            for value in &mut next {
                *value /= norm;
            }
            centrality = next;
        }
        self.write_scores(&centrality, activity);
    }

    fn shortest_paths(&self) -> Vec<Vec<f64>> {
        let n = self.nodes_amount;
        let mut dist = vec![vec![UNREACHED; n]; n];
        for (i, row) in dist.iter_mut().enumerate() {
            row[i] = 0.0;
        }
        for (&node, edges) in &self.adjacency {
            for (&adj, &weight) in edges {
                dist[node][adj] = weight;
            }
        }
        for k in 0..n {
            for i in 0..n {
                let dik = dist[i][k];
                if dik >= UNREACHED {
                    continue;
                }
                for j in 0..n {
                    let through = dik + dist[k][j];
                    if through < dist[i][j] {
                        dist[i][j] = through;
                    }
                }
            }
        }
        dist
    }

    pub fn closeness(&self, activity: &mut VarActivity) {
        let dist = self.shortest_paths();
        let mut scores = vec![0.0; self.nodes_amount];
        for i in self.n_constraints..self.nodes_amount {
            let total: f64 = (0..self.nodes_amount)
                .filter(|&j| j != i)
                .map(|j| dist[i][j])
                .sum();
            scores[i] = if total > 0.0 {
                (self.nodes_amount - 1) as f64 / total
            } else {
                0.0
            };
        }
        self.write_scores(&scores, activity);
    }

    /// Approximate betweenness: each strict shortest-path improvement
    /// through `k` resets its score to one, each rediscovery at equal
    /// length adds one. Not textbook path counting, but the scores are
    /// reproducible and cheap to fold into the Floyd-Warshall sweep.
    pub fn betweenness(&self, activity: &mut VarActivity) {
        let n = self.nodes_amount;
        let mut scores = vec![1.0; n];
        let mut dist = vec![vec![UNREACHED; n]; n];
        for (i, row) in dist.iter_mut().enumerate() {
            row[i] = 0.0;
        }
        for (&node, edges) in &self.adjacency {
            for (&adj, &weight) in edges {
                dist[node][adj] = weight;
            }
        }
        for k in 0..n {
            for i in 0..n {
                for j in 0..n {
                    let through = dist[i][k] + dist[k][j];
                    if through < dist[i][j] {
                        dist[i][j] = through;
                        scores[k] = 1.0;
                    } else if through == dist[i][j] {
                        scores[k] += 1.0;
                    }
                }
            }
        }
        self.write_scores(&scores, activity);
    }

    /// Closed-form structural score, no graph traversal: each occurrence
    /// contributes `(coef / degree) * (1 / constraint_len)` to its
    /// literal's node.
    pub fn pseudo_boolean(
        store: &ConstraintStore,
        num_vars: usize,
        activity: &mut VarActivity,
    ) {
        let mut ranks = vec![0.0; 2 * num_vars];
        for cref in store.crefs() {
            let constraint = &store[cref];
            let degree = constraint.degree as f64;
            let size = constraint.len() as f64;
            for (coef, lit) in constraint.iter() {
                let slot = lit.variable() as usize - 1;
                let slot = if lit.polarity() { slot } else { slot + num_vars };
                ranks[slot] += (coef as f64 / degree) * (1.0 / size);
            }
        }
        let scale = (num_vars * 2) as f64;
        for var in 1..=num_vars {
            let score = ranks[var - 1].max(ranks[num_vars + var - 1]) * scale;
            activity.set(var as u32, if score.is_finite() { score } else { 0.0 });
        }
    }
}

/// Runs the selected measure over the current constraint set and records
/// the invocation in the statistics. `Vsids` is a no-op; the shortest-path
/// measures are skipped (activity left untouched) when the node count
/// exceeds the budget.
pub fn apply(
    mode: HeuristicMode,
    store: &ConstraintStore,
    num_vars: usize,
    activity: &mut VarActivity,
    stats: &mut Stats,
) {
    if mode == HeuristicMode::Vsids {
        return;
    }
    let started = Instant::now();
    if mode == HeuristicMode::PseudoBoolean {
        Graph::pseudo_boolean(store, num_vars, activity);
        stats.record_heuristic_run(started.elapsed().as_secs_f64());
        return;
    }
    let mut graph = Graph::build(store, num_vars);
    log::debug!(
        "centrality {mode:?} over {} nodes ({} constraints)",
        graph.nodes(),
        store.crefs().count()
    );
    match mode {
        HeuristicMode::Degree => graph.degree_centrality(activity, false),
        HeuristicMode::DegreeWeighted => graph.degree_centrality(activity, true),
        HeuristicMode::PageRank => graph.pagerank(activity),
        HeuristicMode::Hits => graph.hits(activity),
        HeuristicMode::Eigenvector => graph.eigenvector(activity),
        HeuristicMode::Closeness | HeuristicMode::Betweenness => {
            if graph.fits_shortest_path_budget() {
                if mode == HeuristicMode::Closeness {
                    graph.closeness(activity);
                } else {
                    graph.betweenness(activity);
                }
            } else {
                log::warn!(
                    "skipping {mode:?}: {} nodes exceed the all-pairs budget",
                    graph.nodes()
                );
            }
        }
        HeuristicMode::Vsids | HeuristicMode::PseudoBoolean => unreachable!(),
    }
    graph.clean_mem();
    stats.record_heuristic_run(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pb::constraint::{Constraint, Normalized};
    use crate::pb::literal::Lit;

    fn store_with(constraints: &[(&[(i64, i32)], i64)]) -> ConstraintStore {
        let mut store = ConstraintStore::new();
        for &(terms, degree) in constraints {
            let terms: Vec<(i64, Lit)> = terms
                .iter()
                .map(|&(c, l)| (c, Lit::from_i32(l)))
                .collect();
            let Normalized::Constraint(c) = Constraint::normalized(&terms, degree) else {
                panic!("expected constraint");
            };
            store.alloc(c);
        }
        store
    }

    #[test]
    fn test_weighted_degree_scores() {
        // x1 + x2 >= 1: both edges weigh 1/1; each positive literal node
        // has weighted degree 1, so the score is 1 * 2 vars * 2.
        let store = store_with(&[(&[(1, 1), (1, 2)], 1)]);
        let mut activity = VarActivity::new(2);
        let graph = Graph::build(&store, 2);
        graph.degree_centrality(&mut activity, true);
        assert!((activity[1] - 4.0).abs() < 1e-12);
        assert!((activity[2] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_degree_counts_polarities_separately() {
        // x1 appears once per polarity, x2 twice on the same node, so x2
        // outranks the split occurrences of x1.
        let store = store_with(&[(&[(1, 1), (1, 2)], 1), (&[(1, -1), (1, 2)], 1)]);
        let mut activity = VarActivity::new(2);
        Graph::build(&store, 2).degree_centrality(&mut activity, false);
        assert!(activity[2] > activity[1]);
    }

    #[test]
    fn test_pagerank_fixpoint_on_single_edge() {
        // x1 >= 1: three nodes, one symmetric edge. The update keeps both
        // connected nodes at 1/3 (0.85/3 + 0.15/3) every iteration, the
        // isolated negative node drops to zero.
        let store = store_with(&[(&[(1, 1)], 1)]);
        let mut activity = VarActivity::new(1);
        Graph::build(&store, 1).pagerank(&mut activity);
        let expected = (1.0 / 3.0) * 2.0;
        assert!((activity[1] - expected).abs() < 1e-9);
    }

    #[test]
    fn test_eigenvector_single_edge() {
        // Power iteration on one symmetric unit edge settles at 1/sqrt(2)
        // for both endpoints.
        let store = store_with(&[(&[(1, 1)], 1)]);
        let mut activity = VarActivity::new(1);
        Graph::build(&store, 1).eigenvector(&mut activity);
        assert!((activity[1] - 2.0 / 2.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_pseudo_boolean_closed_form() {
        // 2 x1 + x2 >= 2, size 2: rank(x1) = (2/2)*(1/2), rank(x2) =
        // (1/2)*(1/2); scale is 2 vars * 2.
        let store = store_with(&[(&[(2, 1), (1, 2)], 2)]);
        let mut activity = VarActivity::new(2);
        Graph::pseudo_boolean(&store, 2, &mut activity);
        assert!((activity[1] - 2.0).abs() < 1e-12);
        assert!((activity[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_hits_prefers_connected_polarity() {
        let store = store_with(&[(&[(1, 1), (1, 2)], 1)]);
        let mut activity = VarActivity::new(2);
        Graph::build(&store, 2).hits(&mut activity);
        assert!(activity[1].is_finite());
        assert!(activity[1] > 0.0);
        assert_eq!(activity[1], activity[2]);
    }

    #[test]
    fn test_shortest_path_measures_are_finite() {
        let store = store_with(&[(&[(1, 1), (1, 2)], 1), (&[(1, -1), (1, 2)], 1)]);
        let graph = Graph::build(&store, 2);
        let mut activity = VarActivity::new(2);
        graph.closeness(&mut activity);
        assert!(activity[1].is_finite());
        assert!(activity[2].is_finite());
        graph.betweenness(&mut activity);
        assert!(activity[1].is_finite() && activity[1] >= 0.0);
        assert!(activity[2].is_finite() && activity[2] >= 0.0);
    }

    #[test]
    fn test_budget_gate() {
        let store = ConstraintStore::new();
        let graph = Graph::build(&store, FLOYD_WARSHALL_NODE_BUDGET);
        assert!(!graph.fits_shortest_path_budget());

        let mut activity = VarActivity::new(FLOYD_WARSHALL_NODE_BUDGET);
        let mut stats = Stats::new();
        activity.set(1, 7.0);
        apply(
            HeuristicMode::Betweenness,
            &store,
            FLOYD_WARSHALL_NODE_BUDGET,
            &mut activity,
            &mut stats,
        );
        // Skipped: the previous scores survive.
        assert!((activity[1] - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_vsids_mode_is_a_no_op() {
        let store = store_with(&[(&[(1, 1)], 1)]);
        let mut activity = VarActivity::new(1);
        let mut stats = Stats::new();
        apply(HeuristicMode::Vsids, &store, 1, &mut activity, &mut stats);
        assert_eq!(stats.heuristic_invocations, 0);
    }

    #[test]
    fn test_scores_invariant_under_variable_relabeling() {
        // The same formula with variables renamed 1->3, 2->1, 3->2: these
        // measures score nodes by structure, so the scores must follow the
        // renaming (up to summation order in the float accumulations).
        // Betweenness is absent: its tie counting depends on node visit
        // order, so it is only reproducible, not label-invariant.
        let original = store_with(&[(&[(2, 1), (1, 2)], 2), (&[(1, 2), (1, -3)], 1)]);
        let relabeled = store_with(&[(&[(2, 3), (1, 1)], 2), (&[(1, 1), (1, -2)], 1)]);
        let renamed = [0u32, 3, 1, 2];
        for mode in [
            HeuristicMode::Degree,
            HeuristicMode::DegreeWeighted,
            HeuristicMode::PseudoBoolean,
            HeuristicMode::PageRank,
            HeuristicMode::Hits,
            HeuristicMode::Eigenvector,
            HeuristicMode::Closeness,
        ] {
            let mut act_a = VarActivity::new(3);
            let mut act_b = VarActivity::new(3);
            let mut stats = Stats::new();
            apply(mode, &original, 3, &mut act_a, &mut stats);
            apply(mode, &relabeled, 3, &mut act_b, &mut stats);
            for var in 1..=3u32 {
                assert!(
                    (act_a[var] - act_b[renamed[var as usize]]).abs() < 1e-9,
                    "{mode:?}: variable {var} scored {} but its renaming scored {}",
                    act_a[var],
                    act_b[renamed[var as usize]],
                );
            }
        }
    }

    #[test]
    fn test_constraint_order_does_not_change_degree_scores() {
        let a = store_with(&[(&[(1, 1), (1, 2)], 1), (&[(1, 2), (1, 3)], 2)]);
        let b = store_with(&[(&[(1, 2), (1, 3)], 2), (&[(1, 1), (1, 2)], 1)]);
        let mut act_a = VarActivity::new(3);
        let mut act_b = VarActivity::new(3);
        Graph::build(&a, 3).degree_centrality(&mut act_a, true);
        Graph::build(&b, 3).degree_centrality(&mut act_b, true);
        for var in 1..=3 {
            assert!((act_a[var] - act_b[var]).abs() < 1e-12);
        }
    }
}
