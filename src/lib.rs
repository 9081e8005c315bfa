//! A conflict-driven pseudo-Boolean solver with graph-centrality branching
//! heuristics.

/// The `pb` module implements the solver core: constraints, watched-literal
/// propagation, conflict analysis over weighted constraints, the search
/// controller, and the centrality scoring engine.
pub mod pb;
