#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
pub mod activity;
pub mod assignment;
pub mod centrality;
pub mod conflict_analysis;
pub mod constraint;
pub mod literal;
pub mod opb;
pub mod phase_saving;
pub mod propagation;
pub mod restarter;
pub mod solver;
pub mod stats;
pub mod store;
pub mod trail;
pub mod watch;
