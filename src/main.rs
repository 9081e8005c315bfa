//! # pbsat
//!
//! `pbsat` is a command-line pseudo-Boolean satisfiability and optimization
//! solver. It reads linear constraints in OPB format (or DIMACS CNF as the
//! degenerate case), decides satisfiability with a conflict-driven search
//! over weighted constraints, and minimizes an objective when the input
//! carries a `min:` line.
//!
//! The branching order can be seeded from a structural centrality measure
//! of the variable-constraint graph (`--heuristic page-rank`, `degree`,
//! `betweenness`, ...) instead of pure conflict-driven activity.
//!
//! ```sh
//! pbsat problem.opb
//! pbsat --heuristic page-rank --time-limit 60 problem.opb
//! pbsat --print-solution --csv-stats problem.cnf
//! ```
//!
//! Output follows the usual competition conventions: an `s` status line
//! (`SATISFIABLE`, `UNSATISFIABLE`, `OPTIMUM FOUND`, `UNKNOWN`), `o` lines
//! for every improved objective value, and a `v` literal line on demand.

use clap::{Parser, ValueEnum};
use pbsat::pb::centrality::HeuristicMode;
use pbsat::pb::literal::Lit;
use pbsat::pb::opb::{parse_path, Formula, Terms};
use pbsat::pb::restarter::{Luby, Never, Restarter};
use pbsat::pb::solver::{SolveState, Solver};
use pbsat::pb::stats::Stats;
use std::process::ExitCode;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(
    name = "pbsat",
    version,
    about = "A pseudo-Boolean solver with centrality-guided branching"
)]
struct Cli {
    /// Input file: OPB, or DIMACS CNF (detected by its `p cnf` line).
    path: String,

    /// Which scoring scheme seeds the branching order before search.
    #[arg(long, value_enum, default_value_t = HeuristicMode::Vsids)]
    heuristic: HeuristicMode,

    /// Restart schedule.
    #[arg(long, value_enum, default_value_t = RestartMode::Luby)]
    restarts: RestartMode,

    /// Wall-clock limit in seconds, polled cooperatively at search
    /// checkpoints.
    #[arg(long)]
    time_limit: Option<f64>,

    /// Ignore the objective line and report plain satisfiability.
    #[arg(long, default_value_t = false)]
    no_optimize: bool,

    /// Print the satisfying assignment as a `v` line.
    #[arg(short, long, default_value_t = false)]
    print_solution: bool,

    /// Print run counters as comment lines after solving.
    #[arg(long, default_value_t = false)]
    stats: bool,

    /// Print run counters as a CSV header/row pair (machine-readable).
    #[arg(long, default_value_t = false)]
    csv_stats: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RestartMode {
    Luby,
    Never,
}

/// Final answer of a run, after the optional optimization loop.
enum Outcome {
    Sat,
    Unsat,
    Optimum(i64),
    /// Time limit hit; carries the best objective value seen, if any.
    Unknown(Option<i64>),
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let formula = match parse_path(&cli.path) {
        Ok(formula) => formula,
        Err(e) => {
            eprintln!("c {e}");
            return ExitCode::FAILURE;
        }
    };
    log::info!(
        "parsed {}: {} vars, {} constraints, objective: {}",
        cli.path,
        formula.num_vars,
        formula.constraints.len(),
        formula.objective.is_some()
    );

    match cli.restarts {
        RestartMode::Luby => run::<Luby<100>>(&cli, &formula),
        RestartMode::Never => run::<Never>(&cli, &formula),
    }
}

fn run<R: Restarter>(cli: &Cli, formula: &Formula) -> ExitCode {
    let mut solver: Solver<R> = Solver::new(formula.num_vars);
    solver.set_heuristic(cli.heuristic);
    if let Some(limit) = cli.time_limit {
        solver.set_time_limit(limit);
    }
    for (terms, degree) in &formula.constraints {
        solver.add_constraint(terms, *degree);
    }

    let outcome = match &formula.objective {
        Some(objective) if !cli.no_optimize => minimize(&mut solver, objective),
        _ => match solver.solve() {
            SolveState::Sat => Outcome::Sat,
            SolveState::Unsat => Outcome::Unsat,
            _ => Outcome::Unknown(None),
        },
    };

    if cli.stats {
        println!("{}", solver.stats);
    }
    if cli.csv_stats {
        println!("c {}", Stats::csv_header());
        println!("c {}", solver.stats.csv_row());
    }

    let code = match outcome {
        Outcome::Sat => {
            println!("s SATISFIABLE");
            ExitCode::from(10)
        }
        Outcome::Optimum(value) => {
            println!("s OPTIMUM FOUND");
            println!("c objective {value}");
            ExitCode::from(30)
        }
        Outcome::Unsat => {
            println!("s UNSATISFIABLE");
            return ExitCode::from(20);
        }
        Outcome::Unknown(best) => {
            println!("s UNKNOWN");
            if let Some(value) = best {
                println!("c best objective {value}");
            }
            return ExitCode::FAILURE;
        }
    };

    if cli.print_solution {
        if let Some(solution) = solver.last_solution() {
            let line: Vec<String> = solution.iter().map(ToString::to_string).collect();
            println!("v {}", line.join(" "));
        }
    }
    code
}

/// Solution-improving minimization: after each model, require the next one
/// to be strictly better until the bound becomes infeasible.
fn minimize<R: Restarter>(solver: &mut Solver<R>, objective: &Terms) -> Outcome {
    let mut best: Option<i64> = None;
    loop {
        match solver.solve() {
            SolveState::Sat => {
                let solution = solver.last_solution().expect("SAT carries a solution");
                let value = objective_value(objective, solution);
                println!("o {value}");
                log::debug!("incumbent objective {value}");
                best = Some(value);
                let bound: Terms = objective.iter().map(|&(c, l)| (-c, l)).collect();
                solver.add_constraint(&bound, 1 - value);
            }
            SolveState::Unsat => {
                return best.map_or(Outcome::Unsat, Outcome::Optimum);
            }
            SolveState::Inprocessed => return Outcome::Unknown(best),
            SolveState::Inconsistent(_) | SolveState::Restarted => {
                unreachable!("terminal states only without assumptions")
            }
        }
    }
}

fn objective_value(objective: &Terms, solution: &[Lit]) -> i64 {
    objective
        .iter()
        .filter(|&&(_, l)| solution[l.variable() as usize - 1] == l)
        .map(|&(c, _)| c)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_objective_value_counts_true_literals() {
        let objective: Terms = vec![(3, Lit::from_i32(1)), (5, Lit::from_i32(-2))];
        let solution = vec![Lit::from_i32(1), Lit::from_i32(2)];
        assert_eq!(objective_value(&objective, &solution), 3);
        let solution = vec![Lit::from_i32(1), Lit::from_i32(-2)];
        assert_eq!(objective_value(&objective, &solution), 8);
    }
}
