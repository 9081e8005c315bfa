#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
//! Readers for linear pseudo-Boolean input (OPB) and DIMACS CNF.
//!
//! The OPB dialect accepted here covers the common linear fragment:
//! - Comment lines starting with `*` (the `#variable=`/`#constraint=`
//!   header is a comment; counts are derived from the constraints found).
//! - An optional objective line `min: +1 x1 +2 x2 ;`.
//! - Constraint lines `+2 x1 -3 ~x2 >= 5 ;` with relations `>=`, `<=` or
//!   `=` (an equality becomes two inequalities).
//!
//! DIMACS CNF is handled as the degenerate all-coefficients-one case and
//! detected by its `p cnf` problem line.

use crate::pb::literal::Lit;
use itertools::Itertools;
use std::fmt;
use std::io::{self, BufRead};

pub type Terms = Vec<(i64, Lit)>;

/// A parsed input formula: constraints are `sum(coef * lit) >= degree`,
/// the objective (if any) is minimized.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Formula {
    pub num_vars: usize,
    pub constraints: Vec<(Terms, i64)>,
    pub objective: Option<Terms>,
}

#[derive(Debug)]
pub enum ParseError {
    Io(io::Error),
    Malformed { line: usize, message: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "read failed: {e}"),
            Self::Malformed { line, message } => {
                write!(f, "malformed input at line {line}: {message}")
            }
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Malformed { .. } => None,
        }
    }
}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

fn malformed(line: usize, message: impl Into<String>) -> ParseError {
    ParseError::Malformed {
        line,
        message: message.into(),
    }
}

/// Parses a literal token: `x12` or `~x12`.
fn parse_opb_literal(token: &str, line: usize) -> Result<Lit, ParseError> {
    let (negated, name) = token
        .strip_prefix('~')
        .map_or((false, token), |rest| (true, rest));
    let var: u32 = name
        .strip_prefix('x')
        .and_then(|digits| digits.parse().ok())
        .filter(|&v| v > 0)
        .ok_or_else(|| malformed(line, format!("expected a literal, found '{token}'")))?;
    Ok(Lit::new(var, !negated))
}

/// Parses the `<coef> <lit> <coef> <lit> ...` prefix of a line, stopping at
/// the first non-coefficient token. Returns the terms and the rest.
fn parse_terms<'a>(
    tokens: &'a [&'a str],
    line: usize,
) -> Result<(Terms, &'a [&'a str]), ParseError> {
    let mut terms = Terms::new();
    let mut rest = tokens;
    while let Some((&first, tail)) = rest.split_first() {
        let Ok(coef) = first.parse::<i64>() else {
            break;
        };
        let (&lit_token, tail) = tail
            .split_first()
            .ok_or_else(|| malformed(line, "coefficient without a literal"))?;
        terms.push((coef, parse_opb_literal(lit_token, line)?));
        rest = tail;
    }
    Ok((terms, rest))
}

/// Parses OPB-formatted data from a buffered reader.
///
/// # Errors
/// I/O failures and syntax errors, with the offending line number.
pub fn parse_opb<R: BufRead>(reader: R) -> Result<Formula, ParseError> {
    let mut formula = Formula::default();
    for (index, line) in reader.lines().enumerate() {
        let number = index + 1;
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('*') {
            continue;
        }
        let line = line.strip_suffix(';').unwrap_or(line).trim();

        if let Some(objective) = line.strip_prefix("min:") {
            let tokens = objective.split_whitespace().collect_vec();
            let (terms, rest) = parse_terms(&tokens, number)?;
            if !rest.is_empty() {
                return Err(malformed(number, format!("trailing tokens '{}'", rest.join(" "))));
            }
            formula.objective = Some(terms);
            continue;
        }

        let tokens = line.split_whitespace().collect_vec();
        let (terms, rest) = parse_terms(&tokens, number)?;
        let [relation, degree_token] = rest else {
            return Err(malformed(number, "expected '<relation> <degree>'"));
        };
        let degree: i64 = degree_token
            .parse()
            .map_err(|_| malformed(number, format!("bad degree '{degree_token}'")))?;
        match *relation {
            ">=" => formula.constraints.push((terms, degree)),
            "<=" => formula
                .constraints
                .push((negated_terms(&terms), -degree)),
            "=" => {
                formula.constraints.push((terms.clone(), degree));
                formula.constraints.push((negated_terms(&terms), -degree));
            }
            other => {
                return Err(malformed(number, format!("unknown relation '{other}'")));
            }
        }
    }
    formula.num_vars = max_var(&formula);
    Ok(formula)
}

fn negated_terms(terms: &Terms) -> Terms {
    terms.iter().map(|&(c, l)| (-c, l)).collect()
}

fn max_var(formula: &Formula) -> usize {
    formula
        .constraints
        .iter()
        .flat_map(|(terms, _)| terms)
        .chain(formula.objective.iter().flatten())
        .map(|(_, l)| l.variable() as usize)
        .max()
        .unwrap_or(0)
}

/// Parses DIMACS CNF: each clause becomes an all-ones constraint of
/// degree one. The problem line's counts are ignored; the variable count
/// is derived from the literals found.
///
/// # Errors
/// I/O failures and non-integer literal tokens.
pub fn parse_dimacs<R: BufRead>(reader: R) -> Result<Formula, ParseError> {
    let mut formula = Formula::default();
    for (index, line) in reader.lines().enumerate() {
        let number = index + 1;
        let line = line?;
        let mut parts = line.split_whitespace().peekable();
        match parts.peek() {
            Some(&"%") => break,
            None | Some(&"c" | &"p") => {}
            Some(_) => {
                let mut terms = Terms::new();
                for token in parts {
                    let value: i32 = token.parse().map_err(|_| {
                        malformed(number, format!("bad literal '{token}'"))
                    })?;
                    if value == 0 {
                        break;
                    }
                    terms.push((1, Lit::from_i32(value)));
                }
                if !terms.is_empty() {
                    formula.constraints.push((terms, 1));
                }
            }
        }
    }
    formula.num_vars = max_var(&formula);
    Ok(formula)
}

/// Opens and parses an input file, detecting DIMACS by its `p cnf` problem
/// line and treating everything else as OPB.
///
/// # Errors
/// File open/read failures and syntax errors.
pub fn parse_path(path: &str) -> Result<Formula, ParseError> {
    let content = std::fs::read_to_string(path)?;
    let is_dimacs = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('c') && !l.starts_with('*'))
        .is_some_and(|l| l.starts_with("p cnf"));
    if is_dimacs {
        parse_dimacs(content.as_bytes())
    } else {
        parse_opb(content.as_bytes())
    }
}
