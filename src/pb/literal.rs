#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
use core::ops::{Neg, Not};
use std::fmt;

pub type Variable = u32;

/// A signed literal: positive value asserts the variable true, negative
/// asserts it false. Negation is a sign flip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Lit(i32);

impl Lit {
    #[must_use]
    pub fn new(var: Variable, polarity: bool) -> Self {
        debug_assert!(var > 0, "variables are 1-based");
        let v = i32::try_from(var).expect("variable id overflowed");
        if polarity {
            Self(v)
        } else {
            Self(-v)
        }
    }

    #[must_use]
    pub const fn from_i32(value: i32) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn to_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn variable(self) -> Variable {
        self.0.unsigned_abs()
    }

    #[must_use]
    pub const fn polarity(self) -> bool {
        self.0 > 0
    }

    #[must_use]
    pub const fn negated(self) -> Self {
        Self(-self.0)
    }

    /// Dense 0-based index for watch lists: positive polarity first.
    #[must_use]
    pub const fn index(self) -> usize {
        let base = (self.variable() as usize - 1) * 2;
        if self.polarity() {
            base
        } else {
            base + 1
        }
    }
}

impl Neg for Lit {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.negated()
    }
}

impl Not for Lit {
    type Output = Self;

    fn not(self) -> Self::Output {
        self.negated()
    }
}

impl From<i32> for Lit {
    fn from(value: i32) -> Self {
        Self::from_i32(value)
    }
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.polarity() {
            write!(f, "x{}", self.variable())
        } else {
            write!(f, "~x{}", self.variable())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negation_is_involution() {
        let l = Lit::new(3, true);
        assert_eq!(!!l, l);
        assert_eq!((!l).polarity(), false);
        assert_eq!((!l).variable(), 3);
    }

    #[test]
    fn test_index_is_dense() {
        assert_eq!(Lit::new(1, true).index(), 0);
        assert_eq!(Lit::new(1, false).index(), 1);
        assert_eq!(Lit::new(2, true).index(), 2);
        assert_eq!(Lit::new(2, false).index(), 3);
    }

    #[test]
    fn test_from_i32_roundtrip() {
        assert_eq!(Lit::from_i32(-7), Lit::new(7, false));
        assert_eq!(Lit::from_i32(-7).to_i32(), -7);
    }
}
