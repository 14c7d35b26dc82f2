//! Dimensional analysis over an open basis
//!
//! A dimension is a vector of signed integer exponents keyed by the names of
//! primitive units. The basis is not fixed: primitives come from whatever
//! definition database was loaded, so the vector is a sorted map rather than
//! a hardcoded SI array. Zero exponents are never stored.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::GaugeError;

/// Largest exponent magnitude the algebra will produce. Operations that
/// would push past this fail with a `Domain` error instead of overflowing.
const MAX_EXPONENT: i64 = 1 << 20;

/// Exponent vector of a physical quantity, keyed by primitive-unit name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    exponents: BTreeMap<String, i32>,
}

impl Dimension {
    /// The dimensionless vector (all exponents zero).
    pub fn dimensionless() -> Self {
        Dimension::default()
    }

    /// Basis vector for a single primitive unit: `{name: 1}`.
    pub fn base(name: impl Into<String>) -> Self {
        let mut exponents = BTreeMap::new();
        exponents.insert(name.into(), 1);
        Dimension { exponents }
    }

    /// Build from explicit (name, exponent) pairs. Zero entries are dropped.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, i32)>,
        S: Into<String>,
    {
        let mut dim = Dimension::default();
        for (name, exp) in pairs {
            dim.set(name.into(), exp);
        }
        dim
    }

    /// Exponent of a primitive, zero if absent.
    pub fn exponent(&self, name: &str) -> i32 {
        self.exponents.get(name).copied().unwrap_or(0)
    }

    fn set(&mut self, name: String, exp: i32) {
        if exp == 0 {
            self.exponents.remove(&name);
        } else {
            self.exponents.insert(name, exp);
        }
    }

    /// Store an exponent computed in i64, rejecting values outside the
    /// supported range.
    fn checked_set(&mut self, name: String, exp: i64) -> Result<(), GaugeError> {
        if exp.abs() > MAX_EXPONENT {
            return Err(GaugeError::domain(
                "dimension",
                format!("exponent {} for '{}' exceeds the supported range", exp, name),
            ));
        }
        self.set(name, exp as i32);
        Ok(())
    }

    /// Check if this is a dimensionless quantity
    pub fn is_dimensionless(&self) -> bool {
        self.exponents.is_empty()
    }

    /// Multiply dimensions (add exponents)
    pub fn multiply(&self, other: &Dimension) -> Result<Dimension, GaugeError> {
        let mut result = self.clone();
        for (name, exp) in &other.exponents {
            result.checked_set(name.clone(), result.exponent(name) as i64 + *exp as i64)?;
        }
        Ok(result)
    }

    /// Divide dimensions (subtract exponents)
    pub fn divide(&self, other: &Dimension) -> Result<Dimension, GaugeError> {
        self.multiply(&other.invert())
    }

    /// Raise to integer power (multiply exponents)
    pub fn power(&self, exp: i32) -> Result<Dimension, GaugeError> {
        let mut result = Dimension::default();
        for (name, e) in &self.exponents {
            result.checked_set(name.clone(), *e as i64 * exp as i64)?;
        }
        Ok(result)
    }

    /// Invert dimensions (negate exponents). Infallible: the algebra keeps
    /// every exponent well inside the symmetric `MAX_EXPONENT` bound.
    pub fn invert(&self) -> Dimension {
        let mut result = self.clone();
        for exp in result.exponents.values_mut() {
            *exp = exp.saturating_neg();
        }
        result
    }

    /// Copy with every exponent for a name in `ignore` removed.
    ///
    /// Used for lenient conformability, where configured dimensionless
    /// primitives (plane/solid angle and the like) do not count.
    pub fn without(&self, ignore: &BTreeSet<String>) -> Dimension {
        let mut result = self.clone();
        for name in ignore {
            result.exponents.remove(name);
        }
        result
    }

    /// Iterate (name, exponent) pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.exponents.iter().map(|(n, e)| (n.as_str(), *e))
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for (name, exp) in &self.exponents {
            if *exp == 1 {
                parts.push(name.clone());
            } else {
                parts.push(format!("{}^{}", name, exp));
            }
        }
        if parts.is_empty() {
            write!(f, "1")
        } else {
            write!(f, "{}", parts.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensionless() {
        assert!(Dimension::dimensionless().is_dimensionless());
        assert!(!Dimension::base("m").is_dimensionless());
    }

    #[test]
    fn test_multiply_cancels() {
        let m = Dimension::base("m");
        let per_m = m.invert();
        assert!(m.multiply(&per_m).unwrap().is_dimensionless());
    }

    #[test]
    fn test_divide() {
        let velocity = Dimension::base("m").divide(&Dimension::base("s")).unwrap();
        assert_eq!(velocity, Dimension::from_pairs([("m", 1), ("s", -1)]));
    }

    #[test]
    fn test_power() {
        let area = Dimension::base("m").power(2).unwrap();
        assert_eq!(area.exponent("m"), 2);
        assert!(area.power(0).unwrap().is_dimensionless());
    }

    #[test]
    fn test_exponent_range_is_bounded() {
        let big = Dimension::base("m").power(1 << 20).unwrap();
        assert!(matches!(big.power(2), Err(GaugeError::Domain { .. })));
        assert!(matches!(big.multiply(&big), Err(GaugeError::Domain { .. })));
        // inversion of a maximal exponent stays exact
        assert_eq!(big.invert().exponent("m"), -(1 << 20));
    }

    #[test]
    fn test_zero_entries_dropped() {
        let dim = Dimension::from_pairs([("m", 1), ("s", 0)]);
        assert_eq!(dim, Dimension::base("m"));
        assert_eq!(dim.iter().count(), 1);
    }

    #[test]
    fn test_without() {
        let ignore: BTreeSet<String> = ["radian".to_string()].into();
        let dim = Dimension::from_pairs([("m", 1), ("radian", -1)]);
        assert_eq!(dim.without(&ignore), Dimension::base("m"));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Dimension::dimensionless()), "1");
        assert_eq!(format!("{}", Dimension::base("m")), "m");
        let force = Dimension::from_pairs([("kg", 1), ("m", 1), ("s", -2)]);
        assert_eq!(format!("{}", force), "kg m s^-2");
    }
}
