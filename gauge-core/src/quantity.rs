//! Quantity type - a numeric factor with a dimension vector
//!
//! Quantities are transient values created per request. A primitive unit's
//! own quantity is `{factor: 1, dimension: {self: 1}}`.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{Dimension, GaugeError};

/// A physical quantity: a numeric factor with a dimension vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    /// The numeric value, expressed in primitive units.
    pub factor: f64,
    /// The dimensional signature.
    pub dimension: Dimension,
}

impl Quantity {
    /// Create a new quantity
    pub fn new(factor: f64, dimension: Dimension) -> Self {
        Quantity { factor, dimension }
    }

    /// Create a dimensionless quantity (pure number)
    pub fn dimensionless(factor: f64) -> Self {
        Quantity { factor, dimension: Dimension::dimensionless() }
    }

    /// The quantity of a primitive unit itself: `{1, {name: 1}}`.
    pub fn base(name: impl Into<String>) -> Self {
        Quantity { factor: 1.0, dimension: Dimension::base(name) }
    }

    /// Check if this is a dimensionless quantity
    pub fn is_dimensionless(&self) -> bool {
        self.dimension.is_dimensionless()
    }

    /// Check if two quantities share an identical dimension vector.
    pub fn is_compatible(&self, other: &Quantity) -> bool {
        self.dimension == other.dimension
    }

    /// Lenient compatibility: entries for names in `ignore` are removed from
    /// both vectors before comparing.
    pub fn is_compatible_ignoring(&self, other: &Quantity, ignore: &BTreeSet<String>) -> bool {
        self.dimension.without(ignore) == other.dimension.without(ignore)
    }

    /// Multiply two quantities (dimensions are multiplied)
    pub fn mul(&self, other: &Quantity) -> Result<Quantity, GaugeError> {
        Ok(Quantity {
            factor: self.factor * other.factor,
            dimension: self.dimension.multiply(&other.dimension)?,
        })
    }

    /// Scale the factor, keeping the dimension. Used for prefix application.
    pub fn scale(&self, multiplier: f64) -> Quantity {
        Quantity {
            factor: self.factor * multiplier,
            dimension: self.dimension.clone(),
        }
    }

    /// Divide two quantities (dimensions are divided)
    pub fn div(&self, other: &Quantity) -> Result<Quantity, GaugeError> {
        if other.factor == 0.0 {
            return Err(GaugeError::domain("division", "division by zero"));
        }
        Ok(Quantity {
            factor: self.factor / other.factor,
            dimension: self.dimension.divide(&other.dimension)?,
        })
    }

    /// Raise to an integer power
    pub fn pow(&self, exp: i32) -> Result<Quantity, GaugeError> {
        if exp < 0 && self.factor == 0.0 {
            return Err(GaugeError::domain("power", "division by zero"));
        }
        Ok(Quantity {
            factor: self.factor.powi(exp),
            dimension: self.dimension.power(exp)?,
        })
    }

    /// Negate the factor, keeping the dimension.
    pub fn neg(&self) -> Quantity {
        Quantity {
            factor: -self.factor,
            dimension: self.dimension.clone(),
        }
    }

    /// The reciprocal quantity: every exponent negated, factor inverted.
    /// A zero factor has no reciprocal.
    pub fn recip(&self) -> Result<Quantity, GaugeError> {
        if self.factor == 0.0 {
            return Err(GaugeError::domain("reciprocal", "zero factor has no reciprocal"));
        }
        Ok(Quantity {
            factor: 1.0 / self.factor,
            dimension: self.dimension.invert(),
        })
    }

    /// Strict conversion ratio from this quantity to `other`.
    pub fn ratio_to(&self, other: &Quantity) -> Result<f64, GaugeError> {
        if !self.is_compatible(other) {
            return Err(GaugeError::Incompatible {
                have: self.dimension.clone(),
                want: other.dimension.clone(),
            });
        }
        if other.factor == 0.0 {
            return Err(GaugeError::domain("conversion", "division by zero"));
        }
        Ok(self.factor / other.factor)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            write!(f, "{}", self.factor)
        } else {
            write!(f, "{} {}", self.factor, self.dimension)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meters(factor: f64) -> Quantity {
        Quantity::new(factor, Dimension::base("m"))
    }

    fn seconds(factor: f64) -> Quantity {
        Quantity::new(factor, Dimension::base("s"))
    }

    #[test]
    fn test_base_quantity() {
        let q = Quantity::base("m");
        assert_eq!(q.factor, 1.0);
        assert_eq!(q.dimension, Dimension::base("m"));
    }

    #[test]
    fn test_mul() {
        let area = meters(5.0).mul(&meters(3.0)).unwrap();
        assert_eq!(area.factor, 15.0);
        assert_eq!(area.dimension, Dimension::base("m").power(2).unwrap());
    }

    #[test]
    fn test_div() {
        let velocity = meters(100.0).div(&seconds(10.0)).unwrap();
        assert_eq!(velocity.factor, 10.0);
        assert_eq!(velocity.dimension, Dimension::from_pairs([("m", 1), ("s", -1)]));
    }

    #[test]
    fn test_div_by_zero() {
        let err = meters(1.0).div(&Quantity::dimensionless(0.0)).unwrap_err();
        assert!(matches!(err, GaugeError::Domain { .. }));
    }

    #[test]
    fn test_pow() {
        let volume = meters(5.0).pow(3).unwrap();
        assert_eq!(volume.factor, 125.0);
        assert_eq!(volume.dimension.exponent("m"), 3);
    }

    #[test]
    fn test_negative_pow() {
        let hz = seconds(2.0).pow(-1).unwrap();
        assert_eq!(hz.factor, 0.5);
        assert_eq!(hz.dimension.exponent("s"), -1);
    }

    #[test]
    fn test_recip() {
        let hz = seconds(1.0).recip().unwrap();
        assert_eq!(hz.factor, 1.0);
        assert_eq!(hz.dimension, Dimension::base("s").invert());
        assert!(Quantity::dimensionless(0.0).recip().is_err());
    }

    #[test]
    fn test_ratio_to() {
        let km = meters(1000.0);
        assert_eq!(km.ratio_to(&meters(1.0)).unwrap(), 1000.0);
        assert!(km.ratio_to(&seconds(1.0)).is_err());
    }

    #[test]
    fn test_lenient_compatibility() {
        let ignore: BTreeSet<String> = ["radian".to_string()].into();
        let angular = Quantity::new(1.0, Dimension::from_pairs([("s", -1), ("radian", 1)]));
        let hz = Quantity::new(1.0, Dimension::from_pairs([("s", -1)]));
        assert!(!angular.is_compatible(&hz));
        assert!(angular.is_compatible_ignoring(&hz, &ignore));
    }
}
