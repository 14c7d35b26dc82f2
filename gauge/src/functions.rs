//! Function evaluation
//!
//! The four function variants are a closed enum; every operation here
//! matches all of them exhaustively, so a new evaluation path cannot be
//! silently skipped for one kind.

use gauge_core::{Dimension, GaugeError, Quantity};

use crate::reduce::Reducer;
use crate::tables::{BuiltinOp, FunctionDef, FunctionKind, Interpolation, TablesSnapshot};

/// Apply a function to an input quantity.
///
/// Computed functions re-enter the reducer for their formula with the
/// placeholder bound to the input; the reducer's visit stack guards against
/// a function (transitively) referencing itself.
pub fn evaluate(
    def: &FunctionDef,
    input: &Quantity,
    reducer: &mut Reducer<'_>,
) -> Result<Quantity, GaugeError> {
    match &def.kind {
        FunctionKind::Linear { slope, intercept, domain, range } => {
            if input.dimension != *domain {
                return Err(GaugeError::domain(
                    def.name.clone(),
                    format!(
                        "expects argument of dimension {}, got {}",
                        domain, input.dimension
                    ),
                ));
            }
            Ok(Quantity::new(slope * input.factor + intercept, range.clone()))
        }
        FunctionKind::Table { breakpoints, interpolation } => {
            if !input.is_dimensionless() {
                return Err(GaugeError::domain(
                    def.name.clone(),
                    format!("table argument must be dimensionless, got {}", input.dimension),
                ));
            }
            let y = lookup_table(&def.name, breakpoints, *interpolation, input.factor)?;
            Ok(Quantity::dimensionless(y))
        }
        FunctionKind::Builtin { op } => {
            if !input.is_dimensionless() {
                return Err(GaugeError::domain(
                    def.name.clone(),
                    format!("builtin argument must be dimensionless, got {}", input.dimension),
                ));
            }
            let y = apply_builtin(&def.name, *op, input.factor)?;
            Ok(Quantity::dimensionless(y))
        }
        FunctionKind::Computed { formula, .. } => {
            reducer.enter_named(&def.name, Some((&def.placeholder, input.clone())), formula)
        }
    }
}

/// The dimension a function expects of its argument. Used to decide whether
/// a "want" that names a function is a legal target for a given "have".
pub fn conformability(def: &FunctionDef) -> Dimension {
    match &def.kind {
        FunctionKind::Linear { domain, .. } => domain.clone(),
        FunctionKind::Table { .. } => Dimension::dimensionless(),
        FunctionKind::Builtin { .. } => Dimension::dimensionless(),
        FunctionKind::Computed { .. } => Dimension::dimensionless(),
    }
}

/// Whether `q` is an acceptable argument, up to lenient normalization.
pub fn accepts(def: &FunctionDef, q: &Quantity, tables: &TablesSnapshot) -> bool {
    let ignore = tables.ignored_dimensionless();
    q.dimension.without(ignore) == conformability(def).without(ignore)
}

/// Binary-search the bracketing breakpoint pair for `x` and interpolate.
/// Breakpoints are validated strictly ascending at build time.
fn lookup_table(
    name: &str,
    breakpoints: &[(f64, f64)],
    interpolation: Interpolation,
    x: f64,
) -> Result<f64, GaugeError> {
    let first = breakpoints[0];
    let last = breakpoints[breakpoints.len() - 1];

    if x < first.0 || x > last.0 {
        return match interpolation {
            Interpolation::Clamp => Ok(if x < first.0 { first.1 } else { last.1 }),
            Interpolation::Linear | Interpolation::Nearest => Err(GaugeError::domain(
                name.to_string(),
                format!("argument {} is out of range [{}, {}]", x, first.0, last.0),
            )),
        };
    }

    let upper = breakpoints.partition_point(|(px, _)| *px < x);
    if breakpoints[upper].0 == x {
        return Ok(breakpoints[upper].1);
    }
    let (x0, y0) = breakpoints[upper - 1];
    let (x1, y1) = breakpoints[upper];

    match interpolation {
        Interpolation::Nearest => {
            // tie goes to the lower breakpoint
            if x - x0 <= x1 - x {
                Ok(y0)
            } else {
                Ok(y1)
            }
        }
        Interpolation::Linear | Interpolation::Clamp => {
            Ok(y0 + (y1 - y0) * (x - x0) / (x1 - x0))
        }
    }
}

fn apply_builtin(name: &str, op: BuiltinOp, x: f64) -> Result<f64, GaugeError> {
    let out_of_domain = |reason: String| GaugeError::domain(name.to_string(), reason);
    match op {
        BuiltinOp::Sqrt => {
            if x < 0.0 {
                return Err(out_of_domain(format!("sqrt of negative value {}", x)));
            }
            Ok(x.sqrt())
        }
        BuiltinOp::CubeRoot => Ok(x.cbrt()),
        BuiltinOp::Ln => {
            if x <= 0.0 {
                return Err(out_of_domain(format!("ln of non-positive value {}", x)));
            }
            Ok(x.ln())
        }
        BuiltinOp::Log10 => {
            if x <= 0.0 {
                return Err(out_of_domain(format!("log10 of non-positive value {}", x)));
            }
            Ok(x.log10())
        }
        BuiltinOp::Sin => Ok(x.sin()),
        BuiltinOp::Cos => Ok(x.cos()),
        BuiltinOp::Tan => Ok(x.tan()),
        BuiltinOp::Atan => Ok(x.atan()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::tables::TableBuilder;

    fn tables(text: &str) -> TablesSnapshot {
        let (tables, errors) = TableBuilder::new().add_source("test", text).build();
        assert!(errors.is_empty(), "{:?}", errors);
        tables
    }

    fn call(tables: &TablesSnapshot, text: &str) -> Result<Quantity, GaugeError> {
        Reducer::with_functions(tables).reduce(&parse(text).unwrap())
    }

    #[test]
    fn test_linear_affine_map() {
        let t = tables("K  !\ntempC(x) linear\n    1 ; 273.15 ; 1 ; K\n");
        let q = call(&t, "tempC(100)").unwrap();
        assert!((q.factor - 373.15).abs() < 1e-9);
        assert_eq!(q.dimension, Dimension::base("K"));
    }

    #[test]
    fn test_linear_domain_mismatch() {
        let t = tables("K  !\nm  !\ntempC(x) linear\n    1 ; 273.15 ; 1 ; K\n");
        let err = call(&t, "tempC(2 m)").unwrap_err();
        assert!(matches!(err, GaugeError::Domain { .. }), "{:?}", err);
    }

    #[test]
    fn test_table_interpolation() {
        let t = tables("f(x) table\n    0  0\n    10  100\n");
        assert_eq!(call(&t, "f(5)").unwrap().factor, 50.0);
        assert_eq!(call(&t, "f(0)").unwrap().factor, 0.0);
        assert_eq!(call(&t, "f(10)").unwrap().factor, 100.0);
    }

    #[test]
    fn test_table_out_of_range_strict() {
        let t = tables("f(x) table\n    0  0\n    10  100\n");
        let err = call(&t, "f(11)").unwrap_err();
        assert!(matches!(err, GaugeError::Domain { .. }), "{:?}", err);
    }

    #[test]
    fn test_table_clamp() {
        let t = tables("f(x) table clamp\n    0  0\n    10  100\n");
        assert_eq!(call(&t, "f(-3)").unwrap().factor, 0.0);
        assert_eq!(call(&t, "f(25)").unwrap().factor, 100.0);
        assert_eq!(call(&t, "f(5)").unwrap().factor, 50.0);
    }

    #[test]
    fn test_table_nearest() {
        let t = tables("f(x) table nearest\n    0  0\n    10  100\n");
        assert_eq!(call(&t, "f(4)").unwrap().factor, 0.0);
        assert_eq!(call(&t, "f(6)").unwrap().factor, 100.0);
        // tie goes low
        assert_eq!(call(&t, "f(5)").unwrap().factor, 0.0);
    }

    #[test]
    fn test_builtin_sqrt() {
        let t = tables("root(x) builtin sqrt\n");
        assert_eq!(call(&t, "root(16)").unwrap().factor, 4.0);
        assert!(call(&t, "root(-1)").is_err());
    }

    #[test]
    fn test_builtin_requires_dimensionless() {
        let t = tables("m  !\nroot(x) builtin sqrt\n");
        let err = call(&t, "root(4 m)").unwrap_err();
        assert!(matches!(err, GaugeError::Domain { .. }), "{:?}", err);
    }

    #[test]
    fn test_computed_chains_through_units() {
        let t = tables("m  !\nft  0.3048 m\nsquare_ft(x) computed\n    x^2 ft^2\n");
        let q = call(&t, "square_ft(3)").unwrap();
        assert!((q.factor - 9.0 * 0.3048 * 0.3048).abs() < 1e-12);
        assert_eq!(q.dimension, Dimension::base("m").power(2).unwrap());
    }

    #[test]
    fn test_computed_may_call_other_functions() {
        let t = tables("root(x) builtin sqrt\nfourth(x) computed\n    root(root(x))\n");
        assert_eq!(call(&t, "fourth(16)").unwrap().factor, 2.0);
    }

    #[test]
    fn test_computed_self_reference_is_cycle() {
        let t = tables("f(x) computed\n    f(x)\n");
        let err = call(&t, "f(2)").unwrap_err();
        assert!(matches!(err, GaugeError::CircularDefinition { .. }), "{:?}", err);
    }

    #[test]
    fn test_computed_mutual_recursion_is_cycle() {
        let t = tables("f(x) computed\n    g(x)\ng(x) computed\n    f(x)\n");
        let err = call(&t, "f(2)").unwrap_err();
        assert!(matches!(err, GaugeError::CircularDefinition { .. }), "{:?}", err);
    }

    #[test]
    fn test_conformability() {
        let t = tables("K  !\ntempC(x) linear\n    1 ; 273.15 ; K ; K\n");
        let def = t.function("tempC").unwrap();
        assert_eq!(conformability(def), Dimension::base("K"));
    }
}
