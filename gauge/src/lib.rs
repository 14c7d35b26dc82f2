//! Gauge - unit conversion engine
//!
//! Builds an immutable [`TablesSnapshot`] from layered text unit databases,
//! then answers conversion queries against it: parse both expressions,
//! reduce them to a numeric factor over primitive dimensions, and compare.
//!
//! ```
//! use gauge::{ConversionResult, Gauge};
//!
//! let gauge = Gauge::with_default_database();
//! match gauge.convert("5 miles", "km").unwrap() {
//!     ConversionResult::Ratio { value } => assert!((value - 8.04672).abs() < 1e-9),
//!     other => panic!("unexpected: {:?}", other),
//! }
//! ```

mod ast;
mod convert;
mod functions;
mod lexer;
mod parser;
mod prefix;
mod reduce;
mod tables;

pub use ast::{BinOp, Expr};
pub use convert::{check_all, conformable_units, convert, convert_strict, ConversionResult};
pub use gauge_core::{render_caret, Dimension, GaugeError, Quantity, TableBuildError};
pub use parser::parse;
pub use reduce::{reduce, reduce_name, Reducer};
pub use tables::{
    BuiltinOp, FunctionDef, FunctionKind, Interpolation, PrefixDef, SourceLocation,
    TableBuilder, TablesSnapshot, UnitBody, UnitDef,
};

use std::sync::Arc;

use tracing::info;

const DEFAULT_DATABASE: &str = include_str!("../data/default.units");

/// Main conversion engine. Holds an immutable snapshot behind an `Arc`;
/// clones of the handle share it, and [`Gauge::reload`] swaps in a fresh
/// snapshot without disturbing readers that already hold one.
#[derive(Clone)]
pub struct Gauge {
    tables: Arc<TablesSnapshot>,
    build_errors: Arc<Vec<TableBuildError>>,
}

impl Gauge {
    /// Build an engine from named sources, layered in order. Malformed
    /// entries are skipped and reported through [`Gauge::build_errors`];
    /// the rest of the database stays usable.
    pub fn from_sources<'a, I>(sources: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut builder = TableBuilder::new();
        for (name, text) in sources {
            builder = builder.add_source(name, text);
        }
        let (tables, build_errors) = builder.build();
        info!(
            units = tables.unit_names().len(),
            errors = build_errors.len(),
            "unit tables built"
        );
        Gauge {
            tables: Arc::new(tables),
            build_errors: Arc::new(build_errors),
        }
    }

    /// Engine loaded with the embedded default database.
    pub fn with_default_database() -> Self {
        Gauge::from_sources([("default", DEFAULT_DATABASE)])
    }

    /// Default database plus extra sources layered on top (later wins).
    pub fn with_extra_sources<'a, I>(sources: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut all = vec![("default", DEFAULT_DATABASE)];
        all.extend(sources);
        Gauge::from_sources(all)
    }

    /// Shared handle to the current snapshot. Queries made against it keep
    /// working even if the engine reloads underneath.
    pub fn snapshot(&self) -> Arc<TablesSnapshot> {
        self.tables.clone()
    }

    pub fn tables(&self) -> &TablesSnapshot {
        &self.tables
    }

    /// Recoverable problems from the last build, in source order.
    pub fn build_errors(&self) -> &[TableBuildError] {
        &self.build_errors
    }

    /// Rebuild from new sources and swap the snapshot.
    pub fn reload<'a, I>(&mut self, sources: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        *self = Gauge::from_sources(sources);
    }

    /// Convert `have` into `want`. See [`convert`].
    pub fn convert(&self, have: &str, want: &str) -> Result<ConversionResult, GaugeError> {
        convert::convert(have, want, &self.tables)
    }

    /// Like [`Gauge::convert`], but a reciprocal match reports as
    /// incompatible instead.
    pub fn convert_strict(&self, have: &str, want: &str) -> Result<ConversionResult, GaugeError> {
        convert::convert_strict(have, want, &self.tables)
    }

    /// The stored definition text of a unit, if defined under that name.
    pub fn definition_of(&self, name: &str) -> Option<&UnitDef> {
        convert::definition_of(name, &self.tables)
    }

    /// Sorted unit names conformable with the given expression.
    pub fn conformable_units(&self, expr: &str) -> Result<Vec<String>, GaugeError> {
        let q = Reducer::with_functions(&self.tables).reduce(&parse(expr)?)?;
        Ok(convert::conformable_units(&q, &self.tables)
            .map(str::to_string)
            .collect())
    }

    /// Reduce every unit in the database and report the failures.
    pub fn check_all(&self) -> Vec<GaugeError> {
        convert::check_all(&self.tables)
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Gauge::with_default_database()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> Gauge {
        Gauge::with_default_database()
    }

    fn ratio(gauge: &Gauge, have: &str, want: &str) -> f64 {
        match gauge.convert(have, want).unwrap() {
            ConversionResult::Ratio { value } => value,
            other => panic!("{} -> {}: expected ratio, got {:?}", have, want, other),
        }
    }

    #[test]
    fn test_default_database_is_clean() {
        let gauge = engine();
        assert!(gauge.build_errors().is_empty(), "{:?}", gauge.build_errors());
        assert!(gauge.check_all().is_empty(), "{:?}", gauge.check_all());
    }

    #[test]
    fn test_miles_to_km() {
        assert!((ratio(&engine(), "5 miles", "km") - 8.04672).abs() < 1e-9);
    }

    #[test]
    fn test_kilometer_is_1000_meter() {
        assert!((ratio(&engine(), "kilometer", "meter") - 1000.0).abs() < 1e-12);
    }

    #[test]
    fn test_self_conversion_is_one() {
        let gauge = engine();
        for expr in ["m", "J / s", "mph", "kg m^2 / s^2"] {
            assert_eq!(ratio(&gauge, expr, expr), 1.0, "{}", expr);
        }
    }

    #[test]
    fn test_round_trip_product_is_one() {
        let gauge = engine();
        let forward = ratio(&gauge, "pound", "kg");
        let back = ratio(&gauge, "kg", "pound");
        assert!((forward * back - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_reciprocal_hertz_second() {
        let gauge = engine();
        assert_eq!(
            gauge.convert("1 hertz", "second").unwrap(),
            ConversionResult::Reciprocal { value: 1.0 }
        );
        assert!(matches!(
            gauge.convert_strict("1 hertz", "second").unwrap(),
            ConversionResult::Incompatible { .. }
        ));
    }

    #[test]
    fn test_temperature_function() {
        let gauge = engine();
        match gauge.convert("212", "tempF").unwrap() {
            ConversionResult::FunctionResult { value } => {
                assert!((value - 373.15).abs() < 1e-9)
            }
            other => panic!("expected function result, got {:?}", other),
        }
    }

    #[test]
    fn test_unicode_operators() {
        let gauge = engine();
        assert!((ratio(&gauge, "1 m²", "cm^2") - 10000.0).abs() < 1e-9);
        assert!((ratio(&gauge, "3 × 4 m", "m") - 12.0).abs() < 1e-12);
    }

    #[test]
    fn test_prefix_stacking() {
        let gauge = engine();
        assert!((ratio(&gauge, "GHz", "kHz") - 1e6).abs() < 1e-3);
        assert!((ratio(&gauge, "micrometer", "nm") - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_layered_override_wins() {
        let gauge = Gauge::with_extra_sources([("local", "mile  2000 m\n")]);
        assert_eq!(ratio(&gauge, "mile", "m"), 2000.0);
    }

    #[test]
    fn test_malformed_line_is_isolated() {
        let gauge = Gauge::with_extra_sources([("local", "bad^name  3 m\ngood  3 m\n")]);
        assert_eq!(gauge.build_errors().len(), 1);
        assert_eq!(ratio(&gauge, "good", "m"), 3.0);
    }

    #[test]
    fn test_conformable_units_for_pressure() {
        let gauge = engine();
        let names = gauge.conformable_units("psi").unwrap();
        assert!(names.contains(&"pascal".to_string()));
        assert!(names.contains(&"bar".to_string()));
        assert!(!names.contains(&"joule".to_string()));
    }

    #[test]
    fn test_definition_lookup() {
        let gauge = engine();
        let def = gauge.definition_of("mile").unwrap();
        assert_eq!(def.body, UnitBody::Expression("5280 foot".to_string()));
    }

    #[test]
    fn test_snapshot_survives_reload() {
        let mut gauge = engine();
        let snapshot = gauge.snapshot();
        gauge.reload([("tiny", "m  !\n")]);
        assert!(snapshot.unit("mile").is_some());
        assert!(gauge.tables().unit("mile").is_none());
    }
}
