//! Conversion service
//!
//! Ties the parser, reducer and function engine together into the
//! user-facing operations: convert between two expressions, show a
//! definition, list conformable units, and sanity-check a whole database.

use serde::{Deserialize, Serialize};
use tracing::debug;

use gauge_core::{GaugeError, Quantity};

use crate::functions;
use crate::parser::parse;
use crate::reduce::Reducer;
use crate::tables::{TablesSnapshot, UnitDef};

/// Outcome of a conversion request. `Incompatible` is a result, not an
/// error: the request was well-formed, the quantities just do not match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversionResult {
    /// `have` is `value` of `want`.
    Ratio { value: f64 },
    /// `have` matches the reciprocal of `want`; `value` is their product.
    Reciprocal { value: f64 },
    /// `want` named a function; `value` is the function applied to `have`.
    FunctionResult { value: f64 },
    /// Dimensions differ, reported in canonical form.
    Incompatible { have: String, want: String },
}

/// Convert `have` into `want`, allowing a reciprocal match.
pub fn convert(
    have: &str,
    want: &str,
    tables: &TablesSnapshot,
) -> Result<ConversionResult, GaugeError> {
    convert_inner(have, want, tables, true)
}

/// Convert `have` into `want`; reciprocal matches report as incompatible.
pub fn convert_strict(
    have: &str,
    want: &str,
    tables: &TablesSnapshot,
) -> Result<ConversionResult, GaugeError> {
    convert_inner(have, want, tables, false)
}

fn convert_inner(
    have: &str,
    want: &str,
    tables: &TablesSnapshot,
    allow_reciprocal: bool,
) -> Result<ConversionResult, GaugeError> {
    let have_q = Reducer::with_functions(tables).reduce(&parse(have)?)?;

    // A bare function name as the target applies the function instead of
    // dividing. A unit of the same name wins, so a database can shadow one
    // with the other.
    let target = want.trim();
    if tables.unit(target).is_none() {
        if let Some(def) = tables.function(target) {
            if !functions::accepts(def, &have_q, tables) {
                return Ok(incompatible(&have_q.dimension, &functions::conformability(def), tables));
            }
            let mut reducer = Reducer::with_functions(tables);
            let out = functions::evaluate(def, &have_q, &mut reducer)?;
            return Ok(ConversionResult::FunctionResult { value: out.factor });
        }
    }

    let want_q = Reducer::with_functions(tables).reduce(&parse(want)?)?;
    let ignore = tables.ignored_dimensionless();
    let have_dim = have_q.dimension.without(ignore);
    let want_dim = want_q.dimension.without(ignore);

    if have_dim == want_dim {
        if want_q.factor == 0.0 {
            return Err(GaugeError::domain(want.to_string(), "target reduces to zero"));
        }
        debug!(have, want, ratio = have_q.factor / want_q.factor, "ratio conversion");
        return Ok(ConversionResult::Ratio { value: have_q.factor / want_q.factor });
    }

    if allow_reciprocal && have_dim == want_dim.invert() {
        if want_q.factor == 0.0 {
            return Err(GaugeError::domain(want.to_string(), "target reduces to zero"));
        }
        debug!(have, want, "reciprocal conversion");
        return Ok(ConversionResult::Reciprocal { value: have_q.factor * want_q.factor });
    }

    Ok(incompatible(&have_q.dimension, &want_q.dimension, tables))
}

fn incompatible(
    have: &gauge_core::Dimension,
    want: &gauge_core::Dimension,
    tables: &TablesSnapshot,
) -> ConversionResult {
    let ignore = tables.ignored_dimensionless();
    ConversionResult::Incompatible {
        have: have.without(ignore).to_string(),
        want: want.without(ignore).to_string(),
    }
}

/// The stored definition of a unit name, if one exists under that exact
/// spelling (prefix splitting does not apply here).
pub fn definition_of<'a>(name: &str, tables: &'a TablesSnapshot) -> Option<&'a UnitDef> {
    tables.unit(name)
}

/// All unit names whose reduced dimension leniently matches `q`, sorted.
/// Aliases are listed alongside their canonical names.
pub fn conformable_units<'a>(
    q: &'a Quantity,
    tables: &'a TablesSnapshot,
) -> impl Iterator<Item = &'a str> + 'a {
    let ignore = tables.ignored_dimensionless();
    let target = q.dimension.without(ignore);
    tables.unit_names().into_iter().filter(move |name| {
        let def = match tables.unit(name) {
            Some(def) => def,
            None => return false,
        };
        let reduced = match tables.cached(&def.name) {
            Some(cached) => cached.dimension.clone(),
            None => match crate::reduce::reduce_name(&def.name, tables) {
                Ok(quantity) => quantity.dimension,
                Err(_) => return false,
            },
        };
        reduced.without(ignore) == target
    })
}

/// Reduce every canonical unit in the database from scratch and collect
/// the failures. Clean databases return an empty vector.
pub fn check_all(tables: &TablesSnapshot) -> Vec<GaugeError> {
    let mut failures = Vec::new();
    for name in tables.unit_names() {
        let def = match tables.unit(name) {
            Some(def) => def,
            None => continue,
        };
        if def.name != name {
            continue; // alias entry, covered by its canonical name
        }
        if let Err(err) = crate::reduce::reduce_name(name, tables) {
            failures.push(err);
        }
    }
    failures
}
