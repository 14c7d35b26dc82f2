//! Dimensional reduction
//!
//! Evaluates an expression tree bottom-up into a canonical `Quantity`.
//! Named units resolve through the prefix resolver and recurse into their
//! stored definitions; the resolution path is threaded through an explicit
//! visit stack, so circular definitions fail deterministically instead of
//! recursing forever. Successfully reduced units are served from the
//! snapshot's build-time memo cache.

use std::collections::HashMap;

use tracing::trace;

use gauge_core::{GaugeError, Quantity};

use crate::ast::{BinOp, Expr};
use crate::functions;
use crate::parser::parse;
use crate::prefix;
use crate::tables::{TablesSnapshot, UnitBody};

/// Reduce an expression to a quantity. Function calls are not reducible by
/// this entry point; they produce a `Domain` error telling the caller to
/// route through the function engine (`Reducer::with_functions`).
pub fn reduce(expr: &Expr, tables: &TablesSnapshot) -> Result<Quantity, GaugeError> {
    Reducer::new(tables).reduce(expr)
}

/// Reduce a bare unit name to a quantity.
pub fn reduce_name(name: &str, tables: &TablesSnapshot) -> Result<Quantity, GaugeError> {
    Reducer::new(tables).reduce_name(name)
}

pub struct Reducer<'a> {
    tables: &'a TablesSnapshot,
    /// Names currently being resolved, for cycle detection. Shared between
    /// unit definitions and function bodies, since computed functions and
    /// units can reference each other.
    stack: Vec<String>,
    /// Placeholder bindings for computed-function formulas; shadow units.
    bindings: HashMap<String, Quantity>,
    functions_allowed: bool,
}

impl<'a> Reducer<'a> {
    /// Pure reducer: rejects function calls.
    pub fn new(tables: &'a TablesSnapshot) -> Self {
        Reducer {
            tables,
            stack: Vec::new(),
            bindings: HashMap::new(),
            functions_allowed: false,
        }
    }

    /// Reducer that evaluates function calls through the function engine.
    pub fn with_functions(tables: &'a TablesSnapshot) -> Self {
        Reducer { functions_allowed: true, ..Reducer::new(tables) }
    }

    pub fn tables(&self) -> &'a TablesSnapshot {
        self.tables
    }

    pub fn reduce(&mut self, expr: &Expr) -> Result<Quantity, GaugeError> {
        match expr {
            Expr::Number(value) => Ok(Quantity::dimensionless(*value)),
            Expr::Unit(name) => self.reduce_name(name),
            Expr::Negate(inner) => Ok(self.reduce(inner)?.neg()),
            Expr::Binary(left, op, right) => {
                let lhs = self.reduce(left)?;
                match op {
                    BinOp::Mul => lhs.mul(&self.reduce(right)?),
                    BinOp::Div | BinOp::AltDiv => lhs.div(&self.reduce(right)?),
                    BinOp::Pow => {
                        let exponent = self.integer_exponent(right)?;
                        lhs.pow(exponent)
                    }
                }
            }
            Expr::Call(name, arg) => self.reduce_call(name, arg),
        }
    }

    /// Resolve a (possibly prefixed) unit name to its canonical quantity.
    pub fn reduce_name(&mut self, name: &str) -> Result<Quantity, GaugeError> {
        if let Some(bound) = self.bindings.get(name) {
            return Ok(bound.clone());
        }

        let resolved = prefix::resolve(name, self.tables)?;
        let base = match resolved.base {
            Some(base) => base,
            // Bare prefix: a dimensionless multiplier.
            None => return Ok(Quantity::dimensionless(resolved.multiplier)),
        };

        // Lookup cannot fail: the resolver only returns names it found.
        let def = match self.tables.unit(&base) {
            Some(def) => def,
            None => return Err(GaugeError::unknown_unit(base)),
        };

        match &def.body {
            UnitBody::Primitive { .. } => {
                Ok(Quantity::base(def.name.clone()).scale(resolved.multiplier))
            }
            UnitBody::Expression(raw) => {
                if let Some(cached) = self.tables.cached(&def.name) {
                    return Ok(cached.scale(resolved.multiplier));
                }
                if self.stack.iter().any(|entry| entry == &def.name) {
                    let mut chain = self.stack.clone();
                    chain.push(def.name.clone());
                    return Err(GaugeError::circular(chain));
                }
                trace!(unit = %def.name, "reducing definition");
                self.stack.push(def.name.clone());
                let result = parse(raw).and_then(|expr| self.reduce(&expr));
                self.stack.pop();
                Ok(result?.scale(resolved.multiplier))
            }
        }
    }

    fn reduce_call(&mut self, name: &str, arg: &Expr) -> Result<Quantity, GaugeError> {
        if !self.functions_allowed {
            return Err(GaugeError::domain(
                name.to_string(),
                "function call is not reducible to a plain quantity",
            ));
        }
        let def = match self.tables.function(name) {
            Some(def) => def.clone(),
            None => return Err(GaugeError::unknown_unit(name)),
        };
        let input = self.reduce(arg)?;
        functions::evaluate(&def, &input, self)
    }

    /// An exponent must reduce to a dimensionless integral value.
    fn integer_exponent(&mut self, expr: &Expr) -> Result<i32, GaugeError> {
        let q = self.reduce(expr)?;
        if !q.is_dimensionless() {
            return Err(GaugeError::domain(
                "exponent",
                format!("exponent has dimension {}", q.dimension),
            ));
        }
        let rounded = q.factor.round();
        if (q.factor - rounded).abs() > 1e-9 {
            return Err(GaugeError::domain(
                "exponent",
                format!("exponent {} is not an integer", q.factor),
            ));
        }
        // A bare `as i32` would saturate huge values silently.
        if rounded.abs() > i32::MAX as f64 {
            return Err(GaugeError::domain(
                "exponent",
                format!("exponent {} is out of range", q.factor),
            ));
        }
        Ok(rounded as i32)
    }

    /// Guarded entry into a named definition body, used by the function
    /// engine for computed formulas.
    pub(crate) fn enter_named(
        &mut self,
        name: &str,
        binding: Option<(&str, Quantity)>,
        formula: &str,
    ) -> Result<Quantity, GaugeError> {
        if self.stack.iter().any(|entry| entry == name) {
            let mut chain = self.stack.clone();
            chain.push(name.to_string());
            return Err(GaugeError::circular(chain));
        }
        self.stack.push(name.to_string());

        let saved = binding.as_ref().and_then(|(placeholder, input)| {
            self.bindings.insert(placeholder.to_string(), input.clone())
        });
        let result = parse(formula).and_then(|expr| self.reduce(&expr));
        if let Some((placeholder, _)) = binding {
            match saved {
                Some(previous) => {
                    self.bindings.insert(placeholder.to_string(), previous);
                }
                None => {
                    self.bindings.remove(placeholder);
                }
            }
        }

        self.stack.pop();
        result
    }
}
