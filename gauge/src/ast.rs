//! Abstract Syntax Tree for unit expressions

use serde::{Deserialize, Serialize};

/// A parsed unit expression.
///
/// The parser knows nothing about the definition tables: `Unit` names are
/// validated during reduction, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Numeric literal (decimal or scientific notation).
    Number(f64),
    /// Reference to a (possibly prefixed) unit name.
    Unit(String),
    /// Binary operation.
    Binary(Box<Expr>, BinOp, Box<Expr>),
    /// Unary negation.
    Negate(Box<Expr>),
    /// Function call `name(arg)`.
    Call(String, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Mul,
    Div,
    /// The alternate division glyph `|`; same precedence as `/`.
    AltDiv,
    Pow,
}

impl Expr {
    pub fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
        Expr::Binary(Box::new(left), op, Box::new(right))
    }

    /// Collect every unit and function name referenced by this expression.
    pub fn referenced_names(&self, out: &mut std::collections::BTreeSet<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Unit(name) => {
                out.insert(name.clone());
            }
            Expr::Binary(left, _, right) => {
                left.referenced_names(out);
                right.referenced_names(out);
            }
            Expr::Negate(inner) => inner.referenced_names(out),
            Expr::Call(name, arg) => {
                out.insert(name.clone());
                arg.referenced_names(out);
            }
        }
    }
}
