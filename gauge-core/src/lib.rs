//! Gauge Core - foundation types for the Gauge unit-conversion engine
//!
//! - `Dimension`: exponent vector over an open basis of primitive units
//! - `Quantity`: f64 factor + dimension, with the dimensional algebra
//! - `GaugeError` / `TableBuildError`: the structured error taxonomy
//!
//! Everything here is a plain value: cloneable, serializable, and free of
//! global state. The engine crate (`gauge`) builds the parser, definition
//! tables and conversion service on top of these.

mod dimension;
mod error;
mod quantity;

pub use dimension::Dimension;
pub use error::{render_caret, GaugeError, TableBuildError};
pub use quantity::Quantity;
