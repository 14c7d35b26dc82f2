//! Error taxonomy
//!
//! Errors are values. Parsing, reduction and conversion return them
//! explicitly; nothing in the core panics or throws for ordinary control
//! flow. Every variant carries enough structure (names, offsets, dimension
//! vectors) for a presentation layer to render a precise diagnostic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Dimension;

/// Any failure produced by the core engine.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum GaugeError {
    /// The input text is not a well-formed unit expression. The offset is a
    /// byte offset into the normalized input, suitable for a caret diagnostic.
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    /// An identifier resolved to no unit, prefix+unit split, or plural form.
    #[error("unknown unit '{name}'")]
    UnknownUnit { name: String },

    /// A definition (unit or function) transitively references itself.
    /// The chain lists the names on the resolution path, cycle entry last.
    #[error("circular definition: {}", chain.join(" -> "))]
    CircularDefinition { chain: Vec<String> },

    /// An operation was applied outside its domain: division by zero,
    /// a non-dimensionless builtin argument, an out-of-range table lookup,
    /// a reciprocal of a zero factor, a non-integer exponent.
    #[error("{context}: {reason}")]
    Domain { context: String, reason: String },

    /// Two quantities cannot be related by any scalar ratio.
    #[error("incompatible units: have {have}, want {want}")]
    Incompatible { have: Dimension, want: Dimension },
}

impl GaugeError {
    pub fn syntax(offset: usize, message: impl Into<String>) -> Self {
        GaugeError::Syntax { offset, message: message.into() }
    }

    pub fn unknown_unit(name: impl Into<String>) -> Self {
        GaugeError::UnknownUnit { name: name.into() }
    }

    pub fn circular(chain: Vec<String>) -> Self {
        GaugeError::CircularDefinition { chain }
    }

    pub fn domain(context: impl Into<String>, reason: impl Into<String>) -> Self {
        GaugeError::Domain { context: context.into(), reason: reason.into() }
    }
}

/// One malformed entry in a definition source. Collected during the build
/// pass; never fatal to the rest of the build.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{source_name}:{line}: {message}")]
pub struct TableBuildError {
    /// Name of the definition source the entry came from.
    pub source_name: String,
    /// 1-based line number of the entry's first physical line.
    pub line: usize,
    pub message: String,
}

impl TableBuildError {
    pub fn new(source_name: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        TableBuildError {
            source_name: source_name.into(),
            line,
            message: message.into(),
        }
    }
}

/// Render a two-line caret diagnostic pointing at `offset` in `input`.
///
/// Presentation helper for `GaugeError::Syntax`. The offset counts bytes in
/// the text the error was produced from — for `Syntax` errors that is the
/// normalized expression (unicode glyphs expanded to ASCII), so pass that
/// form, not the raw user input. An offset past the end or inside a
/// multi-byte character is moved back to the nearest boundary.
pub fn render_caret(input: &str, offset: usize) -> String {
    let mut offset = offset.min(input.len());
    while offset > 0 && !input.is_char_boundary(offset) {
        offset -= 1;
    }
    let column = input[..offset].chars().count();
    format!("{}\n{}^", input, " ".repeat(column))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_syntax() {
        let err = GaugeError::syntax(4, "unexpected ')'");
        assert_eq!(err.to_string(), "syntax error at offset 4: unexpected ')'");
    }

    #[test]
    fn test_display_circular() {
        let err = GaugeError::circular(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(err.to_string(), "circular definition: a -> b -> a");
    }

    #[test]
    fn test_display_incompatible() {
        let err = GaugeError::Incompatible {
            have: Dimension::base("m"),
            want: Dimension::base("s"),
        };
        assert_eq!(err.to_string(), "incompatible units: have m, want s");
    }

    #[test]
    fn test_build_error_location() {
        let err = TableBuildError::new("personal.units", 12, "bad definition");
        assert_eq!(err.to_string(), "personal.units:12: bad definition");
    }

    #[test]
    fn test_render_caret() {
        let rendered = render_caret("5 foo^", 5);
        assert_eq!(rendered, "5 foo^\n     ^");
    }

    #[test]
    fn test_render_caret_multibyte() {
        // offset 1 lands inside the two-byte 'é'; back up to its start
        assert_eq!(render_caret("élan", 1), "élan\n^");
        assert_eq!(render_caret("élan", 3), "élan\n  ^");
        assert_eq!(render_caret("élan", 99), "élan\n    ^");
    }

    #[test]
    fn test_serializes() {
        let err = GaugeError::unknown_unit("zorble");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("zorble"));
    }
}
