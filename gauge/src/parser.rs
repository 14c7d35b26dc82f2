//! Recursive-descent parser for unit expressions
//!
//! Precedence, tightest first: unary minus; `^` (right-associative);
//! multiplication and division (`*`, `/`, `|`, and adjacency — one
//! left-associative level); parentheses and `name(arg)` calls as primaries.
//!
//! The parser never consults the definition tables. Whether an identifier
//! names a real unit is the reducer's concern.

use gauge_core::GaugeError;

use crate::ast::{BinOp, Expr};
use crate::lexer::{normalize, tokenize, Token, TokenKind};

/// Parse an expression string into an AST.
pub fn parse(input: &str) -> Result<Expr, GaugeError> {
    let normalized = normalize(input);
    let tokens = tokenize(&normalized)?;
    if tokens.is_empty() {
        return Err(GaugeError::syntax(0, "empty expression"));
    }
    let mut parser = Parser { tokens, pos: 0, input_len: normalized.len() };
    let expr = parser.parse_mul()?;
    if let Some(tok) = parser.peek() {
        return Err(GaugeError::syntax(
            tok.offset,
            format!("unexpected {}", describe(&tok.kind)),
        ));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    input_len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn end_offset(&self) -> usize {
        self.input_len
    }

    /// mul := pow (('*' | '/' | '|' | adjacency) pow)*
    fn parse_mul(&mut self) -> Result<Expr, GaugeError> {
        let mut left = self.parse_pow()?;
        loop {
            let op = match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Star) => {
                    self.advance();
                    BinOp::Mul
                }
                Some(TokenKind::Slash) => {
                    self.advance();
                    BinOp::Div
                }
                Some(TokenKind::Pipe) => {
                    self.advance();
                    BinOp::AltDiv
                }
                // Adjacency: a following primary-start token is an
                // implicit multiplication ("5 miles", "N m").
                Some(TokenKind::Number(_))
                | Some(TokenKind::Ident(_))
                | Some(TokenKind::Func(_))
                | Some(TokenKind::LParen) => BinOp::Mul,
                _ => break,
            };
            let right = self.parse_pow()?;
            left = Expr::binary(left, op, right);
        }
        Ok(left)
    }

    /// pow := unary ('^' pow)?   (right-associative)
    fn parse_pow(&mut self) -> Result<Expr, GaugeError> {
        let base = self.parse_unary()?;
        if let Some(TokenKind::Caret) = self.peek().map(|t| &t.kind) {
            self.advance();
            let exponent = self.parse_pow()?;
            return Ok(Expr::binary(base, BinOp::Pow, exponent));
        }
        Ok(base)
    }

    /// unary := '-' unary | primary
    fn parse_unary(&mut self) -> Result<Expr, GaugeError> {
        if let Some(TokenKind::Minus) = self.peek().map(|t| &t.kind) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, GaugeError> {
        let tok = match self.advance() {
            Some(tok) => tok,
            None => {
                return Err(GaugeError::syntax(self.end_offset(), "unexpected end of expression"));
            }
        };
        match tok.kind {
            TokenKind::Number(value) => Ok(Expr::Number(value)),
            TokenKind::Ident(name) => Ok(Expr::Unit(name)),
            TokenKind::Func(name) => {
                // The lexer guarantees the next token is '('.
                self.expect_lparen()?;
                let arg = self.parse_mul()?;
                self.expect_rparen()?;
                Ok(Expr::Call(name, Box::new(arg)))
            }
            TokenKind::LParen => {
                let inner = self.parse_mul()?;
                self.expect_rparen()?;
                Ok(inner)
            }
            other => Err(GaugeError::syntax(
                tok.offset,
                format!("unexpected {}", describe(&other)),
            )),
        }
    }

    fn expect_lparen(&mut self) -> Result<(), GaugeError> {
        match self.advance() {
            Some(Token { kind: TokenKind::LParen, .. }) => Ok(()),
            Some(tok) => Err(GaugeError::syntax(
                tok.offset,
                format!("expected '(', found {}", describe(&tok.kind)),
            )),
            None => Err(GaugeError::syntax(self.end_offset(), "expected '('")),
        }
    }

    fn expect_rparen(&mut self) -> Result<(), GaugeError> {
        match self.advance() {
            Some(Token { kind: TokenKind::RParen, .. }) => Ok(()),
            Some(tok) => Err(GaugeError::syntax(
                tok.offset,
                format!("expected ')', found {}", describe(&tok.kind)),
            )),
            None => Err(GaugeError::syntax(self.end_offset(), "missing closing ')'")),
        }
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Number(n) => format!("number {}", n),
        TokenKind::Ident(name) | TokenKind::Func(name) => format!("'{}'", name),
        TokenKind::Star => "'*'".to_string(),
        TokenKind::Slash => "'/'".to_string(),
        TokenKind::Pipe => "'|'".to_string(),
        TokenKind::Caret => "'^'".to_string(),
        TokenKind::Minus => "'-'".to_string(),
        TokenKind::LParen => "'('".to_string(),
        TokenKind::RParen => "')'".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(name: &str) -> Expr {
        Expr::Unit(name.to_string())
    }

    #[test]
    fn test_adjacency_multiplication() {
        let expr = parse("5 miles").unwrap();
        assert_eq!(expr, Expr::binary(Expr::Number(5.0), BinOp::Mul, unit("miles")));
    }

    #[test]
    fn test_explicit_operators() {
        let expr = parse("m / s").unwrap();
        assert_eq!(expr, Expr::binary(unit("m"), BinOp::Div, unit("s")));

        let expr = parse("1|2 m").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                Expr::binary(Expr::Number(1.0), BinOp::AltDiv, Expr::Number(2.0)),
                BinOp::Mul,
                unit("m"),
            )
        );
    }

    #[test]
    fn test_left_associative_division() {
        // a / b / c == (a / b) / c
        let expr = parse("a / b / c").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                Expr::binary(unit("a"), BinOp::Div, unit("b")),
                BinOp::Div,
                unit("c"),
            )
        );
    }

    #[test]
    fn test_power_right_associative() {
        // 2^3^2 == 2^(3^2)
        let expr = parse("2^3^2").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                Expr::Number(2.0),
                BinOp::Pow,
                Expr::binary(Expr::Number(3.0), BinOp::Pow, Expr::Number(2.0)),
            )
        );
    }

    #[test]
    fn test_power_binds_tighter_than_mul() {
        // m s^-2 == m * (s^(-2))
        let expr = parse("m s^-2").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                unit("m"),
                BinOp::Mul,
                Expr::binary(
                    unit("s"),
                    BinOp::Pow,
                    Expr::Negate(Box::new(Expr::Number(2.0))),
                ),
            )
        );
    }

    #[test]
    fn test_unary_minus_binds_tightest() {
        // -2^2 == (-2)^2 per the grammar's precedence ordering
        let expr = parse("-2^2").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                Expr::Negate(Box::new(Expr::Number(2.0))),
                BinOp::Pow,
                Expr::Number(2.0),
            )
        );
    }

    #[test]
    fn test_parentheses() {
        let expr = parse("kg (m / s^2)").unwrap();
        assert_eq!(
            expr,
            Expr::binary(
                unit("kg"),
                BinOp::Mul,
                Expr::binary(
                    unit("m"),
                    BinOp::Div,
                    Expr::binary(unit("s"), BinOp::Pow, Expr::Number(2.0)),
                ),
            )
        );
    }

    #[test]
    fn test_function_call() {
        let expr = parse("tempF(50)").unwrap();
        assert_eq!(expr, Expr::Call("tempF".into(), Box::new(Expr::Number(50.0))));
    }

    #[test]
    fn test_unicode_glyphs() {
        let expr = parse("m²").unwrap();
        assert_eq!(expr, Expr::binary(unit("m"), BinOp::Pow, Expr::Number(2.0)));

        let expr = parse("N·m").unwrap();
        assert_eq!(expr, Expr::binary(unit("N"), BinOp::Mul, unit("m")));
    }

    #[test]
    fn test_error_offsets() {
        let err = parse("m / ").unwrap_err();
        assert!(matches!(err, GaugeError::Syntax { offset: 4, .. }), "{:?}", err);

        let err = parse("(m").unwrap_err();
        assert!(matches!(err, GaugeError::Syntax { .. }));

        let err = parse("").unwrap_err();
        assert_eq!(err, GaugeError::syntax(0, "empty expression"));
    }

    #[test]
    fn test_trailing_garbage() {
        let err = parse("m )").unwrap_err();
        assert!(matches!(err, GaugeError::Syntax { offset: 2, .. }), "{:?}", err);
    }
}
